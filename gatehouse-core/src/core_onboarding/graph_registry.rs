//! Question graphs by group

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::question_graph::QuestionGraph;
use super::types::GroupId;
use crate::config::{ConfigError, OnboardingConfig};

#[derive(Debug, Clone, Default)]
pub struct GraphRegistry {
    graphs: HashMap<GroupId, Arc<QuestionGraph>>,
}

impl GraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate every graph file named in the configuration
    pub fn load(config: &OnboardingConfig) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for (group, path) in &config.question_graphs {
            let graph = QuestionGraph::from_file(path).map_err(|err| ConfigError::GraphLoad {
                group: group.clone(),
                reason: err.to_string(),
            })?;
            info!(group = %group, path = %path.display(), questions = graph.len(), "Loaded question graph");
            registry.insert(GroupId::new(group.as_str()), graph);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, group: GroupId, graph: QuestionGraph) {
        self.graphs.insert(group, Arc::new(graph));
    }

    pub fn with_graph(mut self, group: impl Into<String>, graph: QuestionGraph) -> Self {
        self.insert(GroupId::new(group), graph);
        self
    }

    pub fn get(&self, group: &GroupId) -> Option<Arc<QuestionGraph>> {
        self.graphs.get(group).cloned()
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const GRAPH: &str = r#"
        [[question]]
        id = "why"
        prompt = "Why do you want to join?"
        kind = "free_text"
    "#;

    #[test]
    fn test_load_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guild.toml");
        std::fs::write(&path, GRAPH).unwrap();

        let mut config = OnboardingConfig::default();
        config.question_graphs.insert("guild".to_string(), path);

        let registry = GraphRegistry::load(&config).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&GroupId::new("guild")).is_some());
        assert!(registry.get(&GroupId::new("other")).is_none());
    }

    #[test]
    fn test_missing_file_names_the_group() {
        let mut config = OnboardingConfig::default();
        config
            .question_graphs
            .insert("guild".to_string(), PathBuf::from("/nonexistent/gatehouse/graph.toml"));

        match GraphRegistry::load(&config) {
            Err(ConfigError::GraphLoad { group, .. }) => assert_eq!(group, "guild"),
            other => panic!("expected GraphLoad, got {:?}", other),
        }
    }
}
