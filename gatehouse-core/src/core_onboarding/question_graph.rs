//! Conditional question graph
//!
//! A group's questionnaire is a forest of questions. A child question hangs
//! off one option of a single-select parent and is only asked when the
//! parent was answered with that option. Traversal is depth-first: roots in
//! configured order, and a parent's matching children directly after it.
//!
//! The graph is immutable once built; every query is a pure function of the
//! answers collected so far.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use thiserror::Error;
use tracing::trace;

use super::errors::Refusal;
use super::types::{OptionId, QuestionId};

/// Answers of one session, keyed by question
pub type AnswerSet = BTreeMap<QuestionId, AnswerValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    FreeText,
    SingleSelect,
}

/// One choice on a single-select question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: OptionId,
    pub label: String,
    /// Choosing this option flags the submission for the reviewer
    #[serde(default)]
    pub immediate_reject: bool,
}

/// Edge to the parent question and the option that unlocks this node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentEdge {
    pub question: QuestionId,
    pub option: OptionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionNode {
    pub id: QuestionId,
    pub prompt: String,
    pub kind: QuestionKind,
    /// Position among siblings; ties keep declaration order
    #[serde(default)]
    pub order: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<QuestionOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentEdge>,
}

impl QuestionNode {
    pub fn option(&self, id: &OptionId) -> Option<&QuestionOption> {
        self.options.iter().find(|option| &option.id == id)
    }
}

/// A recorded answer: free text or the id of the chosen option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Text(String),
    Choice(OptionId),
}

impl AnswerValue {
    pub fn text(value: impl Into<String>) -> Self {
        AnswerValue::Text(value.into())
    }

    pub fn choice(option: impl Into<String>) -> Self {
        AnswerValue::Choice(OptionId::new(option))
    }
}

/// Why a graph definition was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("question graph has no questions")]
    Empty,

    #[error("duplicate question id '{0}'")]
    DuplicateQuestion(QuestionId),

    #[error("question '{question}' declares option '{option}' twice")]
    DuplicateOption { question: QuestionId, option: OptionId },

    #[error("single-select question '{0}' has no options")]
    MissingOptions(QuestionId),

    #[error("free-text question '{0}' must not declare options")]
    UnexpectedOptions(QuestionId),

    #[error("question '{question}' references unknown parent '{parent}'")]
    UnknownParent { question: QuestionId, parent: QuestionId },

    #[error("question '{question}' references option '{option}' missing from parent '{parent}'")]
    UnknownParentOption { question: QuestionId, parent: QuestionId, option: OptionId },

    #[error("question '{question}' hangs off free-text question '{parent}'")]
    ParentNotSelect { question: QuestionId, parent: QuestionId },

    #[error("question '{0}' is part of a parent cycle")]
    Cycle(QuestionId),

    #[error("failed to parse question graph: {0}")]
    Parse(String),

    #[error("failed to read question graph: {0}")]
    Io(String),
}

#[derive(Debug, Deserialize, Serialize)]
struct GraphFile {
    #[serde(rename = "question", default)]
    questions: Vec<QuestionNode>,
}

/// Validated, immutable question forest
#[derive(Debug, Clone)]
pub struct QuestionGraph {
    /// Declaration order
    nodes: Vec<QuestionNode>,
    index: HashMap<QuestionId, usize>,
    /// Root indices in traversal order
    roots: Vec<usize>,
    /// Child indices per parent, in traversal order
    children: HashMap<QuestionId, Vec<usize>>,
}

impl QuestionGraph {
    /// Validate and index `nodes`
    pub fn new(nodes: Vec<QuestionNode>) -> Result<Self, GraphError> {
        if nodes.is_empty() {
            return Err(GraphError::Empty);
        }

        let mut index = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            if index.insert(node.id.clone(), position).is_some() {
                return Err(GraphError::DuplicateQuestion(node.id.clone()));
            }
        }

        for node in &nodes {
            match node.kind {
                QuestionKind::SingleSelect if node.options.is_empty() => {
                    return Err(GraphError::MissingOptions(node.id.clone()));
                }
                QuestionKind::FreeText if !node.options.is_empty() => {
                    return Err(GraphError::UnexpectedOptions(node.id.clone()));
                }
                _ => {}
            }

            let mut seen = HashSet::new();
            for option in &node.options {
                if !seen.insert(&option.id) {
                    return Err(GraphError::DuplicateOption {
                        question: node.id.clone(),
                        option: option.id.clone(),
                    });
                }
            }

            if let Some(edge) = &node.parent {
                let parent = index
                    .get(&edge.question)
                    .map(|&i| &nodes[i])
                    .ok_or_else(|| GraphError::UnknownParent {
                        question: node.id.clone(),
                        parent: edge.question.clone(),
                    })?;
                if parent.kind != QuestionKind::SingleSelect {
                    return Err(GraphError::ParentNotSelect {
                        question: node.id.clone(),
                        parent: parent.id.clone(),
                    });
                }
                if parent.option(&edge.option).is_none() {
                    return Err(GraphError::UnknownParentOption {
                        question: node.id.clone(),
                        parent: parent.id.clone(),
                        option: edge.option.clone(),
                    });
                }
            }
        }

        // One parent per node, so a cycle shows up as a parent chain longer than the graph
        for node in &nodes {
            let mut current = node;
            let mut hops = 0;
            while let Some(edge) = &current.parent {
                hops += 1;
                if hops > nodes.len() {
                    return Err(GraphError::Cycle(node.id.clone()));
                }
                current = &nodes[index[&edge.question]];
            }
        }

        let by_order = |a: &usize, b: &usize| nodes[*a].order.cmp(&nodes[*b].order).then(a.cmp(b));

        let mut roots: Vec<usize> = (0..nodes.len()).filter(|&i| nodes[i].parent.is_none()).collect();
        roots.sort_by(by_order);

        let mut children: HashMap<QuestionId, Vec<usize>> = HashMap::new();
        for (position, node) in nodes.iter().enumerate() {
            if let Some(edge) = &node.parent {
                children.entry(edge.question.clone()).or_default().push(position);
            }
        }
        for siblings in children.values_mut() {
            siblings.sort_by(by_order);
        }

        Ok(Self { nodes, index, roots, children })
    }

    /// Parse `[[question]]` tables
    pub fn from_toml_str(contents: &str) -> Result<Self, GraphError> {
        let file: GraphFile = toml::from_str(contents).map_err(|e| GraphError::Parse(e.to_string()))?;
        Self::new(file.questions)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| GraphError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Serialize back to the `[[question]]` format
    pub fn to_toml_string(&self) -> Result<String, GraphError> {
        let file = GraphFile { questions: self.nodes.clone() };
        toml::to_string_pretty(&file).map_err(|e| GraphError::Parse(e.to_string()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All questions in declaration order
    pub fn questions(&self) -> &[QuestionNode] {
        &self.nodes
    }

    pub fn question(&self, id: &QuestionId) -> Option<&QuestionNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Every question currently reachable, in traversal order
    pub fn reachable_path(&self, answers: &AnswerSet) -> Vec<&QuestionNode> {
        let mut path = Vec::new();
        for &root in &self.roots {
            self.walk(root, answers, &mut path);
        }
        path
    }

    fn walk<'a>(&'a self, position: usize, answers: &AnswerSet, path: &mut Vec<&'a QuestionNode>) {
        let node = &self.nodes[position];
        path.push(node);

        let Some(AnswerValue::Choice(chosen)) = answers.get(&node.id) else {
            return;
        };
        if let Some(children) = self.children.get(&node.id) {
            for &child in children {
                if self.nodes[child].parent.as_ref().map(|edge| &edge.option) == Some(chosen) {
                    self.walk(child, answers, path);
                }
            }
        }
    }

    /// First question of an empty session
    pub fn first_question(&self) -> Option<&QuestionNode> {
        self.roots.first().map(|&i| &self.nodes[i])
    }

    /// Next reachable, unanswered question; `None` means complete
    pub fn next_question(&self, answers: &AnswerSet) -> Option<&QuestionNode> {
        let next = self
            .reachable_path(answers)
            .into_iter()
            .find(|node| !answers.contains_key(&node.id));
        trace!(answered = answers.len(), next = ?next.map(|n| &n.id), "Computed next question");
        next
    }

    pub fn is_complete(&self, answers: &AnswerSet) -> bool {
        self.next_question(answers).is_none()
    }

    pub fn is_reachable(&self, id: &QuestionId, answers: &AnswerSet) -> bool {
        self.reachable_path(answers).iter().any(|node| &node.id == id)
    }

    /// Check `value` against the question's kind and limits
    ///
    /// Text is trimmed; the trimmed form is what gets stored.
    pub fn validate_answer(
        &self,
        node: &QuestionNode,
        value: AnswerValue,
        max_text_len: usize,
    ) -> Result<AnswerValue, Refusal> {
        match (node.kind, value) {
            (QuestionKind::FreeText, AnswerValue::Text(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(Refusal::Validation(format!("answer to '{}' is empty", node.id)));
                }
                let length = text.chars().count();
                if length > max_text_len {
                    return Err(Refusal::Validation(format!(
                        "answer to '{}' is {} characters, the limit is {}",
                        node.id, length, max_text_len
                    )));
                }
                Ok(AnswerValue::Text(text.to_string()))
            }
            (QuestionKind::SingleSelect, AnswerValue::Choice(option)) => {
                if node.option(&option).is_none() {
                    return Err(Refusal::Validation(format!(
                        "'{}' is not an option of '{}'",
                        option, node.id
                    )));
                }
                Ok(AnswerValue::Choice(option))
            }
            (QuestionKind::FreeText, AnswerValue::Choice(_)) => Err(Refusal::Validation(format!(
                "'{}' expects a text answer",
                node.id
            ))),
            (QuestionKind::SingleSelect, AnswerValue::Text(_)) => Err(Refusal::Validation(format!(
                "'{}' expects one of its options",
                node.id
            ))),
        }
    }

    /// Drop answers to questions no longer reachable; returns the removed ids
    pub fn prune_unreachable(&self, answers: &mut AnswerSet) -> Vec<QuestionId> {
        let reachable: HashSet<QuestionId> =
            self.reachable_path(answers).into_iter().map(|node| node.id.clone()).collect();

        let removed: Vec<QuestionId> =
            answers.keys().filter(|id| !reachable.contains(*id)).cloned().collect();
        for id in &removed {
            answers.remove(id);
        }
        removed
    }

    /// Labels of chosen immediate-reject options on the reachable path
    pub fn flag_reasons(&self, answers: &AnswerSet) -> Vec<String> {
        self.reachable_path(answers)
            .into_iter()
            .filter_map(|node| match answers.get(&node.id) {
                Some(AnswerValue::Choice(chosen)) => node.option(chosen),
                _ => None,
            })
            .filter(|option| option.immediate_reject)
            .map(|option| format!("Selected: {}", option.label))
            .collect()
    }

    /// Human-readable rendering of an answer, for reviewer notifications
    pub fn describe_answer(&self, id: &QuestionId, value: &AnswerValue) -> String {
        match value {
            AnswerValue::Text(text) => text.clone(),
            AnswerValue::Choice(option) => self
                .question(id)
                .and_then(|node| node.option(option))
                .map(|o| o.label.clone())
                .unwrap_or_else(|| option.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BRANCHING: &str = r#"
        [[question]]
        id = "q1"
        prompt = "Have you played before?"
        kind = "single_select"
        order = 1
        options = [
            { id = "yes", label = "Yes" },
            { id = "no", label = "No" },
        ]

        [[question]]
        id = "q2"
        prompt = "Which characters did you play?"
        kind = "free_text"
        parent = { question = "q1", option = "yes" }

        [[question]]
        id = "q3"
        prompt = "Do you accept the rules?"
        kind = "single_select"
        order = 2
        options = [
            { id = "accept", label = "I accept" },
            { id = "refuse", label = "I refuse", immediate_reject = true },
        ]
    "#;

    fn graph() -> QuestionGraph {
        QuestionGraph::from_toml_str(BRANCHING).expect("valid graph")
    }

    fn answers(pairs: &[(&str, AnswerValue)]) -> AnswerSet {
        pairs.iter().map(|(id, value)| (QuestionId::new(*id), value.clone())).collect()
    }

    fn ids(nodes: Vec<&QuestionNode>) -> Vec<&str> {
        nodes.into_iter().map(|n| n.id.as_str()).collect()
    }

    fn node(id: &str, kind: QuestionKind, options: &[&str], parent: Option<(&str, &str)>) -> QuestionNode {
        QuestionNode {
            id: QuestionId::new(id),
            prompt: format!("prompt {}", id),
            kind,
            order: 0,
            options: options
                .iter()
                .map(|o| QuestionOption { id: OptionId::new(*o), label: o.to_uppercase(), immediate_reject: false })
                .collect(),
            parent: parent.map(|(q, o)| ParentEdge { question: QuestionId::new(q), option: OptionId::new(o) }),
        }
    }

    #[test]
    fn test_branch_taken_interleaves_child() {
        let graph = graph();
        let empty = AnswerSet::new();
        assert_eq!(ids(graph.reachable_path(&empty)), vec!["q1", "q3"]);
        assert_eq!(graph.first_question().map(|n| n.id.as_str()), Some("q1"));

        let chose_yes = answers(&[("q1", AnswerValue::choice("yes"))]);
        assert_eq!(ids(graph.reachable_path(&chose_yes)), vec!["q1", "q2", "q3"]);
        assert_eq!(graph.next_question(&chose_yes).map(|n| n.id.as_str()), Some("q2"));
    }

    #[test]
    fn test_branch_not_taken_skips_child() {
        let graph = graph();
        let chose_no = answers(&[("q1", AnswerValue::choice("no"))]);
        assert_eq!(graph.next_question(&chose_no).map(|n| n.id.as_str()), Some("q3"));
        assert!(!graph.is_reachable(&QuestionId::new("q2"), &chose_no));
    }

    #[test]
    fn test_traversal_is_deterministic_and_only_returns_unanswered_reachable() {
        let graph = graph();
        let mut set = AnswerSet::new();
        let script = [
            ("q1", AnswerValue::choice("yes")),
            ("q2", AnswerValue::text("A bard")),
            ("q3", AnswerValue::choice("accept")),
        ];

        for (expected, value) in script {
            let first = graph.next_question(&set).map(|n| n.id.clone());
            let second = graph.next_question(&set).map(|n| n.id.clone());
            assert_eq!(first, second);

            let next = first.expect("not complete yet");
            assert_eq!(next.as_str(), expected);
            assert!(!set.contains_key(&next));
            assert!(graph.is_reachable(&next, &set));
            set.insert(next, value);
        }
        assert!(graph.is_complete(&set));
    }

    #[test]
    fn test_prune_after_overwrite() {
        let graph = graph();
        let mut set = answers(&[
            ("q1", AnswerValue::choice("yes")),
            ("q2", AnswerValue::text("A bard")),
        ]);

        set.insert(QuestionId::new("q1"), AnswerValue::choice("no"));
        let removed = graph.prune_unreachable(&mut set);
        assert_eq!(removed, vec![QuestionId::new("q2")]);
        assert_eq!(graph.next_question(&set).map(|n| n.id.as_str()), Some("q3"));
    }

    #[test]
    fn test_flag_reasons_list_immediate_reject_choices() {
        let graph = graph();
        let set = answers(&[
            ("q1", AnswerValue::choice("no")),
            ("q3", AnswerValue::choice("refuse")),
        ]);
        assert_eq!(graph.flag_reasons(&set), vec!["Selected: I refuse".to_string()]);
        assert!(graph.is_complete(&set));
    }

    #[test]
    fn test_validate_answer() {
        let graph = graph();
        let q1 = graph.question(&QuestionId::new("q1")).expect("q1");
        let q2 = graph.question(&QuestionId::new("q2")).expect("q2");

        assert_eq!(
            graph.validate_answer(q2, AnswerValue::text("  padded  "), 20),
            Ok(AnswerValue::text("padded"))
        );
        assert!(graph.validate_answer(q2, AnswerValue::text("   "), 20).is_err());
        assert!(graph.validate_answer(q2, AnswerValue::text("x".repeat(21)), 20).is_err());
        assert!(graph.validate_answer(q2, AnswerValue::choice("yes"), 20).is_err());

        assert!(graph.validate_answer(q1, AnswerValue::choice("yes"), 20).is_ok());
        assert!(matches!(
            graph.validate_answer(q1, AnswerValue::choice("maybe"), 20),
            Err(Refusal::Validation(_))
        ));
        assert!(graph.validate_answer(q1, AnswerValue::text("yes"), 20).is_err());
    }

    #[test]
    fn test_sibling_order_then_declaration_order() {
        let mut late = node("late", QuestionKind::FreeText, &[], None);
        late.order = 5;
        let early_a = node("early_a", QuestionKind::FreeText, &[], None);
        let early_b = node("early_b", QuestionKind::FreeText, &[], None);

        let graph = QuestionGraph::new(vec![late, early_a, early_b]).expect("valid");
        assert_eq!(ids(graph.reachable_path(&AnswerSet::new())), vec!["early_a", "early_b", "late"]);
    }

    #[test]
    fn test_validation_errors() {
        assert_eq!(QuestionGraph::new(vec![]).unwrap_err(), GraphError::Empty);

        let dup = vec![
            node("a", QuestionKind::FreeText, &[], None),
            node("a", QuestionKind::FreeText, &[], None),
        ];
        assert!(matches!(QuestionGraph::new(dup), Err(GraphError::DuplicateQuestion(_))));

        let dangling = vec![node("b", QuestionKind::FreeText, &[], Some(("ghost", "x")))];
        assert!(matches!(QuestionGraph::new(dangling), Err(GraphError::UnknownParent { .. })));

        let bad_option = vec![
            node("a", QuestionKind::SingleSelect, &["x"], None),
            node("b", QuestionKind::FreeText, &[], Some(("a", "y"))),
        ];
        assert!(matches!(QuestionGraph::new(bad_option), Err(GraphError::UnknownParentOption { .. })));

        let text_parent = vec![
            node("a", QuestionKind::FreeText, &[], None),
            node("b", QuestionKind::FreeText, &[], Some(("a", "x"))),
        ];
        assert!(matches!(QuestionGraph::new(text_parent), Err(GraphError::ParentNotSelect { .. })));

        let no_options = vec![node("a", QuestionKind::SingleSelect, &[], None)];
        assert!(matches!(QuestionGraph::new(no_options), Err(GraphError::MissingOptions(_))));

        let stray_options = vec![node("a", QuestionKind::FreeText, &["x"], None)];
        assert!(matches!(QuestionGraph::new(stray_options), Err(GraphError::UnexpectedOptions(_))));
    }

    #[test]
    fn test_cycles_are_rejected() {
        let cycle = vec![
            node("root", QuestionKind::FreeText, &[], None),
            node("a", QuestionKind::SingleSelect, &["x"], Some(("b", "x"))),
            node("b", QuestionKind::SingleSelect, &["x"], Some(("a", "x"))),
        ];
        assert!(matches!(QuestionGraph::new(cycle), Err(GraphError::Cycle(_))));

        let self_loop = vec![node("a", QuestionKind::SingleSelect, &["x"], Some(("a", "x")))];
        assert!(matches!(QuestionGraph::new(self_loop), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn test_toml_round_trip_preserves_traversal() {
        let graph = graph();
        let rendered = graph.to_toml_string().expect("render");
        let reparsed = QuestionGraph::from_toml_str(&rendered).expect("reparse");
        let set = answers(&[("q1", AnswerValue::choice("yes"))]);
        assert_eq!(ids(reparsed.reachable_path(&set)), ids(graph.reachable_path(&set)));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(QuestionGraph::from_toml_str("[[question]]\nid = 3"), Err(GraphError::Parse(_))));
        assert_eq!(QuestionGraph::from_toml_str("").unwrap_err(), GraphError::Empty);
    }
}
