//! Column encodings for domain types

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use crate::core_onboarding::appeal::AppealStatus;
use crate::core_onboarding::audit::AuditAction;
use crate::core_onboarding::member::{ApplicationStatus, RoleTier};
use crate::core_onboarding::session::{SubmissionKind, SubmissionStatus};
use crate::core_onboarding::types::{AppealId, GroupId, QuestionId, SubmissionId, Timestamp, UserId};

fn unknown(what: &str, raw: &str) -> FromSqlError {
    FromSqlError::Other(format!("unknown {} '{}'", what, raw).into())
}

macro_rules! text_enum_column {
    ($ty:ty, $what:literal) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let raw = value.as_str()?;
                <$ty>::parse(raw).ok_or_else(|| unknown($what, raw))
            }
        }
    };
}

text_enum_column!(ApplicationStatus, "application status");
text_enum_column!(SubmissionStatus, "submission status");
text_enum_column!(SubmissionKind, "submission kind");
text_enum_column!(AppealStatus, "appeal status");
text_enum_column!(AuditAction, "audit action");

macro_rules! text_id_column {
    ($ty:ident) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                String::column_result(value).map($ty)
            }
        }
    };
}

text_id_column!(GroupId);
text_id_column!(UserId);
text_id_column!(QuestionId);

macro_rules! integer_id_column {
    ($ty:ident) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value.as_i64().map($ty)
            }
        }
    };
}

integer_id_column!(SubmissionId);
integer_id_column!(AppealId);

impl ToSql for RoleTier {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(self.level())))
    }
}

impl FromSql for RoleTier {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let level = value.as_i64()?;
        RoleTier::from_level(level).ok_or_else(|| unknown("role tier", &level.to_string()))
    }
}

impl ToSql for Timestamp {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0 as i64))
    }
}

impl FromSql for Timestamp {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_i64().map(|millis| Timestamp(millis.max(0) as u64))
    }
}
