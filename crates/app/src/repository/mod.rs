//! Relational persistence for the domain entities.
//!
//! Repositories speak the portable `RelationalDb` contract: named-placeholder
//! SQL, JSON rows. Identifiers and timestamps are stored as TEXT (UUID and
//! RFC 3339 strings) so the same statements run on any backend the contract
//! covers. `ensure_schema()` is idempotent.

mod assessments;
mod clients;
mod projects;

pub use assessments::AssessmentRepository;
pub use clients::ClientRepository;
pub use projects::ProjectRepository;

use chrono::{DateTime, Utc};
use serde_json::Value;

use cloudlift_core::{DomainError, Error};
use cloudlift_interfaces::Row;

macro_rules! sql_params {
    ($($name:literal => $value:expr),* $(,)?) => {{
        let mut params = cloudlift_interfaces::SqlParams::new();
        $(params.insert($name.to_string(), serde_json::Value::from($value));)*
        params
    }};
}
pub(crate) use sql_params;

fn text_column<'a>(row: &'a Row, name: &str) -> Result<&'a str, Error> {
    row.get(name).and_then(Value::as_str).ok_or_else(|| {
        DomainError::validation_field(name, "missing or non-text column in result row").into()
    })
}

fn opt_text_column(row: &Row, name: &str) -> Option<String> {
    row.get(name).and_then(Value::as_str).map(str::to_string)
}

fn timestamp_column(row: &Row, name: &str) -> Result<DateTime<Utc>, Error> {
    let raw = text_column(row, name)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            DomainError::validation_field(name, format!("invalid timestamp '{raw}': {e}")).into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timestamps_round_trip() {
        let now = Utc::now();
        let mut row = Row::new();
        row.insert("created_at".into(), json!(now.to_rfc3339()));
        assert_eq!(timestamp_column(&row, "created_at").unwrap(), now);
    }

    #[test]
    fn missing_column_is_an_error() {
        let row = Row::new();
        assert!(text_column(&row, "name").is_err());
        assert!(timestamp_column(&row, "created_at").is_err());
    }
}
