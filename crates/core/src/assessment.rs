//! Assessment entity: one analysis run over a project's uploaded documents.
//!
//! Status machine: `Pending -> Running -> (Completed | Failed)`. Every other
//! transition is rejected with `InvalidStateTransition`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{AssessmentId, ProjectId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl AssessmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(DomainError::validation_field(
                "status",
                format!("unknown assessment status '{other}'"),
            )),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: AssessmentId,
    pub project_id: ProjectId,
    pub status: AssessmentStatus,
    /// Object-storage keys of the documents this run analyzes.
    pub document_keys: Vec<String>,
    /// Filled in when the run completes.
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assessment {
    pub fn new(
        id: AssessmentId,
        project_id: ProjectId,
        document_keys: Vec<String>,
    ) -> DomainResult<Self> {
        if document_keys.is_empty() {
            return Err(DomainError::validation_field(
                "document_keys",
                "an assessment needs at least one document",
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id,
            project_id,
            status: AssessmentStatus::Pending,
            document_keys,
            summary: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn start(&mut self) -> DomainResult<()> {
        self.transition(AssessmentStatus::Running)
    }

    pub fn complete(&mut self, summary: impl Into<String>) -> DomainResult<()> {
        self.transition(AssessmentStatus::Completed)?;
        self.summary = Some(summary.into());
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> DomainResult<()> {
        self.transition(AssessmentStatus::Failed)?;
        self.summary = Some(reason.into());
        Ok(())
    }

    fn transition(&mut self, to: AssessmentStatus) -> DomainResult<()> {
        let allowed = matches!(
            (self.status, to),
            (AssessmentStatus::Pending, AssessmentStatus::Running)
                | (AssessmentStatus::Running, AssessmentStatus::Completed)
                | (AssessmentStatus::Running, AssessmentStatus::Failed)
        );
        if !allowed {
            return Err(DomainError::InvalidStateTransition {
                entity: "assessment",
                from: self.status.as_str().into(),
                to: to.as_str().into(),
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment() -> Assessment {
        Assessment::new(
            AssessmentId::new(),
            ProjectId::new(),
            vec!["uploads/inventory.xlsx".into()],
        )
        .unwrap()
    }

    #[test]
    fn happy_path() {
        let mut a = assessment();
        a.start().unwrap();
        a.complete("12 servers, 3 databases").unwrap();
        assert_eq!(a.status, AssessmentStatus::Completed);
        assert!(a.status.is_terminal());
    }

    #[test]
    fn cannot_complete_before_start() {
        let mut a = assessment();
        let err = a.complete("nope").unwrap_err();
        assert_eq!(err.error_code(), "invalid_state_transition");
        assert_eq!(a.status, AssessmentStatus::Pending);
        assert!(a.summary.is_none());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut a = assessment();
        a.start().unwrap();
        a.fail("parser error").unwrap();
        assert!(a.start().is_err());
        assert!(a.complete("late").is_err());
    }

    #[test]
    fn needs_documents() {
        let err = Assessment::new(AssessmentId::new(), ProjectId::new(), vec![]).unwrap_err();
        assert_eq!(err.error_code(), "validation_error");
    }
}
