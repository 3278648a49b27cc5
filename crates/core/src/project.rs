//! Migration project entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{ClientId, ProjectId};

const NAME_MAX_LEN: usize = 200;
const DESCRIPTION_MAX_LEN: usize = 4000;

/// Lifecycle status of a project.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    Active,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            other => Err(DomainError::validation_field(
                "status",
                format!("unknown project status '{other}'"),
            )),
        }
    }
}

/// A cloud-migration project owned by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub client_id: ClientId,
    pub name: String,
    pub description: String,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a new project in `Draft` status. Validates name/description.
    pub fn new(
        id: ProjectId,
        client_id: ClientId,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> DomainResult<Self> {
        let name = validate_name(name.into())?;
        let description = validate_description(description.into())?;
        let now = Utc::now();
        Ok(Self {
            id,
            client_id,
            name,
            description,
            status: ProjectStatus::Draft,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rename/redescribe the project. Archived projects are read-only.
    pub fn update(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> DomainResult<()> {
        if self.status == ProjectStatus::Archived {
            return Err(DomainError::BusinessRuleViolation {
                rule: "archived_project_read_only".into(),
                message: "an archived project cannot be modified".into(),
            });
        }
        self.name = validate_name(name.into())?;
        self.description = validate_description(description.into())?;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn activate(&mut self) -> DomainResult<()> {
        self.transition(ProjectStatus::Active)
    }

    pub fn archive(&mut self) -> DomainResult<()> {
        self.transition(ProjectStatus::Archived)
    }

    fn transition(&mut self, to: ProjectStatus) -> DomainResult<()> {
        let allowed = matches!(
            (self.status, to),
            (ProjectStatus::Draft, ProjectStatus::Active)
                | (ProjectStatus::Draft, ProjectStatus::Archived)
                | (ProjectStatus::Active, ProjectStatus::Archived)
        );
        if !allowed {
            return Err(DomainError::InvalidStateTransition {
                entity: "project",
                from: self.status.as_str().into(),
                to: to.as_str().into(),
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

fn validate_name(name: String) -> DomainResult<String> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(DomainError::validation_field("name", "must not be empty"));
    }
    if name.len() > NAME_MAX_LEN {
        return Err(DomainError::validation_field(
            "name",
            format!("must be at most {NAME_MAX_LEN} characters"),
        ));
    }
    Ok(name)
}

fn validate_description(description: String) -> DomainResult<String> {
    if description.len() > DESCRIPTION_MAX_LEN {
        return Err(DomainError::validation_field(
            "description",
            format!("must be at most {DESCRIPTION_MAX_LEN} characters"),
        ));
    }
    Ok(description)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> Project {
        Project::new(ProjectId::new(), ClientId::new(), "Lift DC-West", "").unwrap()
    }

    #[test]
    fn rejects_empty_name() {
        let err = Project::new(ProjectId::new(), ClientId::new(), "   ", "").unwrap_err();
        assert_eq!(err.error_code(), "validation_error");
    }

    #[test]
    fn archived_project_is_read_only() {
        let mut p = project();
        p.archive().unwrap();
        assert!(p.update("new name", "").is_err());
    }

    #[test]
    fn archived_cannot_reactivate() {
        let mut p = project();
        p.archive().unwrap();
        let err = p.activate().unwrap_err();
        assert_eq!(err.error_code(), "invalid_state_transition");
    }
}
