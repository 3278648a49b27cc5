//! Command messages. Identifiers are assigned by the caller (via the
//! constructors here) so `send_command` can stay fire-and-forget.

use cloudlift_core::{AssessmentId, ClientId, ProjectId};

use crate::messages::{Command, MessageInfo};

macro_rules! impl_command {
    ($t:ty) => {
        impl Command for $t {
            fn info(&self) -> &MessageInfo {
                &self.info
            }
        }
    };
}

#[derive(Debug)]
pub struct CreateProject {
    pub info: MessageInfo,
    pub project_id: ProjectId,
    pub client_id: ClientId,
    pub name: String,
    pub description: String,
}

impl CreateProject {
    pub fn new(client_id: ClientId, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            info: MessageInfo::new(),
            project_id: ProjectId::new(),
            client_id,
            name: name.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug)]
pub struct UpdateProject {
    pub info: MessageInfo,
    pub project_id: ProjectId,
    pub name: String,
    pub description: String,
}

impl UpdateProject {
    pub fn new(
        project_id: ProjectId,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            info: MessageInfo::new(),
            project_id,
            name: name.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug)]
pub struct ArchiveProject {
    pub info: MessageInfo,
    pub project_id: ProjectId,
}

impl ArchiveProject {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            info: MessageInfo::new(),
            project_id,
        }
    }
}

#[derive(Debug)]
pub struct CreateClient {
    pub info: MessageInfo,
    pub client_id: ClientId,
    pub name: String,
    pub contact_email: String,
    pub industry: Option<String>,
}

impl CreateClient {
    pub fn new(
        name: impl Into<String>,
        contact_email: impl Into<String>,
        industry: Option<String>,
    ) -> Self {
        Self {
            info: MessageInfo::new(),
            client_id: ClientId::new(),
            name: name.into(),
            contact_email: contact_email.into(),
            industry,
        }
    }
}

#[derive(Debug)]
pub struct CreateAssessment {
    pub info: MessageInfo,
    pub assessment_id: AssessmentId,
    pub project_id: ProjectId,
    /// Object-storage keys of the documents to analyze.
    pub document_keys: Vec<String>,
}

impl CreateAssessment {
    pub fn new(project_id: ProjectId, document_keys: Vec<String>) -> Self {
        Self {
            info: MessageInfo::new(),
            assessment_id: AssessmentId::new(),
            project_id,
            document_keys,
        }
    }
}

#[derive(Debug)]
pub struct StartAssessment {
    pub info: MessageInfo,
    pub assessment_id: AssessmentId,
}

impl StartAssessment {
    pub fn new(assessment_id: AssessmentId) -> Self {
        Self {
            info: MessageInfo::new(),
            assessment_id,
        }
    }
}

/// How a run ended. Carried by [`CompleteAssessment`].
#[derive(Debug, Clone)]
pub enum AssessmentOutcome {
    Succeeded { summary: String },
    Failed { reason: String },
}

#[derive(Debug)]
pub struct CompleteAssessment {
    pub info: MessageInfo,
    pub assessment_id: AssessmentId,
    pub outcome: AssessmentOutcome,
}

impl CompleteAssessment {
    pub fn succeeded(assessment_id: AssessmentId, summary: impl Into<String>) -> Self {
        Self {
            info: MessageInfo::new(),
            assessment_id,
            outcome: AssessmentOutcome::Succeeded {
                summary: summary.into(),
            },
        }
    }

    pub fn failed(assessment_id: AssessmentId, reason: impl Into<String>) -> Self {
        Self {
            info: MessageInfo::new(),
            assessment_id,
            outcome: AssessmentOutcome::Failed {
                reason: reason.into(),
            },
        }
    }
}

impl_command!(CreateProject);
impl_command!(UpdateProject);
impl_command!(ArchiveProject);
impl_command!(CreateClient);
impl_command!(CreateAssessment);
impl_command!(StartAssessment);
impl_command!(CompleteAssessment);
