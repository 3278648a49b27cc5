//! Query messages and their typed outputs.

use cloudlift_core::{Assessment, AssessmentId, Client, ClientId, Project, ProjectId};

use crate::messages::{MessageInfo, Query};

macro_rules! impl_query {
    ($t:ty, $out:ty) => {
        impl Query for $t {
            type Output = $out;

            fn info(&self) -> &MessageInfo {
                &self.info
            }
        }
    };
}

#[derive(Debug)]
pub struct GetProject {
    pub info: MessageInfo,
    pub project_id: ProjectId,
}

impl GetProject {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            info: MessageInfo::new(),
            project_id,
        }
    }
}

#[derive(Debug)]
pub struct ListProjects {
    pub info: MessageInfo,
    /// Restrict to one client when set.
    pub client_id: Option<ClientId>,
}

impl ListProjects {
    pub fn all() -> Self {
        Self {
            info: MessageInfo::new(),
            client_id: None,
        }
    }

    pub fn for_client(client_id: ClientId) -> Self {
        Self {
            info: MessageInfo::new(),
            client_id: Some(client_id),
        }
    }
}

/// Case-insensitive substring match over project name and description.
#[derive(Debug)]
pub struct SearchProjects {
    pub info: MessageInfo,
    pub term: String,
}

impl SearchProjects {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            info: MessageInfo::new(),
            term: term.into(),
        }
    }
}

#[derive(Debug)]
pub struct GetClient {
    pub info: MessageInfo,
    pub client_id: ClientId,
}

impl GetClient {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            info: MessageInfo::new(),
            client_id,
        }
    }
}

#[derive(Debug)]
pub struct ListClients {
    pub info: MessageInfo,
}

impl ListClients {
    pub fn new() -> Self {
        Self {
            info: MessageInfo::new(),
        }
    }
}

impl Default for ListClients {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct GetAssessment {
    pub info: MessageInfo,
    pub assessment_id: AssessmentId,
}

impl GetAssessment {
    pub fn new(assessment_id: AssessmentId) -> Self {
        Self {
            info: MessageInfo::new(),
            assessment_id,
        }
    }
}

#[derive(Debug)]
pub struct ListAssessmentsForProject {
    pub info: MessageInfo,
    pub project_id: ProjectId,
}

impl ListAssessmentsForProject {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            info: MessageInfo::new(),
            project_id,
        }
    }
}

impl_query!(GetProject, Project);
impl_query!(ListProjects, Vec<Project>);
impl_query!(SearchProjects, Vec<Project>);
impl_query!(GetClient, Client);
impl_query!(ListClients, Vec<Client>);
impl_query!(GetAssessment, Assessment);
impl_query!(ListAssessmentsForProject, Vec<Assessment>);
