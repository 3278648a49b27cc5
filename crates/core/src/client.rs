//! Client (customer organization) entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::ClientId;

/// An organization whose estate is being assessed for migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub contact_email: String,
    pub industry: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn new(
        id: ClientId,
        name: impl Into<String>,
        contact_email: impl Into<String>,
        industry: Option<String>,
    ) -> DomainResult<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation_field("name", "must not be empty"));
        }
        let contact_email = contact_email.into().trim().to_string();
        // Minimal shape check; full validation is the presentation layer's job.
        if !contact_email.contains('@') || contact_email.len() < 3 {
            return Err(DomainError::validation_field(
                "contact_email",
                "must be a valid email address",
            ));
        }
        Ok(Self {
            id,
            name,
            contact_email,
            industry,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_email() {
        assert!(Client::new(ClientId::new(), "Acme", "nope", None).is_err());
    }

    #[test]
    fn trims_name() {
        let c = Client::new(ClientId::new(), "  Acme  ", "ops@acme.io", None).unwrap();
        assert_eq!(c.name, "Acme");
    }
}
