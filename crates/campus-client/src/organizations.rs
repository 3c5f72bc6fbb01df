//! Organization directory managed by admins.

use serde::{Deserialize, Serialize};

use crate::client::{ApiClient, ListPayload};
use crate::error::Result;
use crate::validate::{self, ValidationError};
use crate::wire;

const ORGANIZATIONS_PATH: &str = "/admin/listorganizations/";

/// An organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Organization id.
    #[serde(deserialize_with = "wire::id")]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Creation time as sent by the backend.
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Returns `true` if `name` matches an existing organization, ignoring case
/// and surrounding whitespace.
pub fn name_taken(existing: &[Organization], name: &str) -> bool {
    let wanted = name.trim().to_lowercase();
    existing
        .iter()
        .any(|org| org.name.trim().to_lowercase() == wanted)
}

/// Organizations whose name contains `term`, ignoring case.
pub fn search<'a>(existing: &'a [Organization], term: &str) -> Vec<&'a Organization> {
    let term = term.to_lowercase();
    existing
        .iter()
        .filter(|org| org.name.to_lowercase().contains(&term))
        .collect()
}

#[derive(Serialize)]
struct NamePayload<'a> {
    name: &'a str,
}

fn trimmed_name(name: &str) -> std::result::Result<NamePayload<'_>, ValidationError> {
    let name = name.trim();
    validate::required("name", name)?;
    Ok(NamePayload { name })
}

impl ApiClient {
    /// Lists organizations.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn list_organizations(&self) -> Result<Vec<Organization>> {
        let payload: Option<ListPayload<Organization>> = self.get(ORGANIZATIONS_PATH).await?;
        Ok(payload.map(ListPayload::into_vec).unwrap_or_default())
    }

    /// Creates an organization.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank name, otherwise any pipeline
    /// error.
    pub async fn create_organization(&self, name: &str) -> Result<Organization> {
        self.post(ORGANIZATIONS_PATH, &trimmed_name(name)?).await
    }

    /// Renames an organization.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank name, otherwise any pipeline
    /// error.
    pub async fn rename_organization(&self, id: &str, name: &str) -> Result<Organization> {
        self.patch(&format!("{ORGANIZATIONS_PATH}{id}/"), &trimmed_name(name)?)
            .await
    }

    /// Deletes an organization.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn delete_organization(&self, id: &str) -> Result<()> {
        self.delete(&format!("{ORGANIZATIONS_PATH}{id}/")).await
    }
}
