//! Education history and teaching record of the signed-in user.

use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::error::Result;
use crate::wire;

const EDUCATIONS_PATH: &str = "/api/my/educations/";
const TEACHINGS_PATH: &str = "/api/instructor/teachings/";

/// A degree or school entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Education {
    /// Entry id.
    #[serde(deserialize_with = "wire::id")]
    pub id: String,
    /// Degree level.
    pub level: String,
    /// Institution.
    pub university: String,
    /// First year.
    pub start_year: i32,
    /// Last year; `None` while ongoing.
    #[serde(default)]
    pub end_year: Option<i32>,
}

/// Fields of a new education entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewEducation {
    /// Degree level.
    pub level: String,
    /// Institution.
    pub university: String,
    /// First year.
    pub start_year: i32,
    /// Last year; `None` while ongoing.
    pub end_year: Option<i32>,
}

/// Partial update of an education entry.
///
/// `end_year: Some(None)` marks the entry as ongoing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EducationUpdate {
    /// Degree level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Institution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub university: Option<String>,
    /// First year.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_year: Option<i32>,
    /// Last year.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_year: Option<Option<i32>>,
}

/// A teaching experience entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teaching {
    /// Entry id.
    #[serde(deserialize_with = "wire::id")]
    pub id: String,
    /// Subject taught.
    pub topic: String,
    /// Details.
    #[serde(default)]
    pub description: String,
    /// First year.
    pub start_year: i32,
    /// Last year; `None` while ongoing.
    #[serde(default)]
    pub end_year: Option<i32>,
}

/// Fields of a new teaching entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTeaching {
    /// Subject taught.
    pub topic: String,
    /// Details.
    pub description: String,
    /// First year.
    pub start_year: i32,
    /// Last year; `None` while ongoing.
    pub end_year: Option<i32>,
}

/// Partial update of a teaching entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeachingUpdate {
    /// Subject taught.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// First year.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_year: Option<i32>,
    /// Last year.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_year: Option<Option<i32>>,
}

impl ApiClient {
    /// Lists education entries.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn list_educations(&self) -> Result<Vec<Education>> {
        self.get(EDUCATIONS_PATH).await
    }

    /// Adds an education entry.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn create_education(&self, entry: &NewEducation) -> Result<Education> {
        self.post(EDUCATIONS_PATH, entry).await
    }

    /// Changes an education entry.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn update_education(&self, id: &str, update: &EducationUpdate) -> Result<Education> {
        self.patch(&format!("{EDUCATIONS_PATH}{id}/"), update).await
    }

    /// Removes an education entry.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn delete_education(&self, id: &str) -> Result<()> {
        self.delete(&format!("{EDUCATIONS_PATH}{id}/")).await
    }

    /// Lists teaching entries.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn list_teachings(&self) -> Result<Vec<Teaching>> {
        self.get(TEACHINGS_PATH).await
    }

    /// Adds a teaching entry.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn create_teaching(&self, entry: &NewTeaching) -> Result<Teaching> {
        self.post(TEACHINGS_PATH, entry).await
    }

    /// Changes a teaching entry.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn update_teaching(&self, id: &str, update: &TeachingUpdate) -> Result<Teaching> {
        self.patch(&format!("{TEACHINGS_PATH}{id}/"), update).await
    }

    /// Removes a teaching entry.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn delete_teaching(&self, id: &str) -> Result<()> {
        self.delete(&format!("{TEACHINGS_PATH}{id}/")).await
    }
}
