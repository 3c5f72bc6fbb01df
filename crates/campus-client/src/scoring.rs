//! Course scoring criteria.
//!
//! A course has at most one scoring set. The backend answers `GET` with an
//! empty set (`id: null`) until one is created.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::ApiClient;
use crate::error::Result;
use crate::wire;

fn scoring_path(course_id: &str) -> String {
    format!("/api/courses/{course_id}/scoring/")
}

/// One scoring rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringItem {
    /// Item id; absent until the item has been saved.
    #[serde(
        default,
        deserialize_with = "wire::opt_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    /// What the rule measures.
    #[serde(default)]
    pub description: String,
    /// Number of correct answers.
    #[serde(default)]
    pub correct: u32,
    /// Number of incorrect answers.
    #[serde(default)]
    pub incorrect: u32,
    /// Score awarded.
    #[serde(default, deserialize_with = "wire::number")]
    pub score: f64,
    /// Position in the set.
    #[serde(default)]
    pub order: u32,
}

/// The scoring set of a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scoring {
    /// Set id; `None` when the course has no scoring yet.
    #[serde(default, deserialize_with = "wire::opt_id")]
    pub id: Option<String>,
    /// Course id.
    #[serde(deserialize_with = "wire::id")]
    pub course: String,
    /// Minimum score to pass.
    #[serde(default, deserialize_with = "wire::number")]
    pub pass_score: f64,
    /// Rules, in order.
    #[serde(default)]
    pub items: Vec<ScoringItem>,
}

/// Body of a create or replace call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringPayload {
    /// Minimum score to pass.
    pub pass_score: f64,
    /// Rules, in order.
    pub items: Vec<ScoringItem>,
}

impl ScoringPayload {
    /// Returns a copy with every item id removed, as required on creation.
    #[must_use]
    pub fn without_item_ids(&self) -> Self {
        Self {
            pass_score: self.pass_score,
            items: self
                .items
                .iter()
                .cloned()
                .map(|item| ScoringItem { id: None, ..item })
                .collect(),
        }
    }
}

impl ApiClient {
    /// Fetches the scoring set of a course.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn get_course_scoring(&self, course_id: &str) -> Result<Scoring> {
        self.get(&scoring_path(course_id)).await
    }

    /// Creates the scoring set of a course. Item ids must be absent.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn create_course_scoring(
        &self,
        course_id: &str,
        payload: &ScoringPayload,
    ) -> Result<Scoring> {
        self.post(&scoring_path(course_id), payload).await
    }

    /// Replaces the whole scoring set of a course.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn update_course_scoring(
        &self,
        course_id: &str,
        payload: &ScoringPayload,
    ) -> Result<Scoring> {
        self.put(&scoring_path(course_id), payload).await
    }

    /// Deletes the scoring set of a course.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn delete_course_scoring(&self, course_id: &str) -> Result<()> {
        self.delete(&scoring_path(course_id)).await
    }

    /// Creates the scoring set if none exists, otherwise replaces it.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn upsert_course_scoring(
        &self,
        course_id: &str,
        payload: &ScoringPayload,
    ) -> Result<Scoring> {
        let current = self.get_course_scoring(course_id).await?;
        if current.id.is_none() {
            debug!(course_id, "No scoring yet; creating");
            self.create_course_scoring(course_id, &payload.without_item_ids())
                .await
        } else {
            self.update_course_scoring(course_id, payload).await
        }
    }
}
