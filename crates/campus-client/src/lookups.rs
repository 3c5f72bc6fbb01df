//! Category and curriculum pick lists.

use serde::{Deserialize, Serialize};

use crate::client::{ApiClient, ListPayload};
use crate::error::Result;
use crate::wire;

/// Category endpoints, tried in order.
pub const CATEGORY_PATHS: [&str; 3] = [
    "/api/categories/",
    "/api/course-categories/",
    "/api/courses/categories/",
];

/// Curriculum endpoints, tried in order.
pub const CURRICULUM_PATHS: [&str; 3] = [
    "/api/curricula/",
    "/api/curriculums/",
    "/api/courses/curricula/",
];

/// One entry of a pick list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupOption {
    /// Entry id.
    #[serde(deserialize_with = "wire::id")]
    pub id: String,
    /// Display name.
    pub name: String,
    /// URL slug.
    #[serde(default)]
    pub slug: Option<String>,
}

impl ApiClient {
    /// Lists course categories.
    ///
    /// # Errors
    ///
    /// Returns the first auth failure or the last error when every
    /// endpoint fails.
    pub async fn list_categories(&self) -> Result<Vec<LookupOption>> {
        let payload: ListPayload<LookupOption> = self.get_with_fallback(&CATEGORY_PATHS).await?;
        Ok(payload.into_vec())
    }

    /// Lists curricula.
    ///
    /// # Errors
    ///
    /// Returns the first auth failure or the last error when every
    /// endpoint fails.
    pub async fn list_curricula(&self) -> Result<Vec<LookupOption>> {
        let payload: ListPayload<LookupOption> =
            self.get_with_fallback(&CURRICULUM_PATHS).await?;
        Ok(payload.into_vec())
    }
}
