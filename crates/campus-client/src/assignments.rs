//! Lesson assignments and their attachments.

use futures::future::try_join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::client::{ApiClient, ApiRequest, FormPart, ListPayload, UploadFile};
use crate::error::Result;
use crate::validate;
use crate::wire;

const ASSIGNMENTS_PATH: &str = "/api/assignments/";

/// Offset appended to local due dates (Asia/Bangkok).
pub const DUE_AT_OFFSET: &str = "+07:00";

/// Ids shaped like a UUID: 36 hex digits and dashes.
#[allow(clippy::expect_used)]
static UUID36_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-fA-F-]{36}$").expect("valid uuid regex"));

/// Returns `true` if `id` looks like a backend lesson id.
///
/// Client-side placeholder ids for unsaved lessons never match.
#[must_use]
pub fn is_uuid36(id: &str) -> bool {
    UUID36_RE.is_match(id)
}

/// Builds an ISO timestamp from a local date and time.
///
/// `time` defaults to midnight. Returns an empty string when `date` is
/// empty.
#[must_use]
pub fn due_at_iso(date: &str, time: &str) -> String {
    if date.is_empty() {
        return String::new();
    }
    let time = if time.is_empty() { "00:00" } else { time };
    format!("{date}T{time}:00{DUE_AT_OFFSET}")
}

/// A file attached to an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Attachment id.
    #[serde(deserialize_with = "wire::id")]
    pub id: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Stored file.
    #[serde(default)]
    pub file_url: Option<String>,
    /// Name of the uploaded file.
    #[serde(default)]
    pub original_name: Option<String>,
    /// MIME type.
    #[serde(default)]
    pub content_type: Option<String>,
}

/// An assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Assignment id.
    #[serde(deserialize_with = "wire::id")]
    pub id: String,
    /// Course id.
    #[serde(deserialize_with = "wire::id")]
    pub course: String,
    /// Lesson id.
    #[serde(default, deserialize_with = "wire::opt_id")]
    pub lesson: Option<String>,
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Instructions.
    #[serde(default)]
    pub details: String,
    /// Group code the assignment targets.
    #[serde(default)]
    pub assign_to_code: Option<String>,
    /// Deadline.
    #[serde(default)]
    pub due_at: Option<String>,
    /// Attached files.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Input for [`ApiClient::create_assignment`].
#[derive(Debug, Clone, Default)]
pub struct NewAssignment {
    /// Course id.
    pub course_id: String,
    /// Lesson id; dropped unless it looks like a backend id.
    pub lesson_id: Option<String>,
    /// Title.
    pub title: String,
    /// Instructions.
    pub details: String,
    /// Group code the assignment targets.
    pub assign_to_code: Option<String>,
    /// Deadline, see [`due_at_iso`].
    pub due_at: Option<String>,
    /// Files to attach.
    pub files: Vec<UploadFile>,
}

impl NewAssignment {
    /// Builds the multipart form.
    #[must_use]
    pub fn to_form(&self) -> Vec<FormPart> {
        let mut parts = vec![FormPart::text("course", &self.course_id)];
        if let Some(lesson) = self.lesson_id.as_deref().filter(|id| is_uuid36(id)) {
            parts.push(FormPart::text("lesson", lesson));
        }
        parts.push(FormPart::text("title", &self.title));
        parts.push(FormPart::text("details", &self.details));
        if let Some(code) = self.assign_to_code.as_deref().filter(|c| !c.is_empty()) {
            parts.push(FormPart::text("assign_to_code", code));
        }
        if let Some(due_at) = self.due_at.as_deref().filter(|d| !d.is_empty()) {
            parts.push(FormPart::text("due_at", due_at));
        }
        parts.extend(self.files.iter().map(|f| FormPart::file("files", f)));
        parts
    }
}

/// Input for [`ApiClient::update_assignment`].
#[derive(Debug, Clone, Default)]
pub struct AssignmentUpdate {
    /// Title.
    pub title: String,
    /// Instructions.
    pub details: String,
    /// Group code; only sent when non-empty.
    pub assign_to_code: Option<String>,
    /// Deadline, see [`due_at_iso`].
    pub due_at: String,
}

impl AssignmentUpdate {
    /// Builds the JSON body.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        body.insert("title".to_string(), Value::from(self.title.as_str()));
        body.insert("details".to_string(), Value::from(self.details.as_str()));
        body.insert("due_at".to_string(), Value::from(self.due_at.as_str()));
        if let Some(code) = self.assign_to_code.as_deref().filter(|c| !c.is_empty()) {
            body.insert("assign_to_code".to_string(), Value::from(code));
        }
        Value::Object(body)
    }
}

fn files_form(files: &[UploadFile]) -> Vec<FormPart> {
    files.iter().map(|f| FormPart::file("files", f)).collect()
}

impl ApiClient {
    /// Finds the assignment of a course, optionally narrowed to a lesson.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn find_assignment(
        &self,
        course_id: &str,
        lesson_id: Option<&str>,
    ) -> Result<Option<Assignment>> {
        let mut request = ApiRequest::get(ASSIGNMENTS_PATH).with_query("course", course_id);
        if let Some(lesson) = lesson_id.filter(|id| is_uuid36(id)) {
            request = request.with_query("lesson", lesson);
        }
        let payload: Option<ListPayload<Assignment>> = self.fetch(request).await?;
        Ok(payload.and_then(|p| p.into_vec().into_iter().next()))
    }

    /// Creates an assignment with its attachments.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank title, otherwise any pipeline
    /// error.
    #[instrument(skip(self, assignment), fields(course_id = %assignment.course_id, files = assignment.files.len()))]
    pub async fn create_assignment(&self, assignment: &NewAssignment) -> Result<Assignment> {
        validate::required("course", &assignment.course_id)?;
        validate::required("title", &assignment.title)?;
        self.fetch(ApiRequest::post(ASSIGNMENTS_PATH).with_form(assignment.to_form()))
            .await
    }

    /// Updates an assignment's text fields.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank title, otherwise any pipeline
    /// error.
    pub async fn update_assignment(&self, id: &str, update: &AssignmentUpdate) -> Result<Assignment> {
        validate::required("title", &update.title)?;
        self.patch(&format!("{ASSIGNMENTS_PATH}{id}/"), &update.to_json())
            .await
    }

    /// Deletes an assignment.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn delete_assignment(&self, id: &str) -> Result<()> {
        self.delete(&format!("{ASSIGNMENTS_PATH}{id}/")).await
    }

    /// Uploads more files to an assignment.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn add_attachments(
        &self,
        assignment_id: &str,
        files: &[UploadFile],
    ) -> Result<Vec<Attachment>> {
        let request = ApiRequest::post(format!("{ASSIGNMENTS_PATH}{assignment_id}/attachments/"))
            .with_form(files_form(files));
        let payload: Option<ListPayload<Attachment>> = self.fetch(request).await?;
        Ok(payload.map(ListPayload::into_vec).unwrap_or_default())
    }

    /// Removes one attachment.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn remove_attachment(&self, assignment_id: &str, file_id: &str) -> Result<()> {
        self.delete(&format!(
            "{ASSIGNMENTS_PATH}{assignment_id}/attachments/{file_id}/"
        ))
        .await
    }

    /// Removes several attachments concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first failure; other removals may still have happened.
    pub async fn remove_attachments(&self, assignment_id: &str, file_ids: &[String]) -> Result<()> {
        debug!(assignment_id, count = file_ids.len(), "Removing attachments");
        try_join_all(
            file_ids
                .iter()
                .map(|file_id| self.remove_attachment(assignment_id, file_id)),
        )
        .await?;
        Ok(())
    }
}
