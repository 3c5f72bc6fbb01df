//! Shared documents.
//!
//! Anyone signed in can list documents. Instructors upload and manage their
//! own; admins manage everything through a separate detail path.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::client::{ApiClient, ApiRequest, FormPart, ListPayload, UploadFile};
use crate::error::Result;
use crate::validate::{self, ValidationError, MAX_DOCUMENT_NAME_LEN};
use crate::wire;

const LIST_PATH: &str = "/api/documents/";
const INSTRUCTOR_PATH: &str = "/api/instructor/documents/";
const ADMIN_PATH: &str = "/api/admin/documents/";

/// Statuses on which instructor mutations are retried on the admin path.
const ADMIN_FALLBACK_STATUSES: [u16; 2] = [403, 404];

/// A document, normalized from whichever serializer produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    /// Document id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Original file name.
    pub file_name: String,
    /// Absolute download URL.
    pub file_url: Option<String>,
    /// Creation time as sent by the backend.
    pub created_at: Option<String>,
}

impl Document {
    /// Normalizes a raw list entry. Relative file references are resolved
    /// with `resolve`.
    pub fn from_raw(raw: &Value, resolve: impl Fn(&str) -> String) -> Self {
        Self {
            id: wire::first_present(raw, &["id", "pk"]).unwrap_or_default(),
            name: wire::first_present(raw, &["name", "title"]).unwrap_or_else(|| "-".to_string()),
            file_name: wire::first_present(raw, &["fileName", "file_name", "filename", "name"])
                .unwrap_or_default(),
            file_url: wire::first_present(
                raw,
                &["fileUrl", "file", "document", "file_url", "url"],
            )
            .filter(|url| !url.is_empty())
            .map(|url| resolve(&url)),
            created_at: wire::first_present(raw, &["created_at", "created", "timestamp"]),
        }
    }
}

fn instructor_detail(id: &str) -> String {
    format!("{INSTRUCTOR_PATH}{id}/")
}

fn admin_detail(id: &str) -> String {
    format!("{ADMIN_PATH}{id}/")
}

fn checked_name(name: &str) -> std::result::Result<&str, ValidationError> {
    let name = name.trim();
    validate::required("name", name)?;
    validate::max_length("name", name, MAX_DOCUMENT_NAME_LEN)?;
    Ok(name)
}

#[derive(Serialize)]
struct Rename<'a> {
    title: &'a str,
}

impl ApiClient {
    /// Lists every visible document.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        let payload: Option<ListPayload<Value>> = self.get(LIST_PATH).await?;
        Ok(payload
            .map(ListPayload::into_vec)
            .unwrap_or_default()
            .iter()
            .map(|raw| Document::from_raw(raw, |url| self.media_url(url)))
            .collect())
    }

    /// Uploads a document.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank or over-long name, otherwise
    /// any pipeline error.
    #[instrument(skip(self, file), fields(file_name = %file.file_name))]
    pub async fn upload_document(&self, name: &str, file: &UploadFile) -> Result<Document> {
        let name = checked_name(name)?;
        let request = ApiRequest::post(INSTRUCTOR_PATH).with_form(vec![
            FormPart::text("name", name),
            FormPart::file("file", file),
        ]);
        let raw: Value = self.fetch(request).await?;
        Ok(Document::from_raw(&raw, |url| self.media_url(url)))
    }

    /// Renames a document.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank or over-long name, otherwise
    /// the error of the last path tried.
    pub async fn rename_document(&self, id: &str, name: &str) -> Result<()> {
        let body = Rename {
            title: checked_name(name)?,
        };
        self.with_admin_fallback(id, |path| ApiRequest::patch(path).with_json(&body))
            .await
    }

    /// Deletes a document.
    ///
    /// # Errors
    ///
    /// Returns the error of the last path tried.
    pub async fn delete_document(&self, id: &str) -> Result<()> {
        self.with_admin_fallback(id, |path| Ok(ApiRequest::delete(path)))
            .await
    }

    async fn with_admin_fallback<F>(&self, id: &str, build: F) -> Result<()>
    where
        F: Fn(String) -> Result<ApiRequest>,
    {
        match self.send(build(instructor_detail(id))?).await {
            Err(e) if e.has_status(&ADMIN_FALLBACK_STATUSES) => {
                debug!(id, status = ?e.status(), "Retrying document change on admin path");
                self.send(build(admin_detail(id))?).await
            }
            other => other,
        }
    }
}
