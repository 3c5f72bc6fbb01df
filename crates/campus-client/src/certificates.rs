//! Certificate templates and issuing.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::ApiClient;
use crate::error::Result;
use crate::wire;

/// An issued certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Certificate id.
    #[serde(deserialize_with = "wire::id")]
    pub id: String,
    /// Printed serial number.
    #[serde(default)]
    pub serial_no: String,
    /// Code used to verify authenticity.
    #[serde(default)]
    pub verification_code: String,
    /// Issue time.
    #[serde(default)]
    pub issued_at: Option<String>,
    /// Recipient name.
    #[serde(default)]
    pub student_name: String,
    /// Course name as printed.
    #[serde(default)]
    pub course_name: String,
    /// Completion date.
    #[serde(default)]
    pub completion_date: Option<String>,
    /// `pending`, `done`, `failed` or another backend value.
    #[serde(default)]
    pub render_status: String,
    /// Rendered file, relative or absolute.
    #[serde(default)]
    pub file_url: Option<String>,
}

impl Certificate {
    /// Returns `true` once the file has been rendered.
    #[must_use]
    pub fn is_rendered(&self) -> bool {
        self.render_status.eq_ignore_ascii_case("done")
    }
}

/// Template settings. Unset fields keep their stored values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CertificateTemplate {
    /// `classic`, `modern`, `minimalist` or another backend style.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Primary color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,
    /// Secondary color.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_color: Option<String>,
    /// Title printed instead of the course title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_title_override: Option<String>,
    /// Issuer name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_name: Option<String>,
    /// Locale of the printed text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

/// Who receives certificates when a template is saved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueOptions {
    /// Specific students.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_for_student_ids: Option<Vec<String>>,
    /// Everyone enrolled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_for_all_enrolled: Option<bool>,
    /// Only students who completed the course.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_for_completed_only: Option<bool>,
}

impl IssueOptions {
    /// Every enrolled student who completed the course.
    #[must_use]
    pub fn completed_only() -> Self {
        Self {
            issue_for_student_ids: Some(Vec::new()),
            issue_for_all_enrolled: Some(true),
            issue_for_completed_only: Some(true),
        }
    }
}

#[derive(Debug, Serialize)]
struct SaveAndIssueBody<'a> {
    #[serde(flatten)]
    template: &'a CertificateTemplate,
    #[serde(flatten)]
    issue: &'a IssueOptions,
}

/// Response of save-and-issue: a bare list or the template with `created`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IssuedPayload {
    List(Vec<Certificate>),
    Created {
        #[serde(default)]
        created: Vec<Certificate>,
    },
}

impl IssuedPayload {
    fn into_vec(self) -> Vec<Certificate> {
        match self {
            Self::List(list) | Self::Created { created: list } => list,
        }
    }
}

impl ApiClient {
    /// Saves the certificate template and issues certificates per `issue`.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn save_and_issue(
        &self,
        course_id: &str,
        template: &CertificateTemplate,
        issue: &IssueOptions,
    ) -> Result<Vec<Certificate>> {
        let payload: IssuedPayload = self
            .post(
                &format!("/api/courses/{course_id}/certificates/save-and-issue/"),
                &SaveAndIssueBody { template, issue },
            )
            .await?;
        let created = payload.into_vec();
        info!(course_id, issued = created.len(), "Certificates issued");
        Ok(created)
    }

    /// Saves the template and issues certificates to every student who
    /// completed the course.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn issue_for_completed(
        &self,
        course_id: &str,
        template: &CertificateTemplate,
    ) -> Result<Vec<Certificate>> {
        self.save_and_issue(course_id, template, &IssueOptions::completed_only())
            .await
    }

    /// Lists the certificates of a course.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn list_course_certificates(&self, course_id: &str) -> Result<Vec<Certificate>> {
        self.get(&format!("/api/courses/{course_id}/certificates/"))
            .await
    }
}
