//! Course listing, editing and approval.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use crate::client::{ApiClient, ApiRequest, FormPart, ListPayload, UploadFile};
use crate::config::{BannerField, StatusField};
use crate::error::Result;
use crate::wire;

const COURSES_PATH: &str = "/api/courses/";

fn course_path(id: &str) -> String {
    format!("/api/courses/{id}/")
}

/// Approval state of a course.
///
/// Backends differ on the vocabulary: some use DRAFT/APPROVED/REJECTED,
/// others store `pending|active|denied|archived`. Unknown values read from
/// the backend are kept as [`CourseStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CourseStatus {
    /// Being written.
    Draft,
    /// Waiting for approval.
    Pending,
    /// Published.
    Approved,
    /// Sent back.
    Rejected,
    /// Published, on backends that say `active`.
    Active,
    /// Sent back, on backends that say `denied`.
    Denied,
    /// Retired.
    Archived,
    /// Any other value the backend reported.
    Other(String),
}

impl CourseStatus {
    /// Returns the wire value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Draft => "DRAFT",
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Active => "ACTIVE",
            Self::Denied => "DENIED",
            Self::Archived => "ARCHIVED",
            Self::Other(s) => s,
        }
    }

    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "DRAFT" => Some(Self::Draft),
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            "ACTIVE" => Some(Self::Active),
            "DENIED" => Some(Self::Denied),
            "ARCHIVED" => Some(Self::Archived),
            _ => None,
        }
    }
}

impl fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_str_case_insensitive(s).ok_or_else(|| {
            format!(
                "invalid course status '{s}': expected one of DRAFT, PENDING, APPROVED, \
                 REJECTED, ACTIVE, DENIED, ARCHIVED"
            )
        })
    }
}

impl<'de> Deserialize<'de> for CourseStatus {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_str_case_insensitive(&s).unwrap_or(Self::Other(s)))
    }
}

impl Serialize for CourseStatus {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Who can see a course, on backends that use visibility instead of status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CourseVisibility {
    /// Listed and enrollable.
    Open,
    /// Listed but not enrollable.
    Closed,
    /// Not listed.
    Hidden,
}

impl CourseVisibility {
    /// Returns the wire value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::Hidden => "HIDDEN",
        }
    }
}

impl fmt::Display for CourseVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseVisibility {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            "HIDDEN" => Ok(Self::Hidden),
            _ => Err(format!(
                "invalid course visibility '{s}': expected one of OPEN, CLOSED, HIDDEN"
            )),
        }
    }
}

impl<'de> Deserialize<'de> for CourseVisibility {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for CourseVisibility {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Three-way approval badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalUi {
    /// Approved.
    Approved,
    /// Pending, including drafts.
    Pending,
    /// Rejected.
    Rejected,
}

impl ApprovalUi {
    /// Maps a backend status string to a badge.
    ///
    /// APPROVED and ACTIVE are approved, REJECTED and DENIED are rejected,
    /// in any case. Anything else, DRAFT included, is pending.
    #[must_use]
    pub fn from_course_status(status: Option<&str>) -> Self {
        match status.map(|s| s.trim().to_uppercase()).as_deref() {
            Some("APPROVED" | "ACTIVE") => Self::Approved,
            Some("REJECTED" | "DENIED") => Self::Rejected,
            _ => Self::Pending,
        }
    }
}

impl fmt::Display for ApprovalUi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Approved => "approved",
            Self::Pending => "pending",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// A course in list responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    /// Course id.
    #[serde(deserialize_with = "wire::id")]
    pub id: String,
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Banner image path or URL.
    #[serde(default)]
    pub banner_img: Option<String>,
    /// Level label.
    #[serde(default)]
    pub level: Option<String>,
    /// Curriculum id.
    #[serde(default, deserialize_with = "wire::opt_id")]
    pub curriculum: Option<String>,
    /// Instructor user id.
    #[serde(default, deserialize_with = "wire::opt_id")]
    pub instructor: Option<String>,
    /// University id.
    #[serde(default, deserialize_with = "wire::opt_id")]
    pub university: Option<String>,
    /// Approval state.
    #[serde(default)]
    pub status: Option<CourseStatus>,
    /// Visibility, on backends that expose it.
    #[serde(default)]
    pub visibility: Option<CourseVisibility>,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Instructor display name.
    #[serde(default)]
    pub instructor_name: Option<String>,
    /// Curriculum display name.
    #[serde(default)]
    pub curriculum_name: Option<String>,
    /// Category id.
    #[serde(default, deserialize_with = "wire::opt_id")]
    pub category: Option<String>,
    /// Category id under its alternate name.
    #[serde(default, deserialize_with = "wire::opt_id")]
    pub category_id: Option<String>,
    /// Category display name.
    #[serde(default)]
    pub category_name: Option<String>,
    /// Total learning time in hours.
    #[serde(default)]
    pub duration_hours: Option<f64>,
}

impl Course {
    /// Returns the approval badge for this course.
    #[must_use]
    pub fn approval(&self) -> ApprovalUi {
        ApprovalUi::from_course_status(self.status.as_ref().map(CourseStatus::as_str))
    }
}

/// A single course as returned by the detail endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseDetail {
    /// Course id.
    #[serde(deserialize_with = "wire::id")]
    pub id: String,
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Category id.
    #[serde(default, deserialize_with = "wire::opt_id")]
    pub category: Option<String>,
    /// Course code.
    #[serde(default)]
    pub code: Option<String>,
    /// Curriculum id.
    #[serde(default, deserialize_with = "wire::opt_id")]
    pub curriculum: Option<String>,
    /// Status or visibility, depending on the backend.
    #[serde(default)]
    pub status: Option<String>,
    /// Banner URL.
    #[serde(default)]
    pub banner_image_url: Option<String>,
    /// Banner under an alternate name.
    #[serde(default)]
    pub image: Option<String>,
    /// Banner under an alternate name.
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Banner under an alternate name.
    #[serde(default)]
    pub banner: Option<String>,
}

impl CourseDetail {
    /// Returns the first banner reference the backend provided.
    #[must_use]
    pub fn banner_ref(&self) -> Option<&str> {
        [&self.banner_image_url, &self.image, &self.thumbnail, &self.banner]
            .into_iter()
            .find_map(|v| v.as_deref().filter(|s| !s.is_empty()))
    }
}

/// Query filters for course listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseFilter {
    /// Instructor user id.
    pub instructor: Option<String>,
    /// Approval state.
    pub status: Option<CourseStatus>,
    /// Free-text search.
    pub q: Option<String>,
}

impl CourseFilter {
    fn apply(&self, mut request: ApiRequest) -> ApiRequest {
        if let Some(instructor) = &self.instructor {
            request = request.with_query("instructor", instructor);
        }
        if let Some(status) = &self.status {
            request = request.with_query("status", status.as_str());
        }
        if let Some(q) = self.q.as_deref().filter(|q| !q.is_empty()) {
            request = request.with_query("q", q);
        }
        request
    }
}

/// Fields to change on a course. Unset fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct CourseUpdate {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New curriculum id.
    pub curriculum_id: Option<String>,
    /// New category id.
    pub category_id: Option<String>,
    /// New enrollment token.
    pub enroll_token: Option<String>,
    /// New status; sent only when the backend uses `status`.
    pub status: Option<String>,
    /// New visibility; sent only when the backend uses `visibility`.
    pub visibility: Option<CourseVisibility>,
    /// New banner image.
    pub banner: Option<UploadFile>,
}

impl CourseUpdate {
    /// Builds the multipart form for the given backend field layout.
    #[must_use]
    pub fn to_form(&self, status_field: StatusField, banner_field: BannerField) -> Vec<FormPart> {
        let mut parts = Vec::new();
        let mut text = |name: &str, value: Option<&str>| {
            if let Some(value) = value {
                parts.push(FormPart::text(name, value));
            }
        };
        text("title", self.title.as_deref());
        text("description", self.description.as_deref());
        text("curriculum_id", self.curriculum_id.as_deref());
        text("category_id", self.category_id.as_deref());
        text("enroll_token", self.enroll_token.as_deref());
        match status_field {
            StatusField::Status => text("status", self.status.as_deref()),
            StatusField::Visibility => {
                text("visibility", self.visibility.as_ref().map(CourseVisibility::as_str));
            }
        }
        if let Some(banner) = &self.banner {
            parts.push(FormPart::file(banner_field.as_str(), banner));
        }
        parts
    }
}

/// Approval state as reported by the approval endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStatus {
    /// Badge value.
    pub status: ApprovalUi,
    /// When the state last changed.
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl ApiClient {
    /// Lists courses matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn list_courses(&self, filter: &CourseFilter) -> Result<Vec<Course>> {
        let request = filter.apply(ApiRequest::get(COURSES_PATH));
        let payload: ListPayload<Course> = self.fetch(request).await?;
        Ok(payload.into_vec())
    }

    /// Lists the signed-in instructor's courses.
    ///
    /// Uses the server-side `instructor` filter and falls back to filtering
    /// the full list locally when the filtered call fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the user cannot be resolved or both listings
    /// fail.
    #[instrument(skip(self))]
    pub async fn list_my_courses(&self) -> Result<Vec<Course>> {
        let me = self.get_me().await?;
        let filter = CourseFilter {
            instructor: Some(me.id.clone()),
            ..CourseFilter::default()
        };
        match self.list_courses(&filter).await {
            Ok(courses) => Ok(courses),
            Err(e) => {
                debug!(error = %e, "Instructor filter failed; filtering locally");
                let all = self.list_courses(&CourseFilter::default()).await?;
                Ok(all
                    .into_iter()
                    .filter(|c| c.instructor.as_deref() == Some(me.id.as_str()))
                    .collect())
            }
        }
    }

    /// Fetches one course.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn get_course(&self, id: &str) -> Result<CourseDetail> {
        self.get(&course_path(id)).await
    }

    /// Replaces course fields with a multipart `PUT`.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    #[instrument(skip(self, update))]
    pub async fn update_course(&self, id: &str, update: &CourseUpdate) -> Result<CourseDetail> {
        let config = self.config();
        let parts = update.to_form(config.course_status_field, config.banner_field);
        self.fetch(ApiRequest::put(course_path(id)).with_form(parts))
            .await
    }

    /// Deletes a course.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn delete_course(&self, id: &str) -> Result<()> {
        self.delete(&course_path(id)).await
    }

    /// Submits a course for approval.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn request_course_approval(&self, id: &str) -> Result<()> {
        self.send(ApiRequest::post(format!("/api/courses/{id}/request-approval/")))
            .await
    }

    /// Fetches the approval badge of a course.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn course_approval_status(&self, id: &str) -> Result<ApprovalStatus> {
        self.get(&format!("/api/courses/{id}/approval-status/"))
            .await
    }

    /// Lists the courses of a university.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn list_university_courses(
        &self,
        university_id: &str,
        filter: &CourseFilter,
    ) -> Result<Vec<Course>> {
        let request = filter
            .apply(ApiRequest::get(COURSES_PATH))
            .with_query("university", university_id);
        let payload: ListPayload<Course> = self.fetch(request).await?;
        Ok(payload.into_vec())
    }

    /// Approves or rejects a course (admin and university staff).
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    #[instrument(skip(self))]
    pub async fn update_course_status(&self, id: &str, status: &CourseStatus) -> Result<Course> {
        self.patch(
            &format!("/api/courses/{id}/update-status/"),
            &json!({ "status": status }),
        )
        .await
    }
}
