//! Campus LMS Client
//!
//! Async client for the Campus LMS REST backend.
//!
//! Every call goes through [`ApiClient`], which attaches the stored bearer
//! token, renews it once on a 401 and shares that renewal between all
//! requests that fail at the same time. Feature modules add typed
//! operations for courses, quizzes, assignments and the rest of the
//! backend on top of that pipeline.

pub mod assignments;
pub mod auth;
pub mod certificates;
pub mod client;
pub mod config;
pub mod courses;
pub mod documents;
pub mod error;
pub mod lookups;
pub mod organizations;
pub mod profile;
pub mod quizzes;
pub mod refresh;
pub mod scoring;
pub mod validate;
mod wire;

pub use campus_session;

pub use assignments::{due_at_iso, Assignment, AssignmentUpdate, Attachment, NewAssignment};
pub use auth::{
    AuthUser, LoginFailure, PasswordChange, Portal, ProfileImage, ProfileUpdate, RegisterFailure,
    RegisterRole, Registration, SignIn, UserMe,
};
pub use certificates::{Certificate, CertificateTemplate, IssueOptions};
pub use client::{ApiClient, ApiRequest, Body, FormPart, ListPayload, UploadFile};
pub use config::{BannerField, ClientConfig, StatusField};
pub use courses::{
    ApprovalStatus, ApprovalUi, Course, CourseDetail, CourseFilter, CourseStatus,
    CourseUpdate, CourseVisibility,
};
pub use documents::Document;
pub use error::{ClientError, Result};
pub use lookups::LookupOption;
pub use organizations::Organization;
pub use profile::{Education, EducationUpdate, NewEducation, NewTeaching, Teaching, TeachingUpdate};
pub use quizzes::{Choice, ItemId, Question, QuestionType, Quiz};
pub use refresh::{RefreshGate, RefreshOutcome};
pub use scoring::{Scoring, ScoringItem, ScoringPayload};
pub use validate::ValidationError;
