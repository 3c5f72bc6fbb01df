//! Sign-in, sign-out and account endpoints.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use campus_session::{AuthKey, LoginTokens};

use crate::client::{ApiClient, ApiRequest, FormPart, UploadFile};
use crate::error::{ClientError, Result};
use crate::validate;
use crate::wire;

/// Built-in "current user" endpoints, tried in order by [`ApiClient::get_me`].
pub const ME_CANDIDATES: [&str; 4] = [
    "/api/auth/user/",
    "/api/users/me/",
    "/api/instructor/me/",
    "/api/me/",
];

const AUTH_USER_PATH: &str = "/api/auth/user/";

/// The signed-in user as returned by `/api/auth/user/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct AuthUser {
    /// Primary key.
    #[serde(default, deserialize_with = "wire::opt_id")]
    pub pk: Option<String>,
    /// Email address; empty when the backend sends `null`.
    #[serde(default, deserialize_with = "wire::text_or_empty")]
    pub email: String,
    /// Given name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default)]
    pub last_name: Option<String>,
    /// Role, either a plain string or an object with a `name`.
    #[serde(default)]
    pub role: Option<Value>,
    /// Role name as rendered by some serializers.
    #[serde(default)]
    pub role_name: Option<String>,
    /// Whether the user teaches.
    #[serde(default)]
    pub is_instructor: bool,
    /// Whether the user studies.
    #[serde(default)]
    pub is_student: bool,
    /// Django staff flag.
    #[serde(default)]
    pub is_staff: bool,
    /// Django superuser flag.
    #[serde(default)]
    pub is_superuser: bool,
    /// Group names or group objects.
    #[serde(default)]
    pub groups: Vec<Value>,
    /// Display name.
    #[serde(default)]
    pub full_name: Option<String>,
    /// Avatar URL.
    #[serde(default)]
    pub profile_image_url: Option<String>,
    /// Short biography.
    #[serde(default)]
    pub bio: Option<String>,
}

/// The normalized "me" record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMe {
    /// User id.
    pub id: String,
    /// Email address, possibly empty.
    pub email: String,
    /// Display name, possibly empty.
    pub full_name: String,
    /// University name.
    pub university: Option<String>,
    /// University id.
    pub university_id: Option<String>,
    /// Short biography.
    pub bio: Option<String>,
    /// Avatar URL.
    pub profile_image_url: Option<String>,
}

/// Builds a [`UserMe`] from whichever field spellings the backend used.
#[must_use]
pub fn normalize_me(raw: &Value) -> UserMe {
    UserMe {
        id: wire::first_text(raw, &["id", "pk", "uuid"]).unwrap_or_default(),
        email: wire::first_text(raw, &["email", "user.email"]).unwrap_or_default(),
        full_name: wire::first_text(raw, &["full_name", "name", "user.full_name"])
            .unwrap_or_default(),
        university: wire::first_text(raw, &["university.name", "university"]),
        university_id: wire::first_text(raw, &["university_id", "university.id"]),
        bio: wire::first_present(raw, &["bio", "motto"]),
        profile_image_url: wire::first_present(
            raw,
            &["profile_image_url", "avatar_url", "profile_image", "avatar"],
        ),
    }
}

/// Builds the "me" candidate list, with an optional override first.
///
/// An override not starting with `/api` gets that prefix.
#[must_use]
pub fn me_candidates(override_path: Option<&str>) -> Vec<String> {
    let mut candidates = Vec::with_capacity(ME_CANDIDATES.len() + 1);
    if let Some(path) = override_path.map(str::trim).filter(|p| !p.is_empty()) {
        if path.starts_with("/api") {
            candidates.push(path.to_string());
        } else if path.starts_with('/') {
            candidates.push(format!("/api{path}"));
        } else {
            candidates.push(format!("/api/{path}"));
        }
    }
    candidates.extend(ME_CANDIDATES.iter().map(ToString::to_string));
    candidates
}

/// Landing area for a signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Portal {
    /// University staff.
    University,
    /// System administrator.
    Admin,
    /// Course instructor.
    Instructor,
    /// Learner (default).
    Student,
}

impl Portal {
    /// Picks the portal from a raw user record.
    ///
    /// The role comes from `role.name`, `role_display`, `role_name` or
    /// `role`, upper-cased, plus any group names. University wins over
    /// admin, admin over instructor, instructor over student.
    #[must_use]
    pub fn resolve(user: &Value) -> Self {
        let role = wire::first_present(user, &["role.name", "role_display", "role_name", "role"])
            .unwrap_or_default()
            .to_uppercase();
        let groups: Vec<String> = user
            .get("groups")
            .and_then(Value::as_array)
            .map(|groups| {
                groups
                    .iter()
                    .filter_map(|g| wire::scalar(g.get("name").unwrap_or(g)))
                    .map(|g| g.to_uppercase())
                    .collect()
            })
            .unwrap_or_default();
        let has = |name: &str| role == name || groups.iter().any(|g| g == name);

        if has("UNIVERSITY") {
            Self::University
        } else if has("ADMIN") {
            Self::Admin
        } else if has("INSTRUCTOR") {
            Self::Instructor
        } else {
            Self::Student
        }
    }

    /// Returns the landing route of the web frontend.
    #[must_use]
    pub const fn landing_path(&self) -> &'static str {
        match self {
            Self::University => "/universities-staff/settings_universities-staff",
            Self::Admin => "/admin/settings_admin",
            Self::Instructor => "/my-courses",
            Self::Student => "/home",
        }
    }
}

impl fmt::Display for Portal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::University => "university",
            Self::Admin => "admin",
            Self::Instructor => "instructor",
            Self::Student => "student",
        };
        f.write_str(s)
    }
}

/// Why a login was refused, derived from the server's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFailure {
    /// Wrong email or password.
    InvalidCredentials,
    /// The account exists but is inactive.
    AccountDisabled,
    /// The email address was never confirmed.
    EmailNotVerified,
    /// No account for this email.
    UserNotFound,
    /// Anything else.
    Unknown,
}

impl LoginFailure {
    /// Classifies a server message by case-insensitive substring match.
    #[must_use]
    pub fn classify(detail: &str) -> Self {
        let s = detail.to_lowercase();
        let any = |needles: &[&str]| needles.iter().any(|n| s.contains(n));

        if any(&[
            "invalid credentials",
            "invalid email or password",
            "incorrect",
            "wrong password",
        ]) {
            Self::InvalidCredentials
        } else if any(&["no active account", "disabled", "inactive"]) {
            Self::AccountDisabled
        } else if any(&["not verified", "unverified", "verify your email"]) {
            Self::EmailNotVerified
        } else if any(&["user not found", "no such user"]) {
            Self::UserNotFound
        } else {
            Self::Unknown
        }
    }

    /// Classifies a failed login call.
    ///
    /// Reads `detail`, then the first `non_field_errors` entry, then the
    /// error's own message. Returns the class and the raw text.
    #[must_use]
    pub fn from_error(error: &ClientError) -> (Self, String) {
        let body = match error {
            ClientError::Http { body, .. } => body.as_ref(),
            _ => None,
        };
        let raw = body
            .and_then(|b| {
                wire::first_text(b, &["detail"]).or_else(|| {
                    b.get("non_field_errors")
                        .and_then(Value::as_array)
                        .and_then(|errors| errors.first())
                        .and_then(wire::scalar)
                })
            })
            .unwrap_or_else(|| error.to_string());
        (Self::classify(&raw), raw)
    }

    /// Returns a message suitable for the user.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "Incorrect email or password",
            Self::AccountDisabled => "This account is disabled; contact an administrator",
            Self::EmailNotVerified => {
                "This email address is not verified; check your inbox or resend the link"
            }
            Self::UserNotFound => "No account exists for this email",
            Self::Unknown => "Sign-in failed; please try again",
        }
    }
}

/// Why a registration was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterFailure {
    /// The email address already has an account.
    EmailTaken,
    /// The server reported a generic failure.
    Failed,
    /// Anything else.
    Unknown,
}

impl RegisterFailure {
    /// Classifies a server message by case-insensitive substring match.
    #[must_use]
    pub fn classify(detail: &str) -> Self {
        let s = detail.to_lowercase();
        if [
            "email already registered",
            "email already exists",
            "user with this email already exists",
            "a user is already registered with this e-mail address",
        ]
        .iter()
        .any(|n| s.contains(n))
        {
            Self::EmailTaken
        } else if s.contains("registration failed") {
            Self::Failed
        } else {
            Self::Unknown
        }
    }
}

/// Role chosen at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RegisterRole {
    /// Teaches courses.
    Instructor,
    /// Takes courses.
    Student,
}

/// Input for [`ApiClient::register`].
#[derive(Debug, Clone)]
pub struct Registration {
    /// Email address; trimmed and lower-cased before sending.
    pub email: String,
    /// Password.
    pub password: String,
    /// Password confirmation; checked locally, never sent.
    pub confirm_password: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Requested role.
    pub role: RegisterRole,
}

/// Input for [`ApiClient::change_password`].
#[derive(Debug, Clone, Serialize)]
pub struct PasswordChange {
    /// Current password.
    pub current_password: String,
    /// New password.
    pub new_password: String,
    /// New password again.
    pub confirm_password: String,
}

/// Editable profile fields.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    /// Short biography.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

/// Response of a profile image upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProfileImage {
    /// URL of the stored image.
    pub profile_image_url: String,
}

/// Result of a successful sign-in.
#[derive(Debug, Clone)]
pub struct SignIn {
    /// Parsed user record.
    pub user: AuthUser,
    /// User record exactly as the server sent it.
    pub raw: Value,
    /// Where the user lands.
    pub portal: Portal,
}

impl SignIn {
    fn from_raw(raw: Value) -> Result<Self> {
        let portal = Portal::resolve(&raw);
        let user = serde_json::from_value(raw.clone())?;
        Ok(Self { user, raw, portal })
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    access: Option<String>,
    #[serde(default)]
    refresh: Option<String>,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl LoginResponse {
    fn into_tokens(self) -> Result<LoginTokens> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
        if let Some(access) = non_empty(self.access) {
            return Ok(LoginTokens {
                access,
                refresh: non_empty(self.refresh),
            });
        }
        if non_empty(self.key).is_some() {
            return Err(ClientError::MissingToken {
                hint: Some("server issued a legacy DRF key; JWT login is required".to_string()),
            });
        }
        if let Some(access) = non_empty(self.access_token) {
            return Ok(LoginTokens {
                access,
                refresh: non_empty(self.refresh_token),
            });
        }
        Err(ClientError::MissingToken { hint: None })
    }
}

impl ApiClient {
    /// Signs in with email and password.
    ///
    /// Stale tokens are removed first. On success the tokens are stored,
    /// the user record is fetched and cached as `me`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed input, the server's error
    /// for a refused login (see [`LoginFailure::from_error`]) or
    /// `ClientError::MissingToken` if the response carried no JWT.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<SignIn> {
        let email = email.trim();
        let password = password.trim();
        validate::email("email", email)?;
        validate::required("password", password)?;

        self.tokens().clear_tokens()?;
        let response: LoginResponse = self
            .post(
                "/api/auth/login/",
                &json!({ "email": email, "password": password }),
            )
            .await?;
        self.tokens().store_login(&response.into_tokens()?)?;

        let raw: Value = self.get(AUTH_USER_PATH).await?;
        self.tokens().cache_me(&raw)?;
        let signed_in = SignIn::from_raw(raw)?;
        info!(portal = %signed_in.portal, "Signed in");
        Ok(signed_in)
    }

    /// Re-validates a stored session.
    ///
    /// Returns `None` when no token is stored or the token no longer works;
    /// in the latter case `access`, `refresh` and `me` are removed.
    ///
    /// # Errors
    ///
    /// Returns an error only if local storage cannot be updated.
    pub async fn restore_session(&self) -> Result<Option<SignIn>> {
        if self.tokens().bearer().is_none() {
            return Ok(None);
        }
        let fetched = self
            .get::<Value>(AUTH_USER_PATH)
            .await
            .and_then(SignIn::from_raw);
        match fetched {
            Ok(signed_in) => {
                self.tokens().cache_me(&signed_in.raw)?;
                debug!(portal = %signed_in.portal, "Session restored");
                Ok(Some(signed_in))
            }
            Err(e) => {
                warn!(error = %e, "Stored session is no longer valid");
                self.tokens()
                    .remove_local(&[AuthKey::Access, AuthKey::Refresh, AuthKey::Me])?;
                Ok(None)
            }
        }
    }

    /// Signs out.
    ///
    /// The refresh token is revoked on a best-effort basis; local auth is
    /// cleared regardless and a logout broadcast is recorded.
    ///
    /// # Errors
    ///
    /// Returns an error only if local storage cannot be updated.
    pub async fn logout(&self) -> Result<()> {
        if let Some(refresh) = self.tokens().refresh_token() {
            if let Err(e) = self
                .send(ApiRequest::post("/api/auth/logout/").with_json(&json!({ "refresh": refresh }))?)
                .await
            {
                debug!(error = %e, "Server-side logout failed; clearing local session anyway");
            }
        }
        self.tokens().clear_auth()?;
        self.tokens().broadcast_logout(Utc::now())?;
        info!("Signed out");
        Ok(())
    }

    /// Fetches `/api/auth/user/`.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn auth_user(&self) -> Result<AuthUser> {
        self.get(AUTH_USER_PATH).await
    }

    /// Updates name and biography.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn update_me(&self, update: &ProfileUpdate) -> Result<Value> {
        self.patch(AUTH_USER_PATH, update).await
    }

    /// Uploads a new profile image.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn update_profile_image(&self, image: &UploadFile) -> Result<ProfileImage> {
        let request =
            ApiRequest::patch(AUTH_USER_PATH).with_form(vec![FormPart::file("profile_image", image)]);
        self.fetch(request).await
    }

    /// Changes the password of the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the new password is too short or the
    /// confirmation differs, otherwise any pipeline error.
    pub async fn change_password(&self, change: &PasswordChange) -> Result<Value> {
        validate::required("current_password", &change.current_password)?;
        validate::new_password(&change.new_password, &change.confirm_password)?;
        self.post("/api/auth/password/change/", change).await
    }

    /// Creates an account. The user must verify the email before signing in.
    ///
    /// # Errors
    ///
    /// Returns a validation error for missing or malformed fields, otherwise
    /// any pipeline error (see [`RegisterFailure::classify`]).
    #[instrument(skip(self, registration), fields(role = ?registration.role))]
    pub async fn register(&self, registration: &Registration) -> Result<Value> {
        validate::required("first_name", &registration.first_name)?;
        validate::required("last_name", &registration.last_name)?;
        validate::email("email", registration.email.trim())?;
        validate::confirmation(
            "confirm_password",
            &registration.password,
            &registration.confirm_password,
        )?;
        validate::required("password", &registration.password)?;

        let full_name = format!(
            "{} {}",
            registration.first_name.trim(),
            registration.last_name.trim()
        );
        let body = json!({
            "email": registration.email.trim().to_lowercase(),
            "password": registration.password,
            "full_name": full_name.trim(),
            "role": registration.role,
        });
        self.post("/api/auth/register/", &body).await
    }

    /// Confirms an email address from the link sent after registration.
    ///
    /// # Errors
    ///
    /// Returns any pipeline error.
    pub async fn verify_email(&self, uid: &str, token: &str) -> Result<Value> {
        self.post("/api/auth/verify/", &json!({ "uid": uid, "token": token }))
            .await
    }

    /// Sends the verification link again.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed email, otherwise any
    /// pipeline error.
    pub async fn resend_verification(&self, email: &str) -> Result<()> {
        validate::email("email", email.trim())?;
        self.send(ApiRequest::post("/api/auth/resend/").with_json(&json!({ "email": email.trim() }))?)
            .await
    }

    /// Requests a password reset email.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed email, otherwise any
    /// pipeline error.
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        validate::email("email", email.trim())?;
        self.send(
            ApiRequest::post("/api/auth/password/reset/")
                .with_json(&json!({ "email": email.trim() }))?,
        )
        .await
    }

    /// Sets a new password from a reset link.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an incomplete link or a bad password,
    /// otherwise any pipeline error.
    pub async fn confirm_password_reset(
        &self,
        uid: &str,
        token: &str,
        new_password: &str,
        confirm: &str,
    ) -> Result<()> {
        validate::required("uid", uid)?;
        validate::required("token", token)?;
        validate::new_password(new_password, confirm)?;
        let body = json!({
            "uid": uid,
            "token": token,
            "new_password1": new_password,
            "new_password2": confirm,
        });
        self.send(ApiRequest::post("/api/auth/password/reset/confirm/").with_json(&body)?)
            .await
    }

    /// Fetches and caches the normalized current user.
    ///
    /// Tries the configured override and then [`ME_CANDIDATES`]; a 401 or
    /// 403 stops the search.
    ///
    /// # Errors
    ///
    /// Returns the stopping auth error or the last failure.
    pub async fn get_me(&self) -> Result<UserMe> {
        let candidates = me_candidates(self.config().me_path.as_deref());
        let raw: Value = self.get_with_fallback(&candidates).await?;
        let me = normalize_me(&raw);
        self.tokens().cache_me(&me)?;
        Ok(me)
    }
}
