//! Request and response bodies.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use portgate_core::models::apps::Application;
use portgate_core::models::auth::{Role, SessionUser, User};
use serde::{Deserialize, Serialize};

/// JSON error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// The logged-in user as the portal shows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub role: Role,
}

impl From<&SessionUser> for UserView {
    fn from(u: &SessionUser) -> Self {
        Self {
            id: u.id.clone(),
            username: u.username.clone(),
            full_name: u.full_name.clone(),
            email: u.email.clone(),
            role: u.role,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: UserView,
    pub expires_at: DateTime<Utc>,
}

impl From<&SessionUser> for SessionResponse {
    fn from(u: &SessionUser) -> Self {
        Self {
            user: UserView::from(u),
            expires_at: u.expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}

/// An application card on the portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppView {
    pub id: String,
    pub port: u16,
    pub name: String,
    pub description: String,
    pub image_path: Option<String>,
    pub category: String,
    pub running: bool,
    pub public: bool,
}

impl AppView {
    pub fn new(app: &Application, running: bool, public: bool) -> Self {
        Self {
            id: app.id.clone(),
            port: app.port,
            name: app.name.clone(),
            description: app.description.clone(),
            image_path: app.image_path.clone(),
            category: app.category.clone(),
            running,
            public,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppsQuery {
    pub category: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppsResponse {
    pub apps: Vec<AppView>,
    pub categories: Vec<String>,
    pub running_count: usize,
}

/// Where the browser must submit the access token. The token travels as a
/// hidden form field, never in a bookmarkable URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchForm {
    pub action: String,
    pub method: String,
    pub fields: BTreeMap<String, String>,
}

/// Form body (or query) accepted by the gateway launch endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LaunchParams {
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserView {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub groups: Vec<String>,
}

impl AdminUserView {
    pub fn new(user: User, groups: Vec<String>) -> Self {
        Self {
            id: user.id,
            username: user.username,
            full_name: user.full_name,
            email: user.email,
            role: user.role,
            is_active: user.is_active,
            created_at: user.created_at,
            last_login: user.last_login,
            groups,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupsRequest {
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupsResponse {
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAppRequest {
    pub port: u16,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub image_path: Option<String>,
    #[serde(default)]
    pub category: String,
    /// Replace the permission set when present.
    pub groups: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminAppView {
    #[serde(flatten)]
    pub app: AppView,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanQuery {
    pub start: u16,
    pub end: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    pub ports: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}
