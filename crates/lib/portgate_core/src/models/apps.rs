//! Application registry models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default category for applications registered without one.
pub const DEFAULT_CATEGORY: &str = "General";

/// A registered backend application, identified by its port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub port: u16,
    pub name: String,
    pub description: String,
    pub image_path: Option<String>,
    pub category: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

/// Input for registering (or re-registering) an application.
#[derive(Debug, Clone)]
pub struct NewApplication {
    pub port: u16,
    pub name: String,
    pub description: String,
    pub image_path: Option<String>,
    pub category: String,
    pub created_by: Option<String>,
}

impl NewApplication {
    /// Minimal registration with default description and category.
    pub fn new(port: u16, name: impl Into<String>) -> Self {
        Self {
            port,
            name: name.into(),
            description: String::new(),
            image_path: None,
            category: DEFAULT_CATEGORY.to_string(),
            created_by: None,
        }
    }
}
