//! Permission filter.
//!
//! Pure functions deciding which applications a user may see. Admins see
//! every active application; everyone else sees active applications that
//! are public or share at least one group with them.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::PUBLIC_GROUP;
use crate::models::apps::Application;
use crate::models::auth::Role;

/// Application id to the set of groups allowed to open it.
pub type PermissionMap = HashMap<String, BTreeSet<String>>;

/// Whether a single application is visible to a user with `role` and
/// `groups`.
pub fn is_visible(
    role: Role,
    groups: &[String],
    app: &Application,
    permissions: &PermissionMap,
) -> bool {
    if !app.is_active {
        return false;
    }
    if role.is_admin() {
        return true;
    }
    match permissions.get(&app.id) {
        None => false,
        Some(allowed) => {
            allowed.contains(PUBLIC_GROUP) || groups.iter().any(|g| allowed.contains(g))
        }
    }
}

/// The applications visible to a user, de-duplicated by id and ordered by
/// name.
pub fn visible_applications(
    role: Role,
    groups: &[String],
    apps: &[Application],
    permissions: &PermissionMap,
) -> Vec<Application> {
    let mut seen = HashSet::new();
    let mut visible: Vec<Application> = apps
        .iter()
        .filter(|app| is_visible(role, groups, app, permissions))
        .filter(|app| seen.insert(app.id.clone()))
        .cloned()
        .collect();
    visible.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    visible
}

/// Keep applications in `category`. `"All"` keeps everything.
pub fn filter_by_category(apps: &[Application], category: &str) -> Vec<Application> {
    if category == "All" {
        return apps.to_vec();
    }
    apps.iter()
        .filter(|app| app.category == category)
        .cloned()
        .collect()
}

/// Distinct categories, sorted.
pub fn categories(apps: &[Application]) -> Vec<String> {
    apps.iter()
        .map(|app| app.category.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Case-insensitive search over name, description and category. An empty
/// term matches everything.
pub fn search_applications(apps: &[Application], term: &str) -> Vec<Application> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return apps.to_vec();
    }
    apps.iter()
        .filter(|app| {
            app.name.to_lowercase().contains(&term)
                || app.description.to_lowercase().contains(&term)
                || app.category.to_lowercase().contains(&term)
        })
        .cloned()
        .collect()
}
