//! Route paths for the portal and gateway routers.

// Portal
pub const GET_HEALTH: &str = "/health";
pub const POST_AUTH_LOGIN: &str = "/auth/login";
pub const POST_AUTH_LOGOUT: &str = "/auth/logout";
pub const POST_AUTH_REFRESH: &str = "/auth/refresh";
pub const GET_AUTH_ME: &str = "/auth/me";
pub const GET_API_APPS: &str = "/api/apps";
pub const POST_API_APPS_ID_LAUNCH: &str = "/api/apps/{app_id}/launch";
pub const ADMIN_USERS: &str = "/admin/users";
pub const ADMIN_USERS_ID: &str = "/admin/users/{user_id}";
pub const PUT_ADMIN_USERS_ID_GROUPS: &str = "/admin/users/{user_id}/groups";
pub const GET_ADMIN_GROUPS: &str = "/admin/groups";
pub const ADMIN_APPS: &str = "/admin/apps";
pub const DELETE_ADMIN_APPS_ID: &str = "/admin/apps/{app_id}";
pub const PUT_ADMIN_APPS_ID_PERMISSIONS: &str = "/admin/apps/{app_id}/permissions";
pub const GET_ADMIN_SCAN: &str = "/admin/scan";

// Gateway
pub const LAUNCH_ID: &str = "/launch/{app_id}";
pub const APP_ID: &str = "/app/{app_id}";
pub const APP_ID_ROOT: &str = "/app/{app_id}/";
pub const POST_APP_ID_REFRESH: &str = "/app/{app_id}/refresh-session";
pub const POST_APP_ID_SIGN_OUT: &str = "/app/{app_id}/sign-out";
pub const GET_VALIDATE_SESSION: &str = "/validate-session/{app_id}/{token}";
