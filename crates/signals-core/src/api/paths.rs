//! ============================================================================
//! API Paths - Endpoint constants and the public-path list
//! ============================================================================
//! Public paths never carry a bearer token and never trigger the refresh
//! protocol, even when a stale token exists.
//! ============================================================================

pub const LOGIN: &str = "auth/login";
pub const REGISTER: &str = "auth/register";
pub const ACTIVATE: &str = "auth/activate";
pub const PASSWORD_RESET_REQUEST: &str = "auth/password-reset-request";
pub const TOKEN_REFRESH: &str = "auth/token/refresh";

pub const ME: &str = "auth/me";
pub const SUBSCRIPTION: &str = "users/subscription";
pub const HAS_ACCEPTED_LATEST: &str = "acceptance/has-accepted-latest";
pub const ACCEPT_LATEST: &str = "acceptance/accept-latest";
pub const LATEST_TERMS: &str = "terms/latest";
pub const PAYMENT_CREATE: &str = "payment/create";
pub const SALE: &str = "sale";

const PUBLIC_PATHS: &[&str] = &[
    LOGIN,
    REGISTER,
    ACTIVATE,
    PASSWORD_RESET_REQUEST,
    TOKEN_REFRESH,
];

/// Whether a path is callable without authentication.
pub fn is_public(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path.trim_start_matches('/'))
}
