//! ============================================================================
//! API Types - Request/response shapes for the REST endpoints
//! ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::SubscriptionTier;

/// `POST auth/login` response: access + refresh token.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
}

/// `POST auth/token/refresh` response: rotated access token, and a rotated
/// refresh token when the server chooses to issue one.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// `GET auth/me` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// `GET users/subscription` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    pub tier: SubscriptionTier,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// `GET acceptance/has-accepted-latest` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptanceStatus {
    pub has_accepted_latest: bool,
}

/// `GET terms/latest` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermsDocument {
    pub version: String,
    pub content: String,
}

/// `POST payment/create` response. The checkout flow itself is an external
/// service; the core only hands the redirect URL upward.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    pub checkout_url: String,
}

/// One entry from `GET sale`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price_cents: u64,
}
