//! ============================================================================
//! API Module - Authenticated request client
//! ============================================================================
//! Request/response exchange against the remote API with transparent access
//! token renewal: single-flight refresh, pending-request queue, and at most
//! one replay per call.
//! ============================================================================

mod client;
pub mod paths;
mod types;

pub use client::{ApiClient, ApiConfig};
pub use types::{
    AcceptanceStatus, LoginResponse, PaymentSession, RefreshResponse, SaleItem, SubscriptionInfo,
    TermsDocument, UserProfile,
};
