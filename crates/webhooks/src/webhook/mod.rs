//! Inbound payment webhooks: authentication, parsing and routing.

pub mod router;
pub mod stripe;
pub mod verify;

pub use router::{RouteOutcome, route_event};
pub use stripe::parse_event;
pub use verify::{SIGNATURE_HEADER, SignatureVerifier};

/// Why a webhook delivery was rejected.
///
/// Both variants map to `400 Bad Request`; nothing downstream runs.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}
