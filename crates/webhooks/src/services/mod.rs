//! Notification connectors.
//!
//! # Services
//!
//! - `brevo` - Brevo contact upsert (CRM-B)
//! - `email` - Order confirmation email via SMTP
//! - `klaviyo` - Klaviyo profile import (CRM-A)

pub mod brevo;
pub mod email;
pub mod klaviyo;

pub use brevo::{BrevoClient, BrevoError};
pub use email::{EmailError, EmailService};
pub use klaviyo::{KlaviyoClient, KlaviyoError};

/// Connector name of the Klaviyo CRM in reports.
pub const KLAVIYO_CONNECTOR: &str = "klaviyo";

/// Connector name of the Brevo CRM in reports.
pub const BREVO_CONNECTOR: &str = "brevo";
