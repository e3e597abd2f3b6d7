//! Subcommand implementations.

pub mod migrate;
pub mod product;
pub mod replay;

use secrecy::SecretString;

/// Read the fulfillment database URL (`DROPLINE_DATABASE_URL`, then `DATABASE_URL`).
fn database_url() -> Option<SecretString> {
    dotenvy::dotenv().ok();

    std::env::var("DROPLINE_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
        .map(SecretString::from)
}
