//! Dropline Core - Shared domain types.
//!
//! This crate provides the types that flow through the post-payment
//! fulfillment pipeline:
//! - `webhooks` - Webhook receiver and fulfillment pipeline
//! - `cli` - Command-line tools for migrations, catalog seeding and replay
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Anything that decides *what* should happen (variant
//! precedence, name splitting, status transitions) lives here so it can be
//! tested in isolation.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, emails, money, order status, payment events and
//!   order/catalog records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
