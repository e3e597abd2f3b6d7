//! Dropline webhook receiver library.
//!
//! Receives signed payment events, turns completed checkouts into orders and
//! fans them out to inventory, dropshipping, CRMs and email.
//!
//! # Modules
//!
//! - [`webhook`] - Signature verification, payload parsing and event routing
//! - [`pipeline`] - Checkout orchestration and the ports it depends on
//! - [`db`] - `PostgreSQL` order store and inventory ledger
//! - [`dropship`] - Dropshipping provider client
//! - [`services`] - CRM and email connectors
//! - [`routes`] - HTTP handlers

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod dropship;
pub mod error;
pub mod pipeline;
pub mod routes;
pub mod services;
pub mod state;
pub mod webhook;

use axum::Router;

use state::AppState;

/// Build the application router without transport layers.
pub fn app(state: AppState) -> Router {
    routes::routes().with_state(state)
}
