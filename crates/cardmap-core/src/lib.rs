//! Core library for cardmap.
//!
//! cardmap is a thin client over the card-benefits REST backend. This crate
//! holds the pieces every front end shares: the token store, the HTTP
//! client with one-shot token refresh, the session context and route
//! guards, configuration, and nearby-store notifications.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod proximity;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthSession, GuardKind, GuardView, RouteGuard, TokenKind, TokenStore};
pub use config::Config;
