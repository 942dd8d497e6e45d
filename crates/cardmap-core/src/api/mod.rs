//! REST API client module for the cardmap backend.
//!
//! This module provides the `ApiClient` for talking to the backend's
//! `/user/*`, `/card/*` and `/event/*` endpoints.
//!
//! Requests carry the stored access token as a bearer credential. A 401 is
//! recovered once by exchanging the refresh token for a new pair, with
//! concurrent recoveries sharing a single refresh call.

pub mod client;
pub mod error;
mod refresh;

pub use client::ApiClient;
pub use error::ApiError;
