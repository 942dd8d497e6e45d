//! Data models for cardmap entities.
//!
//! - `UserProfile`: identity returned by the session probe
//! - `TokenPair`, `LoginRequest`, `RefreshRequest`: auth wire types
//! - `Merchant`: a store location with its best card benefit

pub mod merchant;
pub mod user;

pub use merchant::Merchant;
pub use user::{LoginRequest, RefreshRequest, TokenPair, UserProfile};
