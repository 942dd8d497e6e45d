//! Authentication module for managing tokens, sessions and route guards.
//!
//! This module provides:
//! - `TokenStore`: persisted access/refresh tokens with expiry, backed by
//!   memory, a JSON jar file, or the OS keychain
//! - `AuthSession`: cached "is this process signed in" state
//! - `RouteGuard`: render-or-redirect decisions for protected and public pages
//! - `Credentials`: sign-in form validation

pub mod guard;
pub mod keychain;
pub mod login;
pub mod session;
pub mod store;

pub use guard::{GuardKind, GuardPhase, GuardRoutes, GuardView, RouteGuard};
pub use keychain::KeyringTokenStore;
pub use login::{Credentials, LoginError, ValidationError};
pub use session::{AuthSession, AuthStatus, SessionState};
pub use store::{
    Clock, FileTokenStore, ManualClock, MemoryTokenStore, SystemClock, TokenKind, TokenLifetime,
    TokenStore,
};
