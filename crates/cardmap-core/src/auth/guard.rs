//! Route guards deciding between rendering a page and redirecting.
//!
//! A guard starts out pending and renders nothing. [`RouteGuard::settle`]
//! runs the one session check of its mount; after that the decision is read
//! from the live session state, so a logout elsewhere flips an
//! authenticated-only page to a redirect without remounting.

use tokio::sync::watch;
use tracing::debug;

use crate::config::Config;

use super::session::{AuthSession, AuthStatus, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardKind {
    /// Only signed-in users may see the page
    AuthenticatedOnly,
    /// Only signed-out users may see the page (login, sign up)
    PublicOnly,
}

/// What the guarded route should show right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardView {
    /// Neither the page nor a redirect
    Pending,
    Render,
    Redirect(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPhase {
    Pending,
    Authorized,
    Redirected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardRoutes {
    pub login: String,
    pub landing: String,
}

impl GuardRoutes {
    pub fn from_config(config: &Config) -> Self {
        Self {
            login: config.login_route.clone(),
            landing: config.landing_route.clone(),
        }
    }
}

impl Default for GuardRoutes {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct RouteGuard {
    kind: GuardKind,
    routes: GuardRoutes,
    session: AuthSession,
    state: watch::Receiver<SessionState>,
    settled: bool,
}

impl RouteGuard {
    /// Mount a guard. No request is made until [`settle`](Self::settle).
    pub fn mount(kind: GuardKind, session: &AuthSession, routes: GuardRoutes) -> Self {
        Self {
            kind,
            routes,
            state: session.subscribe(),
            session: session.clone(),
            settled: false,
        }
    }

    pub fn kind(&self) -> GuardKind {
        self.kind
    }

    /// Run this mount's session check and return the resulting view.
    ///
    /// Only the first call consults the session; later calls return the
    /// current view.
    pub async fn settle(&mut self) -> GuardView {
        if self.settled {
            return self.view();
        }

        let authenticated = self.session.check_auth().await;
        if !authenticated && self.kind == GuardKind::AuthenticatedOnly {
            self.session.tokens().clear_all();
        }
        self.state.borrow_and_update();
        self.settled = true;

        let view = self.view();
        debug!(kind = ?self.kind, ?view, "Route guard settled");
        view
    }

    pub fn view(&self) -> GuardView {
        if !self.settled {
            return GuardView::Pending;
        }
        let status = self.state.borrow().status;
        match (self.kind, status) {
            (_, AuthStatus::Unknown) => GuardView::Pending,
            (GuardKind::AuthenticatedOnly, AuthStatus::Authenticated) => GuardView::Render,
            (GuardKind::AuthenticatedOnly, AuthStatus::Unauthenticated) => {
                GuardView::Redirect(self.routes.login.clone())
            }
            (GuardKind::PublicOnly, AuthStatus::Authenticated) => {
                GuardView::Redirect(self.routes.landing.clone())
            }
            (GuardKind::PublicOnly, AuthStatus::Unauthenticated) => GuardView::Render,
        }
    }

    pub fn phase(&self) -> GuardPhase {
        match self.view() {
            GuardView::Pending => GuardPhase::Pending,
            GuardView::Render => GuardPhase::Authorized,
            GuardView::Redirect(_) => GuardPhase::Redirected,
        }
    }

    /// Wait for the session to change and return the new view.
    ///
    /// Returns `None` once every handle to the session is gone.
    pub async fn changed(&mut self) -> Option<GuardView> {
        self.state.changed().await.ok()?;
        Some(self.view())
    }
}
