//! Which views need a session.

use crate::session::{AuthState, LOGIN_PATH};

/// Where to send a logged-in user who lands on the login page.
pub const HOME_PATH: &str = "/?chatHistoryOpen=true";

const PUBLIC_PATHS: &[&str] = &[LOGIN_PATH];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Auth state not loaded yet; render nothing.
    Wait,
    Allow,
    Redirect(String),
}

pub fn route_guard(path: &str, state: &AuthState) -> RouteDecision {
    let route = path.split(['?', '#']).next().unwrap_or(path);
    let is_public = PUBLIC_PATHS.contains(&route);

    match state {
        AuthState::Loading => RouteDecision::Wait,
        AuthState::LoggedIn(_) if is_public => RouteDecision::Redirect(HOME_PATH.to_string()),
        AuthState::LoggedOut if !is_public => RouteDecision::Redirect(LOGIN_PATH.to_string()),
        _ => RouteDecision::Allow,
    }
}
