//! Admin back office: leads and trash, webhooks, branding, tag manager.

pub mod auth;
pub mod routes;

pub use auth::AdminAuth;
pub use routes::{AdminRouteState, admin_routes, site_routes};
