//! HTTP authentication surface.
//!
//! This module provides:
//! - Sign-in and refresh endpoints
//! - The security middleware that gates every route
//! - Principal extractors for downstream handlers
//! - A sled-backed user store and first-run admin bootstrap

mod handlers;
mod middleware;
/// First-run admin bootstrap.
pub mod setup;
mod users;

pub use handlers::{MeResponse, health, me, refresh, signin};
pub use middleware::{Authenticated, MaybeAuthenticated, security_pipeline};
pub use setup::{ADMIN_ROLE, SetupError, auto_setup_from_env, generate_password};
pub use users::{SledUserStore, StoredUser};
