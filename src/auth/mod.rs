//! Authentication Module
//! Mission: Secure API access with JWT sessions, token revocation and RBAC

pub mod api;
pub mod errors;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod revocation;
pub mod session;
pub mod user_store;

pub use errors::AuthError;
pub use jwt::JwtHandler;
pub use middleware::{authenticate, authorize, AllowedRoles, AuthState, CurrentUser};
pub use revocation::RevocationList;
pub use session::SessionService;
pub use user_store::UserStore;
