pub mod admin;
pub mod claims;
pub mod context;
pub mod jwks;
pub mod middleware;

pub use admin::{ChildTable, RequireAdmin, StaffRole};
pub use claims::Claims;
pub use context::AuthContext;
pub use jwks::JwksCache;
pub use middleware::{AuthError, RequireAuth};
