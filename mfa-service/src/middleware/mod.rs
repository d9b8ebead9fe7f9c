pub mod auth;
pub mod metrics;
pub mod tenant;

pub use auth::{auth_middleware, AuthContext};
pub use metrics::metrics_middleware;
pub use tenant::{enforce_tenant_middleware, TENANT_HEADER};
