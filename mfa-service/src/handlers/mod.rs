pub mod auth;
pub mod idempotency;
pub mod metrics;
pub mod mfa;

pub use auth::{login, logout};
pub use mfa::{activate, approve, create_challenge, device_status, enroll, get_challenge};
