pub mod challenge;
pub mod device;
pub mod session;
pub mod tenant;
pub mod user;

pub use challenge::{ChallengeState, MfaChallenge};
pub use device::{DeviceChanges, DeviceState, MfaDevice};
pub use session::Session;
pub use tenant::TenantId;
pub use user::{User, UserState};
