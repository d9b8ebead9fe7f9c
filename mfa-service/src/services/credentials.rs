use crate::models::User;
use crate::utils::{verify_password, Password};

/// Primary-credential check performed at login.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, user: &User, password: &Password) -> bool;
}

/// Verifies against the user's stored Argon2 hash. Users without a hash
/// cannot log in.
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2Verifier;

impl CredentialVerifier for Argon2Verifier {
    fn verify(&self, user: &User, password: &Password) -> bool {
        match &user.credential_hash {
            Some(hash) => verify_password(password, hash).is_ok(),
            None => false,
        }
    }
}

/// Accepts any non-empty password. Development only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonEmptyPasswordVerifier;

impl CredentialVerifier for NonEmptyPasswordVerifier {
    fn verify(&self, _user: &User, password: &Password) -> bool {
        !password.is_empty()
    }
}
