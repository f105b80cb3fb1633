use argon2::{
    password_hash::{PasswordHash, PasswordVerifier},
    Argon2,
};
use async_trait::async_trait;
use il_core::traits::AdminAuth;

#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2AdminAuth;

#[async_trait]
impl AdminAuth for Argon2AdminAuth {
    /// Verifies if a provided password matches a stored Argon2 hash.
    async fn verify_admin_password(&self, password: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(p) => p,
            Err(err) => {
                tracing::error!("configured admin hash is not a PHC string: {err}");
                return false;
            }
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }
}
