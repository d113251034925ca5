use crate::error::{AppError, AppResult};

/// Hash a password with bcrypt at the given cost.
pub fn hash_password(plaintext: &str, cost: u32) -> AppResult<String> {
    bcrypt::hash(plaintext, cost).map_err(|e| AppError::Internal(format!("bcrypt: {}", e)))
}

/// Verify a plaintext password against a stored bcrypt hash. A malformed hash
/// never verifies.
pub fn verify_password(plaintext: &str, hash: &str) -> bool {
    bcrypt::verify(plaintext, hash).unwrap_or(false)
}
