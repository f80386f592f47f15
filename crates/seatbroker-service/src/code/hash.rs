//! Plaintext code generation, normalization and hashing.

use rand::Rng;
use sha2::{Digest, Sha256};
use validator::ValidateEmail;

use seatbroker_core::error::AppError;
use seatbroker_core::result::AppResult;

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Random base-36 code body of `length` characters behind `prefix`.
pub fn generate_plaintext(prefix: &str, length: usize) -> String {
    let mut rng = rand::thread_rng();
    let body: String = (0..length)
        .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
        .collect();
    format!("{}{body}", normalize_code(prefix))
}

/// Canonical form of a plaintext code: trimmed, upper-case.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Hex SHA-256 of the normalized code.
pub fn hash_code(code: &str) -> String {
    format!("{:x}", Sha256::digest(normalize_code(code).as_bytes()))
}

/// Trim, lower-case and validate an email address.
pub fn normalize_email(email: &str) -> AppResult<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.validate_email() {
        return Err(AppError::validation(format!("Invalid email address: '{email}'")));
    }
    Ok(email)
}
