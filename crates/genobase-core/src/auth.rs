//! Credential hashing helpers.
//!
//! The repository never stores or compares plain secrets: accounts carry an
//! argon2 PHC string, and verification is a one-way comparison.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::SaltString,
};
use rand_core::{OsRng, RngCore};

use crate::error::{Error, Result};

/// Hash a secret into an argon2 PHC string, e.g. `$argon2id$v=19$…`.
pub fn hash_secret(secret: &str) -> Result<String> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(secret.as_bytes(), &salt)
    .map(|h| h.to_string())
    .map_err(|e| Error::InvalidArgument(format!("argon2 error: {e}")))
}

/// Verify a secret against a stored PHC string. An unparseable stored hash
/// verifies as false.
pub fn verify_secret(secret: &str, stored: &str) -> bool {
  let Ok(parsed) = PasswordHash::new(stored) else {
    return false;
  };
  Argon2::default()
    .verify_password(secret.as_bytes(), &parsed)
    .is_ok()
}

/// Generate a temporary secret (12 chars from [A-Z0-9]), used when an
/// operator creates or resets an account without supplying a password.
pub fn generate_secret() -> String {
  const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
  const LEN: usize = 12;

  let mut rng = OsRng;
  (0..LEN)
    .map(|_| CHARS[(rng.next_u32() as usize) % CHARS.len()] as char)
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hash_then_verify() {
    let hash = hash_secret("hunter2").unwrap();
    assert!(hash.starts_with("$argon2"));
    assert!(verify_secret("hunter2", &hash));
    assert!(!verify_secret("hunter3", &hash));
  }

  #[test]
  fn corrupt_hash_verifies_false() {
    assert!(!verify_secret("hunter2", "not-a-phc-string"));
  }

  #[test]
  fn generated_secrets_have_expected_shape() {
    let secret = generate_secret();
    assert_eq!(secret.len(), 12);
    assert!(secret.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
  }
}
