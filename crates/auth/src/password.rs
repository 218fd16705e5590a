//! PBKDF2-HMAC-SHA512 password hashing.
//!
//! Hashes are stored self-describing as
//! `PBKDF2$sha512$<iterations>$<b64 salt>$<b64 hash>` so that the parameters
//! can change without invalidating existing rows.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use sha2::Sha512;
use subtle::ConstantTimeEq;
use thiserror::Error;

pub const SALT_SIZE: usize = 16;
pub const HASH_SIZE: usize = 64;
pub const DEFAULT_ITERATIONS: u32 = 100_000;
pub const MIN_PASSWORD_CHARS: usize = 6;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password must be at least 6 characters")]
    TooShort,

    #[error("iterations must be positive")]
    ZeroIterations,

    #[error("malformed password hash: {0}")]
    Malformed(&'static str),
}

pub fn validate_password(password: &str) -> Result<(), PasswordError> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(PasswordError::TooShort);
    }
    Ok(())
}

/// Hash `password` with a fresh random salt.
pub fn hash_password(password: &str, iterations: u32) -> Result<String, PasswordError> {
    validate_password(password)?;
    if iterations == 0 {
        return Err(PasswordError::ZeroIterations);
    }
    let mut salt = [0u8; SALT_SIZE];
    rand::rng().fill_bytes(&mut salt);
    Ok(encode(iterations, &salt, &derive(password, &salt, iterations)))
}

/// Compare `password` against a stored hash in constant time.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, PasswordError> {
    let mut parts = stored.split('$');
    if parts.next() != Some("PBKDF2") {
        return Err(PasswordError::Malformed("unknown scheme"));
    }
    if parts.next() != Some("sha512") {
        return Err(PasswordError::Malformed("unknown digest"));
    }
    let iterations: u32 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .filter(|n| *n > 0)
        .ok_or(PasswordError::Malformed("iterations"))?;
    let salt = parts
        .next()
        .and_then(|s| STANDARD.decode(s).ok())
        .ok_or(PasswordError::Malformed("salt"))?;
    let expected = parts
        .next()
        .and_then(|s| STANDARD.decode(s).ok())
        .ok_or(PasswordError::Malformed("hash"))?;
    if parts.next().is_some() {
        return Err(PasswordError::Malformed("trailing data"));
    }

    let actual = derive(password, &salt, iterations);
    Ok(actual[..].ct_eq(&expected[..]).into())
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_SIZE] {
    let mut out = [0u8; HASH_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha512>(password.as_bytes(), salt, iterations, &mut out);
    out
}

fn encode(iterations: u32, salt: &[u8], hash: &[u8]) -> String {
    format!(
        "PBKDF2$sha512${iterations}${}${}",
        STANDARD.encode(salt),
        STANDARD.encode(hash)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_has_self_describing_format() {
        let h = hash_password("secret1", 10).unwrap();
        let parts: Vec<&str> = h.split('$').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(&parts[..3], &["PBKDF2", "sha512", "10"]);
        assert_eq!(STANDARD.decode(parts[3]).unwrap().len(), SALT_SIZE);
        assert_eq!(STANDARD.decode(parts[4]).unwrap().len(), HASH_SIZE);
    }

    #[test]
    fn verifies_correct_and_rejects_wrong_password() {
        let h = hash_password("secret1", 10).unwrap();
        assert_eq!(verify_password("secret1", &h), Ok(true));
        assert_eq!(verify_password("secret2", &h), Ok(false));
    }

    #[test]
    fn salts_differ_between_hashes() {
        assert_ne!(
            hash_password("secret1", 10).unwrap(),
            hash_password("secret1", 10).unwrap()
        );
    }

    #[test]
    fn rejects_short_password() {
        assert_eq!(hash_password("12345", 10), Err(PasswordError::TooShort));
    }

    #[test]
    fn rejects_malformed_hashes() {
        assert!(verify_password("secret1", "bcrypt$x").is_err());
        assert!(verify_password("secret1", "PBKDF2$sha512$0$AA==$AA==").is_err());
        assert!(verify_password("secret1", "PBKDF2$sha512$10$!!$AA==").is_err());
    }
}
