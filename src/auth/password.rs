use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use uuid::Uuid;

pub use argon2::password_hash::Error as PasswordError;

/// Argon2id hash of `password` as a PHC string; salt and parameters travel inside it.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string())
}

/// False for a wrong password and for a stored hash that does not parse.
pub fn verify_password(password: &str, phc: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            tracing::warn!("Unreadable password hash: {}", e);
            false
        }
    }
}

/// Compare two secrets without stopping at the first differing byte.
pub fn secrets_match(given: &str, stored: &str) -> bool {
    given.len() == stored.len()
        && given
            .bytes()
            .zip(stored.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Random hex string of `length` characters, used for API keys and secrets.
pub fn generate_hash(length: usize) -> String {
    let mut out = String::with_capacity(length);
    while out.len() < length {
        out.push_str(&Uuid::new_v4().simple().to_string());
    }
    out.truncate(length);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_matching_password_only() {
        let hash = hash_password("s3cret").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("s3cret!", &hash));
        assert!(!verify_password("s3cret", "not-a-phc-string"));
        assert_ne!(hash, hash_password("s3cret").unwrap());
    }

    #[test]
    fn secrets_compare_by_value() {
        assert!(secrets_match("abc123", "abc123"));
        assert!(!secrets_match("abc124", "abc123"));
        assert!(!secrets_match("abc", "abc123"));
        assert!(!secrets_match("", "abc"));
    }

    #[test]
    fn generated_hashes_have_requested_length() {
        assert_eq!(generate_hash(15).len(), 15);
        assert_eq!(generate_hash(40).len(), 40);
        assert_ne!(generate_hash(15), generate_hash(15));
    }
}
