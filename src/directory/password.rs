use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use super::DirectoryError;

pub const PBKDF2_ITERATIONS: u32 = 600_000;
pub const HASH_LENGTH: usize = 32;
pub const SALT_LENGTH: usize = 16;

const SCHEME: &str = "pbkdf2-sha256";

/// Hash a password as `pbkdf2-sha256$<iterations>$<salt>$<hash>` (base64 parts).
pub fn hash_password(password: &str, iterations: u32) -> String {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);

    let mut hash = derive(password, &salt, iterations);
    let encoded = format!(
        "{SCHEME}${iterations}${}${}",
        STANDARD.encode(salt),
        STANDARD.encode(hash)
    );
    hash.zeroize();
    encoded
}

/// Check a password against a stored hash in constant time.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, DirectoryError> {
    let parts: Vec<&str> = stored.split('$').collect();
    let [scheme, iterations, salt, expected] = parts.as_slice() else {
        return Err(DirectoryError::Hashing("unrecognized hash format".into()));
    };
    if *scheme != SCHEME {
        return Err(DirectoryError::Hashing(format!("unsupported scheme {scheme}")));
    }

    let iterations: u32 = iterations
        .parse()
        .map_err(|_| DirectoryError::Hashing("invalid iteration count".into()))?;
    let salt = STANDARD
        .decode(salt)
        .map_err(|e| DirectoryError::Hashing(e.to_string()))?;
    let expected = STANDARD
        .decode(expected)
        .map_err(|e| DirectoryError::Hashing(e.to_string()))?;

    let mut actual = derive(password, &salt, iterations);
    let matches: bool = actual.as_slice().ct_eq(expected.as_slice()).into();
    actual.zeroize();
    Ok(matches)
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LENGTH] {
    let mut out = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: u32 = 1_000;

    #[test]
    fn correct_password_verifies() {
        let stored = hash_password("correct horse", FAST);
        assert!(verify_password("correct horse", &stored).unwrap());
    }

    #[test]
    fn wrong_password_rejected() {
        let stored = hash_password("correct horse", FAST);
        assert!(!verify_password("battery staple", &stored).unwrap());
    }

    #[test]
    fn salts_differ_between_hashes() {
        assert_ne!(hash_password("same", FAST), hash_password("same", FAST));
    }

    #[test]
    fn stored_format_carries_iterations() {
        let stored = hash_password("pw", FAST);
        assert!(stored.starts_with("pbkdf2-sha256$1000$"));
    }

    #[test]
    fn malformed_hash_is_error() {
        assert!(verify_password("pw", "plaintext").is_err());
        assert!(verify_password("pw", "md5$1$a$b").is_err());
    }
}
