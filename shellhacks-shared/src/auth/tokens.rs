/// Identifier and one-time token utilities
///
/// - Shell ids: short codes over an alphabet without look-alike characters
///   (no `0/O`, `1/I/L`), so applicants can read them off a badge.
/// - One-time tokens (email confirmation, password reset): random bytes,
///   hex-encoded. Only the SHA-256 digest is persisted.
/// - Constant-time comparison for digests and shared secrets.
///
/// # Example
///
/// ```
/// use shellhacks_shared::auth::tokens::{digest_token, generate_hex_token, generate_shell_id};
///
/// let shell_id = generate_shell_id(5);
/// assert_eq!(shell_id.len(), 5);
///
/// let token = generate_hex_token(8);
/// assert_eq!(token.len(), 16);
/// assert_eq!(digest_token(&token).len(), 64);
/// ```
use rand::{rngs::OsRng, Rng, RngCore};
use sha2::{Digest, Sha256};

/// Characters a shell id may contain
pub const SHELL_ID_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Number of avatar images available to applicants
pub const AVATAR_COUNT: u32 = 8;

/// Generates a random shell id of `length` characters
pub fn generate_shell_id(length: usize) -> String {
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..SHELL_ID_ALPHABET.len());
            SHELL_ID_ALPHABET[idx] as char
        })
        .collect()
}

/// Generates `bytes` random bytes from the OS RNG, hex-encoded
///
/// The result has `2 * bytes` characters.
pub fn generate_hex_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// SHA-256 digest of a token, hex-encoded (64 characters)
///
/// Surrounding whitespace is ignored so tokens pasted from an email still match.
pub fn digest_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compares two strings without short-circuiting on the first difference
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Avatar assigned to a shell id, `"Id1"` through `"Id{AVATAR_COUNT}"`
///
/// Derived from the id so the same applicant always gets the same picture.
pub fn avatar_for(shell_id: &str) -> String {
    let digest = Sha256::digest(shell_id.as_bytes());
    let n = u32::from(digest[0]) % AVATAR_COUNT + 1;
    format!("Id{}", n)
}

/// Checks that a string looks like a shell id of any length
pub fn is_shell_id(candidate: &str) -> bool {
    !candidate.is_empty() && candidate.bytes().all(|b| SHELL_ID_ALPHABET.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_shell_id_length_and_alphabet() {
        for len in [5, 8] {
            let id = generate_shell_id(len);
            assert_eq!(id.len(), len);
            assert!(is_shell_id(&id));
        }
    }

    #[test]
    fn test_shell_id_alphabet_has_no_lookalikes() {
        for c in [b'0', b'O', b'1', b'I', b'L'] {
            assert!(!SHELL_ID_ALPHABET.contains(&c));
        }
    }

    #[test]
    fn test_shell_ids_vary() {
        let ids: HashSet<String> = (0..50).map(|_| generate_shell_id(8)).collect();
        assert!(ids.len() > 45);
    }

    #[test]
    fn test_hex_token_shape() {
        let token = generate_hex_token(6);
        assert_eq!(token.len(), 12);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(generate_hex_token(8), generate_hex_token(8));
    }

    #[test]
    fn test_digest_is_deterministic() {
        let d1 = digest_token("abcdef");
        let d2 = digest_token(" abcdef\n");
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 64);
        assert_ne!(d1, digest_token("abcdeg"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("hello", "hello"));
        assert!(!constant_time_eq("hello", "world"));
        assert!(!constant_time_eq("hello", "hello!"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn test_avatar_is_stable() {
        let a = avatar_for("AB3DE");
        assert_eq!(a, avatar_for("AB3DE"));
        let n: u32 = a.trim_start_matches("Id").parse().unwrap();
        assert!((1..=AVATAR_COUNT).contains(&n));
    }

    #[test]
    fn test_is_shell_id_rejects_garbage() {
        assert!(!is_shell_id(""));
        assert!(!is_shell_id("ab3de"));
        assert!(!is_shell_id("AB-3D"));
    }
}
