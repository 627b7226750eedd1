/// Authentication primitives
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing
/// - [`jwt`]: applicant session tokens (HS256)
/// - [`tokens`]: shell ids, one-time tokens, digests, constant-time compare
/// - [`credentials`]: the [`credentials::CredentialService`] seam used by the lifecycle manager
///
/// # Example
///
/// ```no_run
/// use shellhacks_shared::auth::credentials::{Argon2JwtCredentials, CredentialService};
/// use shellhacks_shared::auth::jwt::Claims;
/// use chrono::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let creds = Argon2JwtCredentials::new("secret-key-at-least-32-bytes-long!!");
/// let hash = creds.hash_password("pw123")?;
/// assert!(creds.verify_password("pw123", &hash)?);
///
/// let token = creds.issue(&Claims::new("AB3DE", Duration::days(6)))?;
/// # Ok(())
/// # }
/// ```
pub mod credentials;
pub mod jwt;
pub mod password;
pub mod tokens;
