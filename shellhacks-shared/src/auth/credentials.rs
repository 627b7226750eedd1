/// Credential service
///
/// The lifecycle manager hashes passwords and mints session tokens through
/// [`CredentialService`], which keeps Argon2 parameters and the signing
/// secret out of the business logic.
use super::jwt::{self, Claims, JwtError};
use super::password::{self, PasswordError, PasswordParams};

/// Error type for credential operations
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Jwt(#[from] JwtError),
}

/// Password hashing and session token minting
///
/// All methods are synchronous and CPU-bound; async callers are expected to
/// run the password methods on a blocking thread.
pub trait CredentialService: Send + Sync {
    /// Hashes a plaintext password
    fn hash_password(&self, password: &str) -> Result<String, CredentialError>;

    /// Checks a plaintext password against a stored hash
    fn verify_password(&self, password: &str, hash: &str) -> Result<bool, CredentialError>;

    /// Signs a session token
    fn issue(&self, claims: &Claims) -> Result<String, CredentialError>;

    /// Validates a session token and returns its claims
    fn validate(&self, token: &str) -> Result<Claims, CredentialError>;
}

/// Argon2id passwords plus HS256 JWT sessions
#[derive(Clone)]
pub struct Argon2JwtCredentials {
    secret: String,
    params: PasswordParams,
}

impl Argon2JwtCredentials {
    /// Creates the service with production Argon2 parameters
    pub fn new(secret: impl Into<String>) -> Self {
        Self::with_params(secret, PasswordParams::default())
    }

    /// Creates the service with explicit Argon2 parameters
    pub fn with_params(secret: impl Into<String>, params: PasswordParams) -> Self {
        Self {
            secret: secret.into(),
            params,
        }
    }
}

impl std::fmt::Debug for Argon2JwtCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Argon2JwtCredentials")
            .field("secret", &"<redacted>")
            .field("params", &self.params)
            .finish()
    }
}

impl CredentialService for Argon2JwtCredentials {
    fn hash_password(&self, password: &str) -> Result<String, CredentialError> {
        Ok(password::hash_password(password, &self.params)?)
    }

    fn verify_password(&self, password: &str, hash: &str) -> Result<bool, CredentialError> {
        Ok(password::verify_password(password, hash)?)
    }

    fn issue(&self, claims: &Claims) -> Result<String, CredentialError> {
        Ok(jwt::create_token(claims, &self.secret)?)
    }

    fn validate(&self, token: &str) -> Result<Claims, CredentialError> {
        Ok(jwt::validate_token(token, &self.secret)?)
    }
}
