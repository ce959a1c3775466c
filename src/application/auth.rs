use super::AppError;

pub const DEFAULT_USERNAME: &str = "admin";
pub const DEFAULT_PASSWORD: &str = "admin123";

/// Decides whether a username/password pair may open a session.
pub trait CredentialVerifier {
    fn verify(&self, username: &str, password: &str) -> bool;

    fn authenticate(&self, username: &str, password: &str) -> Result<(), AppError> {
        if self.verify(username, password) {
            Ok(())
        } else {
            Err(AppError::Authentication)
        }
    }
}

/// A single fixed username/password pair, compared in plaintext.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    username: String,
    password: String,
}

impl StaticCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Default for StaticCredentials {
    fn default() -> Self {
        Self::new(DEFAULT_USERNAME, DEFAULT_PASSWORD)
    }
}

impl CredentialVerifier for StaticCredentials {
    fn verify(&self, username: &str, password: &str) -> bool {
        username == self.username && password == self.password
    }
}
