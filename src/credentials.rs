use crate::error::Result;

/// A user name and password for `LOGIN`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// The user name.
    pub user: String,
    /// The password. Never logged.
    pub password: String,
}

impl Credentials {
    /// Bundle a user name and password.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Credentials {
        Credentials {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A source of login credentials, consulted by
/// [`Session::authenticate`](crate::Session::authenticate).
///
/// After the server rejects a login with `NO`, the source is asked again with the server's text,
/// so an interactive implementation can prompt the user with the reason. Returning an error
/// aborts authentication.
pub trait CredentialSource {
    /// Produce credentials for the next login attempt.
    fn credentials(&mut self, rejection: Option<&str>) -> Result<Credentials>;
}

impl CredentialSource for Credentials {
    fn credentials(&mut self, _rejection: Option<&str>) -> Result<Credentials> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_password() {
        let c = Credentials::new("fred", "hunter2");
        let s = format!("{:?}", c);
        assert!(s.contains("fred"));
        assert!(!s.contains("hunter2"));
    }
}
