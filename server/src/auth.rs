//! Shared-secret authentication. Absent server-side credentials means auth
//! is disabled entirely — the simplest reading of a single shared user/key
//! pair rather than the teacher's per-device bearer tokens.

#[derive(Clone, Default)]
pub struct AuthConfig {
    credentials: Option<(String, String)>,
}

impl AuthConfig {
    pub fn disabled() -> Self {
        AuthConfig { credentials: None }
    }

    pub fn shared_secret(user: impl Into<String>, key: impl Into<String>) -> Self {
        AuthConfig {
            credentials: Some((user.into(), key.into())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn check(&self, user: Option<&str>, key: Option<&str>) -> bool {
        match &self.credentials {
            None => true,
            Some((expected_user, expected_key)) => {
                user == Some(expected_user.as_str()) && key == Some(expected_key.as_str())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_auth_accepts_anything() {
        let auth = AuthConfig::disabled();
        assert!(auth.check(None, None));
    }

    #[test]
    fn enabled_auth_requires_matching_user_and_key() {
        let auth = AuthConfig::shared_secret("alice", "secret");
        assert!(auth.check(Some("alice"), Some("secret")));
        assert!(!auth.check(Some("alice"), Some("wrong")));
        assert!(!auth.check(None, None));
    }
}
