//! Authentication context used to assume an identity for mount setup.

use std::sync::RwLock;

use crate::error::{AvmError, AvmResult};

/// Identity provider consulted by the driver.
pub trait AuthenticationContext: Send + Sync {
    /// Name of the privileged system identity.
    fn system_user_name(&self) -> String;

    /// Make `user` the current identity.
    fn set_current_user(&self, user: &str) -> AvmResult<()>;

    fn current_user(&self) -> Option<String>;
}

/// Process-local authentication context.
pub struct LocalAuthentication {
    system_user: String,
    current: RwLock<Option<String>>,
}

impl LocalAuthentication {
    pub fn new(system_user: impl Into<String>) -> Self {
        Self {
            system_user: system_user.into(),
            current: RwLock::new(None),
        }
    }
}

impl Default for LocalAuthentication {
    fn default() -> Self {
        Self::new("System")
    }
}

impl AuthenticationContext for LocalAuthentication {
    fn system_user_name(&self) -> String {
        self.system_user.clone()
    }

    fn set_current_user(&self, user: &str) -> AvmResult<()> {
        let mut current = self.current.write().map_err(|_| AvmError::LockPoisoned)?;
        *current = Some(user.to_string());
        Ok(())
    }

    fn current_user(&self) -> Option<String> {
        self.current.read().ok()?.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_current_user() {
        let auth = LocalAuthentication::default();
        assert_eq!(auth.current_user(), None);

        auth.set_current_user(&auth.system_user_name()).unwrap();
        assert_eq!(auth.current_user(), Some("System".to_string()));
    }
}
