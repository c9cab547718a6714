use hq_common::{QueueError, Result};
use subtle::ConstantTimeEq;

/// Shared admin secret guarding start/stop/reset and publisher management
#[derive(Clone)]
pub struct AdminKey(String);

impl AdminKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.0.as_bytes().ct_eq(candidate.as_bytes()).into()
    }

    /// `Unauthorized` unless `candidate` is the admin key
    pub fn check(&self, candidate: Option<&str>) -> Result<()> {
        match candidate {
            Some(key) if self.matches(key) => Ok(()),
            _ => Err(QueueError::Unauthorized),
        }
    }
}

impl std::fmt::Debug for AdminKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AdminKey(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_key_check() {
        let key = AdminKey::new("secret");
        assert!(key.check(Some("secret")).is_ok());
        assert!(matches!(key.check(Some("secre")), Err(QueueError::Unauthorized)));
        assert!(matches!(key.check(None), Err(QueueError::Unauthorized)));
        assert_eq!(format!("{:?}", key), "AdminKey(***)");
    }
}
