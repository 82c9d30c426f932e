//! Synthetic user identities, unique per virtual user and iteration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub name: String,
    pub password: String,
}

impl Identity {
    /// Derive an identity from the VU number and the current wall clock
    pub fn generate(vu: u32, password: &str) -> Self {
        Self::with_suffix(&format!("{}_{}", vu, chrono::Utc::now().timestamp_millis()), password)
    }

    pub fn with_suffix(suffix: &str, password: &str) -> Self {
        Self {
            email: format!("loadtest_user{}", suffix),
            name: format!("LoadTest User {}", suffix),
            password: password.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_format() {
        let identity = Identity::with_suffix("3_1700000000000", "secret");
        assert_eq!(identity.email, "loadtest_user3_1700000000000");
        assert_eq!(identity.name, "LoadTest User 3_1700000000000");
        assert_eq!(identity.password, "secret");
    }

    #[test]
    fn test_generated_identities_differ_across_vus() {
        let a = Identity::generate(1, "pw");
        let b = Identity::generate(2, "pw");
        assert_ne!(a.email, b.email);
        assert!(a.email.starts_with("loadtest_user1_"));
    }
}
