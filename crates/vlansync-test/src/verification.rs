//! Verification helpers for reconciliation tests
//!
//! Provides assertion helpers over the fake host's link table and over the
//! command lines a test double recorded.

use thiserror::Error;

use crate::fake_host::FakeHost;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected link '{name}' not found on host")]
    LinkNotFound { name: String },

    #[error("Value mismatch for {name}:{field}: expected '{expected}', got '{actual}'")]
    ValueMismatch {
        name: String,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Expected VLAN keys {expected:?}, found {actual:?}")]
    VlanSetMismatch {
        expected: Vec<(String, u16)>,
        actual: Vec<(String, u16)>,
    },

    #[error("Expected {expected} commands matching '{pattern}', found {actual}")]
    CommandCountMismatch {
        pattern: String,
        expected: usize,
        actual: usize,
    },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Link-table verification helper
pub struct HostVerifier<'a> {
    host: &'a FakeHost,
}

impl<'a> HostVerifier<'a> {
    /// Create a new host verifier
    pub fn new(host: &'a FakeHost) -> Self {
        Self { host }
    }

    /// Verify the exact set of VLAN identity keys on the host
    pub fn assert_vlans(&self, expected: &[(&str, u16)]) -> VerifyResult<()> {
        let mut expected: Vec<(String, u16)> = expected
            .iter()
            .map(|(parent, id)| (parent.to_string(), *id))
            .collect();
        expected.sort();
        let actual = self.host.vlan_keys();

        if actual != expected {
            return Err(VerificationError::VlanSetMismatch { expected, actual });
        }
        Ok(())
    }

    /// Verify that a link is administratively up
    pub fn assert_link_up(&self, name: &str) -> VerifyResult<()> {
        let link = self.link(name)?;
        if !link.is_up() {
            return Err(VerificationError::ValueMismatch {
                name: name.to_string(),
                field: "flags".to_string(),
                expected: "UP".to_string(),
                actual: format!("{:?}", link.flags),
            });
        }
        Ok(())
    }

    /// Verify a link's MTU
    pub fn assert_mtu(&self, name: &str, expected: u32) -> VerifyResult<()> {
        let link = self.link(name)?;
        if link.mtu != expected {
            return Err(VerificationError::ValueMismatch {
                name: name.to_string(),
                field: "mtu".to_string(),
                expected: expected.to_string(),
                actual: link.mtu.to_string(),
            });
        }
        Ok(())
    }

    /// Verify a link's hardware address
    pub fn assert_address(&self, name: &str, expected: &str) -> VerifyResult<()> {
        let link = self.link(name)?;
        if link.address != expected {
            return Err(VerificationError::ValueMismatch {
                name: name.to_string(),
                field: "address".to_string(),
                expected: expected.to_string(),
                actual: link.address,
            });
        }
        Ok(())
    }

    fn link(&self, name: &str) -> VerifyResult<crate::fake_host::FakeLink> {
        self.host
            .link(name)
            .ok_or_else(|| VerificationError::LinkNotFound {
                name: name.to_string(),
            })
    }
}

/// Command execution verifier
pub struct CommandVerifier {
    captured_commands: Vec<String>,
}

impl CommandVerifier {
    /// Create a new command verifier
    pub fn new(captured_commands: Vec<String>) -> Self {
        Self { captured_commands }
    }

    /// Verify the number of commands starting with `pattern`
    pub fn assert_count(&self, pattern: &str, expected: usize) -> VerifyResult<()> {
        let actual = self
            .captured_commands
            .iter()
            .filter(|cmd| cmd.starts_with(pattern))
            .count();
        if actual != expected {
            return Err(VerificationError::CommandCountMismatch {
                pattern: pattern.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Verify that no command starting with `pattern` was executed
    pub fn assert_not_executed(&self, pattern: &str) -> VerifyResult<()> {
        self.assert_count(pattern, 0)
    }

    /// Verify that no command mutated the link table
    pub fn assert_read_only(&self) -> VerifyResult<()> {
        for verb in ["add", "set", "delete"] {
            let mutations = self
                .captured_commands
                .iter()
                .filter(|cmd| cmd.contains(&format!(" link {} ", verb)))
                .count();
            if mutations != 0 {
                return Err(VerificationError::CommandCountMismatch {
                    pattern: format!("link {}", verb),
                    expected: 0,
                    actual: mutations,
                });
            }
        }
        Ok(())
    }

    /// Get all captured commands
    pub fn captured_commands(&self) -> &[String] {
        &self.captured_commands
    }
}
