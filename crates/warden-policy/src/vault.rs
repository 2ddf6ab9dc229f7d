//! Vault capability.
//!
//! Sensitive columns may only be queried while the vault holding the
//! pseudonymization keys is open. The validator only asks one question,
//! [`VaultAccess::is_open`], so the real state machine and fixed test
//! doubles are interchangeable.

use std::sync::atomic::{AtomicU8, Ordering};

/// Read-only view of the vault used by the validator.
pub trait VaultAccess: Send + Sync {
    fn is_open(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    Closed,
    Open,
    Authenticated,
}

impl VaultState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => VaultState::Open,
            2 => VaultState::Authenticated,
            _ => VaultState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            VaultState::Closed => 0,
            VaultState::Open => 1,
            VaultState::Authenticated => 2,
        }
    }
}

/// An invalid vault transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot {action} vault in state {from:?}")]
pub struct VaultError {
    pub action: &'static str,
    pub from: VaultState,
}

/// `Closed -> Open -> Authenticated` state machine, shareable across threads.
#[derive(Debug)]
pub struct Vault {
    state: AtomicU8,
}

impl Default for Vault {
    fn default() -> Self {
        Self::new()
    }
}

impl Vault {
    /// Create a closed vault.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(VaultState::Closed.as_u8()),
        }
    }

    pub fn state(&self) -> VaultState {
        VaultState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Closed -> Open`.
    pub fn open(&self) -> Result<(), VaultError> {
        self.transition("open", VaultState::Closed, VaultState::Open)
    }

    /// `Open -> Authenticated`.
    pub fn authenticate(&self) -> Result<(), VaultError> {
        self.transition("authenticate", VaultState::Open, VaultState::Authenticated)
    }

    /// Any state to `Closed`.
    pub fn close(&self) {
        let prev = self.state.swap(VaultState::Closed.as_u8(), Ordering::AcqRel);
        tracing::debug!(from = ?VaultState::from_u8(prev), "vault closed");
    }

    fn transition(
        &self,
        action: &'static str,
        from: VaultState,
        to: VaultState,
    ) -> Result<(), VaultError> {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| tracing::debug!(?from, ?to, "vault transition"))
            .map_err(|actual| VaultError {
                action,
                from: VaultState::from_u8(actual),
            })
    }
}

impl VaultAccess for Vault {
    fn is_open(&self) -> bool {
        matches!(self.state(), VaultState::Open | VaultState::Authenticated)
    }
}

/// A vault whose state never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticVault(pub bool);

impl StaticVault {
    pub const OPEN: StaticVault = StaticVault(true);
    pub const CLOSED: StaticVault = StaticVault(false);
}

impl VaultAccess for StaticVault {
    fn is_open(&self) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_lifecycle() {
        let vault = Vault::new();
        assert_eq!(vault.state(), VaultState::Closed);
        assert!(!vault.is_open());

        vault.open().unwrap();
        assert!(vault.is_open());

        vault.authenticate().unwrap();
        assert_eq!(vault.state(), VaultState::Authenticated);
        assert!(vault.is_open());

        vault.close();
        assert!(!vault.is_open());
    }

    #[test]
    fn test_invalid_transitions() {
        let vault = Vault::new();
        assert_eq!(
            vault.authenticate(),
            Err(VaultError {
                action: "authenticate",
                from: VaultState::Closed
            })
        );

        vault.open().unwrap();
        let err = vault.open().unwrap_err();
        assert_eq!(err.from, VaultState::Open);
        assert_eq!(err.to_string(), "cannot open vault in state Open");
    }

    #[test]
    fn test_static_vault() {
        assert!(StaticVault::OPEN.is_open());
        assert!(!StaticVault::CLOSED.is_open());
    }
}
