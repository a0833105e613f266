//! Check registry
//!
//! Single owner of check records. Readers get copies; writers replace whole
//! records under the write lock, so nobody observes a half-applied update.

use crate::domain::Check;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Check already exists: {0}")]
    AlreadyExists(Uuid),

    #[error("Check not found: {0}")]
    NotFound(Uuid),

    #[error("Check {0} is already in a terminal state")]
    Terminal(Uuid),
}

/// Outcome of one expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sweep {
    pub removed: usize,
    /// Removed records that never reached a terminal state
    pub processing: usize,
}

#[derive(Debug, Default)]
pub struct CheckRegistry {
    checks: RwLock<HashMap<Uuid, Check>>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, check: Check) -> Result<(), RegistryError> {
        let mut checks = self.checks.write();
        if checks.contains_key(&check.id) {
            return Err(RegistryError::AlreadyExists(check.id));
        }
        checks.insert(check.id, check);
        Ok(())
    }

    pub fn get(&self, id: &Uuid) -> Option<Check> {
        self.checks.read().get(id).cloned()
    }

    /// Replace a record; a terminal record only accepts an identical copy
    pub fn update(&self, check: Check) -> Result<(), RegistryError> {
        let mut checks = self.checks.write();
        let current = checks
            .get_mut(&check.id)
            .ok_or(RegistryError::NotFound(check.id))?;

        if current.status.is_terminal() && *current != check {
            return Err(RegistryError::Terminal(check.id));
        }
        *current = check;
        Ok(())
    }

    /// Drop every record whose expiry is at or before `now`
    pub fn cleanup_expired(&self, now: DateTime<Utc>) -> Sweep {
        let mut sweep = Sweep::default();
        self.checks.write().retain(|_, check| {
            if check.expires_at > now {
                return true;
            }
            sweep.removed += 1;
            if !check.status.is_terminal() {
                sweep.processing += 1;
            }
            false
        });
        sweep
    }

    pub fn len(&self) -> usize {
        self.checks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
