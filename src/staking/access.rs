//! Operator authorization

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::LedgerError;
use super::types::Identity;

/// Holds the single privileged operator identity. Set once at pool creation;
/// there is no transfer operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    operator: Identity,
}

impl AccessControl {
    pub fn new(operator: Identity) -> Self {
        Self { operator }
    }

    pub fn operator(&self) -> &Identity {
        &self.operator
    }

    pub fn is_operator(&self, caller: &Identity) -> bool {
        &self.operator == caller
    }

    pub fn ensure_operator(&self, caller: &Identity) -> Result<(), LedgerError> {
        if self.is_operator(caller) {
            Ok(())
        } else {
            warn!(caller = %caller, "Operator-only call rejected");
            Err(LedgerError::Unauthorized)
        }
    }
}
