//! Ledger error taxonomy
//!
//! Every variant is final: the pool performs no internal retry and a failed
//! operation leaves principal, accumulators, pending rewards and reserves
//! exactly as they were.

use super::types::AssetId;
use crate::ledger::TransferError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Stake, withdrawal or injection of zero
    ZeroAmount,
    /// Withdrawal larger than the caller's staked principal (including none staked)
    InsufficientPrincipal { requested: u128, available: u128 },
    /// Reward injected while total principal is zero
    NoStakers,
    /// Asset has not been allow-listed for rewards
    UnknownAsset(AssetId),
    /// Caller is not the pool operator
    Unauthorized,
    /// External pull or push did not complete
    TransferFailed(String),
    /// Fixed-point result does not fit the ledger's integer width
    Overflow,
}

impl LedgerError {
    /// Stable machine-readable code, used by the HTTP layer
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::ZeroAmount => "zero_amount",
            LedgerError::InsufficientPrincipal { .. } => "insufficient_principal",
            LedgerError::NoStakers => "no_stakers",
            LedgerError::UnknownAsset(_) => "unknown_asset",
            LedgerError::Unauthorized => "unauthorized",
            LedgerError::TransferFailed(_) => "transfer_failed",
            LedgerError::Overflow => "overflow",
        }
    }
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::ZeroAmount => write!(f, "Amount must be greater than zero"),
            LedgerError::InsufficientPrincipal { requested, available } => write!(
                f,
                "Insufficient staked principal: requested {}, available {}",
                requested, available
            ),
            LedgerError::NoStakers => write!(f, "Cannot distribute rewards with no stakers"),
            LedgerError::UnknownAsset(asset) => write!(f, "Asset {} is not allowed", asset),
            LedgerError::Unauthorized => write!(f, "Caller is not the pool operator"),
            LedgerError::TransferFailed(reason) => write!(f, "Transfer failed: {}", reason),
            LedgerError::Overflow => write!(f, "Arithmetic overflow"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<TransferError> for LedgerError {
    fn from(err: TransferError) -> Self {
        LedgerError::TransferFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_error_maps_to_transfer_failed() {
        let err: LedgerError = TransferError::InsufficientAllowance {
            allowed: 1,
            requested: 5,
        }
        .into();

        assert!(matches!(err, LedgerError::TransferFailed(_)));
        assert_eq!(err.code(), "transfer_failed");
    }

    #[test]
    fn test_display_includes_amounts() {
        let err = LedgerError::InsufficientPrincipal {
            requested: 10,
            available: 3,
        };
        let message = err.to_string();
        assert!(message.contains("10"));
        assert!(message.contains("3"));
    }
}
