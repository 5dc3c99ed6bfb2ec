//! Ledger Transfer Definitions
//!
//! Transfer types, receipts and the [`AssetTransfer`] collaborator interface.

use serde::{Deserialize, Serialize};

use super::transfer_codes;
use crate::staking::{AssetId, Identity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferType {
    StakeDeposit,
    PrincipalWithdrawal,
    RewardInjection,
    RewardPayout,
    Faucet,
}

impl TransferType {
    pub fn code(&self) -> u16 {
        match self {
            TransferType::StakeDeposit => transfer_codes::STAKE_DEPOSIT,
            TransferType::PrincipalWithdrawal => transfer_codes::PRINCIPAL_WITHDRAWAL,
            TransferType::RewardInjection => transfer_codes::REWARD_INJECTION,
            TransferType::RewardPayout => transfer_codes::REWARD_PAYOUT,
            TransferType::Faucet => transfer_codes::FAUCET,
        }
    }
}

/// One leg of an outbound payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub asset: AssetId,
    pub amount: u128,
}

/// Proof that a transfer was posted by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transfer_id: u128,
    pub kind: TransferType,
    pub asset: AssetId,
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Debit account holds less than requested
    InsufficientBalance { available: u128, requested: u128 },
    /// Owner has not approved custody for the pulled amount
    InsufficientAllowance { allowed: u128, requested: u128 },
    /// Ledger refused the transfer for another reason
    Rejected(String),
}

impl std::fmt::Display for TransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferError::InsufficientBalance { available, requested } => write!(
                f,
                "Insufficient balance: have {}, need {}",
                available, requested
            ),
            TransferError::InsufficientAllowance { allowed, requested } => write!(
                f,
                "Insufficient allowance: approved {}, need {}",
                allowed, requested
            ),
            TransferError::Rejected(reason) => write!(f, "Transfer rejected: {}", reason),
        }
    }
}

impl std::error::Error for TransferError {}

/// External asset-transfer interface.
///
/// Every call is atomic: it either posts in full or returns an error having
/// moved nothing. Implementations never receive a handle to the pool, so a
/// transfer cannot call back into it.
pub trait AssetTransfer {
    /// Move `amount` of `asset` from `from` into pool custody. Requires a prior
    /// approval by `from`.
    fn pull(
        &mut self,
        kind: TransferType,
        from: &Identity,
        asset: &AssetId,
        amount: u128,
    ) -> Result<TransferReceipt, TransferError>;

    /// Move `amount` of `asset` from pool custody to `to`.
    fn push(
        &mut self,
        kind: TransferType,
        to: &Identity,
        asset: &AssetId,
        amount: u128,
    ) -> Result<TransferReceipt, TransferError>;

    /// Post several custody-to-`to` transfers as one linked chain: all of them
    /// or none.
    fn push_linked(
        &mut self,
        kind: TransferType,
        to: &Identity,
        payouts: &[Payout],
    ) -> Result<Vec<TransferReceipt>, TransferError>;
}
