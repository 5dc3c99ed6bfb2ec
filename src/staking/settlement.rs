//! Settlement Engine
//!
//! Reconciles one staker against every registered accumulator:
//!
//! ```text
//! owed = floor((acc_per_share - reward_debt) * principal / PRECISION)
//! pending += owed
//! reward_debt = acc_per_share
//! ```
//!
//! Settlement always runs with the principal the staker held while the
//! accrued injections happened, i.e. before the current operation changes it.
//! A missing checkpoint is the zero checkpoint; that is exact because every
//! asset's accumulator starts at zero when it is registered.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::accumulator::{accrued_amount, RewardAccumulator};
use super::error::LedgerError;
use super::types::{AssetId, Identity};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardCheckpoint {
    /// Accumulator value last reconciled against this staker
    pub reward_debt: U256,
    /// Settled and not yet claimed
    pub pending: u128,
    /// Everything ever settled for this staker, claimed or not
    pub total_settled: u128,
}

/// Reward position reported by the query surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakerRewards {
    pub pending: u128,
    pub total_settled: u128,
}

/// A staker's principal and per-asset checkpoints. The zero value is the
/// same as no record at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakerRecord {
    pub principal: u128,
    pub checkpoints: BTreeMap<AssetId, RewardCheckpoint>,
}

impl StakerRecord {
    pub fn checkpoint(&self, asset: &AssetId) -> RewardCheckpoint {
        self.checkpoints.get(asset).copied().unwrap_or_default()
    }

    pub fn pending(&self, asset: &AssetId) -> u128 {
        self.checkpoint(asset).pending
    }

    /// Reward accrued on `asset` since the last checkpoint, not yet settled.
    fn accrued(&self, accumulator: &RewardAccumulator, asset: &AssetId) -> Result<u128, LedgerError> {
        let acc_per_share = accumulator.acc_per_share(asset).unwrap_or_default();
        let checkpoint = self.checkpoint(asset);
        // The accumulator never decreases, so debt can never exceed it.
        let delta = acc_per_share.saturating_sub(checkpoint.reward_debt);
        if delta.is_zero() || self.principal == 0 {
            return Ok(0);
        }
        accrued_amount(delta, self.principal).ok_or(LedgerError::Overflow)
    }

    /// Settle against every registered asset. Returns the newly settled
    /// amount per asset (zero entries omitted). On error the record is left
    /// unchanged.
    pub fn settle(
        &mut self,
        staker: &Identity,
        accumulator: &RewardAccumulator,
    ) -> Result<Vec<(AssetId, u128)>, LedgerError> {
        let mut next = self.checkpoints.clone();
        let mut settled = Vec::new();

        for (asset, rewards) in accumulator.assets() {
            let owed = self.accrued(accumulator, asset)?;
            let checkpoint = next.entry(asset.clone()).or_default();
            checkpoint.pending = checkpoint.pending.checked_add(owed).ok_or(LedgerError::Overflow)?;
            checkpoint.total_settled = checkpoint
                .total_settled
                .checked_add(owed)
                .ok_or(LedgerError::Overflow)?;
            checkpoint.reward_debt = rewards.acc_per_share;

            if owed > 0 {
                settled.push((asset.clone(), owed));
            }
        }

        self.checkpoints = next;
        if !settled.is_empty() {
            debug!(staker = %staker, principal = %self.principal, assets = settled.len(), "Staker settled");
        }
        Ok(settled)
    }

    /// What the staker would hold on `asset` if settled now. Does not mutate.
    pub fn preview(
        &self,
        accumulator: &RewardAccumulator,
        asset: &AssetId,
    ) -> Result<StakerRewards, LedgerError> {
        let accrued = self.accrued(accumulator, asset)?;
        let checkpoint = self.checkpoint(asset);
        Ok(StakerRewards {
            pending: checkpoint.pending.checked_add(accrued).ok_or(LedgerError::Overflow)?,
            total_settled: checkpoint
                .total_settled
                .checked_add(accrued)
                .ok_or(LedgerError::Overflow)?,
        })
    }
}
