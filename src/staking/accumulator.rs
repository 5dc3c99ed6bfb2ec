//! Reward Accumulator
//!
//! One monotonically increasing reward-per-share value per registered asset,
//! scaled by [`PRECISION`]. The accumulator only moves when the operator
//! injects reward:
//!
//! ```text
//! acc_per_share += floor(amount * PRECISION / total_principal)
//! ```
//!
//! The floor remainder stays in the reserve and is never attributed to a
//! staker. The accumulator is 256 bits wide; only amounts settled to a staker
//! are narrowed back to `u128`.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::LedgerError;
use super::types::AssetId;

/// Fixed-point scale of `acc_per_share` (18 decimals).
pub const PRECISION: u128 = 1_000_000_000_000_000_000;

/// `floor(amount * PRECISION / total_principal)`. `None` when nothing is
/// staked.
pub fn share_delta(amount: u128, total_principal: u128) -> Option<U256> {
    if total_principal == 0 {
        return None;
    }
    // At most 2^128 * 2^60, so the product cannot overflow.
    Some(U256::from(amount) * U256::from(PRECISION) / U256::from(total_principal))
}

/// `floor(delta * principal / PRECISION)`, narrowed to `u128`.
///
/// `None` when the product overflows 256 bits or the result does not fit.
pub fn accrued_amount(delta: U256, principal: u128) -> Option<u128> {
    let owed = delta.checked_mul(U256::from(principal))? / U256::from(PRECISION);
    if owed > U256::from(u128::MAX) {
        None
    } else {
        Some(owed.low_u128())
    }
}

/// Per-asset reward state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRewards {
    /// Cumulative reward per unit of principal, scaled by PRECISION
    pub acc_per_share: U256,
    /// Reward funds held and not yet claimed (includes dust)
    pub reserve: u128,
    /// Lifetime amount injected
    pub total_injected: u128,
    /// Lifetime amount paid out to stakers
    pub total_claimed: u128,
}

/// Validated injection waiting for the inbound pull to succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInjection {
    pub asset: AssetId,
    pub amount: u128,
    pub next: AssetRewards,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewardAccumulator {
    assets: BTreeMap<AssetId, AssetRewards>,
}

impl RewardAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `asset` with a zero accumulator. Returns false if it was
    /// already registered; existing state is left untouched.
    pub fn register(&mut self, asset: AssetId) -> bool {
        if self.assets.contains_key(&asset) {
            return false;
        }
        self.assets.insert(asset, AssetRewards::default());
        true
    }

    pub fn is_registered(&self, asset: &AssetId) -> bool {
        self.assets.contains_key(asset)
    }

    pub fn get(&self, asset: &AssetId) -> Option<&AssetRewards> {
        self.assets.get(asset)
    }

    pub fn acc_per_share(&self, asset: &AssetId) -> Option<U256> {
        self.assets.get(asset).map(|a| a.acc_per_share)
    }

    pub fn assets(&self) -> impl Iterator<Item = (&AssetId, &AssetRewards)> {
        self.assets.iter()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Compute the post-injection state without applying it.
    pub fn prepare_injection(
        &self,
        asset: &AssetId,
        amount: u128,
        total_principal: u128,
    ) -> Result<PendingInjection, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let current = self
            .assets
            .get(asset)
            .ok_or_else(|| LedgerError::UnknownAsset(asset.clone()))?;
        if total_principal == 0 {
            return Err(LedgerError::NoStakers);
        }

        let delta = share_delta(amount, total_principal).ok_or(LedgerError::NoStakers)?;
        let next = AssetRewards {
            acc_per_share: current
                .acc_per_share
                .checked_add(delta)
                .ok_or(LedgerError::Overflow)?,
            reserve: current.reserve.checked_add(amount).ok_or(LedgerError::Overflow)?,
            total_injected: current
                .total_injected
                .checked_add(amount)
                .ok_or(LedgerError::Overflow)?,
            total_claimed: current.total_claimed,
        };

        Ok(PendingInjection {
            asset: asset.clone(),
            amount,
            next,
        })
    }

    pub fn apply_injection(&mut self, injection: PendingInjection) {
        self.assets.insert(injection.asset, injection.next);
    }

    /// Move `amount` from the reserve to the claimed total.
    pub fn record_payout(&mut self, asset: &AssetId, amount: u128) -> Result<(), LedgerError> {
        let rewards = self
            .assets
            .get_mut(asset)
            .ok_or_else(|| LedgerError::UnknownAsset(asset.clone()))?;
        let reserve = rewards.reserve.checked_sub(amount).ok_or(LedgerError::Overflow)?;
        let total_claimed = rewards
            .total_claimed
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        rewards.reserve = reserve;
        rewards.total_claimed = total_claimed;
        Ok(())
    }

    pub(crate) fn restore(&mut self, asset: AssetId, rewards: AssetRewards) {
        self.assets.insert(asset, rewards);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fau() -> AssetId {
        AssetId::new("FAU")
    }

    #[test]
    fn test_share_delta_rounds_down() {
        assert_eq!(share_delta(20, 120), Some(U256::from(166_666_666_666_666_666u128)));
        assert_eq!(share_delta(1, 3 * PRECISION), Some(U256::zero()));
        assert_eq!(share_delta(1, 0), None);
    }

    #[test]
    fn test_accrued_amount_narrows_to_u128() {
        assert_eq!(accrued_amount(U256::from(PRECISION / 2), 40), Some(20));
        assert_eq!(accrued_amount(U256::from(PRECISION), u128::MAX), Some(u128::MAX));
        assert_eq!(accrued_amount(U256::from(2 * PRECISION), u128::MAX), None);
        assert_eq!(accrued_amount(U256::MAX, 2), None);
    }

    #[test]
    fn test_large_injection_over_tiny_principal() {
        let mut acc = RewardAccumulator::new();
        acc.register(fau());

        // 1000 tokens over one base unit of principal: the per-share value
        // is 10^39, past u128::MAX.
        let amount = 1_000 * PRECISION;
        acc.apply_injection(acc.prepare_injection(&fau(), amount, 1).unwrap());

        let acc_per_share = acc.acc_per_share(&fau()).unwrap();
        assert!(acc_per_share > U256::from(u128::MAX));
        assert_eq!(accrued_amount(acc_per_share, 1), Some(amount));
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut acc = RewardAccumulator::new();
        assert!(acc.register(fau()));

        acc.apply_injection(acc.prepare_injection(&fau(), 10, 5).unwrap());
        assert!(!acc.register(fau()));
        assert_eq!(acc.get(&fau()).unwrap().reserve, 10);
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn test_injection_scales_by_total_principal() {
        let mut acc = RewardAccumulator::new();
        acc.register(fau());

        let pending = acc.prepare_injection(&fau(), 1_000, 4_000).unwrap();
        assert_eq!(pending.next.acc_per_share, U256::from(PRECISION / 4));
        // Nothing applied until the caller commits.
        assert_eq!(acc.acc_per_share(&fau()), Some(U256::zero()));

        acc.apply_injection(pending);
        let rewards = acc.get(&fau()).unwrap();
        assert_eq!(rewards.acc_per_share, U256::from(PRECISION / 4));
        assert_eq!(rewards.reserve, 1_000);
        assert_eq!(rewards.total_injected, 1_000);
    }

    #[test]
    fn test_injection_preconditions() {
        let mut acc = RewardAccumulator::new();
        acc.register(fau());

        assert_eq!(
            acc.prepare_injection(&fau(), 10, 0).unwrap_err(),
            LedgerError::NoStakers
        );
        assert_eq!(
            acc.prepare_injection(&fau(), 0, 10).unwrap_err(),
            LedgerError::ZeroAmount
        );
        assert_eq!(
            acc.prepare_injection(&AssetId::new("LINK"), 10, 10).unwrap_err(),
            LedgerError::UnknownAsset(AssetId::new("LINK"))
        );
    }

    #[test]
    fn test_record_payout_moves_reserve_to_claimed() {
        let mut acc = RewardAccumulator::new();
        acc.register(fau());
        acc.apply_injection(acc.prepare_injection(&fau(), 100, 10).unwrap());

        acc.record_payout(&fau(), 60).unwrap();
        let rewards = acc.get(&fau()).unwrap();
        assert_eq!(rewards.reserve, 40);
        assert_eq!(rewards.total_claimed, 60);

        assert_eq!(acc.record_payout(&fau(), 41), Err(LedgerError::Overflow));
        assert_eq!(acc.get(&fau()).unwrap().reserve, 40);
    }
}
