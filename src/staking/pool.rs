//! Staking Pool - Stake Manager
//!
//! Owns total principal, the staker map and the reward accumulators, and
//! sequences every operation as checks, then effects, then interactions:
//!
//! - inbound pulls (stake, inject) run after validation but before any state
//!   is written, so a failed pull changes nothing;
//! - outbound pushes (withdraw, claim) run after the state is committed, and a
//!   failed push restores the rollback snapshot taken at commit time.

use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

use super::access::AccessControl;
use super::accumulator::{AssetRewards, RewardAccumulator};
use super::error::LedgerError;
use super::events::{EventLog, LedgerEvent};
use super::settlement::{StakerRecord, StakerRewards};
use super::types::{AssetId, Identity};
use crate::ledger::{AssetTransfer, Payout, TransferType};

/// One asset paid out by a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimedReward {
    pub staker: Identity,
    pub asset: AssetId,
    pub amount: u128,
}

/// State captured before a commit whose outbound transfer may still fail.
#[derive(Debug)]
#[must_use]
struct Rollback {
    staker: Identity,
    record: Option<StakerRecord>,
    total_principal: u128,
    assets: Vec<(AssetId, AssetRewards)>,
}

impl Rollback {
    fn capture<'a>(
        pool: &StakingPool,
        staker: &Identity,
        assets: impl IntoIterator<Item = &'a AssetId>,
    ) -> Self {
        Self {
            staker: staker.clone(),
            record: pool.stakers.get(staker).cloned(),
            total_principal: pool.total_principal,
            assets: assets
                .into_iter()
                .filter_map(|asset| pool.accumulator.get(asset).map(|r| (asset.clone(), *r)))
                .collect(),
        }
    }

    fn restore(self, pool: &mut StakingPool) {
        match self.record {
            Some(record) => {
                pool.stakers.insert(self.staker, record);
            }
            None => {
                pool.stakers.remove(&self.staker);
            }
        }
        pool.total_principal = self.total_principal;
        for (asset, rewards) in self.assets {
            pool.accumulator.restore(asset, rewards);
        }
    }
}

/// Committed claim waiting for its linked push.
#[derive(Debug)]
struct PendingClaim {
    payouts: Vec<Payout>,
    rollback: Rollback,
}

/// Committed withdrawal waiting for its push.
#[derive(Debug)]
struct PendingWithdrawal {
    amount: u128,
    rollback: Rollback,
}

#[derive(Debug)]
pub struct StakingPool {
    access: AccessControl,
    staking_asset: AssetId,
    accumulator: RewardAccumulator,
    stakers: HashMap<Identity, StakerRecord>,
    total_principal: u128,
    events: EventLog,
}

impl StakingPool {
    pub fn new(operator: Identity, staking_asset: AssetId) -> Self {
        info!(operator = %operator, staking_asset = %staking_asset, "Staking pool created");
        Self {
            access: AccessControl::new(operator),
            staking_asset,
            accumulator: RewardAccumulator::new(),
            stakers: HashMap::new(),
            total_principal: 0,
            events: EventLog::new(),
        }
    }

    // ------------------------------------------------------------------
    // Operator operations
    // ------------------------------------------------------------------

    /// Allow-list `asset` for rewards. Returns whether it was newly added.
    pub fn allow_asset(&mut self, caller: &Identity, asset: AssetId) -> Result<bool, LedgerError> {
        self.access.ensure_operator(caller)?;

        if !self.accumulator.register(asset.clone()) {
            return Ok(false);
        }
        info!(asset = %asset, "Reward asset allowed");
        self.events.append(LedgerEvent::AssetAllowed { asset });
        Ok(true)
    }

    /// Pull `amount` of `asset` from the operator and split it across current
    /// principal.
    pub fn inject_reward(
        &mut self,
        caller: &Identity,
        asset: &AssetId,
        amount: u128,
        transfer: &mut dyn AssetTransfer,
    ) -> Result<(), LedgerError> {
        self.access.ensure_operator(caller)?;
        let injection = self
            .accumulator
            .prepare_injection(asset, amount, self.total_principal)
            .inspect_err(|err| {
                warn!(asset = %asset, amount = %amount, error = %err, "Reward injection rejected")
            })?;

        transfer
            .pull(TransferType::RewardInjection, caller, asset, amount)
            .map_err(|err| {
                warn!(asset = %asset, amount = %amount, error = %err, "Reward pull failed");
                LedgerError::from(err)
            })?;

        let acc_per_share = injection.next.acc_per_share;
        self.accumulator.apply_injection(injection);
        self.events.append(LedgerEvent::RewardInjected {
            asset: asset.clone(),
            amount,
        });
        info!(
            asset = %asset,
            amount = %amount,
            total_principal = %self.total_principal,
            acc_per_share = %acc_per_share,
            "Reward injected"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Staker operations
    // ------------------------------------------------------------------

    pub fn stake(
        &mut self,
        staker: &Identity,
        amount: u128,
        transfer: &mut dyn AssetTransfer,
    ) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }

        // Settle with the principal held before this deposit.
        let mut record = self.stakers.get(staker).cloned().unwrap_or_default();
        record.settle(staker, &self.accumulator)?;
        record.principal = record.principal.checked_add(amount).ok_or(LedgerError::Overflow)?;
        let total_principal = self
            .total_principal
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;

        transfer
            .pull(TransferType::StakeDeposit, staker, &self.staking_asset, amount)
            .map_err(|err| {
                warn!(staker = %staker, amount = %amount, error = %err, "Stake pull failed");
                LedgerError::from(err)
            })?;

        let principal = record.principal;
        self.stakers.insert(staker.clone(), record);
        self.total_principal = total_principal;
        self.events.append(LedgerEvent::Staked {
            staker: staker.clone(),
            amount,
        });
        info!(staker = %staker, amount = %amount, principal = %principal, "Staked");
        Ok(())
    }

    pub fn withdraw_exact(
        &mut self,
        staker: &Identity,
        amount: u128,
        transfer: &mut dyn AssetTransfer,
    ) -> Result<(), LedgerError> {
        let pending = self.commit_withdrawal(staker, amount)?;
        let asset = self.staking_asset.clone();

        if let Err(err) = transfer.push(TransferType::PrincipalWithdrawal, staker, &asset, pending.amount) {
            warn!(
                staker = %staker,
                amount = %amount,
                error = %err,
                "Withdrawal push failed, rolling back"
            );
            pending.rollback.restore(self);
            return Err(err.into());
        }

        self.events.append(LedgerEvent::Withdrawn {
            staker: staker.clone(),
            amount,
        });
        info!(
            staker = %staker,
            amount = %amount,
            principal = %self.staker_principal(staker),
            "Withdrawn"
        );
        Ok(())
    }

    /// Withdraw the caller's whole principal. Returns the amount withdrawn.
    pub fn withdraw_all(
        &mut self,
        staker: &Identity,
        transfer: &mut dyn AssetTransfer,
    ) -> Result<u128, LedgerError> {
        let principal = self.staker_principal(staker);
        if principal == 0 {
            return Err(LedgerError::InsufficientPrincipal {
                requested: 0,
                available: 0,
            });
        }
        self.withdraw_exact(staker, principal, transfer)?;
        Ok(principal)
    }

    /// Pay out everything the caller has accrued, one entry per asset.
    pub fn claim_rewards(
        &mut self,
        staker: &Identity,
        transfer: &mut dyn AssetTransfer,
    ) -> Result<Vec<ClaimedReward>, LedgerError> {
        let pending = self.commit_claim(staker, None)?;
        self.pay_claim(staker, pending, transfer)
    }

    /// Pay out the caller's accrued reward in a single asset.
    pub fn claim_reward(
        &mut self,
        staker: &Identity,
        asset: &AssetId,
        transfer: &mut dyn AssetTransfer,
    ) -> Result<Option<ClaimedReward>, LedgerError> {
        if !self.accumulator.is_registered(asset) {
            return Err(LedgerError::UnknownAsset(asset.clone()));
        }
        let pending = self.commit_claim(staker, Some(asset))?;
        Ok(self.pay_claim(staker, pending, transfer)?.into_iter().next())
    }

    // ------------------------------------------------------------------
    // Two-phase commits
    // ------------------------------------------------------------------

    /// Settle and debit principal. The caller must push `amount` out and
    /// restore the rollback if that fails.
    fn commit_withdrawal(
        &mut self,
        staker: &Identity,
        amount: u128,
    ) -> Result<PendingWithdrawal, LedgerError> {
        let available = self.staker_principal(staker);
        if available == 0 || amount > available {
            warn!(
                staker = %staker,
                requested = %amount,
                available = %available,
                "Withdrawal exceeds principal"
            );
            return Err(LedgerError::InsufficientPrincipal {
                requested: amount,
                available,
            });
        }
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }

        let mut record = self.stakers.get(staker).cloned().unwrap_or_default();
        record.settle(staker, &self.accumulator)?;
        record.principal -= amount;
        let total_principal = self
            .total_principal
            .checked_sub(amount)
            .ok_or(LedgerError::Overflow)?;

        let rollback = Rollback::capture(self, staker, std::iter::empty());
        self.stakers.insert(staker.clone(), record);
        self.total_principal = total_principal;

        Ok(PendingWithdrawal { amount, rollback })
    }

    /// Settle and zero pending reward for `only` (or every asset). Reserves
    /// are debited here; the linked push happens afterwards.
    fn commit_claim(
        &mut self,
        staker: &Identity,
        only: Option<&AssetId>,
    ) -> Result<PendingClaim, LedgerError> {
        let rollback = Rollback::capture(self, staker, self.accumulator.assets().map(|(a, _)| a));

        // A claim by an identity that never staked is empty and leaves no record.
        let Some(current) = self.stakers.get(staker) else {
            return Ok(PendingClaim {
                payouts: Vec::new(),
                rollback,
            });
        };

        let mut record = current.clone();
        record.settle(staker, &self.accumulator)?;

        let mut payouts = Vec::new();
        for (asset, checkpoint) in record.checkpoints.iter_mut() {
            if only.is_some_and(|wanted| wanted != asset) || checkpoint.pending == 0 {
                continue;
            }
            payouts.push(Payout {
                asset: asset.clone(),
                amount: checkpoint.pending,
            });
            checkpoint.pending = 0;
        }

        for payout in &payouts {
            if let Err(err) = self.accumulator.record_payout(&payout.asset, payout.amount) {
                rollback.restore(self);
                return Err(err);
            }
        }
        self.stakers.insert(staker.clone(), record);

        Ok(PendingClaim { payouts, rollback })
    }

    fn pay_claim(
        &mut self,
        staker: &Identity,
        pending: PendingClaim,
        transfer: &mut dyn AssetTransfer,
    ) -> Result<Vec<ClaimedReward>, LedgerError> {
        if pending.payouts.is_empty() {
            return Ok(Vec::new());
        }

        if let Err(err) = transfer.push_linked(TransferType::RewardPayout, staker, &pending.payouts) {
            warn!(
                staker = %staker,
                legs = pending.payouts.len(),
                error = %err,
                "Reward payout failed, rolling back"
            );
            pending.rollback.restore(self);
            return Err(err.into());
        }

        let claimed: Vec<ClaimedReward> = pending
            .payouts
            .into_iter()
            .map(|payout| ClaimedReward {
                staker: staker.clone(),
                asset: payout.asset,
                amount: payout.amount,
            })
            .collect();

        for reward in &claimed {
            self.events.append(LedgerEvent::ClaimedReward {
                staker: reward.staker.clone(),
                asset: reward.asset.clone(),
                amount: reward.amount,
            });
            info!(staker = %staker, asset = %reward.asset, amount = %reward.amount, "Reward claimed");
        }
        Ok(claimed)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn pool_principal(&self) -> u128 {
        self.total_principal
    }

    pub fn reserve(&self, asset: &AssetId) -> Result<u128, LedgerError> {
        self.accumulator
            .get(asset)
            .map(|rewards| rewards.reserve)
            .ok_or_else(|| LedgerError::UnknownAsset(asset.clone()))
    }

    pub fn staker_principal(&self, staker: &Identity) -> u128 {
        self.stakers.get(staker).map(|r| r.principal).unwrap_or(0)
    }

    /// Pending and lifetime reward including accrual not yet settled.
    pub fn staker_rewards(
        &self,
        staker: &Identity,
        asset: &AssetId,
    ) -> Result<StakerRewards, LedgerError> {
        if !self.accumulator.is_registered(asset) {
            return Err(LedgerError::UnknownAsset(asset.clone()));
        }
        match self.stakers.get(staker) {
            Some(record) => record.preview(&self.accumulator, asset),
            None => Ok(StakerRewards::default()),
        }
    }

    pub fn staker(&self, staker: &Identity) -> Option<&StakerRecord> {
        self.stakers.get(staker)
    }

    pub fn staker_count(&self) -> usize {
        self.stakers.values().filter(|r| r.principal > 0).count()
    }

    pub fn registered_assets(&self) -> Vec<AssetId> {
        self.accumulator.assets().map(|(asset, _)| asset.clone()).collect()
    }

    pub fn asset_rewards(&self, asset: &AssetId) -> Option<&AssetRewards> {
        self.accumulator.get(asset)
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn staking_asset(&self) -> &AssetId {
        &self.staking_asset
    }

    pub fn operator(&self) -> &Identity {
        self.access.operator()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;

    fn operator() -> Identity {
        Identity::new("operator")
    }

    fn chert() -> AssetId {
        AssetId::new("CHERT")
    }

    fn link() -> AssetId {
        AssetId::new("LINK")
    }

    fn fund(ledger: &mut InMemoryLedger, who: &Identity, asset: &AssetId, amount: u128) {
        ledger.faucet(who, asset, amount).unwrap();
        ledger.approve(who, asset, amount);
    }

    fn setup() -> (StakingPool, InMemoryLedger) {
        let mut pool = StakingPool::new(operator(), chert());
        pool.allow_asset(&operator(), chert()).unwrap();
        let mut ledger = InMemoryLedger::new();
        fund(&mut ledger, &operator(), &chert(), 1_000_000);
        (pool, ledger)
    }

    #[test]
    fn test_stake_rejects_zero() {
        let (mut pool, mut ledger) = setup();
        let alice = Identity::new("alice");

        assert_eq!(pool.stake(&alice, 0, &mut ledger), Err(LedgerError::ZeroAmount));
        assert!(pool.staker(&alice).is_none());
    }

    #[test]
    fn test_failed_stake_pull_changes_nothing() {
        let (mut pool, mut ledger) = setup();
        let alice = Identity::new("alice");
        ledger.faucet(&alice, &chert(), 100).unwrap();

        // No allowance granted.
        let result = pool.stake(&alice, 100, &mut ledger);

        assert!(matches!(result, Err(LedgerError::TransferFailed(_))));
        assert_eq!(pool.pool_principal(), 0);
        assert!(pool.staker(&alice).is_none());
        // Only the AssetAllowed record from setup.
        assert_eq!(pool.events().len(), 1);
    }

    #[test]
    fn test_withdraw_more_than_principal() {
        let (mut pool, mut ledger) = setup();
        let alice = Identity::new("alice");
        fund(&mut ledger, &alice, &chert(), 10);
        pool.stake(&alice, 10, &mut ledger).unwrap();

        assert_eq!(
            pool.withdraw_exact(&alice, 11, &mut ledger),
            Err(LedgerError::InsufficientPrincipal {
                requested: 11,
                available: 10
            })
        );
        assert_eq!(
            pool.withdraw_all(&Identity::new("nobody"), &mut ledger),
            Err(LedgerError::InsufficientPrincipal {
                requested: 0,
                available: 0
            })
        );
        assert_eq!(pool.withdraw_exact(&alice, 0, &mut ledger), Err(LedgerError::ZeroAmount));
    }

    #[test]
    fn test_withdraw_with_nothing_staked() {
        let (mut pool, mut ledger) = setup();
        let ghost = Identity::new("ghost");

        for amount in [0, 1] {
            assert_eq!(
                pool.withdraw_exact(&ghost, amount, &mut ledger),
                Err(LedgerError::InsufficientPrincipal {
                    requested: amount,
                    available: 0
                })
            );
        }
        assert!(pool.staker(&ghost).is_none());
        assert_eq!(pool.events().len(), 1);
    }

    #[test]
    fn test_failed_withdrawal_push_rolls_back() {
        let (mut pool, mut ledger) = setup();
        let alice = Identity::new("alice");
        fund(&mut ledger, &alice, &chert(), 10);
        pool.stake(&alice, 10, &mut ledger).unwrap();
        pool.inject_reward(&operator(), &chert(), 5, &mut ledger).unwrap();
        let before = pool.staker(&alice).cloned();

        ledger.fail_next_push();
        let result = pool.withdraw_exact(&alice, 4, &mut ledger);

        assert!(matches!(result, Err(LedgerError::TransferFailed(_))));
        assert_eq!(pool.pool_principal(), 10);
        assert_eq!(pool.staker(&alice).cloned(), before);
        assert_eq!(ledger.balance_of(&alice, &chert()), 0);
        assert_eq!(pool.staker_rewards(&alice, &chert()).unwrap().pending, 5);
    }

    #[test]
    fn test_failed_claim_push_rolls_back() {
        let (mut pool, mut ledger) = setup();
        let alice = Identity::new("alice");
        fund(&mut ledger, &alice, &chert(), 10);
        pool.stake(&alice, 10, &mut ledger).unwrap();
        pool.inject_reward(&operator(), &chert(), 5, &mut ledger).unwrap();

        ledger.fail_next_push();
        let result = pool.claim_rewards(&alice, &mut ledger);

        assert!(matches!(result, Err(LedgerError::TransferFailed(_))));
        assert_eq!(pool.reserve(&chert()), Ok(5));
        assert_eq!(pool.asset_rewards(&chert()).unwrap().total_claimed, 0);
        assert_eq!(pool.staker_rewards(&alice, &chert()).unwrap().pending, 5);

        let claimed = pool.claim_rewards(&alice, &mut ledger).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].amount, 5);
        assert_eq!(pool.reserve(&chert()), Ok(0));
    }

    #[test]
    fn test_inject_requires_operator_and_stakers() {
        let (mut pool, mut ledger) = setup();
        let mallory = Identity::new("mallory");
        fund(&mut ledger, &mallory, &chert(), 10);

        assert_eq!(
            pool.inject_reward(&mallory, &chert(), 10, &mut ledger),
            Err(LedgerError::Unauthorized)
        );
        assert_eq!(
            pool.inject_reward(&operator(), &chert(), 10, &mut ledger),
            Err(LedgerError::NoStakers)
        );
        assert_eq!(
            pool.inject_reward(&operator(), &link(), 10, &mut ledger),
            Err(LedgerError::UnknownAsset(link()))
        );
        assert_eq!(ledger.custody_balance(&chert()), 0);
    }

    #[test]
    fn test_allow_asset_is_operator_only_and_idempotent() {
        let (mut pool, _) = setup();

        assert_eq!(
            pool.allow_asset(&Identity::new("alice"), link()),
            Err(LedgerError::Unauthorized)
        );
        assert_eq!(pool.allow_asset(&operator(), link()), Ok(true));
        assert_eq!(pool.allow_asset(&operator(), link()), Ok(false));
        assert_eq!(pool.registered_assets(), vec![chert(), link()]);
    }

    #[test]
    fn test_claim_by_unknown_identity_is_empty() {
        let (mut pool, mut ledger) = setup();
        let ghost = Identity::new("ghost");

        assert_eq!(pool.claim_rewards(&ghost, &mut ledger), Ok(vec![]));
        assert!(pool.staker(&ghost).is_none());
        assert_eq!(
            pool.claim_reward(&ghost, &link(), &mut ledger),
            Err(LedgerError::UnknownAsset(link()))
        );
    }

    #[test]
    fn test_single_asset_claim_leaves_other_assets_pending() {
        let (mut pool, mut ledger) = setup();
        pool.allow_asset(&operator(), link()).unwrap();
        fund(&mut ledger, &operator(), &link(), 100);
        let alice = Identity::new("alice");
        fund(&mut ledger, &alice, &chert(), 10);
        pool.stake(&alice, 10, &mut ledger).unwrap();
        pool.inject_reward(&operator(), &chert(), 20, &mut ledger).unwrap();
        pool.inject_reward(&operator(), &link(), 30, &mut ledger).unwrap();

        let claimed = pool.claim_reward(&alice, &link(), &mut ledger).unwrap();

        assert_eq!(claimed.map(|c| c.amount), Some(30));
        assert_eq!(ledger.balance_of(&alice, &link()), 30);
        assert_eq!(pool.staker_rewards(&alice, &chert()).unwrap().pending, 20);
        assert_eq!(pool.staker_rewards(&alice, &link()).unwrap().pending, 0);
        assert_eq!(pool.staker_rewards(&alice, &link()).unwrap().total_settled, 30);
        assert_eq!(pool.claim_reward(&alice, &link(), &mut ledger), Ok(None));
    }
}
