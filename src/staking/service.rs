//! Pool Service
//!
//! Async facade that owns a [`StakingPool`] together with its transfer
//! backend behind one lock. Every mutating call holds the write lock for the
//! whole operation, including the outbound transfer, so operations are
//! serialized and no caller observes a half-applied one.

use std::sync::Arc;
use tokio::sync::RwLock;

use super::accumulator::AssetRewards;
use super::error::LedgerError;
use super::events::{EventRecord, ReplayedBalances};
use super::pool::{ClaimedReward, StakingPool};
use super::settlement::StakerRewards;
use super::types::{AssetId, Identity};
use crate::ledger::AssetTransfer;

/// Pool plus the ledger it moves funds through.
#[derive(Debug)]
pub struct PoolState<L> {
    pub pool: StakingPool,
    pub ledger: L,
}

/// Aggregate view of the pool, served by the status endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolSummary {
    pub operator: Identity,
    pub staking_asset: AssetId,
    pub total_principal: u128,
    pub stakers: usize,
    pub assets: Vec<AssetSummary>,
    pub events: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AssetSummary {
    pub asset: AssetId,
    pub rewards: AssetRewards,
}

pub struct PoolService<L> {
    state: Arc<RwLock<PoolState<L>>>,
}

impl<L> Clone for PoolService<L> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<L> PoolService<L>
where
    L: AssetTransfer + Send + Sync,
{
    pub fn new(pool: StakingPool, ledger: L) -> Self {
        Self {
            state: Arc::new(RwLock::new(PoolState { pool, ledger })),
        }
    }

    pub async fn allow_asset(&self, caller: &Identity, asset: AssetId) -> Result<bool, LedgerError> {
        let mut state = self.state.write().await;
        state.pool.allow_asset(caller, asset)
    }

    pub async fn inject_reward(
        &self,
        caller: &Identity,
        asset: &AssetId,
        amount: u128,
    ) -> Result<(), LedgerError> {
        let mut guard = self.state.write().await;
        let PoolState { pool, ledger } = &mut *guard;
        pool.inject_reward(caller, asset, amount, ledger)
    }

    pub async fn stake(&self, staker: &Identity, amount: u128) -> Result<(), LedgerError> {
        let mut guard = self.state.write().await;
        let PoolState { pool, ledger } = &mut *guard;
        pool.stake(staker, amount, ledger)
    }

    pub async fn withdraw_exact(&self, staker: &Identity, amount: u128) -> Result<(), LedgerError> {
        let mut guard = self.state.write().await;
        let PoolState { pool, ledger } = &mut *guard;
        pool.withdraw_exact(staker, amount, ledger)
    }

    pub async fn withdraw_all(&self, staker: &Identity) -> Result<u128, LedgerError> {
        let mut guard = self.state.write().await;
        let PoolState { pool, ledger } = &mut *guard;
        pool.withdraw_all(staker, ledger)
    }

    pub async fn claim_rewards(&self, staker: &Identity) -> Result<Vec<ClaimedReward>, LedgerError> {
        let mut guard = self.state.write().await;
        let PoolState { pool, ledger } = &mut *guard;
        pool.claim_rewards(staker, ledger)
    }

    pub async fn claim_reward(
        &self,
        staker: &Identity,
        asset: &AssetId,
    ) -> Result<Option<ClaimedReward>, LedgerError> {
        let mut guard = self.state.write().await;
        let PoolState { pool, ledger } = &mut *guard;
        pool.claim_reward(staker, asset, ledger)
    }

    // Queries take the read lock only.

    pub async fn pool_principal(&self) -> u128 {
        self.state.read().await.pool.pool_principal()
    }

    pub async fn reserve(&self, asset: &AssetId) -> Result<u128, LedgerError> {
        self.state.read().await.pool.reserve(asset)
    }

    pub async fn staker_principal(&self, staker: &Identity) -> u128 {
        self.state.read().await.pool.staker_principal(staker)
    }

    pub async fn staker_rewards(
        &self,
        staker: &Identity,
        asset: &AssetId,
    ) -> Result<StakerRewards, LedgerError> {
        self.state.read().await.pool.staker_rewards(staker, asset)
    }

    pub async fn registered_assets(&self) -> Vec<AssetId> {
        self.state.read().await.pool.registered_assets()
    }

    pub async fn asset_rewards(&self, asset: &AssetId) -> Result<AssetRewards, LedgerError> {
        self.state
            .read()
            .await
            .pool
            .asset_rewards(asset)
            .copied()
            .ok_or_else(|| LedgerError::UnknownAsset(asset.clone()))
    }

    /// Event records with `sequence >= from`.
    pub async fn events_since(&self, from: u64) -> Vec<EventRecord> {
        self.state.read().await.pool.events().since(from).to_vec()
    }

    pub async fn staker_events(&self, staker: &Identity) -> Vec<EventRecord> {
        self.state.read().await.pool.events().for_staker(staker)
    }

    pub async fn replay(&self) -> ReplayedBalances {
        self.state.read().await.pool.events().replay()
    }

    pub async fn summary(&self) -> PoolSummary {
        let state = self.state.read().await;
        let pool = &state.pool;
        PoolSummary {
            operator: pool.operator().clone(),
            staking_asset: pool.staking_asset().clone(),
            total_principal: pool.pool_principal(),
            stakers: pool.staker_count(),
            assets: pool
                .registered_assets()
                .into_iter()
                .filter_map(|asset| {
                    pool.asset_rewards(&asset).map(|rewards| AssetSummary {
                        asset: asset.clone(),
                        rewards: *rewards,
                    })
                })
                .collect(),
            events: pool.events().len(),
        }
    }

    /// Run `f` against the ledger without touching the pool.
    pub async fn with_ledger<R>(&self, f: impl FnOnce(&L) -> R) -> R {
        let state = self.state.read().await;
        f(&state.ledger)
    }

    /// Mutate the ledger directly (dev funding, allowances).
    pub async fn with_ledger_mut<R>(&self, f: impl FnOnce(&mut L) -> R) -> R {
        let mut state = self.state.write().await;
        f(&mut state.ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;

    fn service() -> PoolService<InMemoryLedger> {
        let operator = Identity::new("operator");
        let mut pool = StakingPool::new(operator.clone(), AssetId::new("CHERT"));
        pool.allow_asset(&operator, AssetId::new("CHERT")).unwrap();
        PoolService::new(pool, InMemoryLedger::new())
    }

    #[tokio::test]
    async fn test_service_round_trip() {
        let service = service();
        let alice = Identity::new("alice");
        let chert = AssetId::new("CHERT");
        service
            .with_ledger_mut(|ledger| {
                ledger.faucet(&alice, &chert, 100).unwrap();
                ledger.approve(&alice, &chert, 100);
            })
            .await;

        service.stake(&alice, 100).await.unwrap();
        assert_eq!(service.pool_principal().await, 100);
        assert_eq!(service.withdraw_all(&alice).await, Ok(100));
        assert_eq!(service.staker_events(&alice).await.len(), 2);
        assert_eq!(
            service.with_ledger(|ledger| ledger.balance_of(&alice, &chert)).await,
            100
        );
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let service = service();
        let other = service.clone();
        let operator = Identity::new("operator");

        other.allow_asset(&operator, AssetId::new("LINK")).await.unwrap();

        assert_eq!(service.registered_assets().await.len(), 2);
        let summary = service.summary().await;
        assert_eq!(summary.assets.len(), 2);
        assert_eq!(summary.events, 2);
    }
}
