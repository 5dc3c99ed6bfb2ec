//! Staking Pool
//!
//! Proportional reward distribution over staked principal. Rewards are
//! distributed with a per-asset reward-per-share accumulator and per-staker
//! checkpoints, so every operation is O(registered assets) regardless of the
//! number of stakers.
//!
//! ## Components
//!
//! - `access`: operator identity and authorization
//! - `accumulator`: `acc_per_share` and reserve per reward asset
//! - `settlement`: staker checkpoints (`reward_debt`, `pending`)
//! - `pool`: stake, withdraw, claim and inject with rollback on failed transfers
//! - `events`: append-only event log with replay
//! - `service`: async, lock-serialized facade used by the HTTP layer

pub mod access;
pub mod accumulator;
pub mod error;
pub mod events;
pub mod pool;
pub mod service;
pub mod settlement;
pub mod types;

pub use access::AccessControl;
pub use accumulator::{accrued_amount, share_delta, AssetRewards, RewardAccumulator, PRECISION};
pub use error::LedgerError;
pub use events::{EventLog, EventRecord, LedgerEvent, ReplayedBalances};
pub use pool::{ClaimedReward, StakingPool};
pub use service::{AssetSummary, PoolService, PoolState, PoolSummary};
pub use settlement::{RewardCheckpoint, StakerRecord, StakerRewards};
pub use types::{AssetId, Identity};
