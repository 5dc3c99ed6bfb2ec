//! Chert Staking Pool
//!
//! Staking ledger that splits operator-injected rewards across stakers in
//! exact proportion to their principal at the moment of each injection, for
//! any number of allow-listed reward assets.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Server entrypoint
//! ├── config.rs      - Configuration management
//! ├── staking/       - Reward distribution core
//! │   ├── types.rs       - Identity and asset identifiers
//! │   ├── error.rs       - Ledger error taxonomy
//! │   ├── access.rs      - Operator authorization
//! │   ├── accumulator.rs - Reward-per-share accumulators and reserves
//! │   ├── settlement.rs  - Staker checkpoints and settlement
//! │   ├── pool.rs        - Stake / withdraw / claim / inject
//! │   ├── events.rs      - Event log and replay
//! │   └── service.rs     - Async lock-serialized facade
//! ├── ledger/        - Asset transfer boundary
//! │   ├── accounts.rs  - Account ids and codes
//! │   ├── transfers.rs - Transfer types and the AssetTransfer trait
//! │   └── memory.rs    - In-memory double-entry ledger
//! └── api/           - HTTP API endpoints
//!     ├── pool.rs       - Pool operations and queries
//!     ├── ledger.rs     - Development ledger endpoints
//!     └── middleware.rs - Caller identity and request logging
//! ```

pub mod api;
pub mod config;
pub mod ledger;
pub mod staking;

// Re-export main types for convenience
pub use config::StakingConfig;
pub use ledger::{
    AccountIds, AccountType, AssetTransfer, InMemoryLedger, Payout, TransferError,
    TransferReceipt, TransferType, LEDGER_CHERT,
};
pub use staking::{
    AssetId, AssetRewards, ClaimedReward, EventLog, EventRecord, Identity, LedgerError,
    LedgerEvent, PoolService, ReplayedBalances, StakerRewards, StakingPool, PRECISION,
};
