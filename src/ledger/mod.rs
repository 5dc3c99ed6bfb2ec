//! Asset Ledger Boundary
//!
//! The staking pool never moves value itself. It talks to an external asset
//! ledger through [`AssetTransfer`], which has approve/pull semantics for funds
//! coming in and plain or linked pushes for funds going out.
//!
//! ## Account Types
//!
//! - Custody: holds pooled principal and reward reserves for every asset
//! - Participant: one account per identity, derived from the identity string
//! - Mint: source of faucet funding in development ledgers
//!
//! ## Transfer Types
//!
//! - Stake Deposit: participant to custody (pull)
//! - Principal Withdrawal: custody to participant (push)
//! - Reward Injection: operator to custody (pull)
//! - Reward Payout: custody to participant (linked push)
//! - Faucet: mint to participant (development only)

pub mod accounts;
pub mod memory;
pub mod transfers;

pub use accounts::*;
pub use memory::*;
pub use transfers::*;
