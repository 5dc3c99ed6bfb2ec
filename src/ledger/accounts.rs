//! Ledger Account Definitions
//!
//! Account codes and ID conventions for staking pool custody.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::staking::Identity;

pub const LEDGER_CHERT: u16 = 1;

pub mod account_codes {
    pub const CUSTODY: u16 = 1;
    pub const MINT: u16 = 2;
    pub const PARTICIPANT: u16 = 10;
}

pub mod transfer_codes {
    pub const STAKE_DEPOSIT: u16 = 1;
    pub const PRINCIPAL_WITHDRAWAL: u16 = 2;
    pub const REWARD_INJECTION: u16 = 3;
    pub const REWARD_PAYOUT: u16 = 4;
    pub const FAUCET: u16 = 5;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    Custody,
    Mint,
    Participant,
}

impl AccountType {
    pub fn code(&self) -> u16 {
        match self {
            AccountType::Custody => account_codes::CUSTODY,
            AccountType::Mint => account_codes::MINT,
            AccountType::Participant => account_codes::PARTICIPANT,
        }
    }
}

pub struct AccountIds;

impl AccountIds {
    pub const CUSTODY: u128 = 0x0001_0000_0000_0001;
    pub const MINT: u128 = 0x0001_0000_0000_0002;

    /// Participant account id: first 8 bytes of SHA-256 over the identity,
    /// tagged with the participant prefix.
    pub fn participant(identity: &Identity) -> u128 {
        let mut hasher = Sha256::new();
        hasher.update(identity.as_str().as_bytes());
        let hash = hasher.finalize();

        let mut id_bytes = [0u8; 16];
        id_bytes[..8].copy_from_slice(&hash[..8]);
        0x0002_0000_0000_0000_0000_0000_0000_0000u128 | u128::from_le_bytes(id_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_ids_are_stable_and_distinct() {
        let alice = Identity::new("alice");
        let bob = Identity::new("bob");

        assert_eq!(AccountIds::participant(&alice), AccountIds::participant(&alice));
        assert_ne!(AccountIds::participant(&alice), AccountIds::participant(&bob));
        assert_ne!(AccountIds::participant(&alice), AccountIds::CUSTODY);
        assert_eq!(AccountIds::participant(&alice) >> 112, 0x0002);
    }
}
