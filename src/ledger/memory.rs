//! In-Memory Double-Entry Ledger
//!
//! Development and test implementation of [`AssetTransfer`]. Every posted
//! transfer debits one account and credits another for the same asset, so the
//! sum of balances per asset only changes through faucet funding.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::accounts::{AccountIds, AccountType, LEDGER_CHERT};
use super::transfers::{AssetTransfer, Payout, TransferError, TransferReceipt, TransferType};
use crate::staking::{AssetId, Identity};

#[derive(Debug, Clone, Serialize)]
pub struct AccountSnapshot {
    pub id: u128,
    pub ledger: u16,
    pub asset: AssetId,
    pub code: u16,
    pub balance: u128,
    pub credits_posted: u128,
    pub debits_posted: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferSnapshot {
    pub id: u128,
    pub debit_account_id: u128,
    pub credit_account_id: u128,
    pub asset: AssetId,
    pub amount: u128,
    pub code: u16,
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    accounts: HashMap<(u128, AssetId), AccountSnapshot>,
    /// (owner account, asset) -> amount custody may pull
    allowances: HashMap<(u128, AssetId), u128>,
    transfers: Vec<TransferSnapshot>,
    fail_next_push: bool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` of `asset` to `to` out of thin air (mock token faucet).
    pub fn faucet(
        &mut self,
        to: &Identity,
        asset: &AssetId,
        amount: u128,
    ) -> Result<TransferReceipt, TransferError> {
        let credit = AccountIds::participant(to);
        if self.balance(credit, asset).checked_add(amount).is_none() {
            return Err(TransferError::Rejected("credit balance overflow".to_string()));
        }
        self.ensure_account(AccountIds::MINT, asset, AccountType::Mint);
        self.ensure_account(credit, asset, AccountType::Participant);

        // The mint account is the only one allowed to go negative, modelled by
        // topping it up before the transfer.
        if let Some(mint) = self.accounts.get_mut(&(AccountIds::MINT, asset.clone())) {
            mint.balance = mint
                .balance
                .checked_add(amount)
                .ok_or_else(|| TransferError::Rejected("mint supply overflow".to_string()))?;
        }

        let receipt =
            self.execute_transfer(TransferType::Faucet, AccountIds::MINT, credit, asset, amount)?;
        info!(account = %to, asset = %asset, amount = %amount, "Faucet funded account");
        Ok(receipt)
    }

    /// Allow custody to pull up to `amount` of `asset` from `owner`.
    /// Replaces any previous allowance.
    pub fn approve(&mut self, owner: &Identity, asset: &AssetId, amount: u128) {
        let owner_id = AccountIds::participant(owner);
        self.allowances.insert((owner_id, asset.clone()), amount);
        debug!(owner = %owner, asset = %asset, amount = %amount, "Custody allowance set");
    }

    pub fn allowance(&self, owner: &Identity, asset: &AssetId) -> u128 {
        let owner_id = AccountIds::participant(owner);
        self.allowances
            .get(&(owner_id, asset.clone()))
            .copied()
            .unwrap_or(0)
    }

    pub fn balance_of(&self, owner: &Identity, asset: &AssetId) -> u128 {
        self.balance(AccountIds::participant(owner), asset)
    }

    pub fn custody_balance(&self, asset: &AssetId) -> u128 {
        self.balance(AccountIds::CUSTODY, asset)
    }

    pub fn account(&self, owner: &Identity, asset: &AssetId) -> Option<&AccountSnapshot> {
        self.accounts
            .get(&(AccountIds::participant(owner), asset.clone()))
    }

    pub fn transfers(&self) -> &[TransferSnapshot] {
        &self.transfers
    }

    /// Make the next push or linked push fail without moving funds.
    pub fn fail_next_push(&mut self) {
        self.fail_next_push = true;
    }

    fn balance(&self, account_id: u128, asset: &AssetId) -> u128 {
        self.accounts
            .get(&(account_id, asset.clone()))
            .map(|acc| acc.balance)
            .unwrap_or(0)
    }

    fn ensure_account(&mut self, id: u128, asset: &AssetId, kind: AccountType) {
        self.accounts
            .entry((id, asset.clone()))
            .or_insert_with(|| AccountSnapshot {
                id,
                ledger: LEDGER_CHERT,
                asset: asset.clone(),
                code: kind.code(),
                balance: 0,
                credits_posted: 0,
                debits_posted: 0,
            });
    }

    fn take_push_failure(&mut self) -> Result<(), TransferError> {
        if self.fail_next_push {
            self.fail_next_push = false;
            warn!("Injected push failure triggered");
            return Err(TransferError::Rejected("ledger unavailable".to_string()));
        }
        Ok(())
    }

    fn execute_transfer(
        &mut self,
        kind: TransferType,
        debit_account_id: u128,
        credit_account_id: u128,
        asset: &AssetId,
        amount: u128,
    ) -> Result<TransferReceipt, TransferError> {
        if amount == 0 {
            return Err(TransferError::Rejected("zero amount".to_string()));
        }

        let available = self.balance(debit_account_id, asset);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                available,
                requested: amount,
            });
        }

        let credit_balance = self.balance(credit_account_id, asset);
        if credit_balance.checked_add(amount).is_none() {
            return Err(TransferError::Rejected("credit balance overflow".to_string()));
        }

        if let Some(debit) = self.accounts.get_mut(&(debit_account_id, asset.clone())) {
            debit.balance -= amount;
            debit.debits_posted += amount;
        }
        if let Some(credit) = self.accounts.get_mut(&(credit_account_id, asset.clone())) {
            credit.balance += amount;
            credit.credits_posted += amount;
        }

        let id = compute_transfer_id(kind, self.transfers.len() as u64);
        self.transfers.push(TransferSnapshot {
            id,
            debit_account_id,
            credit_account_id,
            asset: asset.clone(),
            amount,
            code: kind.code(),
        });

        debug!(
            transfer_id = %id,
            asset = %asset,
            amount = %amount,
            code = kind.code(),
            "Transfer posted"
        );

        Ok(TransferReceipt {
            transfer_id: id,
            kind,
            asset: asset.clone(),
            amount,
        })
    }
}

impl AssetTransfer for InMemoryLedger {
    fn pull(
        &mut self,
        kind: TransferType,
        from: &Identity,
        asset: &AssetId,
        amount: u128,
    ) -> Result<TransferReceipt, TransferError> {
        let debit = AccountIds::participant(from);
        let allowed = self.allowance(from, asset);
        if allowed < amount {
            return Err(TransferError::InsufficientAllowance {
                allowed,
                requested: amount,
            });
        }

        self.ensure_account(debit, asset, AccountType::Participant);
        self.ensure_account(AccountIds::CUSTODY, asset, AccountType::Custody);
        let receipt = self.execute_transfer(kind, debit, AccountIds::CUSTODY, asset, amount)?;
        self.allowances.insert((debit, asset.clone()), allowed - amount);
        Ok(receipt)
    }

    fn push(
        &mut self,
        kind: TransferType,
        to: &Identity,
        asset: &AssetId,
        amount: u128,
    ) -> Result<TransferReceipt, TransferError> {
        self.take_push_failure()?;

        let credit = AccountIds::participant(to);
        self.ensure_account(AccountIds::CUSTODY, asset, AccountType::Custody);
        self.ensure_account(credit, asset, AccountType::Participant);
        self.execute_transfer(kind, AccountIds::CUSTODY, credit, asset, amount)
    }

    fn push_linked(
        &mut self,
        kind: TransferType,
        to: &Identity,
        payouts: &[Payout],
    ) -> Result<Vec<TransferReceipt>, TransferError> {
        self.take_push_failure()?;

        // Validate the whole chain against custody before posting any leg.
        let mut required: HashMap<&AssetId, u128> = HashMap::new();
        for payout in payouts {
            if payout.amount == 0 {
                return Err(TransferError::Rejected("zero amount in linked chain".to_string()));
            }
            let total = required.entry(&payout.asset).or_insert(0);
            *total = total
                .checked_add(payout.amount)
                .ok_or_else(|| TransferError::Rejected("linked chain overflow".to_string()))?;
        }
        for (asset, total) in &required {
            let available = self.custody_balance(asset);
            if available < *total {
                return Err(TransferError::InsufficientBalance {
                    available,
                    requested: *total,
                });
            }
        }

        let credit = AccountIds::participant(to);
        let mut receipts = Vec::with_capacity(payouts.len());
        for payout in payouts {
            self.ensure_account(credit, &payout.asset, AccountType::Participant);
            receipts.push(self.execute_transfer(
                kind,
                AccountIds::CUSTODY,
                credit,
                &payout.asset,
                payout.amount,
            )?);
        }
        Ok(receipts)
    }
}

fn compute_transfer_id(kind: TransferType, sequence: u64) -> u128 {
    let data = format!("{}:{}", kind.code(), sequence);
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    let hash = hasher.finalize();

    let mut id_bytes = [0u8; 16];
    id_bytes.copy_from_slice(&hash[..16]);
    u128::from_le_bytes(id_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fau() -> AssetId {
        AssetId::new("FAU")
    }

    #[test]
    fn test_pull_requires_allowance() {
        let mut ledger = InMemoryLedger::new();
        let alice = Identity::new("alice");
        ledger.faucet(&alice, &fau(), 100).unwrap();

        let result = ledger.pull(TransferType::StakeDeposit, &alice, &fau(), 50);
        assert_eq!(
            result.unwrap_err(),
            TransferError::InsufficientAllowance {
                allowed: 0,
                requested: 50
            }
        );

        ledger.approve(&alice, &fau(), 60);
        ledger
            .pull(TransferType::StakeDeposit, &alice, &fau(), 50)
            .unwrap();

        assert_eq!(ledger.balance_of(&alice, &fau()), 50);
        assert_eq!(ledger.custody_balance(&fau()), 50);
        assert_eq!(ledger.allowance(&alice, &fau()), 10);
    }

    #[test]
    fn test_pull_rejects_insufficient_balance() {
        let mut ledger = InMemoryLedger::new();
        let alice = Identity::new("alice");
        ledger.faucet(&alice, &fau(), 10).unwrap();
        ledger.approve(&alice, &fau(), 1_000);

        let result = ledger.pull(TransferType::StakeDeposit, &alice, &fau(), 11);
        assert!(matches!(result, Err(TransferError::InsufficientBalance { .. })));
        assert_eq!(ledger.balance_of(&alice, &fau()), 10);
        assert_eq!(ledger.allowance(&alice, &fau()), 1_000);
    }

    #[test]
    fn test_push_moves_custody_funds() {
        let mut ledger = InMemoryLedger::new();
        let alice = Identity::new("alice");
        let bob = Identity::new("bob");
        ledger.faucet(&alice, &fau(), 100).unwrap();
        ledger.approve(&alice, &fau(), 100);
        ledger
            .pull(TransferType::StakeDeposit, &alice, &fau(), 100)
            .unwrap();

        ledger
            .push(TransferType::PrincipalWithdrawal, &bob, &fau(), 40)
            .unwrap();

        assert_eq!(ledger.balance_of(&bob, &fau()), 40);
        assert_eq!(ledger.custody_balance(&fau()), 60);
        let bob_account = ledger.account(&bob, &fau()).unwrap();
        assert_eq!(bob_account.credits_posted, 40);
        assert_eq!(bob_account.code, AccountType::Participant.code());
        assert_eq!(bob_account.ledger, LEDGER_CHERT);
    }

    #[test]
    fn test_linked_push_is_all_or_nothing() {
        let mut ledger = InMemoryLedger::new();
        let operator = Identity::new("operator");
        let alice = Identity::new("alice");
        let link = AssetId::new("LINK");

        ledger.faucet(&operator, &fau(), 10).unwrap();
        ledger.approve(&operator, &fau(), 10);
        ledger
            .pull(TransferType::RewardInjection, &operator, &fau(), 10)
            .unwrap();

        // Custody holds no LINK, so the second leg cannot post.
        let payouts = vec![
            Payout { asset: fau(), amount: 5 },
            Payout { asset: link.clone(), amount: 5 },
        ];
        let result = ledger.push_linked(TransferType::RewardPayout, &alice, &payouts);

        assert!(matches!(result, Err(TransferError::InsufficientBalance { .. })));
        assert_eq!(ledger.balance_of(&alice, &fau()), 0);
        assert_eq!(ledger.custody_balance(&fau()), 10);
    }

    #[test]
    fn test_injected_push_failure_fires_once() {
        let mut ledger = InMemoryLedger::new();
        let alice = Identity::new("alice");
        ledger.faucet(&alice, &fau(), 10).unwrap();
        ledger.approve(&alice, &fau(), 10);
        ledger
            .pull(TransferType::StakeDeposit, &alice, &fau(), 10)
            .unwrap();

        ledger.fail_next_push();
        assert!(ledger
            .push(TransferType::PrincipalWithdrawal, &alice, &fau(), 10)
            .is_err());
        assert!(ledger
            .push(TransferType::PrincipalWithdrawal, &alice, &fau(), 10)
            .is_ok());
        assert_eq!(ledger.balance_of(&alice, &fau()), 10);
    }

    #[test]
    fn test_faucet_overflow_leaves_mint_untouched() {
        let mut ledger = InMemoryLedger::new();
        let alice = Identity::new("alice");
        ledger.faucet(&alice, &fau(), u128::MAX).unwrap();

        let result = ledger.faucet(&alice, &fau(), 1);

        assert!(matches!(result, Err(TransferError::Rejected(_))));
        assert_eq!(ledger.balance_of(&alice, &fau()), u128::MAX);
        assert_eq!(ledger.balance(AccountIds::MINT, &fau()), 0);
        assert_eq!(ledger.transfers().len(), 1);
    }

    #[test]
    fn test_transfer_history_records_codes() {
        let mut ledger = InMemoryLedger::new();
        let alice = Identity::new("alice");
        ledger.faucet(&alice, &fau(), 10).unwrap();
        ledger.approve(&alice, &fau(), 10);
        ledger
            .pull(TransferType::StakeDeposit, &alice, &fau(), 10)
            .unwrap();

        let codes: Vec<u16> = ledger.transfers().iter().map(|t| t.code).collect();
        assert_eq!(
            codes,
            vec![TransferType::Faucet.code(), TransferType::StakeDeposit.code()]
        );
        assert_ne!(ledger.transfers()[0].id, ledger.transfers()[1].id);
    }
}
