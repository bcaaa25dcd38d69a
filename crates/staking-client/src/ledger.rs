//! Read access to the ledger.
//!
//! [`LedgerReader`] is the only capability the client consumes: fetch raw
//! account bytes, and scan a program's accounts by filter. An RPC client
//! implements it in production; [`MemoryLedger`] backs tests and dry runs.
//!
//! Each top-level operation reads through a [`LedgerSnapshot`], which
//! memoizes every address it has seen so a derived address is never read
//! twice (and never observed in two different states) within one operation.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::address::{to_base58, Pubkey};
use crate::error::StakingError;

/// Bytes charged on top of the data length when computing rent.
const ACCOUNT_STORAGE_OVERHEAD: u64 = 128;
/// Default cluster rent rate.
const LAMPORTS_PER_BYTE_YEAR: u64 = 3480;
/// Years of rent an account must hold to be exempt.
const EXEMPTION_THRESHOLD_YEARS: u64 = 2;

/// Rent-exempt minimum balance under the default cluster rent parameters.
pub fn rent_exempt_minimum(data_len: usize) -> u64 {
    (ACCOUNT_STORAGE_OVERHEAD + data_len as u64)
        * LAMPORTS_PER_BYTE_YEAR
        * EXEMPTION_THRESHOLD_YEARS
}

/// An account as stored on the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAccount {
    /// Program that owns the account.
    pub owner: Pubkey,
    pub data: Vec<u8>,
}

/// Server-side filter for program account scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountFilter {
    /// Account data length equals this exactly.
    DataSize(usize),
    /// Account data at `offset` starts with `bytes`.
    Memcmp { offset: usize, bytes: Vec<u8> },
}

impl AccountFilter {
    pub fn matches(&self, data: &[u8]) -> bool {
        match self {
            AccountFilter::DataSize(len) => data.len() == *len,
            AccountFilter::Memcmp { offset, bytes } => data
                .get(*offset..offset + bytes.len())
                .is_some_and(|window| window == bytes.as_slice()),
        }
    }
}

/// Read-only ledger capability.
pub trait LedgerReader {
    /// Fetch one account. `Ok(None)` means the account does not exist.
    fn get_account(&self, address: &Pubkey) -> Result<Option<LedgerAccount>, StakingError>;

    /// Fetch several accounts, ideally in one round trip so all results
    /// come from the same ledger state. Results follow `addresses` order.
    fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<LedgerAccount>>, StakingError> {
        addresses.iter().map(|a| self.get_account(a)).collect()
    }

    /// All accounts owned by `program_id` that pass every filter.
    fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<(Pubkey, LedgerAccount)>, StakingError>;

    fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64, StakingError> {
        Ok(rent_exempt_minimum(data_len))
    }
}

impl<L: LedgerReader + ?Sized> LedgerReader for &L {
    fn get_account(&self, address: &Pubkey) -> Result<Option<LedgerAccount>, StakingError> {
        (**self).get_account(address)
    }

    fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<LedgerAccount>>, StakingError> {
        (**self).get_multiple_accounts(addresses)
    }

    fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<(Pubkey, LedgerAccount)>, StakingError> {
        (**self).get_program_accounts(program_id, filters)
    }

    fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64, StakingError> {
        (**self).minimum_balance_for_rent_exemption(data_len)
    }
}

/// A per-operation view of the ledger.
///
/// The first read of an address is cached, including absence. Later reads
/// of the same address inside the operation return the cached result.
pub struct LedgerSnapshot<'a, L: LedgerReader + ?Sized> {
    ledger: &'a L,
    seen: RefCell<HashMap<Pubkey, Option<LedgerAccount>>>,
}

impl<'a, L: LedgerReader + ?Sized> LedgerSnapshot<'a, L> {
    pub fn new(ledger: &'a L) -> Self {
        Self {
            ledger,
            seen: RefCell::new(HashMap::new()),
        }
    }

    /// Load every address not yet seen in a single batched read.
    pub fn prefetch(&self, addresses: &[Pubkey]) -> Result<(), StakingError> {
        let mut missing: Vec<Pubkey> = Vec::new();
        {
            let seen = self.seen.borrow();
            for address in addresses {
                if !seen.contains_key(address) && !missing.contains(address) {
                    missing.push(*address);
                }
            }
        }
        if missing.is_empty() {
            return Ok(());
        }

        let fetched = self.ledger.get_multiple_accounts(&missing)?;
        if fetched.len() != missing.len() {
            return Err(StakingError::Ledger(format!(
                "asked for {} accounts, ledger returned {}",
                missing.len(),
                fetched.len()
            )));
        }

        let mut seen = self.seen.borrow_mut();
        for (address, account) in missing.into_iter().zip(fetched) {
            debug!(
                address = %to_base58(&address),
                exists = account.is_some(),
                "ledger read"
            );
            seen.insert(address, account);
        }
        Ok(())
    }

    pub fn account(&self, address: &Pubkey) -> Result<Option<LedgerAccount>, StakingError> {
        self.prefetch(std::slice::from_ref(address))?;
        Ok(self.seen.borrow().get(address).cloned().flatten())
    }

    pub fn exists(&self, address: &Pubkey) -> Result<bool, StakingError> {
        self.prefetch(std::slice::from_ref(address))?;
        Ok(matches!(self.seen.borrow().get(address), Some(Some(_))))
    }

    /// The account at `address`, or `AccountNotFound` naming `what`.
    pub fn require(&self, address: &Pubkey, what: &str) -> Result<LedgerAccount, StakingError> {
        self.account(address)?.ok_or_else(|| {
            StakingError::AccountNotFound(format!("{what} {}", to_base58(address)))
        })
    }

    pub fn ledger(&self) -> &'a L {
        self.ledger
    }
}

/// An in-memory ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    accounts: BTreeMap<Pubkey, LedgerAccount>,
    reads: Cell<usize>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_account(&mut self, address: Pubkey, owner: Pubkey, data: Vec<u8>) {
        self.accounts.insert(address, LedgerAccount { owner, data });
    }

    pub fn remove_account(&mut self, address: &Pubkey) -> Option<LedgerAccount> {
        self.accounts.remove(address)
    }

    /// Number of round trips served so far.
    pub fn read_count(&self) -> usize {
        self.reads.get()
    }

    fn count_read(&self) {
        self.reads.set(self.reads.get() + 1);
    }
}

impl LedgerReader for MemoryLedger {
    fn get_account(&self, address: &Pubkey) -> Result<Option<LedgerAccount>, StakingError> {
        self.count_read();
        Ok(self.accounts.get(address).cloned())
    }

    fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
    ) -> Result<Vec<Option<LedgerAccount>>, StakingError> {
        self.count_read();
        Ok(addresses
            .iter()
            .map(|a| self.accounts.get(a).cloned())
            .collect())
    }

    fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<(Pubkey, LedgerAccount)>, StakingError> {
        self.count_read();
        Ok(self
            .accounts
            .iter()
            .filter(|(_, acc)| acc.owner == *program_id)
            .filter(|(_, acc)| filters.iter().all(|f| f.matches(&acc.data)))
            .map(|(k, acc)| (*k, acc.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingLedger;

    impl LedgerReader for FailingLedger {
        fn get_account(&self, _: &Pubkey) -> Result<Option<LedgerAccount>, StakingError> {
            Err(StakingError::Ledger("node unavailable".into()))
        }

        fn get_program_accounts(
            &self,
            _: &Pubkey,
            _: &[AccountFilter],
        ) -> Result<Vec<(Pubkey, LedgerAccount)>, StakingError> {
            Err(StakingError::Ledger("node unavailable".into()))
        }
    }

    #[test]
    fn rent_for_user_pool() {
        assert_eq!(rent_exempt_minimum(5648), 40_200_960);
        assert_eq!(rent_exempt_minimum(0), 890_880);
    }

    #[test]
    fn memcmp_filter() {
        let f = AccountFilter::Memcmp {
            offset: 2,
            bytes: vec![7, 8],
        };
        assert!(f.matches(&[0, 0, 7, 8, 9]));
        assert!(!f.matches(&[0, 0, 7, 9]));
        assert!(!f.matches(&[0, 0, 7]));
    }

    #[test]
    fn program_scan_applies_owner_and_filters() {
        let program = [1u8; 32];
        let mut ledger = MemoryLedger::new();
        ledger.set_account([10u8; 32], program, vec![0u8; 4]);
        ledger.set_account([11u8; 32], program, vec![0u8; 5]);
        ledger.set_account([12u8; 32], [2u8; 32], vec![0u8; 4]);

        let found = ledger
            .get_program_accounts(&program, &[AccountFilter::DataSize(4)])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, [10u8; 32]);
    }

    #[test]
    fn snapshot_reads_each_address_once() {
        let mut ledger = MemoryLedger::new();
        ledger.set_account([1u8; 32], [0u8; 32], vec![1, 2, 3]);
        let snapshot = LedgerSnapshot::new(&ledger);

        assert!(snapshot.exists(&[1u8; 32]).unwrap());
        assert!(!snapshot.exists(&[2u8; 32]).unwrap());
        assert_eq!(
            snapshot.account(&[1u8; 32]).unwrap().unwrap().data,
            vec![1, 2, 3]
        );
        assert!(snapshot.account(&[2u8; 32]).unwrap().is_none());
        assert_eq!(ledger.read_count(), 2);
    }

    #[test]
    fn prefetch_batches_unseen_addresses() {
        let ledger = MemoryLedger::new();
        let snapshot = LedgerSnapshot::new(&ledger);

        snapshot
            .prefetch(&[[1u8; 32], [2u8; 32], [1u8; 32]])
            .unwrap();
        snapshot.prefetch(&[[2u8; 32]]).unwrap();
        assert_eq!(ledger.read_count(), 1);
    }

    #[test]
    fn require_reports_missing_account() {
        let ledger = MemoryLedger::new();
        let snapshot = LedgerSnapshot::new(&ledger);
        let err = snapshot.require(&[0u8; 32], "reward vault").unwrap_err();
        assert!(matches!(err, StakingError::AccountNotFound(_)));
        assert!(err.to_string().contains("reward vault"));
    }

    #[test]
    fn read_failures_propagate() {
        let snapshot = LedgerSnapshot::new(&FailingLedger);
        let err = snapshot.exists(&[0u8; 32]).unwrap_err();
        assert!(matches!(err, StakingError::Ledger(_)));
    }
}
