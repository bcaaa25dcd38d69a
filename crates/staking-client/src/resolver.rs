//! Find or create associated token accounts.

use tracing::debug;

use crate::address::{to_base58, Pubkey};
use crate::derive::derive_associated_token_address;
use crate::error::StakingError;
use crate::ledger::{LedgerReader, LedgerSnapshot};
use crate::spl_token::build_create_associated_token_account;
use crate::transaction::Instruction;

/// Token accounts for one owner, with creation instructions for the ones
/// missing from the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAccounts {
    /// One `Create` per missing account, in `mints` order.
    pub instructions: Vec<Instruction>,
    /// `addresses[i]` holds `mints[i]`.
    pub addresses: Vec<Pubkey>,
}

/// Derive `owner`'s associated token account for each of `mints` and emit
/// a creation instruction, funded by `payer`, for every one that does not
/// exist yet.
///
/// All addresses are read in one batch. Not idempotent across calls: two
/// calls before the first creation lands both emit the creation, so an
/// operation resolves each account once.
pub fn resolve_or_create<L: LedgerReader + ?Sized>(
    snapshot: &LedgerSnapshot<'_, L>,
    owner: &Pubkey,
    payer: &Pubkey,
    mints: &[Pubkey],
) -> Result<ResolvedAccounts, StakingError> {
    let addresses = mints
        .iter()
        .map(|mint| derive_associated_token_address(owner, mint))
        .collect::<Result<Vec<_>, _>>()?;
    snapshot.prefetch(&addresses)?;

    let mut instructions = Vec::new();
    for (mint, address) in mints.iter().zip(&addresses) {
        if snapshot.exists(address)? {
            continue;
        }
        debug!(
            owner = %to_base58(owner),
            mint = %to_base58(mint),
            ata = %to_base58(address),
            "token account missing, creating"
        );
        instructions.push(build_create_associated_token_account(
            payer, address, owner, mint,
        ));
    }

    Ok(ResolvedAccounts {
        instructions,
        addresses,
    })
}

/// Single-mint form of [`resolve_or_create`].
pub fn resolve_one<L: LedgerReader + ?Sized>(
    snapshot: &LedgerSnapshot<'_, L>,
    owner: &Pubkey,
    payer: &Pubkey,
    mint: &Pubkey,
) -> Result<(Option<Instruction>, Pubkey), StakingError> {
    let mut resolved = resolve_or_create(snapshot, owner, payer, std::slice::from_ref(mint))?;
    let address = resolved.addresses[0];
    Ok((resolved.instructions.pop(), address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::spl_token::{ASSOCIATED_TOKEN_PROGRAM_ID, TOKEN_PROGRAM_ID};

    const OWNER: Pubkey = [0x11; 32];
    const PAYER: Pubkey = [0x22; 32];

    #[test]
    fn output_order_follows_input() {
        let mints = [[3u8; 32], [1u8; 32], [2u8; 32]];
        let ledger = MemoryLedger::new();
        let snapshot = LedgerSnapshot::new(&ledger);

        let resolved = resolve_or_create(&snapshot, &OWNER, &PAYER, &mints).unwrap();

        assert_eq!(resolved.addresses.len(), 3);
        for (mint, address) in mints.iter().zip(&resolved.addresses) {
            assert_eq!(
                *address,
                derive_associated_token_address(&OWNER, mint).unwrap()
            );
        }
        assert_eq!(resolved.instructions.len(), 3);
        assert_eq!(resolved.instructions[1].accounts[1].pubkey, resolved.addresses[1]);
    }

    #[test]
    fn only_missing_accounts_are_created() {
        let mints = [[1u8; 32], [2u8; 32]];
        let existing = derive_associated_token_address(&OWNER, &mints[0]).unwrap();
        let mut ledger = MemoryLedger::new();
        ledger.set_account(existing, TOKEN_PROGRAM_ID, vec![0u8; 165]);
        let snapshot = LedgerSnapshot::new(&ledger);

        let resolved = resolve_or_create(&snapshot, &OWNER, &PAYER, &mints).unwrap();

        assert_eq!(resolved.addresses[0], existing);
        assert_eq!(resolved.instructions.len(), 1);
        let create = &resolved.instructions[0];
        assert_eq!(create.program_id, ASSOCIATED_TOKEN_PROGRAM_ID);
        assert_eq!(create.accounts[0].pubkey, PAYER);
        assert_eq!(create.accounts[1].pubkey, resolved.addresses[1]);
        assert_eq!(create.accounts[2].pubkey, OWNER);
        assert_eq!(create.accounts[3].pubkey, mints[1]);
    }

    #[test]
    fn one_batched_read() {
        let ledger = MemoryLedger::new();
        let snapshot = LedgerSnapshot::new(&ledger);
        resolve_or_create(&snapshot, &OWNER, &PAYER, &[[1u8; 32], [2u8; 32], [3u8; 32]]).unwrap();
        assert_eq!(ledger.read_count(), 1);
    }

    #[test]
    fn empty_mint_set() {
        let ledger = MemoryLedger::new();
        let snapshot = LedgerSnapshot::new(&ledger);
        let resolved = resolve_or_create(&snapshot, &OWNER, &PAYER, &[]).unwrap();
        assert_eq!(resolved, ResolvedAccounts::default());
    }

    #[test]
    fn repeated_calls_emit_duplicate_creates() {
        let ledger = MemoryLedger::new();
        let snapshot = LedgerSnapshot::new(&ledger);
        let (first, a) = resolve_one(&snapshot, &OWNER, &PAYER, &[9u8; 32]).unwrap();
        let (second, b) = resolve_one(&snapshot, &OWNER, &PAYER, &[9u8; 32]).unwrap();
        assert_eq!(a, b);
        assert!(first.is_some() && second.is_some());
    }
}
