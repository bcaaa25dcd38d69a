//! Locate the account that holds an NFT and decide whether the caller may
//! stake it.

use tracing::{debug, warn};

use crate::address::{read_pubkey, to_base58, Pubkey};
use crate::derive::{derive_associated_token_address, derive_metadata_address};
use crate::error::StakingError;
use crate::ledger::{AccountFilter, LedgerReader, LedgerSnapshot};
use crate::spl_token::{TokenAccount, TOKEN_ACCOUNT_LEN, TOKEN_MINT_OFFSET, TOKEN_PROGRAM_ID};

/// Offset of `mint` in a token metadata record: key (1) + update_authority (32).
const METADATA_MINT_OFFSET: usize = 33;

/// Where an NFT currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NftHolding {
    /// Token account with a balance of one.
    pub account: Pubkey,
    /// The token account's owner, i.e. the NFT's beneficial owner.
    pub owner: Pubkey,
}

/// Find the token account holding `mint`.
///
/// Scans the token program for accounts of `mint` with a balance of one.
/// If more than one matches, the mint's metadata record must exist and
/// name this mint, and a holder owned by one of `preferred` (in order)
/// wins; otherwise the lowest address does.
pub fn resolve_nft_account<L: LedgerReader + ?Sized>(
    snapshot: &LedgerSnapshot<'_, L>,
    mint: &Pubkey,
    preferred: &[Pubkey],
) -> Result<NftHolding, StakingError> {
    let filters = [
        AccountFilter::DataSize(TOKEN_ACCOUNT_LEN),
        AccountFilter::Memcmp {
            offset: TOKEN_MINT_OFFSET,
            bytes: mint.to_vec(),
        },
    ];
    let scanned = snapshot
        .ledger()
        .get_program_accounts(&TOKEN_PROGRAM_ID, &filters)?;

    let mut holders = Vec::new();
    for (address, account) in scanned {
        let token = TokenAccount::decode(&account.data)?;
        if token.mint == *mint && token.amount == 1 {
            holders.push(NftHolding {
                account: address,
                owner: token.owner,
            });
        }
    }
    holders.sort_by(|a, b| a.account.cmp(&b.account));

    match holders.len() {
        0 => Err(StakingError::AccountNotFound(format!(
            "no token account holds nft {}",
            to_base58(mint)
        ))),
        1 => Ok(holders[0]),
        n => {
            debug!(mint = %to_base58(mint), holders = n, "ambiguous nft holder");
            check_metadata(snapshot, mint)?;
            let chosen = preferred
                .iter()
                .find_map(|owner| holders.iter().find(|h| h.owner == *owner))
                .unwrap_or(&holders[0]);
            Ok(*chosen)
        }
    }
}

fn check_metadata<L: LedgerReader + ?Sized>(
    snapshot: &LedgerSnapshot<'_, L>,
    mint: &Pubkey,
) -> Result<(), StakingError> {
    let address = derive_metadata_address(mint)?;
    let metadata = snapshot.require(&address, "nft metadata")?;
    let recorded = read_pubkey(&metadata.data, METADATA_MINT_OFFSET)?;
    if recorded != *mint {
        return Err(StakingError::MalformedAccount(format!(
            "metadata {} names mint {}, expected {}",
            to_base58(&address),
            to_base58(&recorded),
            to_base58(mint)
        )));
    }
    Ok(())
}

/// The token account a stake of `mint` by `caller` should draw from.
///
/// The caller's associated account is used when it exists. Otherwise the
/// NFT is located: a holder owned by the caller is used directly; a holder
/// owned by `custody` (already staked) keeps the associated account and
/// lets the program reject it; anyone else fails with `NotOwnedByCaller`.
pub fn stake_source_account<L: LedgerReader + ?Sized>(
    snapshot: &LedgerSnapshot<'_, L>,
    caller: &Pubkey,
    custody: &Pubkey,
    mint: &Pubkey,
) -> Result<Pubkey, StakingError> {
    let default = derive_associated_token_address(caller, mint)?;
    if snapshot.exists(&default)? {
        return Ok(default);
    }

    let holding = resolve_nft_account(snapshot, mint, &[*caller, *custody])?;
    if holding.account == default || holding.owner == *caller {
        return Ok(holding.account);
    }
    if holding.owner == *custody {
        warn!(
            mint = %to_base58(mint),
            holder = %to_base58(&holding.account),
            "nft is held by staking custody, keeping associated account"
        );
        return Ok(default);
    }

    Err(StakingError::NotOwnedByCaller {
        mint: to_base58(mint),
        caller: to_base58(caller),
        holder: to_base58(&holding.owner),
    })
}
