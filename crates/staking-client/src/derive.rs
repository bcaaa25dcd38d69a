//! Deterministic address derivation.
//!
//! Program-derived addresses (PDAs) are SHA-256 hashes of
//! `seeds || bump || program_id || "ProgramDerivedAddress"` that do not land
//! on the Ed25519 curve, so no private key can exist for them. The staking
//! program owns two of them (the global authority and one vault per user);
//! token-holding accounts are PDAs of the associated token account program.
//!
//! The per-user pool is not a PDA: it is created with
//! `CreateAccountWithSeed`, whose address is `SHA-256(base || seed || owner)`.

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::address::{to_base58, Pubkey};
use crate::error::StakingError;
use crate::spl_token::{ASSOCIATED_TOKEN_PROGRAM_ID, TOKEN_METADATA_PROGRAM_ID, TOKEN_PROGRAM_ID};

/// The string appended to PDA derivation: "ProgramDerivedAddress".
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Maximum length of a single PDA seed.
pub const MAX_SEED_LEN: usize = 32;

/// Maximum number of seeds, including the bump.
pub const MAX_SEEDS: usize = 16;

/// Seed prefix of Metaplex metadata accounts.
const METADATA_SEED: &[u8] = b"metadata";

/// Find a valid Program Derived Address (PDA) for the given seeds and program.
///
/// Iterates bump seeds from 255 down to 0 and returns the first address that
/// is NOT a valid Ed25519 point, together with the bump that produced it.
pub fn find_program_address(
    seeds: &[&[u8]],
    program_id: &Pubkey,
) -> Result<(Pubkey, u8), StakingError> {
    check_seeds(seeds)?;

    for bump in (0u8..=255).rev() {
        if let Some(address) = try_create_program_address(seeds, &[bump], program_id) {
            return Ok((address, bump));
        }
    }

    Err(StakingError::AddressDerivationExhausted(format!(
        "no bump seed yields an off-curve address for program {}",
        to_base58(program_id)
    )))
}

/// Compute the address for an explicit bump seed.
///
/// Returns `None` when the hash lands on the curve.
pub fn create_program_address(
    seeds: &[&[u8]],
    bump: u8,
    program_id: &Pubkey,
) -> Result<Option<Pubkey>, StakingError> {
    check_seeds(seeds)?;
    Ok(try_create_program_address(seeds, &[bump], program_id))
}

/// Address of an account created with `CreateAccountWithSeed`.
///
/// `SHA-256(base || seed || owner)`. No curve check applies.
pub fn create_with_seed(base: &Pubkey, seed: &str, owner: &Pubkey) -> Result<Pubkey, StakingError> {
    if seed.len() > MAX_SEED_LEN {
        return Err(StakingError::InvalidAddress(format!(
            "seed \"{seed}\" exceeds {MAX_SEED_LEN} bytes"
        )));
    }

    let mut hasher = Sha256::new();
    hasher.update(base);
    hasher.update(seed.as_bytes());
    hasher.update(owner);
    Ok(hasher.finalize().into())
}

/// Derive the associated token account address for an owner + mint pair.
///
/// Seeds: `[owner, token_program_id, mint]` under the associated token
/// account program.
pub fn derive_associated_token_address(
    owner: &Pubkey,
    mint: &Pubkey,
) -> Result<Pubkey, StakingError> {
    let (address, _bump) = find_program_address(
        &[owner.as_ref(), &TOKEN_PROGRAM_ID, mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )?;
    debug!(
        owner = %to_base58(owner),
        mint = %to_base58(mint),
        ata = %to_base58(&address),
        "derived associated token account"
    );
    Ok(address)
}

/// Derive the Metaplex metadata account of `mint`.
pub fn derive_metadata_address(mint: &Pubkey) -> Result<Pubkey, StakingError> {
    find_program_address(
        &[METADATA_SEED, &TOKEN_METADATA_PROGRAM_ID, mint.as_ref()],
        &TOKEN_METADATA_PROGRAM_ID,
    )
    .map(|(address, _bump)| address)
}

fn check_seeds(seeds: &[&[u8]]) -> Result<(), StakingError> {
    // One slot is reserved for the bump.
    if seeds.len() >= MAX_SEEDS {
        return Err(StakingError::InvalidAddress(format!(
            "{} seeds given, at most {} allowed",
            seeds.len(),
            MAX_SEEDS - 1
        )));
    }
    if let Some(seed) = seeds.iter().find(|s| s.len() > MAX_SEED_LEN) {
        return Err(StakingError::InvalidAddress(format!(
            "seed of {} bytes exceeds {MAX_SEED_LEN}",
            seed.len()
        )));
    }
    Ok(())
}

fn try_create_program_address(
    seeds: &[&[u8]],
    bump_seed: &[u8],
    program_id: &Pubkey,
) -> Option<Pubkey> {
    let mut hasher = Sha256::new();

    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(bump_seed);
    hasher.update(program_id);
    hasher.update(PDA_MARKER);

    let hash: Pubkey = hasher.finalize().into();

    if is_on_curve(&hash) {
        return None;
    }

    Some(hash)
}

/// Check if 32 bytes decompress to an Ed25519 curve point.
pub(crate) fn is_on_curve(bytes: &Pubkey) -> bool {
    curve25519_dalek::edwards::CompressedEdwardsY(*bytes)
        .decompress()
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::parse_pubkey;

    #[test]
    fn pda_is_not_on_curve() {
        let (pda, _) = find_program_address(&[b"global-authority"], &[0x15u8; 32]).unwrap();
        assert!(!is_on_curve(&pda));
    }

    #[test]
    fn pda_derivation_is_deterministic() {
        let program = [0x33u8; 32];
        let owner = [0x44u8; 32];
        let a = find_program_address(&[b"vault-seed", &owner], &program).unwrap();
        let b = find_program_address(&[b"vault-seed", &owner], &program).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn returned_bump_recreates_address() {
        let program = [0x21u8; 32];
        let (pda, bump) = find_program_address(&[b"global-authority"], &program).unwrap();
        let again = create_program_address(&[b"global-authority"], bump, &program).unwrap();
        assert_eq!(again, Some(pda));
    }

    #[test]
    fn higher_bumps_than_canonical_land_on_curve() {
        let program = [0x5au8; 32];
        let (_, bump) = find_program_address(&[b"seed"], &program).unwrap();
        for higher in bump.saturating_add(1)..=255 {
            if higher == bump {
                continue;
            }
            assert_eq!(
                create_program_address(&[b"seed"], higher, &program).unwrap(),
                None
            );
        }
    }

    #[test]
    fn different_seeds_give_different_addresses() {
        let program = [0x01u8; 32];
        let (a, _) = find_program_address(&[b"vault-seed", &[1u8; 32]], &program).unwrap();
        let (b, _) = find_program_address(&[b"vault-seed", &[2u8; 32]], &program).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn oversized_seed_is_rejected() {
        let long = [0u8; 33];
        let err = find_program_address(&[&long], &[0u8; 32]).unwrap_err();
        assert!(matches!(err, StakingError::InvalidAddress(_)));
    }

    #[test]
    fn too_many_seeds_are_rejected() {
        let seeds: Vec<&[u8]> = vec![b"s"; MAX_SEEDS];
        assert!(find_program_address(&seeds, &[0u8; 32]).is_err());
    }

    #[test]
    fn ata_differs_per_owner_and_mint() {
        let mint = [0xFFu8; 32];
        let a = derive_associated_token_address(&[1u8; 32], &mint).unwrap();
        let b = derive_associated_token_address(&[2u8; 32], &mint).unwrap();
        let c = derive_associated_token_address(&[1u8; 32], &[0xEEu8; 32]).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(!is_on_curve(&a));
    }

    #[test]
    fn create_with_seed_known_vector() {
        let program = parse_pubkey("2RbwYVj8gmYf8TRNukd34fGJgT7X4X4K3t6gLGwJkNQD").unwrap();
        let address = create_with_seed(&[0x11u8; 32], "user-pool", &program).unwrap();
        let expected: Pubkey = [
            0x04, 0xff, 0x54, 0xde, 0x7f, 0x4b, 0x79, 0xbc, 0xe3, 0x0e, 0x32, 0xe1, 0x44, 0x74,
            0xe2, 0x79, 0x24, 0x9e, 0xae, 0xbe, 0x7d, 0x0e, 0x1f, 0xba, 0x3a, 0x59, 0x23, 0xbf,
            0x3c, 0xed, 0xfd, 0xf2,
        ];
        assert_eq!(address, expected);
    }

    #[test]
    fn create_with_seed_rejects_long_seed() {
        let seed = "x".repeat(33);
        assert!(create_with_seed(&[0u8; 32], &seed, &[0u8; 32]).is_err());
    }

    #[test]
    fn metadata_address_is_off_curve() {
        let md = derive_metadata_address(&[0x42u8; 32]).unwrap();
        assert!(!is_on_curve(&md));
    }

    #[test]
    fn is_on_curve_accepts_basepoint() {
        let mut basepoint = [0x66u8; 32];
        basepoint[0] = 0x58;
        assert!(is_on_curve(&basepoint));
    }
}
