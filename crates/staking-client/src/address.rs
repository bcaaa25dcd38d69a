//! Address encoding.
//!
//! Every account, mint and program on the ledger is a 32-byte key shown to
//! humans as Base58. Program-derived addresses use the same representation;
//! they simply have no private key.

use crate::error::StakingError;

/// A raw 32-byte ledger address.
pub type Pubkey = [u8; 32];

/// Encode a 32-byte address as Base58.
pub fn to_base58(key: &Pubkey) -> String {
    bs58::encode(key).into_string()
}

/// Decode a Base58 address into its 32-byte form.
///
/// Fails if the string is not Base58 or does not decode to exactly 32 bytes.
pub fn parse_pubkey(address: &str) -> Result<Pubkey, StakingError> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| StakingError::InvalidAddress(format!("base58 decode failed: {e}")))?;

    let arr: Pubkey = bytes.try_into().map_err(|v: Vec<u8>| {
        StakingError::InvalidAddress(format!("expected 32 bytes, got {}", v.len()))
    })?;

    Ok(arr)
}

/// Read a 32-byte address out of `data` at `offset`.
pub(crate) fn read_pubkey(data: &[u8], offset: usize) -> Result<Pubkey, StakingError> {
    data.get(offset..offset + 32)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| {
            StakingError::MalformedAccount(format!(
                "need 32 bytes at offset {offset}, account has {}",
                data.len()
            ))
        })
}
