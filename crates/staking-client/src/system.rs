//! System program instructions used by the staking client.

use crate::address::Pubkey;
use crate::transaction::{AccountMeta, Instruction};

/// The System Program public key: 32 zero bytes.
/// Base58: `11111111111111111111111111111111`
pub const SYSTEM_PROGRAM_ID: Pubkey = [0u8; 32];

/// Rent sysvar: `SysvarRent111111111111111111111111111111111`
pub const SYSVAR_RENT_ID: Pubkey = [
    0x06, 0xa7, 0xd5, 0x17, 0x19, 0x2c, 0x5c, 0x51, 0x21, 0x8c, 0xc9, 0x4c, 0x3d, 0x4a, 0xf1, 0x7f,
    0x58, 0xda, 0xee, 0x08, 0x9b, 0xa1, 0xfd, 0x44, 0xe3, 0xdb, 0xd9, 0x8a, 0x00, 0x00, 0x00, 0x00,
];

/// System Program `CreateAccountWithSeed` instruction index.
const CREATE_ACCOUNT_WITH_SEED_IX_INDEX: u32 = 3;

/// Build a System Program `CreateAccountWithSeed` instruction.
///
/// Allocates `space` bytes at `new_account` (which must equal
/// `create_with_seed(base, seed, owner)`), funds it with `lamports` from
/// `from`, and assigns it to `owner`.
///
/// Data (bincode): u32 LE index, base, u64 LE seed length, seed bytes,
/// u64 LE lamports, u64 LE space, owner.
pub fn build_create_account_with_seed(
    from: &Pubkey,
    new_account: &Pubkey,
    base: &Pubkey,
    seed: &str,
    lamports: u64,
    space: u64,
    owner: &Pubkey,
) -> Instruction {
    let mut data = Vec::with_capacity(4 + 32 + 8 + seed.len() + 8 + 8 + 32);
    data.extend_from_slice(&CREATE_ACCOUNT_WITH_SEED_IX_INDEX.to_le_bytes());
    data.extend_from_slice(base);
    data.extend_from_slice(&(seed.len() as u64).to_le_bytes());
    data.extend_from_slice(seed.as_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    data.extend_from_slice(&space.to_le_bytes());
    data.extend_from_slice(owner);

    Instruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![
            AccountMeta::writable(*from, true),
            AccountMeta::writable(*new_account, false),
            AccountMeta::readonly(*base, true),
        ],
        data,
    }
}
