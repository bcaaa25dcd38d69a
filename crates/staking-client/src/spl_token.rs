//! SPL Token and associated-token-account plumbing.
//!
//! Program ids, the associated token account `Create` instruction, and a
//! decoder for the fixed 165-byte SPL token account layout. Only the fields
//! the staking client reads (mint, owner, amount) are decoded.

use crate::address::{read_pubkey, Pubkey};
use crate::error::StakingError;
use crate::system::SYSTEM_PROGRAM_ID;
use crate::transaction::{AccountMeta, Instruction};

/// SPL Token Program ID: `TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`
pub const TOKEN_PROGRAM_ID: Pubkey = [
    0x06, 0xdd, 0xf6, 0xe1, 0xd7, 0x65, 0xa1, 0x93, 0xd9, 0xcb, 0xe1, 0x46, 0xce, 0xeb, 0x79, 0xac,
    0x1c, 0xb4, 0x85, 0xed, 0x5f, 0x5b, 0x37, 0x91, 0x3a, 0x8c, 0xf5, 0x85, 0x7e, 0xff, 0x00, 0xa9,
];

/// Associated Token Account Program ID: `ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL`
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey = [
    0x8c, 0x97, 0x25, 0x8f, 0x4e, 0x24, 0x89, 0xf1, 0xbb, 0x3d, 0x10, 0x29, 0x14, 0x8e, 0x0d, 0x83,
    0x0b, 0x5a, 0x13, 0x99, 0xda, 0xff, 0x10, 0x84, 0x04, 0x8e, 0x7b, 0xd8, 0xdb, 0xe9, 0xf8, 0x59,
];

/// Metaplex Token Metadata Program ID: `metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s`
pub const TOKEN_METADATA_PROGRAM_ID: Pubkey = [
    0x0b, 0x70, 0x65, 0xb1, 0xe3, 0xd1, 0x7c, 0x45, 0x38, 0x9d, 0x52, 0x7f, 0x6b, 0x04, 0xc3, 0xcd,
    0x58, 0xb8, 0x6c, 0x73, 0x1a, 0xa0, 0xfd, 0xb5, 0x49, 0xb6, 0xd1, 0xbc, 0x03, 0xf8, 0x29, 0x46,
];

/// Size of an SPL token account.
pub const TOKEN_ACCOUNT_LEN: usize = 165;

/// Offset of the mint inside an SPL token account.
pub const TOKEN_MINT_OFFSET: usize = 0;

const OWNER_OFFSET: usize = 32;
const AMOUNT_OFFSET: usize = 64;

/// The decoded head of an SPL token account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccount {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
}

impl TokenAccount {
    /// Decode a raw SPL token account.
    pub fn decode(data: &[u8]) -> Result<Self, StakingError> {
        if data.len() < TOKEN_ACCOUNT_LEN {
            return Err(StakingError::MalformedAccount(format!(
                "token account is {} bytes, expected {TOKEN_ACCOUNT_LEN}",
                data.len()
            )));
        }

        let mut amount = [0u8; 8];
        amount.copy_from_slice(&data[AMOUNT_OFFSET..AMOUNT_OFFSET + 8]);

        Ok(Self {
            mint: read_pubkey(data, TOKEN_MINT_OFFSET)?,
            owner: read_pubkey(data, OWNER_OFFSET)?,
            // Native SPL layout, not the staking program's reversed fields.
            amount: u64::from_le_bytes(amount),
        })
    }
}

/// Build an associated token account `Create` instruction.
///
/// `payer` funds the rent; the new account at `ata` holds `mint` on behalf
/// of `owner`. Data is empty (instruction 0, non-idempotent).
pub fn build_create_associated_token_account(
    payer: &Pubkey,
    ata: &Pubkey,
    owner: &Pubkey,
    mint: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::writable(*payer, true),
            AccountMeta::writable(*ata, false),
            AccountMeta::readonly(*owner, false),
            AccountMeta::readonly(*mint, false),
            AccountMeta::readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::readonly(TOKEN_PROGRAM_ID, false),
        ],
        data: Vec::new(),
    }
}
