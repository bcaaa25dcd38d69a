//! Encoders for the staking program's instructions.
//!
//! Instruction data is Anchor-framed: the first 8 bytes of
//! `SHA-256("global:<instruction_name>")`, then the Borsh-encoded
//! arguments. Account lists follow the program's account structs field by
//! field; the program matches accounts by position, so order and the
//! signer/writable bits here are part of the wire contract.

use borsh::BorshSerialize;
use sha2::{Digest, Sha256};

use crate::address::Pubkey;
use crate::error::StakingError;
use crate::spl_token::{TOKEN_METADATA_PROGRAM_ID, TOKEN_PROGRAM_ID};
use crate::system::{SYSTEM_PROGRAM_ID, SYSVAR_RENT_ID};
use crate::transaction::{AccountMeta, Instruction};

/// Anchor instruction discriminator for `name`.
pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    let hash = Sha256::digest(format!("global:{name}").as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash[..8]);
    out
}

/// A staking program instruction and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StakingInstruction {
    Initialize { global_bump: u8 },
    InitializeUserPool,
    DepositToAccount { amount: u64 },
    WithdrawFromAccount { vault_bump: u8, amount: u64 },
    DepositToVault { vault_bump: u8, amount: u64 },
    WithdrawFromVault { global_bump: u8, amount: u64 },
    Fusion { vault_bump: u8, amount: u64, new_uri: String },
    StakeNftToPool { global_bump: u8, duration: i64 },
    WithdrawNftFromPool { global_bump: u8 },
    WithdrawToken { global_bump: u8, amount: u64 },
}

impl StakingInstruction {
    /// The program-side instruction name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "initialize",
            Self::InitializeUserPool => "initialize_user_pool",
            Self::DepositToAccount { .. } => "deposit_to_account",
            Self::WithdrawFromAccount { .. } => "withdraw_from_account",
            Self::DepositToVault { .. } => "deposit_to_vault",
            Self::WithdrawFromVault { .. } => "withdraw_from_vault",
            Self::Fusion { .. } => "fusion",
            Self::StakeNftToPool { .. } => "stake_nft_to_pool",
            Self::WithdrawNftFromPool { .. } => "withdraw_nft_from_pool",
            Self::WithdrawToken { .. } => "withdraw_token",
        }
    }

    /// Discriminator followed by the Borsh-encoded arguments.
    pub fn data(&self) -> Result<Vec<u8>, StakingError> {
        let mut data = instruction_discriminator(self.name()).to_vec();
        match self {
            Self::Initialize { global_bump } => push_args(&mut data, global_bump)?,
            Self::InitializeUserPool => {}
            Self::DepositToAccount { amount } => push_args(&mut data, amount)?,
            Self::WithdrawFromAccount { vault_bump, amount }
            | Self::DepositToVault { vault_bump, amount } => {
                push_args(&mut data, &(*vault_bump, *amount))?
            }
            Self::WithdrawFromVault {
                global_bump,
                amount,
            }
            | Self::WithdrawToken {
                global_bump,
                amount,
            } => push_args(&mut data, &(*global_bump, *amount))?,
            Self::Fusion {
                vault_bump,
                amount,
                new_uri,
            } => push_args(&mut data, &(*vault_bump, *amount, new_uri.clone()))?,
            Self::StakeNftToPool {
                global_bump,
                duration,
            } => push_args(&mut data, &(*global_bump, *duration))?,
            Self::WithdrawNftFromPool { global_bump } => push_args(&mut data, global_bump)?,
        }
        Ok(data)
    }

    /// Pair these arguments with the account list for `program_id`.
    pub fn into_instruction(
        self,
        program_id: &Pubkey,
        accounts: Vec<AccountMeta>,
    ) -> Result<Instruction, StakingError> {
        Ok(Instruction {
            program_id: *program_id,
            accounts,
            data: self.data()?,
        })
    }
}

fn push_args<T: BorshSerialize + ?Sized>(data: &mut Vec<u8>, args: &T) -> Result<(), StakingError> {
    args.serialize(data)
        .map_err(|e| StakingError::SerializationError(format!("instruction args: {e}")))
}

// ---------------------------------------------------------------------------
// Account lists
// ---------------------------------------------------------------------------

pub fn initialize_accounts(admin: &Pubkey, global_authority: &Pubkey) -> Vec<AccountMeta> {
    vec![
        AccountMeta::writable(*admin, true),
        AccountMeta::writable(*global_authority, false),
        AccountMeta::readonly(SYSTEM_PROGRAM_ID, false),
        AccountMeta::readonly(SYSVAR_RENT_ID, false),
    ]
}

pub fn initialize_user_pool_accounts(
    user_pool: &Pubkey,
    user_vault: &Pubkey,
    owner: &Pubkey,
) -> Vec<AccountMeta> {
    vec![
        AccountMeta::writable(*user_pool, false),
        AccountMeta::writable(*user_vault, false),
        AccountMeta::writable(*owner, true),
        AccountMeta::readonly(SYSTEM_PROGRAM_ID, false),
        AccountMeta::readonly(SYSVAR_RENT_ID, false),
    ]
}

/// Shared by `deposit_to_account` and `withdraw_from_account`: tokens move
/// from `source` to `destination`, one of which belongs to the vault.
pub fn account_transfer_accounts(
    owner: &Pubkey,
    user_vault: &Pubkey,
    source: &Pubkey,
    destination: &Pubkey,
) -> Vec<AccountMeta> {
    vec![
        AccountMeta::writable(*owner, true),
        AccountMeta::writable(*user_vault, false),
        AccountMeta::writable(*source, false),
        AccountMeta::writable(*destination, false),
        AccountMeta::readonly(TOKEN_PROGRAM_ID, false),
    ]
}

pub fn deposit_to_vault_accounts(
    owner: &Pubkey,
    global_authority: &Pubkey,
    user_vault: &Pubkey,
    reward_vault: &Pubkey,
    vault_token_account: &Pubkey,
) -> Vec<AccountMeta> {
    vec![
        AccountMeta::writable(*owner, true),
        AccountMeta::writable(*global_authority, false),
        AccountMeta::writable(*user_vault, false),
        AccountMeta::writable(*reward_vault, false),
        AccountMeta::writable(*vault_token_account, false),
        AccountMeta::readonly(TOKEN_PROGRAM_ID, false),
    ]
}

pub fn withdraw_from_vault_accounts(
    owner: &Pubkey,
    global_authority: &Pubkey,
    user_vault: &Pubkey,
    reward_vault: &Pubkey,
    destination: &Pubkey,
) -> Vec<AccountMeta> {
    // Same shape as deposit_to_vault, destination last.
    deposit_to_vault_accounts(owner, global_authority, user_vault, reward_vault, destination)
}

pub struct FusionAccounts {
    pub owner: Pubkey,
    pub global_authority: Pubkey,
    pub update_authority: Pubkey,
    pub user_vault: Pubkey,
    pub reward_vault: Pubkey,
    pub vault_token_account: Pubkey,
    pub nft_mint: Pubkey,
    pub mint_metadata: Pubkey,
}

impl FusionAccounts {
    pub fn to_account_metas(&self) -> Vec<AccountMeta> {
        vec![
            AccountMeta::writable(self.owner, true),
            AccountMeta::writable(self.global_authority, false),
            AccountMeta::writable(self.update_authority, true),
            AccountMeta::writable(self.user_vault, false),
            AccountMeta::writable(self.reward_vault, false),
            AccountMeta::writable(self.vault_token_account, false),
            AccountMeta::writable(self.nft_mint, false),
            AccountMeta::writable(self.mint_metadata, false),
            AccountMeta::readonly(TOKEN_METADATA_PROGRAM_ID, false),
            AccountMeta::readonly(TOKEN_PROGRAM_ID, false),
        ]
    }
}

pub struct StakeNftAccounts {
    pub owner: Pubkey,
    pub user_pool: Pubkey,
    pub global_authority: Pubkey,
    pub user_nft_token_account: Pubkey,
    pub dest_nft_token_account: Pubkey,
    pub nft_mint: Pubkey,
    pub mint_metadata: Pubkey,
}

impl StakeNftAccounts {
    pub fn to_account_metas(&self) -> Vec<AccountMeta> {
        vec![
            AccountMeta::writable(self.owner, true),
            AccountMeta::writable(self.user_pool, false),
            AccountMeta::writable(self.global_authority, false),
            AccountMeta::writable(self.user_nft_token_account, false),
            AccountMeta::writable(self.dest_nft_token_account, false),
            AccountMeta::readonly(self.nft_mint, false),
            AccountMeta::writable(self.mint_metadata, false),
            AccountMeta::readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::readonly(TOKEN_METADATA_PROGRAM_ID, false),
        ]
    }
}

pub struct WithdrawNftAccounts {
    pub owner: Pubkey,
    pub user_pool: Pubkey,
    pub global_authority: Pubkey,
    pub user_nft_token_account: Pubkey,
    pub dest_nft_token_account: Pubkey,
    pub reward_vault: Pubkey,
    pub user_vault: Pubkey,
    pub user_reward_account: Pubkey,
    pub nft_mint: Pubkey,
}

impl WithdrawNftAccounts {
    pub fn to_account_metas(&self) -> Vec<AccountMeta> {
        vec![
            AccountMeta::writable(self.owner, true),
            AccountMeta::writable(self.user_pool, false),
            AccountMeta::writable(self.global_authority, false),
            AccountMeta::writable(self.user_nft_token_account, false),
            AccountMeta::writable(self.dest_nft_token_account, false),
            AccountMeta::writable(self.reward_vault, false),
            AccountMeta::writable(self.user_vault, false),
            AccountMeta::writable(self.user_reward_account, false),
            AccountMeta::readonly(self.nft_mint, false),
            AccountMeta::readonly(TOKEN_PROGRAM_ID, false),
        ]
    }
}

pub fn withdraw_token_accounts(
    owner: &Pubkey,
    global_authority: &Pubkey,
    reward_vault: &Pubkey,
    user_reward_account: &Pubkey,
) -> Vec<AccountMeta> {
    vec![
        AccountMeta::writable(*owner, true),
        AccountMeta::writable(*global_authority, false),
        AccountMeta::writable(*reward_vault, false),
        AccountMeta::writable(*user_reward_account, false),
        AccountMeta::readonly(TOKEN_PROGRAM_ID, false),
    ]
}
