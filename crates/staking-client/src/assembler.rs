//! Build the instruction bundle for each staking operation.
//!
//! Every operation reads the ledger through one [`LedgerSnapshot`], derives
//! the addresses it needs, adds creation instructions for token accounts
//! that do not exist yet, and ends with the program instruction itself.
//! Nothing is signed or submitted here.
//!
//! Operations that move tokens into a user vault (deposit to account,
//! withdraw from vault, fusion, stake) first make sure the participant's UserPool storage
//! exists, prepending `CreateAccountWithSeed` + `initialize_user_pool`
//! when it does not.

use tracing::{info, warn};

use crate::address::{to_base58, Pubkey};
use crate::config::StakingContext;
use crate::derive::{derive_associated_token_address, derive_metadata_address};
use crate::error::StakingError;
use crate::instruction::{
    account_transfer_accounts, deposit_to_vault_accounts, initialize_accounts,
    initialize_user_pool_accounts, withdraw_from_vault_accounts, withdraw_token_accounts,
    FusionAccounts, StakeNftAccounts, StakingInstruction, WithdrawNftAccounts,
};
use crate::layout::USER_POOL_LEN;
use crate::ledger::{LedgerReader, LedgerSnapshot};
use crate::ownership::stake_source_account;
use crate::resolver::resolve_one;
use crate::system::build_create_account_with_seed;
use crate::transaction::{AccountMeta, Instruction, InstructionBundle};

/// Assembles unsigned bundles against a [`StakingContext`].
pub struct TransactionAssembler<'a, L> {
    ctx: &'a StakingContext<L>,
}

impl<'a, L: LedgerReader> TransactionAssembler<'a, L> {
    pub fn new(ctx: &'a StakingContext<L>) -> Self {
        Self { ctx }
    }

    /// Create the GlobalPool. `admin` becomes its super admin.
    pub fn initialize_global(&self, admin: &Pubkey) -> Result<InstructionBundle, StakingError> {
        let (global, global_bump) = self.ctx.config.global_authority()?;

        let mut bundle = InstructionBundle::new(*admin);
        bundle.push(self.program_instruction(
            StakingInstruction::Initialize { global_bump },
            initialize_accounts(admin, &global),
        )?);
        Ok(finish("initialize_global", bundle))
    }

    /// Allocate and initialize `owner`'s UserPool storage.
    pub fn initialize_user_pool(&self, owner: &Pubkey) -> Result<InstructionBundle, StakingError> {
        let mut bundle = InstructionBundle::new(*owner);
        for ix in self.user_pool_setup(owner)? {
            bundle.push(ix);
        }
        Ok(finish("initialize_user_pool", bundle))
    }

    /// Move `amount` reward tokens from the owner's wallet into their vault.
    pub fn deposit_to_account(
        &self,
        owner: &Pubkey,
        amount: u64,
    ) -> Result<InstructionBundle, StakingError> {
        let reward_mint = self.ctx.config.reward_mint;
        let (user_vault, _) = self.ctx.config.user_vault(owner)?;
        let user_pool = self.ctx.config.user_pool_address(owner)?;
        let source = derive_associated_token_address(owner, &reward_mint)?;

        let snapshot = LedgerSnapshot::new(&self.ctx.ledger);
        let vault_account = derive_associated_token_address(&user_vault, &reward_mint)?;
        snapshot.prefetch(&[user_pool, vault_account])?;

        let mut bundle = InstructionBundle::new(*owner);
        self.ensure_user_pool(&snapshot, owner, &mut bundle)?;
        let (create, destination) = resolve_one(&snapshot, &user_vault, owner, &reward_mint)?;
        bundle.instructions.extend(create);
        bundle.push(self.program_instruction(
            StakingInstruction::DepositToAccount { amount },
            account_transfer_accounts(owner, &user_vault, &source, &destination),
        )?);
        Ok(finish("deposit_to_account", bundle))
    }

    /// Move `amount` reward tokens from the owner's vault back to their wallet.
    pub fn withdraw_from_account(
        &self,
        owner: &Pubkey,
        amount: u64,
    ) -> Result<InstructionBundle, StakingError> {
        let reward_mint = self.ctx.config.reward_mint;
        let (user_vault, vault_bump) = self.ctx.config.user_vault(owner)?;
        let source = derive_associated_token_address(&user_vault, &reward_mint)?;

        let snapshot = LedgerSnapshot::new(&self.ctx.ledger);
        let mut bundle = InstructionBundle::new(*owner);
        let (create, destination) = resolve_one(&snapshot, owner, owner, &reward_mint)?;
        bundle.instructions.extend(create);
        bundle.push(self.program_instruction(
            StakingInstruction::WithdrawFromAccount { vault_bump, amount },
            account_transfer_accounts(owner, &user_vault, &source, &destination),
        )?);
        Ok(finish("withdraw_from_account", bundle))
    }

    /// Move `amount` from the owner's vault into the global reward vault.
    ///
    /// The reward vault must already exist.
    pub fn deposit_to_vault(
        &self,
        owner: &Pubkey,
        amount: u64,
    ) -> Result<InstructionBundle, StakingError> {
        let reward_mint = self.ctx.config.reward_mint;
        let (global, _) = self.ctx.config.global_authority()?;
        let (user_vault, vault_bump) = self.ctx.config.user_vault(owner)?;
        let reward_vault = derive_associated_token_address(&global, &reward_mint)?;
        let vault_account = derive_associated_token_address(&user_vault, &reward_mint)?;

        let snapshot = LedgerSnapshot::new(&self.ctx.ledger);
        snapshot.require(&reward_vault, "reward vault")?;

        let mut bundle = InstructionBundle::new(*owner);
        bundle.push(self.program_instruction(
            StakingInstruction::DepositToVault { vault_bump, amount },
            deposit_to_vault_accounts(owner, &global, &user_vault, &reward_vault, &vault_account),
        )?);
        Ok(finish("deposit_to_vault", bundle))
    }

    /// Move `amount` from the global reward vault into the owner's vault.
    pub fn withdraw_from_vault(
        &self,
        owner: &Pubkey,
        amount: u64,
    ) -> Result<InstructionBundle, StakingError> {
        let reward_mint = self.ctx.config.reward_mint;
        let (global, global_bump) = self.ctx.config.global_authority()?;
        let (user_vault, _) = self.ctx.config.user_vault(owner)?;
        let user_pool = self.ctx.config.user_pool_address(owner)?;
        let reward_vault = derive_associated_token_address(&global, &reward_mint)?;

        let snapshot = LedgerSnapshot::new(&self.ctx.ledger);
        let vault_account = derive_associated_token_address(&user_vault, &reward_mint)?;
        snapshot.prefetch(&[user_pool, vault_account])?;

        let mut bundle = InstructionBundle::new(*owner);
        self.ensure_user_pool(&snapshot, owner, &mut bundle)?;
        let (create, destination) = resolve_one(&snapshot, &user_vault, owner, &reward_mint)?;
        bundle.instructions.extend(create);
        bundle.push(self.program_instruction(
            StakingInstruction::WithdrawFromVault {
                global_bump,
                amount,
            },
            withdraw_from_vault_accounts(owner, &global, &user_vault, &reward_vault, &destination),
        )?);
        Ok(finish("withdraw_from_vault", bundle))
    }

    /// Spend `amount` vault tokens to upgrade `nft_mint`, pointing its
    /// metadata at `new_uri`.
    ///
    /// Co-signed by the operator, which must be set on the context.
    pub fn fusion(
        &self,
        owner: &Pubkey,
        nft_mint: &Pubkey,
        amount: u64,
        new_uri: &str,
    ) -> Result<InstructionBundle, StakingError> {
        let operator = self.ctx.operator.ok_or_else(|| {
            StakingError::InvalidConfig("fusion needs the operator update authority".into())
        })?;
        let reward_mint = self.ctx.config.reward_mint;
        let (global, _) = self.ctx.config.global_authority()?;
        let (user_vault, vault_bump) = self.ctx.config.user_vault(owner)?;
        let user_pool = self.ctx.config.user_pool_address(owner)?;

        let snapshot = LedgerSnapshot::new(&self.ctx.ledger);
        snapshot.prefetch(&[user_pool])?;

        let mut bundle = InstructionBundle::new(*owner);
        bundle.add_signer(operator);
        self.ensure_user_pool(&snapshot, owner, &mut bundle)?;

        let accounts = FusionAccounts {
            owner: *owner,
            global_authority: global,
            update_authority: operator,
            user_vault,
            reward_vault: derive_associated_token_address(&global, &reward_mint)?,
            vault_token_account: derive_associated_token_address(&user_vault, &reward_mint)?,
            nft_mint: *nft_mint,
            mint_metadata: derive_metadata_address(nft_mint)?,
        };
        bundle.push(self.program_instruction(
            StakingInstruction::Fusion {
                vault_bump,
                amount,
                new_uri: new_uri.to_owned(),
            },
            accounts.to_account_metas(),
        )?);
        Ok(finish("fusion", bundle))
    }

    /// Stake `mint` for `duration` days.
    ///
    /// Fails with `NotOwnedByCaller` before anything is assembled when the
    /// NFT is held by neither `owner` nor the staking custody.
    pub fn stake_nft(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
        duration: i64,
    ) -> Result<InstructionBundle, StakingError> {
        let (global, global_bump) = self.ctx.config.global_authority()?;
        let user_pool = self.ctx.config.user_pool_address(owner)?;
        let custody_account = derive_associated_token_address(&global, mint)?;

        let snapshot = LedgerSnapshot::new(&self.ctx.ledger);
        snapshot.prefetch(&[
            user_pool,
            derive_associated_token_address(owner, mint)?,
            custody_account,
        ])?;

        let source = stake_source_account(&snapshot, owner, &global, mint)?;

        let mut bundle = InstructionBundle::new(*owner);
        self.ensure_user_pool(&snapshot, owner, &mut bundle)?;
        let (create, destination) = resolve_one(&snapshot, &global, owner, mint)?;
        bundle.instructions.extend(create);

        let accounts = StakeNftAccounts {
            owner: *owner,
            user_pool,
            global_authority: global,
            user_nft_token_account: source,
            dest_nft_token_account: destination,
            nft_mint: *mint,
            mint_metadata: derive_metadata_address(mint)?,
        };
        bundle.push(self.program_instruction(
            StakingInstruction::StakeNftToPool {
                global_bump,
                duration,
            },
            accounts.to_account_metas(),
        )?);
        Ok(finish("stake_nft", bundle))
    }

    /// Unstake `mint`, returning it to the owner and paying out rewards to
    /// the owner's vault.
    pub fn withdraw_nft(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
    ) -> Result<InstructionBundle, StakingError> {
        let reward_mint = self.ctx.config.reward_mint;
        let (global, global_bump) = self.ctx.config.global_authority()?;
        let (user_vault, _) = self.ctx.config.user_vault(owner)?;
        let user_pool = self.ctx.config.user_pool_address(owner)?;

        let nft_account = derive_associated_token_address(owner, mint)?;
        let reward_account = derive_associated_token_address(&user_vault, &reward_mint)?;
        let snapshot = LedgerSnapshot::new(&self.ctx.ledger);
        snapshot.prefetch(&[nft_account, reward_account])?;

        let mut bundle = InstructionBundle::new(*owner);
        let (create_nft, user_nft_token_account) = resolve_one(&snapshot, owner, owner, mint)?;
        let (create_reward, user_reward_account) =
            resolve_one(&snapshot, &user_vault, owner, &reward_mint)?;
        bundle.instructions.extend(create_nft);
        bundle.instructions.extend(create_reward);

        let accounts = WithdrawNftAccounts {
            owner: *owner,
            user_pool,
            global_authority: global,
            user_nft_token_account,
            dest_nft_token_account: derive_associated_token_address(&global, mint)?,
            reward_vault: derive_associated_token_address(&global, &reward_mint)?,
            user_vault,
            user_reward_account,
            nft_mint: *mint,
        };
        bundle.push(self.program_instruction(
            StakingInstruction::WithdrawNftFromPool { global_bump },
            accounts.to_account_metas(),
        )?);
        Ok(finish("withdraw_nft", bundle))
    }

    /// Pay `amount` reward tokens from the global reward vault to `owner`.
    pub fn withdraw_reward_token(
        &self,
        owner: &Pubkey,
        amount: u64,
    ) -> Result<InstructionBundle, StakingError> {
        let reward_mint = self.ctx.config.reward_mint;
        let (global, global_bump) = self.ctx.config.global_authority()?;
        let reward_vault = derive_associated_token_address(&global, &reward_mint)?;

        let snapshot = LedgerSnapshot::new(&self.ctx.ledger);
        let mut bundle = InstructionBundle::new(*owner);
        let (create, destination) = resolve_one(&snapshot, owner, owner, &reward_mint)?;
        bundle.instructions.extend(create);
        bundle.push(self.program_instruction(
            StakingInstruction::WithdrawToken {
                global_bump,
                amount,
            },
            withdraw_token_accounts(owner, &global, &reward_vault, &destination),
        )?);
        Ok(finish("withdraw_reward_token", bundle))
    }

    fn program_instruction(
        &self,
        instruction: StakingInstruction,
        accounts: Vec<AccountMeta>,
    ) -> Result<Instruction, StakingError> {
        instruction.into_instruction(&self.ctx.config.program_id, accounts)
    }

    fn user_pool_setup(&self, owner: &Pubkey) -> Result<Vec<Instruction>, StakingError> {
        let config = &self.ctx.config;
        let user_pool = config.user_pool_address(owner)?;
        let (user_vault, _) = config.user_vault(owner)?;
        let lamports = self
            .ctx
            .ledger
            .minimum_balance_for_rent_exemption(USER_POOL_LEN)?;

        Ok(vec![
            build_create_account_with_seed(
                owner,
                &user_pool,
                owner,
                &config.user_pool_seed,
                lamports,
                USER_POOL_LEN as u64,
                &config.program_id,
            ),
            self.program_instruction(
                StakingInstruction::InitializeUserPool,
                initialize_user_pool_accounts(&user_pool, &user_vault, owner),
            )?,
        ])
    }

    fn ensure_user_pool(
        &self,
        snapshot: &LedgerSnapshot<'_, L>,
        owner: &Pubkey,
        bundle: &mut InstructionBundle,
    ) -> Result<(), StakingError> {
        let user_pool = self.ctx.config.user_pool_address(owner)?;
        if snapshot.exists(&user_pool)? {
            return Ok(());
        }
        warn!(
            owner = %to_base58(owner),
            user_pool = %to_base58(&user_pool),
            "user pool missing, prepending setup"
        );
        bundle.instructions.extend(self.user_pool_setup(owner)?);
        Ok(())
    }
}

fn finish(operation: &str, bundle: InstructionBundle) -> InstructionBundle {
    info!(
        operation,
        instructions = bundle.len(),
        signers = bundle.signers.len(),
        "assembled bundle"
    );
    bundle
}
