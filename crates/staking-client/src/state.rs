//! Query functions over the program's accounts.

use tracing::info;

use crate::address::{to_base58, Pubkey};
use crate::config::StakingContext;
use crate::error::StakingError;
use crate::layout::{GlobalPool, UserPool, USER_POOL_LEN};
use crate::ledger::{AccountFilter, LedgerReader, LedgerSnapshot};

/// Every user pool found by a program scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPoolScan {
    pub count: usize,
    pub pools: Vec<(Pubkey, UserPool)>,
}

/// Reads and decodes program state through a [`StakingContext`].
pub struct StateReader<'a, L> {
    ctx: &'a StakingContext<L>,
}

impl<'a, L: LedgerReader> StateReader<'a, L> {
    pub fn new(ctx: &'a StakingContext<L>) -> Self {
        Self { ctx }
    }

    /// The deployment's GlobalPool. `AccountNotFound` before `initialize`.
    pub fn global_pool(&self) -> Result<GlobalPool, StakingError> {
        let (address, _) = self.ctx.config.global_authority()?;
        let snapshot = LedgerSnapshot::new(&self.ctx.ledger);
        let account = snapshot.require(&address, "global pool")?;
        GlobalPool::decode(&account.data)
    }

    /// `owner`'s UserPool, or `None` if its storage was never created.
    pub fn user_pool(&self, owner: &Pubkey) -> Result<Option<UserPool>, StakingError> {
        let address = self.ctx.config.user_pool_address(owner)?;
        let snapshot = LedgerSnapshot::new(&self.ctx.ledger);
        snapshot
            .account(&address)?
            .map(|account| UserPool::decode(&account.data))
            .transpose()
    }

    /// Decode every program account of UserPool size.
    ///
    /// One malformed account fails the whole scan.
    pub fn all_user_pools(&self) -> Result<UserPoolScan, StakingError> {
        let accounts = self.ctx.ledger.get_program_accounts(
            &self.ctx.config.program_id,
            &[AccountFilter::DataSize(USER_POOL_LEN)],
        )?;

        let pools = accounts
            .into_iter()
            .map(|(address, account)| {
                UserPool::decode(&account.data)
                    .map(|pool| (address, pool))
                    .map_err(|e| match e {
                        StakingError::MalformedAccount(msg) => StakingError::MalformedAccount(
                            format!("user pool {}: {msg}", to_base58(&address)),
                        ),
                        other => other,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(count = pools.len(), "scanned user pools");
        Ok(UserPoolScan {
            count: pools.len(),
            pools,
        })
    }
}
