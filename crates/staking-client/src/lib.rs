//! Client for the NFT staking program.
//!
//! Builds the instruction bundles the on-chain staking program expects:
//! staking and unstaking NFTs, moving reward tokens between wallets,
//! per-user vaults and the global reward vault, and fusion upgrades. It
//! also decodes the program's GlobalPool and UserPool accounts.
//!
//! The crate never submits anything. Ledger reads go through the
//! [`LedgerReader`] trait; operations return an unsigned
//! [`InstructionBundle`] which [`compile_message`] and [`sign_transaction`]
//! turn into wire bytes. The Solana wire format is implemented by hand on
//! `ed25519-dalek` and `bs58`, as is program-derived address derivation.

pub mod address;
pub mod assembler;
pub mod config;
pub mod derive;
pub mod error;
pub mod instruction;
pub mod layout;
pub mod ledger;
pub mod ownership;
pub mod resolver;
pub mod spl_token;
pub mod state;
pub mod system;
pub mod transaction;

pub use address::{parse_pubkey, to_base58, Pubkey};
pub use assembler::TransactionAssembler;
pub use config::{Keypair, StakingConfig, StakingContext};
pub use derive::{
    create_with_seed, derive_associated_token_address, derive_metadata_address,
    find_program_address,
};
pub use error::StakingError;
pub use layout::{GlobalPool, StakedData, UserPool};
pub use ledger::{AccountFilter, LedgerAccount, LedgerReader, LedgerSnapshot, MemoryLedger};
pub use ownership::{resolve_nft_account, NftHolding};
pub use resolver::{resolve_or_create, ResolvedAccounts};
pub use state::{StateReader, UserPoolScan};
pub use transaction::{
    compile_message, partial_sign_wire_transaction, serialize_message, sign_transaction,
    unsigned_wire_transaction, AccountMeta, Instruction, InstructionBundle, Message,
};
