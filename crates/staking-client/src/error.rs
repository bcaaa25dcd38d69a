use thiserror::Error;

/// Errors raised while deriving addresses, decoding staking accounts, or
/// assembling instruction bundles.
#[derive(Debug, Error)]
pub enum StakingError {
    /// Account data is shorter than its fixed layout or declares a count
    /// beyond its capacity.
    #[error("malformed account: {0}")]
    MalformedAccount(String),

    /// An account that must already exist was not found on the ledger.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// The token being staked is held by someone other than the caller
    /// or the staking custody address.
    #[error("nft {mint} is not owned by {caller} (held by {holder})")]
    NotOwnedByCaller {
        mint: String,
        caller: String,
        holder: String,
    },

    /// No bump seed in 0..=255 produced an off-curve address.
    #[error("address derivation exhausted: {0}")]
    AddressDerivationExhausted(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// The ledger read capability failed. Surfaced as-is, never retried.
    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),
}
