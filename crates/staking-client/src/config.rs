//! Deployment configuration and the context threaded through every call.

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::address::Pubkey;
use crate::derive::{create_with_seed, find_program_address};
use crate::error::StakingError;

/// Staking program deployed on mainnet.
pub const DEFAULT_PROGRAM_ID: Pubkey = [
    0x15, 0x29, 0x22, 0x32, 0x18, 0xc9, 0x2a, 0x0b, 0x0a, 0x9a, 0x25, 0x72, 0x3f, 0x1e, 0x81, 0xa3,
    0xf8, 0x5f, 0xd7, 0x39, 0x9a, 0xb0, 0xdf, 0xd3, 0xad, 0x42, 0xd1, 0x7e, 0x62, 0x74, 0xb5, 0xfe,
];

/// Reward (AMMO) token mint: `H3rmqbVz8NTCkGABeue3yc9PgioL2i1RPrQM45itdKMu`
pub const DEFAULT_REWARD_MINT: Pubkey = [
    0xee, 0x76, 0x6e, 0x57, 0xaa, 0xea, 0x2a, 0xb7, 0xd8, 0x2b, 0xac, 0x5d, 0x00, 0x17, 0x5f, 0x7b,
    0x4e, 0x52, 0xd1, 0x97, 0xbe, 0x38, 0x27, 0x15, 0x85, 0xa9, 0xe5, 0x52, 0x5a, 0x07, 0x66, 0x34,
];

pub const GLOBAL_AUTHORITY_SEED: &str = "global-authority";
pub const VAULT_SEED: &str = "vault-seed";
pub const USER_POOL_SEED: &str = "user-pool";
pub const REWARD_DECIMALS: u8 = 9;

/// Which deployment the client talks to.
///
/// Loadable from JSON; any omitted field takes the mainnet value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StakingConfig {
    #[serde(with = "base58_pubkey")]
    pub program_id: Pubkey,
    #[serde(with = "base58_pubkey")]
    pub reward_mint: Pubkey,
    pub reward_decimals: u8,
    pub global_authority_seed: String,
    pub vault_seed: String,
    pub user_pool_seed: String,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            program_id: DEFAULT_PROGRAM_ID,
            reward_mint: DEFAULT_REWARD_MINT,
            reward_decimals: REWARD_DECIMALS,
            global_authority_seed: GLOBAL_AUTHORITY_SEED.into(),
            vault_seed: VAULT_SEED.into(),
            user_pool_seed: USER_POOL_SEED.into(),
        }
    }
}

impl StakingConfig {
    pub fn from_json(json: &str) -> Result<Self, StakingError> {
        serde_json::from_str(json).map_err(|e| StakingError::InvalidConfig(e.to_string()))
    }

    /// Convert whole reward tokens into base units.
    pub fn to_base_units(&self, tokens: u64) -> Result<u64, StakingError> {
        10u64
            .checked_pow(self.reward_decimals as u32)
            .and_then(|scale| tokens.checked_mul(scale))
            .ok_or_else(|| {
                StakingError::InvalidConfig(format!(
                    "{tokens} tokens overflow u64 at {} decimals",
                    self.reward_decimals
                ))
            })
    }

    /// The global authority PDA and its bump. It holds the GlobalPool
    /// record and custodies staked NFTs and the reward reserve.
    pub fn global_authority(&self) -> Result<(Pubkey, u8), StakingError> {
        find_program_address(&[self.global_authority_seed.as_bytes()], &self.program_id)
    }

    /// The per-user vault PDA and its bump.
    pub fn user_vault(&self, owner: &Pubkey) -> Result<(Pubkey, u8), StakingError> {
        find_program_address(&[self.vault_seed.as_bytes(), owner.as_ref()], &self.program_id)
    }

    /// The UserPool storage address, seeded from the owner's key.
    pub fn user_pool_address(&self, owner: &Pubkey) -> Result<Pubkey, StakingError> {
        create_with_seed(owner, &self.user_pool_seed, &self.program_id)
    }
}

/// An Ed25519 keypair, e.g. the operator's metadata update authority.
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Parse the 64-byte `secret || public` keypair layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StakingError> {
        if bytes.len() != 64 {
            return Err(StakingError::InvalidPrivateKey(format!(
                "expected 64 keypair bytes, got {}",
                bytes.len()
            )));
        }

        let mut secret = [0u8; 32];
        secret.copy_from_slice(&bytes[..32]);
        let signing = SigningKey::from_bytes(&secret);
        secret.zeroize();

        if signing.verifying_key().as_bytes() != &bytes[32..] {
            return Err(StakingError::InvalidPrivateKey(
                "public half does not match secret half".into(),
            ));
        }

        Ok(Self { signing })
    }

    /// Parse the JSON array format written by keypair tools.
    pub fn from_json(json: &str) -> Result<Self, StakingError> {
        let mut bytes: Vec<u8> = serde_json::from_str(json)
            .map_err(|e| StakingError::InvalidPrivateKey(format!("keypair json: {e}")))?;
        let keypair = Self::from_bytes(&bytes);
        bytes.zeroize();
        keypair
    }

    pub fn from_signing_key(signing: SigningKey) -> Self {
        Self { signing }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.signing.verifying_key().to_bytes()
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("pubkey", &crate::address::to_base58(&self.pubkey()))
            .finish_non_exhaustive()
    }
}

/// Everything an operation needs besides its own parameters: the ledger
/// reader, the deployment config, and the operator's public key (the
/// update authority that co-signs fusion).
#[derive(Debug)]
pub struct StakingContext<L> {
    pub ledger: L,
    pub config: StakingConfig,
    pub operator: Option<Pubkey>,
}

impl<L> StakingContext<L> {
    pub fn new(ledger: L, config: StakingConfig) -> Self {
        Self {
            ledger,
            config,
            operator: None,
        }
    }

    pub fn with_operator(mut self, operator: Pubkey) -> Self {
        self.operator = Some(operator);
        self
    }
}

mod base58_pubkey {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use crate::address::{parse_pubkey, to_base58, Pubkey};

    pub fn serialize<S: Serializer>(key: &Pubkey, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&to_base58(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Pubkey, D::Error> {
        let s = String::deserialize(d)?;
        parse_pubkey(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::to_base58;

    #[test]
    fn defaults_match_deployment() {
        let config = StakingConfig::default();
        assert_eq!(
            to_base58(&config.program_id),
            "2RbwYVj8gmYf8TRNukd34fGJgT7X4X4K3t6gLGwJkNQD"
        );
        assert_eq!(
            to_base58(&config.reward_mint),
            "H3rmqbVz8NTCkGABeue3yc9PgioL2i1RPrQM45itdKMu"
        );
        assert_eq!(config.user_pool_seed, "user-pool");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = StakingConfig::from_json(
            r#"{ "reward_mint": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA" }"#,
        )
        .unwrap();
        assert_eq!(config.program_id, DEFAULT_PROGRAM_ID);
        assert_eq!(
            to_base58(&config.reward_mint),
            "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"
        );
    }

    #[test]
    fn json_roundtrip() {
        let config = StakingConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("2RbwYVj8gmYf8TRNukd34fGJgT7X4X4K3t6gLGwJkNQD"));
        assert_eq!(StakingConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn bad_address_in_json_is_rejected() {
        let err = StakingConfig::from_json(r#"{ "program_id": "nope" }"#).unwrap_err();
        assert!(matches!(err, StakingError::InvalidConfig(_)));
    }

    #[test]
    fn base_units() {
        let config = StakingConfig::default();
        assert_eq!(config.to_base_units(3).unwrap(), 3_000_000_000);
        assert!(config.to_base_units(u64::MAX).is_err());
    }

    #[test]
    fn user_pool_address_uses_seed() {
        let config = StakingConfig::default();
        let owner = [0x11u8; 32];
        assert_eq!(
            config.user_pool_address(&owner).unwrap(),
            create_with_seed(&owner, "user-pool", &DEFAULT_PROGRAM_ID).unwrap()
        );
    }

    #[test]
    fn vaults_are_per_owner() {
        let config = StakingConfig::default();
        let (a, _) = config.user_vault(&[1u8; 32]).unwrap();
        let (b, _) = config.user_vault(&[2u8; 32]).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, config.global_authority().unwrap().0);
    }

    #[test]
    fn keypair_from_json() {
        let signing = SigningKey::from_bytes(&[7u8; 32]);
        let mut bytes = [7u8; 32].to_vec();
        bytes.extend_from_slice(signing.verifying_key().as_bytes());
        let json = serde_json::to_string(&bytes).unwrap();

        let keypair = Keypair::from_json(&json).unwrap();
        assert_eq!(keypair.pubkey(), signing.verifying_key().to_bytes());
        assert!(format!("{keypair:?}").contains("pubkey"));
    }

    #[test]
    fn keypair_with_mismatched_public_half_fails() {
        let mut bytes = vec![7u8; 32];
        bytes.extend_from_slice(&[0u8; 32]);
        assert!(Keypair::from_bytes(&bytes).is_err());
    }

    #[test]
    fn keypair_wrong_length_fails() {
        assert!(Keypair::from_json("[1, 2, 3]").is_err());
        assert!(Keypair::from_json("not json").is_err());
    }
}
