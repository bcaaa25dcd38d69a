//! Read-only codec for the staking program's account layouts.
//!
//! ```text
//! GlobalPool (48 bytes used):
//!   discriminator        8
//!   super_admin         32
//!   total_staked_count   8
//!
//! UserPool (5648 bytes):
//!   discriminator        8
//!   owner               32
//!   staked_count         8
//!   staking[100]        56 each
//!     mint              32
//!     staked_time        8
//!     lock_time          8
//!     duration           8
//! ```
//!
//! The client never writes these accounts directly; every mutation goes
//! through a program instruction, so there is no encoder.

use crate::address::{read_pubkey, Pubkey};
use crate::error::StakingError;

/// Leading type tag written by the program. Skipped, never interpreted.
pub const DISCRIMINATOR_LEN: usize = 8;

/// Bytes of a GlobalPool that carry data.
pub const GLOBAL_POOL_LEN: usize = DISCRIMINATOR_LEN + 32 + 8;

/// Capacity of the per-user staking table.
pub const STAKE_MAX_COUNT: usize = 100;

/// Size of one staking slot.
pub const STAKED_DATA_LEN: usize = 56;

/// Discriminator plus owner and staked_count.
pub const USER_POOL_HEADER_LEN: usize = DISCRIMINATOR_LEN + 32 + 8;

/// Full size of a UserPool account.
pub const USER_POOL_LEN: usize = USER_POOL_HEADER_LEN + STAKE_MAX_COUNT * STAKED_DATA_LEN;

const GLOBAL_ADMIN_OFFSET: usize = DISCRIMINATOR_LEN;
const GLOBAL_COUNT_OFFSET: usize = GLOBAL_ADMIN_OFFSET + 32;
const USER_OWNER_OFFSET: usize = DISCRIMINATOR_LEN;
const USER_COUNT_OFFSET: usize = USER_OWNER_OFFSET + 32;

/// Read an 8-byte numeric field.
///
/// The bytes are reversed and then read big-endian. Every numeric field of
/// both layouts goes through here.
pub fn read_reversed_u64(data: &[u8], offset: usize) -> Result<u64, StakingError> {
    let mut buf: [u8; 8] = data
        .get(offset..offset + 8)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| {
            StakingError::MalformedAccount(format!(
                "need 8 bytes at offset {offset}, account has {}",
                data.len()
            ))
        })?;
    buf.reverse();
    Ok(u64::from_be_bytes(buf))
}

/// The singleton program state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalPool {
    pub super_admin: Pubkey,
    pub total_staked_count: u64,
}

impl GlobalPool {
    pub fn decode(data: &[u8]) -> Result<Self, StakingError> {
        if data.len() < GLOBAL_POOL_LEN {
            return Err(StakingError::MalformedAccount(format!(
                "global pool is {} bytes, need at least {GLOBAL_POOL_LEN}",
                data.len()
            )));
        }

        Ok(Self {
            super_admin: read_pubkey(data, GLOBAL_ADMIN_OFFSET)?,
            total_staked_count: read_reversed_u64(data, GLOBAL_COUNT_OFFSET)?,
        })
    }
}

/// One staked NFT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StakedData {
    pub mint: Pubkey,
    /// Unix time the NFT was staked.
    pub staked_time: u64,
    /// Unix time the lock expires: `staked_time + duration` days.
    pub lock_time: u64,
    /// Requested lock length in days.
    pub duration: u64,
}

impl StakedData {
    fn decode(data: &[u8], offset: usize) -> Result<Self, StakingError> {
        Ok(Self {
            mint: read_pubkey(data, offset)?,
            staked_time: read_reversed_u64(data, offset + 32)?,
            lock_time: read_reversed_u64(data, offset + 40)?,
            duration: read_reversed_u64(data, offset + 48)?,
        })
    }

    /// Whether the lock has expired at unix time `now`.
    pub fn is_unlocked(&self, now: u64) -> bool {
        self.lock_time <= now
    }
}

/// A participant's staking table.
///
/// `staking` mirrors the on-chain fixed array. Only the first
/// `staked_count` slots are live; the rest stay default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPool {
    pub owner: Pubkey,
    pub staked_count: u64,
    pub staking: [StakedData; STAKE_MAX_COUNT],
}

impl UserPool {
    /// Decode a UserPool, reading exactly `staked_count` slots.
    pub fn decode(data: &[u8]) -> Result<Self, StakingError> {
        if data.len() < USER_POOL_HEADER_LEN {
            return Err(StakingError::MalformedAccount(format!(
                "user pool is {} bytes, header needs {USER_POOL_HEADER_LEN}",
                data.len()
            )));
        }

        let owner = read_pubkey(data, USER_OWNER_OFFSET)?;
        let staked_count = read_reversed_u64(data, USER_COUNT_OFFSET)?;

        if staked_count > STAKE_MAX_COUNT as u64 {
            return Err(StakingError::MalformedAccount(format!(
                "staked_count {staked_count} exceeds capacity {STAKE_MAX_COUNT}"
            )));
        }

        let live = staked_count as usize;
        let needed = USER_POOL_HEADER_LEN + live * STAKED_DATA_LEN;
        if data.len() < needed {
            return Err(StakingError::MalformedAccount(format!(
                "user pool is {} bytes, {live} slots need {needed}",
                data.len()
            )));
        }

        let mut staking = [StakedData::default(); STAKE_MAX_COUNT];
        for (i, slot) in staking.iter_mut().take(live).enumerate() {
            *slot = StakedData::decode(data, USER_POOL_HEADER_LEN + i * STAKED_DATA_LEN)?;
        }

        Ok(Self {
            owner,
            staked_count,
            staking,
        })
    }

    /// The live stakes, in insertion order.
    pub fn staked(&self) -> &[StakedData] {
        let live = (self.staked_count as usize).min(STAKE_MAX_COUNT);
        &self.staking[..live]
    }

    /// Slot index of `mint`, if it is staked here.
    pub fn position_of(&self, mint: &Pubkey) -> Option<usize> {
        self.staked().iter().position(|s| s.mint == *mint)
    }
}
