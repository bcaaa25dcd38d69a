//! Instruction bundles and the legacy transaction wire format.
//!
//! Every staking operation returns an [`InstructionBundle`]: the ordered
//! instructions plus the public keys that must sign. Callers pick the fee
//! payer and recent blockhash, then compile and sign here or hand the
//! bundle to their own submission layer.
//!
//! ```text
//! Transaction:
//!   num_signatures          compact-u16
//!   signatures              64 bytes * num_signatures
//!   message:
//!     num_required_sigs     u8
//!     num_readonly_signed   u8
//!     num_readonly_unsigned u8
//!     num_accounts          compact-u16
//!     account_keys          32 bytes * num_accounts
//!     recent_blockhash      32 bytes
//!     num_instructions      compact-u16
//!     instructions[]        (see below)
//!
//! Instruction:
//!   program_id_index        u8
//!   num_accounts            compact-u16
//!   account_indices         u8 * num_accounts
//!   data_len                compact-u16
//!   data                    u8 * data_len
//! ```

use ed25519_dalek::{Signer, SigningKey};

use crate::address::{to_base58, Pubkey};
use crate::error::StakingError;

/// Length of an Ed25519 signature.
const SIGNATURE_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Compact-u16 encoding
// ---------------------------------------------------------------------------

/// Encode a `u16` value in Solana's compact-u16 format.
///
/// - Values 0..0x7f       -> 1 byte
/// - Values 0x80..0x3fff  -> 2 bytes
/// - Values 0x4000..      -> 3 bytes
pub fn encode_compact_u16(value: u16) -> Vec<u8> {
    let mut val = value as u32;
    let mut out = Vec::with_capacity(3);

    loop {
        let mut byte = (val & 0x7f) as u8;
        val >>= 7;
        if val > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if val == 0 {
            break;
        }
    }

    out
}

/// Decode a compact-u16 value from a byte slice.
///
/// Returns `(value, bytes_consumed)` or an error if the data is truncated.
pub fn decode_compact_u16(data: &[u8]) -> Result<(u16, usize), StakingError> {
    let mut value: u32 = 0;
    let mut shift = 0u32;
    let mut consumed = 0usize;

    loop {
        let byte = *data.get(consumed).ok_or_else(|| {
            StakingError::SerializationError(
                "unexpected end of data while decoding compact-u16".into(),
            )
        })?;
        consumed += 1;

        value |= ((byte & 0x7f) as u32) << shift;
        shift += 7;

        if byte & 0x80 == 0 || consumed >= 3 {
            break;
        }
    }

    let value = u16::try_from(value)
        .map_err(|_| StakingError::SerializationError("compact-u16 value overflow".into()))?;

    Ok((value, consumed))
}

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// A single account reference in an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn writable(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// An instruction before it is compiled into a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// An ordered, unsigned set of instructions plus the keys that must sign.
///
/// Instructions execute in order; prerequisite account creation always
/// precedes the instruction that uses the account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionBundle {
    pub instructions: Vec<Instruction>,
    pub signers: Vec<Pubkey>,
}

impl InstructionBundle {
    /// Start a bundle signed by `signer`.
    pub fn new(signer: Pubkey) -> Self {
        Self {
            instructions: Vec::new(),
            signers: vec![signer],
        }
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Require an additional signer. Duplicates are ignored.
    pub fn add_signer(&mut self, signer: Pubkey) {
        if !self.signers.contains(&signer) {
            self.signers.push(signer);
        }
    }

    /// Append another bundle's instructions and signers after this one's.
    pub fn append(&mut self, other: InstructionBundle) {
        self.instructions.extend(other.instructions);
        for signer in other.signers {
            self.add_signer(signer);
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// A compiled legacy message.
#[derive(Debug, Clone)]
pub struct Message {
    /// All account keys referenced by this message, in canonical order:
    ///   1. writable signers (fee payer first)
    ///   2. read-only signers
    ///   3. writable non-signers
    ///   4. read-only non-signers
    pub account_keys: Vec<Pubkey>,

    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,

    pub recent_blockhash: [u8; 32],

    pub compiled_instructions: Vec<CompiledInstruction>,
}

impl Message {
    /// The keys whose signatures the message needs, in signature-slot order.
    pub fn signer_keys(&self) -> &[Pubkey] {
        let count = (self.num_required_signatures as usize).min(self.account_keys.len());
        &self.account_keys[..count]
    }
}

/// A compiled instruction where account references are replaced by u8 indices
/// into the message's `account_keys` array.
#[derive(Debug, Clone)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub account_indices: Vec<u8>,
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Compilation
// ---------------------------------------------------------------------------

/// Compile a bundle into a message with `fee_payer` at index 0.
pub fn compile_message(
    bundle: &InstructionBundle,
    fee_payer: &Pubkey,
    recent_blockhash: &[u8; 32],
) -> Result<Message, StakingError> {
    if bundle.is_empty() {
        return Err(StakingError::TransactionBuildError(
            "bundle has no instructions".into(),
        ));
    }

    struct AccountEntry {
        pubkey: Pubkey,
        is_signer: bool,
        is_writable: bool,
    }

    let mut entries: Vec<AccountEntry> = Vec::new();

    let mut upsert = |pubkey: Pubkey, signer: bool, writable: bool| {
        if let Some(entry) = entries.iter_mut().find(|e| e.pubkey == pubkey) {
            entry.is_signer |= signer;
            entry.is_writable |= writable;
        } else {
            entries.push(AccountEntry {
                pubkey,
                is_signer: signer,
                is_writable: writable,
            });
        }
    };

    // Fee payer is always signer + writable.
    upsert(*fee_payer, true, true);

    for ix in &bundle.instructions {
        for meta in &ix.accounts {
            upsert(meta.pubkey, meta.is_signer, meta.is_writable);
        }
        upsert(ix.program_id, false, false);
    }
    for signer in &bundle.signers {
        upsert(*signer, true, false);
    }

    // Stable sort keeps insertion order within a class, so the fee payer
    // stays first among writable signers.
    entries.sort_by_key(|e| match (e.is_signer, e.is_writable) {
        (true, true) => 0u8,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    });

    if entries.len() > u8::MAX as usize {
        return Err(StakingError::TransactionBuildError(format!(
            "{} accounts exceed the 255 addressable by a legacy message",
            entries.len()
        )));
    }

    let count = |f: &dyn Fn(&AccountEntry) -> bool| entries.iter().filter(|e| f(e)).count() as u8;
    let num_required_signatures = count(&|e| e.is_signer);
    let num_readonly_signed = count(&|e| e.is_signer && !e.is_writable);
    let num_readonly_unsigned = count(&|e| !e.is_signer && !e.is_writable);

    let account_keys: Vec<Pubkey> = entries.iter().map(|e| e.pubkey).collect();
    let index_of = |key: &Pubkey| -> Result<u8, StakingError> {
        account_keys
            .iter()
            .position(|k| k == key)
            .map(|i| i as u8)
            .ok_or_else(|| {
                StakingError::TransactionBuildError(format!(
                    "{} not in account keys",
                    to_base58(key)
                ))
            })
    };

    let mut compiled = Vec::with_capacity(bundle.instructions.len());
    for ix in &bundle.instructions {
        let account_indices = ix
            .accounts
            .iter()
            .map(|meta| index_of(&meta.pubkey))
            .collect::<Result<Vec<_>, _>>()?;

        compiled.push(CompiledInstruction {
            program_id_index: index_of(&ix.program_id)?,
            account_indices,
            data: ix.data.clone(),
        });
    }

    Ok(Message {
        account_keys,
        num_required_signatures,
        num_readonly_signed,
        num_readonly_unsigned,
        recent_blockhash: *recent_blockhash,
        compiled_instructions: compiled,
    })
}

/// Serialize the message (the bytes that get signed).
pub fn serialize_message(message: &Message) -> Result<Vec<u8>, StakingError> {
    let mut buf = Vec::with_capacity(512);

    buf.push(message.num_required_signatures);
    buf.push(message.num_readonly_signed);
    buf.push(message.num_readonly_unsigned);

    buf.extend_from_slice(&encode_compact_u16(len_u16(message.account_keys.len())?));
    for key in &message.account_keys {
        buf.extend_from_slice(key);
    }

    buf.extend_from_slice(&message.recent_blockhash);

    buf.extend_from_slice(&encode_compact_u16(len_u16(
        message.compiled_instructions.len(),
    )?));
    for ix in &message.compiled_instructions {
        buf.push(ix.program_id_index);

        buf.extend_from_slice(&encode_compact_u16(len_u16(ix.account_indices.len())?));
        buf.extend_from_slice(&ix.account_indices);

        buf.extend_from_slice(&encode_compact_u16(len_u16(ix.data.len())?));
        buf.extend_from_slice(&ix.data);
    }

    Ok(buf)
}

fn len_u16(len: usize) -> Result<u16, StakingError> {
    u16::try_from(len)
        .map_err(|_| StakingError::SerializationError(format!("length {len} exceeds u16")))
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// Sign a message with every required key and serialize it to wire format.
///
/// `keys` must cover every signer slot exactly; a missing key or a key
/// that is not a required signer is an error.
pub fn sign_transaction(message: &Message, keys: &[&SigningKey]) -> Result<Vec<u8>, StakingError> {
    for key in keys {
        let pubkey = key.verifying_key().to_bytes();
        if !message.signer_keys().contains(&pubkey) {
            return Err(StakingError::SigningError(format!(
                "{} is not a required signer",
                to_base58(&pubkey)
            )));
        }
    }

    let mut wire = unsigned_wire_transaction(message)?;
    for key in keys {
        wire = partial_sign_wire_transaction(key, &wire)?;
    }

    let (_, prefix) = decode_compact_u16(&wire)?;
    for (slot, signer) in message.signer_keys().iter().enumerate() {
        let start = prefix + slot * SIGNATURE_LEN;
        if wire[start..start + SIGNATURE_LEN].iter().all(|b| *b == 0) {
            return Err(StakingError::SigningError(format!(
                "missing signature for {}",
                to_base58(signer)
            )));
        }
    }

    Ok(wire)
}

/// Serialize a message with zeroed signature slots, ready for signers to
/// fill in one at a time with [`partial_sign_wire_transaction`].
pub fn unsigned_wire_transaction(message: &Message) -> Result<Vec<u8>, StakingError> {
    let message_bytes = serialize_message(message)?;
    let num_sigs = message.num_required_signatures as usize;

    let mut wire = Vec::with_capacity(3 + num_sigs * SIGNATURE_LEN + message_bytes.len());
    wire.extend_from_slice(&encode_compact_u16(num_sigs as u16));
    wire.resize(wire.len() + num_sigs * SIGNATURE_LEN, 0);
    wire.extend_from_slice(&message_bytes);
    Ok(wire)
}

/// Add one signature to a wire-format transaction.
///
/// Locates the signature slot that belongs to `key` among the message's
/// signer keys, signs the message bytes and writes the signature there.
/// Other slots are left untouched, so the participant and the operator can
/// sign independently.
pub fn partial_sign_wire_transaction(
    key: &SigningKey,
    raw_tx: &[u8],
) -> Result<Vec<u8>, StakingError> {
    let our_pubkey = key.verifying_key().to_bytes();

    // Layout: compact-u16(num_signatures) | 64-byte signatures * N | message
    let (num_sigs, compact_len) = decode_compact_u16(raw_tx)?;

    if num_sigs == 0 {
        return Err(StakingError::TransactionBuildError(
            "transaction has zero signatures".into(),
        ));
    }

    let sigs_start = compact_len;
    let sigs_end = sigs_start + (num_sigs as usize) * SIGNATURE_LEN;

    if sigs_end > raw_tx.len() {
        return Err(StakingError::SerializationError(
            "transaction too short: signature slots exceed length".into(),
        ));
    }

    let message_bytes = &raw_tx[sigs_end..];

    if message_bytes.len() < 4 {
        return Err(StakingError::SerializationError(
            "transaction message too short".into(),
        ));
    }

    let num_required_sigs = message_bytes[0] as usize;
    let (num_accounts, accounts_compact_len) = decode_compact_u16(&message_bytes[3..])?;

    let accounts_start = 3 + accounts_compact_len;
    let accounts_end = accounts_start + (num_accounts as usize) * 32;

    if accounts_end > message_bytes.len() {
        return Err(StakingError::SerializationError(
            "transaction message too short for account keys".into(),
        ));
    }

    let signer_idx = (0..num_required_sigs.min(num_accounts as usize))
        .find(|i| {
            let key_start = accounts_start + i * 32;
            message_bytes[key_start..key_start + 32] == our_pubkey
        })
        .ok_or_else(|| {
            StakingError::SigningError(format!(
                "{} not found in transaction signers",
                to_base58(&our_pubkey)
            ))
        })?;

    let signature = key.sign(message_bytes);

    let mut signed_tx = raw_tx.to_vec();
    let sig_offset = sigs_start + signer_idx * SIGNATURE_LEN;
    signed_tx[sig_offset..sig_offset + SIGNATURE_LEN].copy_from_slice(&signature.to_bytes());

    Ok(signed_tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, VerifyingKey};

    fn transfer_like(from: Pubkey, to: Pubkey) -> Instruction {
        Instruction {
            program_id: [0u8; 32],
            accounts: vec![AccountMeta::writable(from, true), AccountMeta::writable(to, false)],
            data: vec![2, 0, 0, 0],
        }
    }

    fn bundle_for(from: Pubkey, to: Pubkey) -> InstructionBundle {
        let mut bundle = InstructionBundle::new(from);
        bundle.push(transfer_like(from, to));
        bundle
    }

    // -- compact-u16 --------------------------------------------------------

    #[test]
    fn compact_u16_boundaries() {
        assert_eq!(encode_compact_u16(0), vec![0x00]);
        assert_eq!(encode_compact_u16(0x7f), vec![0x7f]);
        assert_eq!(encode_compact_u16(128), vec![0x80, 0x01]);
        assert_eq!(encode_compact_u16(16383), vec![0xff, 0x7f]);
        assert_eq!(encode_compact_u16(16384), vec![0x80, 0x80, 0x01]);
        assert_eq!(encode_compact_u16(u16::MAX), vec![0xff, 0xff, 0x03]);
    }

    #[test]
    fn decode_compact_u16_three_bytes() {
        let (val, len) = decode_compact_u16(&[0x80, 0x80, 0x01]).unwrap();
        assert_eq!(val, 16384);
        assert_eq!(len, 3);
    }

    #[test]
    fn decode_compact_u16_empty_input_fails() {
        assert!(decode_compact_u16(&[]).is_err());
    }

    #[test]
    fn decode_compact_u16_truncated_fails() {
        assert!(decode_compact_u16(&[0x80]).is_err());
    }

    // -- bundles ------------------------------------------------------------

    #[test]
    fn bundle_signers_are_deduplicated() {
        let mut bundle = InstructionBundle::new([1u8; 32]);
        bundle.add_signer([2u8; 32]);
        bundle.add_signer([1u8; 32]);
        assert_eq!(bundle.signers, vec![[1u8; 32], [2u8; 32]]);
    }

    #[test]
    fn bundle_append_keeps_order() {
        let mut first = bundle_for([1u8; 32], [2u8; 32]);
        let mut second = bundle_for([1u8; 32], [3u8; 32]);
        second.add_signer([9u8; 32]);
        first.append(second);

        assert_eq!(first.len(), 2);
        assert_eq!(first.instructions[1].accounts[1].pubkey, [3u8; 32]);
        assert_eq!(first.signers, vec![[1u8; 32], [9u8; 32]]);
    }

    // -- compilation --------------------------------------------------------

    #[test]
    fn compiled_message_account_order() {
        let from = [1u8; 32];
        let to = [2u8; 32];
        let msg = compile_message(&bundle_for(from, to), &from, &[0xAA; 32]).unwrap();

        assert_eq!(msg.account_keys, vec![from, to, [0u8; 32]]);
        assert_eq!(msg.num_required_signatures, 1);
        assert_eq!(msg.num_readonly_signed, 0);
        assert_eq!(msg.num_readonly_unsigned, 1);
        assert_eq!(msg.recent_blockhash, [0xAA; 32]);
    }

    #[test]
    fn extra_bundle_signer_becomes_readonly_signer() {
        let from = [1u8; 32];
        let operator = [7u8; 32];
        let mut bundle = bundle_for(from, [2u8; 32]);
        bundle.add_signer(operator);

        let msg = compile_message(&bundle, &from, &[0u8; 32]).unwrap();
        assert_eq!(msg.num_required_signatures, 2);
        assert_eq!(msg.num_readonly_signed, 1);
        assert_eq!(msg.signer_keys(), &[from, operator]);
    }

    #[test]
    fn fee_payer_distinct_from_signer_comes_first() {
        let payer = [9u8; 32];
        let from = [1u8; 32];
        let msg = compile_message(&bundle_for(from, [2u8; 32]), &payer, &[0u8; 32]).unwrap();
        assert_eq!(msg.account_keys[0], payer);
        assert_eq!(msg.signer_keys(), &[payer, from]);
    }

    #[test]
    fn compiled_instruction_indices() {
        let from = [1u8; 32];
        let to = [2u8; 32];
        let msg = compile_message(&bundle_for(from, to), &from, &[0u8; 32]).unwrap();

        let cix = &msg.compiled_instructions[0];
        assert_eq!(cix.program_id_index, 2);
        assert_eq!(cix.account_indices, vec![0, 1]);
    }

    #[test]
    fn empty_bundle_fails_to_compile() {
        let bundle = InstructionBundle::new([1u8; 32]);
        assert!(compile_message(&bundle, &[1u8; 32], &[0u8; 32]).is_err());
    }

    #[test]
    fn serialize_message_contains_blockhash() {
        let from = [1u8; 32];
        let msg = compile_message(&bundle_for(from, [2u8; 32]), &from, &[0xCC; 32]).unwrap();
        let bytes = serialize_message(&msg).unwrap();

        assert_eq!(bytes[0], msg.num_required_signatures);
        let offset = 3 + 1 + 32 * msg.account_keys.len();
        assert_eq!(&bytes[offset..offset + 32], &[0xCC; 32]);
    }

    // -- signing ------------------------------------------------------------

    #[test]
    fn sign_single_signer_verifies() {
        let key = SigningKey::from_bytes(&[0x42u8; 32]);
        let from = key.verifying_key().to_bytes();
        let msg = compile_message(&bundle_for(from, [0xBB; 32]), &from, &[0xCC; 32]).unwrap();

        let wire = sign_transaction(&msg, &[&key]).unwrap();
        assert_eq!(wire[0], 0x01);

        let sig = Signature::from_bytes(&wire[1..65].try_into().unwrap());
        let vk = VerifyingKey::from_bytes(&from).unwrap();
        assert!(vk.verify_strict(&wire[65..], &sig).is_ok());
    }

    #[test]
    fn sign_two_signers_fills_both_slots() {
        let owner = SigningKey::from_bytes(&[0x11u8; 32]);
        let operator = SigningKey::from_bytes(&[0x22u8; 32]);
        let owner_pk = owner.verifying_key().to_bytes();
        let operator_pk = operator.verifying_key().to_bytes();

        let mut bundle = bundle_for(owner_pk, [0xBB; 32]);
        bundle.add_signer(operator_pk);
        let msg = compile_message(&bundle, &owner_pk, &[0u8; 32]).unwrap();

        // Order of keys given does not matter.
        let wire = sign_transaction(&msg, &[&operator, &owner]).unwrap();
        assert_eq!(wire[0], 0x02);
        let message_bytes = &wire[1 + 128..];

        for (slot, pk) in [owner_pk, operator_pk].iter().enumerate() {
            let start = 1 + slot * 64;
            let sig = Signature::from_bytes(&wire[start..start + 64].try_into().unwrap());
            let vk = VerifyingKey::from_bytes(pk).unwrap();
            assert!(vk.verify_strict(message_bytes, &sig).is_ok());
        }
    }

    #[test]
    fn missing_signer_fails() {
        let owner = SigningKey::from_bytes(&[0x11u8; 32]);
        let owner_pk = owner.verifying_key().to_bytes();
        let mut bundle = bundle_for(owner_pk, [0xBB; 32]);
        bundle.add_signer([0x77u8; 32]);
        let msg = compile_message(&bundle, &owner_pk, &[0u8; 32]).unwrap();

        let err = sign_transaction(&msg, &[&owner]).unwrap_err();
        assert!(err.to_string().contains("missing signature"));
    }

    #[test]
    fn foreign_key_fails() {
        let owner = SigningKey::from_bytes(&[0x11u8; 32]);
        let stranger = SigningKey::from_bytes(&[0x33u8; 32]);
        let owner_pk = owner.verifying_key().to_bytes();
        let bundle = bundle_for(owner_pk, [0xBB; 32]);
        let msg = compile_message(&bundle, &owner_pk, &[0u8; 32]).unwrap();

        let err = sign_transaction(&msg, &[&owner, &stranger]).unwrap_err();
        assert!(err.to_string().contains("not a required signer"));
    }

    #[test]
    fn partial_signing_preserves_message_and_other_slots() {
        let owner = SigningKey::from_bytes(&[0x11u8; 32]);
        let operator = SigningKey::from_bytes(&[0x22u8; 32]);
        let owner_pk = owner.verifying_key().to_bytes();
        let mut bundle = bundle_for(owner_pk, [0xBB; 32]);
        bundle.add_signer(operator.verifying_key().to_bytes());
        let msg = compile_message(&bundle, &owner_pk, &[0u8; 32]).unwrap();

        let unsigned = unsigned_wire_transaction(&msg).unwrap();
        let by_operator = partial_sign_wire_transaction(&operator, &unsigned).unwrap();

        // Owner slot untouched, operator slot filled, message identical.
        assert!(by_operator[1..65].iter().all(|b| *b == 0));
        assert!(by_operator[65..129].iter().any(|b| *b != 0));
        assert_eq!(&by_operator[129..], &unsigned[129..]);

        let full = partial_sign_wire_transaction(&owner, &by_operator).unwrap();
        assert_eq!(full, sign_transaction(&msg, &[&owner, &operator]).unwrap());
    }

    #[test]
    fn partial_sign_truncated_input_fails() {
        let key = SigningKey::from_bytes(&[0x42u8; 32]);
        assert!(partial_sign_wire_transaction(&key, &[0x01]).is_err());
        assert!(partial_sign_wire_transaction(&key, &[]).is_err());
    }

    #[test]
    fn signer_keys_clamped_to_account_keys() {
        let msg = Message {
            account_keys: vec![[1u8; 32]],
            num_required_signatures: 3,
            num_readonly_signed: 0,
            num_readonly_unsigned: 0,
            recent_blockhash: [0u8; 32],
            compiled_instructions: Vec::new(),
        };
        assert_eq!(msg.signer_keys(), &[[1u8; 32]]);
    }

    #[test]
    fn partial_sign_zero_signatures_fails() {
        let key = SigningKey::from_bytes(&[0x42u8; 32]);
        let err = partial_sign_wire_transaction(&key, &[0x00, 0x01, 0x00, 0x00]).unwrap_err();
        assert!(err.to_string().contains("zero signatures"));
    }
}
