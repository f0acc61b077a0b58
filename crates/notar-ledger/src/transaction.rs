//! Legacy transaction wire format, restricted to what anchoring needs.
//!
//! ```text
//! transaction = shortvec(signatures[64]) message
//! message     = header[3] shortvec(account_keys[32]) blockhash[32]
//!               shortvec(instruction)
//! instruction = program_id_index[1] shortvec(account_index[1]) shortvec(data)
//! ```
//!
//! Signatures cover the serialized message bytes. The first signature
//! belongs to the fee payer and identifies the transaction.

use notar_crypto::{verify_signature, Signer};
use notar_types::{Address, Blockhash, TxSignature};

use crate::error::TransactionError;
use crate::short_vec;

/// On-chain memo program: records its instruction data and nothing else.
///
/// Base58: `MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr`.
pub const MEMO_PROGRAM_ID: Address = Address::from_bytes([
    5, 74, 83, 90, 153, 41, 33, 6, 77, 36, 232, 113, 96, 218, 56, 124, 124, 53, 181, 221, 188,
    146, 187, 129, 228, 31, 168, 64, 65, 5, 68, 141,
]);

/// Largest serialized transaction the network accepts.
pub const MAX_TRANSACTION_SIZE: usize = 1232;

/// Counts that partition `account_keys` into signer/readonly groups.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed_accounts: u8,
    pub num_readonly_unsigned_accounts: u8,
}

/// An instruction with its program and accounts replaced by key indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

/// The signed portion of a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub account_keys: Vec<Address>,
    pub recent_blockhash: Blockhash,
    pub instructions: Vec<CompiledInstruction>,
}

impl Message {
    /// A single memo instruction paid for (and signed) by `payer`.
    ///
    /// The memo program is referenced only as the program id; the instruction
    /// carries no account references.
    pub fn new_memo(payer: &Address, memo: &[u8], recent_blockhash: Blockhash) -> Self {
        Self {
            header: MessageHeader {
                num_required_signatures: 1,
                num_readonly_signed_accounts: 0,
                num_readonly_unsigned_accounts: 1,
            },
            account_keys: vec![*payer, MEMO_PROGRAM_ID],
            recent_blockhash,
            instructions: vec![CompiledInstruction {
                program_id_index: 1,
                accounts: Vec::new(),
                data: memo.to_vec(),
            }],
        }
    }

    /// The account that pays fees and must sign first.
    pub fn fee_payer(&self) -> Option<&Address> {
        self.account_keys.first()
    }

    /// Program address of an instruction, if its index is in range.
    pub fn program_id(&self, instruction: &CompiledInstruction) -> Option<&Address> {
        self.account_keys.get(instruction.program_id_index as usize)
    }

    /// Data of every instruction addressed to the memo program.
    pub fn memos(&self) -> impl Iterator<Item = &[u8]> {
        self.instructions
            .iter()
            .filter(|ix| self.program_id(ix) == Some(&MEMO_PROGRAM_ID))
            .map(|ix| ix.data.as_slice())
    }

    /// Serialize to the bytes that signatures cover.
    pub fn serialize(&self) -> Result<Vec<u8>, TransactionError> {
        let mut out = Vec::with_capacity(128);
        out.push(self.header.num_required_signatures);
        out.push(self.header.num_readonly_signed_accounts);
        out.push(self.header.num_readonly_unsigned_accounts);

        short_vec::encode_len(self.account_keys.len(), &mut out)?;
        for key in &self.account_keys {
            out.extend_from_slice(key.as_bytes());
        }
        out.extend_from_slice(self.recent_blockhash.as_bytes());

        short_vec::encode_len(self.instructions.len(), &mut out)?;
        for ix in &self.instructions {
            out.push(ix.program_id_index);
            short_vec::encode_len(ix.accounts.len(), &mut out)?;
            out.extend_from_slice(&ix.accounts);
            short_vec::encode_len(ix.data.len(), &mut out)?;
            out.extend_from_slice(&ix.data);
        }
        Ok(out)
    }

    /// Decode a message from `bytes[*pos..]`, advancing `pos`.
    fn decode(bytes: &[u8], pos: &mut usize) -> Result<Self, TransactionError> {
        let header_bytes = take(bytes, pos, 3)?;
        let header = MessageHeader {
            num_required_signatures: header_bytes[0],
            num_readonly_signed_accounts: header_bytes[1],
            num_readonly_unsigned_accounts: header_bytes[2],
        };

        let key_count = take_len(bytes, pos)?;
        let mut account_keys = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            account_keys.push(Address::from_bytes(take_array(bytes, pos)?));
        }
        let recent_blockhash = Blockhash::from_bytes(take_array(bytes, pos)?);

        let ix_count = take_len(bytes, pos)?;
        let mut instructions = Vec::with_capacity(ix_count);
        for _ in 0..ix_count {
            let program_id_index = take(bytes, pos, 1)?[0];
            let n = take_len(bytes, pos)?;
            let accounts = take(bytes, pos, n)?.to_vec();
            let n = take_len(bytes, pos)?;
            let data = take(bytes, pos, n)?.to_vec();
            for &index in accounts.iter().chain(std::iter::once(&program_id_index)) {
                if index as usize >= account_keys.len() {
                    return Err(TransactionError::AccountIndex {
                        index,
                        len: account_keys.len(),
                    });
                }
            }
            instructions.push(CompiledInstruction {
                program_id_index,
                accounts,
                data,
            });
        }

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        })
    }
}

/// A message together with its signatures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub signatures: Vec<TxSignature>,
    pub message: Message,
}

impl Transaction {
    /// Sign `message` with its fee payer.
    ///
    /// Only single-signer messages are supported; the signer must be the
    /// fee payer.
    pub fn sign(message: Message, signer: &dyn Signer) -> Result<Self, TransactionError> {
        let required = message.header.num_required_signatures as usize;
        if required != 1 {
            return Err(TransactionError::SignatureCount {
                expected: 1,
                actual: required,
            });
        }
        let payer = message.fee_payer().copied().ok_or(TransactionError::AccountIndex {
            index: 0,
            len: 0,
        })?;
        if signer.address() != payer {
            return Err(TransactionError::SignerMismatch {
                expected: payer,
                actual: signer.address(),
            });
        }

        let signature = signer.try_sign(&message.serialize()?)?;
        Ok(Self {
            signatures: vec![signature],
            message,
        })
    }

    /// The transaction's identifying signature (the fee payer's).
    pub fn signature(&self) -> Option<&TxSignature> {
        self.signatures.first()
    }

    /// Serialize for submission. Fails if the result exceeds
    /// [`MAX_TRANSACTION_SIZE`].
    pub fn serialize(&self) -> Result<Vec<u8>, TransactionError> {
        let message = self.message.serialize()?;
        let mut out = Vec::with_capacity(3 + 64 * self.signatures.len() + message.len());
        short_vec::encode_len(self.signatures.len(), &mut out)?;
        for sig in &self.signatures {
            out.extend_from_slice(sig.as_bytes());
        }
        out.extend_from_slice(&message);
        if out.len() > MAX_TRANSACTION_SIZE {
            return Err(TransactionError::TooLarge {
                size: out.len(),
                max: MAX_TRANSACTION_SIZE,
            });
        }
        Ok(out)
    }

    /// Decode a serialized transaction. Rejects trailing bytes.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, TransactionError> {
        let mut pos = 0;
        let sig_count = take_len(bytes, &mut pos)?;
        let mut signatures = Vec::with_capacity(sig_count);
        for _ in 0..sig_count {
            signatures.push(TxSignature::from_bytes(take_array(bytes, &mut pos)?));
        }
        let message = Message::decode(bytes, &mut pos)?;
        if pos != bytes.len() {
            return Err(TransactionError::TrailingBytes(bytes.len() - pos));
        }
        Ok(Self {
            signatures,
            message,
        })
    }

    /// Check every required signature against its account key.
    pub fn verify(&self) -> Result<(), TransactionError> {
        let required = self.message.header.num_required_signatures as usize;
        if self.signatures.len() != required || self.message.account_keys.len() < required {
            return Err(TransactionError::SignatureCount {
                expected: required,
                actual: self.signatures.len(),
            });
        }
        let message = self.message.serialize()?;
        for (index, (sig, key)) in self
            .signatures
            .iter()
            .zip(&self.message.account_keys)
            .enumerate()
        {
            verify_signature(key, &message, sig)
                .map_err(|_| TransactionError::InvalidSignature { index })?;
        }
        Ok(())
    }
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8], TransactionError> {
    let end = pos.checked_add(n).filter(|&end| end <= bytes.len()).ok_or(
        TransactionError::Truncated {
            offset: *pos,
            needed: n.saturating_sub(bytes.len().saturating_sub(*pos)),
        },
    )?;
    let slice = &bytes[*pos..end];
    *pos = end;
    Ok(slice)
}

fn take_array<const N: usize>(bytes: &[u8], pos: &mut usize) -> Result<[u8; N], TransactionError> {
    let slice = take(bytes, pos, N)?;
    let mut arr = [0u8; N];
    arr.copy_from_slice(slice);
    Ok(arr)
}

fn take_len(bytes: &[u8], pos: &mut usize) -> Result<usize, TransactionError> {
    let (len, consumed) = short_vec::decode_len(&bytes[(*pos).min(bytes.len())..], *pos)?;
    *pos += consumed;
    Ok(len)
}
