//! Compact-u16 length prefix used throughout the transaction wire format.
//!
//! Lengths are little-endian base-128: seven value bits per byte, high bit
//! set when another byte follows, at most three bytes. Encodings must be
//! minimal; a trailing zero continuation byte is rejected.

use crate::error::TransactionError;

/// Maximum number of bytes an encoded length may take.
pub const MAX_ENCODING_LEN: usize = 3;

/// Append the compact encoding of `len` to `out`.
pub fn encode_len(len: usize, out: &mut Vec<u8>) -> Result<(), TransactionError> {
    let mut rem = u16::try_from(len).map_err(|_| TransactionError::LengthOverflow(len))?;
    loop {
        let mut byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            out.push(byte);
            return Ok(());
        }
        byte |= 0x80;
        out.push(byte);
    }
}

/// Decode a compact length from the start of `bytes`.
///
/// Returns the length and the number of bytes consumed. `offset` is only
/// used for error reporting.
pub fn decode_len(bytes: &[u8], offset: usize) -> Result<(usize, usize), TransactionError> {
    let mut value: u32 = 0;
    for i in 0..MAX_ENCODING_LEN {
        let byte = *bytes.get(i).ok_or(TransactionError::Truncated {
            offset: offset + i,
            needed: 1,
        })?;
        value |= u32::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            if byte == 0 && i > 0 {
                return Err(TransactionError::InvalidLength {
                    offset,
                    reason: "non-minimal encoding",
                });
            }
            if value > u32::from(u16::MAX) {
                return Err(TransactionError::InvalidLength {
                    offset,
                    reason: "value exceeds u16",
                });
            }
            return Ok((value as usize, i + 1));
        }
    }
    Err(TransactionError::InvalidLength {
        offset,
        reason: "encoding longer than three bytes",
    })
}
