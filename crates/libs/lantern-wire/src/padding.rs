//! Reversible content padding to fixed block sizes.
//!
//! Message content is padded before hitting the wire so the true length
//! is obscured from a passive observer. Padding bytes are random; the
//! final byte stores the padding length so `unpad` can strip it again.

use rand_core::OsRng;
use rand_core::RngCore;

/// Block size candidates for [`optimal_block_size`], smallest first.
const BLOCK_SIZES: [usize; 4] = [256, 512, 1024, 2048];

/// Largest padding run expressible in the single trailing length byte.
const MAX_PADDING: usize = 255;

/// Pad `data` up to the next multiple of `block_size`.
///
/// Empty input is returned unchanged. A length already on a block
/// boundary still receives a full block of padding so the trailing
/// length byte is always present and `unpad` stays reversible. The run
/// is capped at 255 bytes to fit the length byte.
pub fn pad(data: &[u8], block_size: usize) -> Vec<u8> {
    if data.is_empty() || block_size == 0 {
        return data.to_vec();
    }

    let remainder = data.len() % block_size;
    let mut padding_len = block_size - remainder;
    if padding_len > MAX_PADDING {
        padding_len = MAX_PADDING;
    }

    let mut padded = Vec::with_capacity(data.len() + padding_len);
    padded.extend_from_slice(data);

    let mut padding = vec![0u8; padding_len];
    OsRng.fill_bytes(&mut padding);
    padding[padding_len - 1] = padding_len as u8;
    padded.extend_from_slice(&padding);

    padded
}

/// Strip padding applied by [`pad`].
///
/// The trailing byte is read as the padding length. Anything that does
/// not parse as valid padding (length zero or longer than the input) is
/// treated as unpadded data and returned unchanged rather than failing:
/// peers are free to send unpadded content.
pub fn unpad(data: &[u8]) -> Vec<u8> {
    if data.is_empty() {
        return data.to_vec();
    }

    let padding_len = data[data.len() - 1] as usize;
    if padding_len == 0 || padding_len > data.len() {
        return data.to_vec();
    }

    data[..data.len() - padding_len].to_vec()
}

/// Pick the smallest block size whose padding overhead fits in the
/// trailing length byte. Falls back to `data_size` itself when no
/// candidate qualifies, signalling the caller to skip padding.
pub fn optimal_block_size(data_size: usize) -> usize {
    for block_size in BLOCK_SIZES {
        let remainder = data_size % block_size;
        let padding = if remainder == 0 { block_size } else { block_size - remainder };
        if padding <= MAX_PADDING {
            return block_size;
        }
    }
    data_size
}
