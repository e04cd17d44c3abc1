//! Packed 24-bit stereo to hardware word conversion.
//!
//! The host ring buffer stores interleaved `S24_3LE` frames: three
//! little-endian bytes per channel, six bytes per frame. The transfer engine
//! consumes one 64-bit word per frame, made of two 32-bit I2S slots with each
//! sample MSB-aligned in its slot:
//!
//! ```text
//!  63        40 39    32 31         8 7      0
//! ┌────────────┬────────┬────────────┬────────┐
//! │  left 24   │ 0 pad  │  right 24  │ 0 pad  │
//! └────────────┴────────┴────────────┴────────┘
//! ```
//!
//! Words are stored little-endian, so one encoded frame occupies the bytes
//! `[0, r0, r1, r2, 0, l0, l1, l2]` in the transfer buffer.

use crate::constants::{FRAME_BYTES, WORD_BYTES};
use crate::error::{Error, Result};

/// Bit offset of the left channel sample inside an encoded word.
pub const LEFT_SHIFT: u32 = 40;

/// Bit offset of the right channel sample inside an encoded word.
pub const RIGHT_SHIFT: u32 = 8;

const SAMPLE_MASK: u64 = 0x00FF_FFFF;

/// Encode one packed stereo frame into a hardware word.
pub fn encode_frame(frame: &[u8; FRAME_BYTES]) -> u64 {
    let left = u32::from_le_bytes([frame[0], frame[1], frame[2], 0]) as u64;
    let right = u32::from_le_bytes([frame[3], frame[4], frame[5], 0]) as u64;
    (left << LEFT_SHIFT) | (right << RIGHT_SHIFT)
}

/// Recover the packed stereo frame from a hardware word.
///
/// Padding bits are ignored.
pub fn decode_word(word: u64) -> [u8; FRAME_BYTES] {
    let left = ((word >> LEFT_SHIFT) & SAMPLE_MASK) as u32;
    let right = ((word >> RIGHT_SHIFT) & SAMPLE_MASK) as u32;
    let l = left.to_le_bytes();
    let r = right.to_le_bytes();
    [l[0], l[1], l[2], r[0], r[1], r[2]]
}

/// Encode whole frames from `src` into `dest`.
///
/// `src` must hold a whole number of frames; a trailing fragment is rejected
/// with [`Error::PartialFrame`] before anything is written. Encoding stops
/// when `dest` runs out of room for another word.
///
/// Returns the number of frames encoded.
pub fn encode(src: &[u8], dest: &mut [u8]) -> Result<usize> {
    if src.len() % FRAME_BYTES != 0 {
        return Err(Error::PartialFrame { len: src.len() });
    }

    let mut frames = 0;
    for (frame, word) in src
        .chunks_exact(FRAME_BYTES)
        .zip(dest.chunks_exact_mut(WORD_BYTES))
    {
        let mut packed = [0u8; FRAME_BYTES];
        packed.copy_from_slice(frame);
        word.copy_from_slice(&encode_frame(&packed).to_le_bytes());
        frames += 1;
    }
    Ok(frames)
}
