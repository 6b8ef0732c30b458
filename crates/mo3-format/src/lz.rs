//! LZ decompressor for the music chunk.
//!
//! The compressed stream interleaves lazily-pulled control bytes with
//! literal and offset bytes. Offsets are stored bitwise-complemented
//! (negative displacements from the write position); short matches can
//! reuse the previous offset without spending an offset byte.

use crate::bitstream::BitReader;
use crate::reader::ByteReader;
use crate::FormatError;

/// Decompress exactly `size` bytes of music-chunk data, leaving `src`
/// positioned after the last byte the compressed stream consumed.
pub(crate) fn decompress(src: &mut ByteReader<'_>, size: usize) -> Result<Vec<u8>, FormatError> {
    if size == 0 {
        return Err(FormatError::Corrupted("empty music chunk"));
    }

    let mut bits = BitReader::new();
    let mut previous_offset: i64 = 0;
    let mut dst: Vec<u8> = Vec::with_capacity(size);

    // The first byte is always a literal seed.
    dst.push(src.read_u8()?);

    while dst.len() < size {
        if bits.read_bit(src)? == 0 {
            dst.push(src.read_u8()?);
            continue;
        }

        // Match. Length codes below 3 reuse the previous offset and give
        // the length back the bit they borrowed; otherwise the code's
        // excess forms the offset high bits.
        let mut bonus: i64 = 0;
        let mut length = i64::from(bits.read_length(src)?) - 3;
        let offset;
        if length < 0 {
            offset = previous_offset;
            length += 1;
        } else {
            let low = i64::from(src.read_u8()?);
            offset = !((length << 8) | low);
            length = 0;
            if offset < -1280 {
                bonus += 1;
            }
            bonus += 1; // matches are never empty
            if offset < -32000 {
                bonus += 1;
            }
            previous_offset = offset;
        }

        // Two refinement bits; all-zero falls back to an extended code.
        length = (length << 1) + i64::from(bits.read_bit(src)?);
        length = (length << 1) + i64::from(bits.read_bit(src)?);
        if length == 0 {
            length = i64::from(bits.read_length(src)?) + 2;
        }
        length += bonus;

        let pos = dst.len() as i64;
        let from = pos + offset;
        if from < 0 || from >= pos {
            return Err(FormatError::Corrupted("match source out of range"));
        }
        if length > size as i64 - pos {
            return Err(FormatError::Corrupted("match overruns declared size"));
        }

        // Byte-by-byte: source and destination may overlap for
        // self-referential run extension.
        let mut from = from as usize;
        for _ in 0..length {
            let byte = dst[from];
            dst.push(byte);
            from += 1;
        }
    }

    Ok(dst)
}
