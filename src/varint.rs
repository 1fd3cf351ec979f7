//! Variable-length integer codec
//!
//! Integers are written most-significant group first. Each byte carries a
//! 7-bit group; the high bit is set on every byte except the last one.
//!
//! This is the bijective variant rather than plain LEB128: every group above
//! the lowest one is stored minus one, so each value has exactly one
//! encoding and no encoding has redundant leading groups.
//!
//! ```text
//!        0  -> 00
//!      127  -> 7f
//!      128  -> 80 00
//!    16511  -> ff 7f
//!    16512  -> 80 80 00
//! ```

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};

/// Largest value accepted by the codec (2^63 - 1)
pub const MAX_VALUE: u64 = i64::MAX as u64;

/// Longest encoding the decoder will walk before giving up
pub const MAX_ENCODED_LEN: usize = 10;

const GROUP_MASK: u64 = 0x7f;
const CONTINUATION: u8 = 0x80;

/// Encode `n` into a freshly allocated buffer
pub fn encode(n: u64) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(encoded_len(n));
    put_varint(&mut out, n)?;
    Ok(out)
}

/// Number of bytes `encode(n)` produces
pub fn encoded_len(mut n: u64) -> usize {
    let mut len = 1;
    while n > GROUP_MASK {
        n = (n >> 7) - 1;
        len += 1;
    }
    len
}

/// Append the encoding of `n` to `buf`
pub fn put_varint<B: BufMut>(buf: &mut B, n: u64) -> Result<()> {
    if n > MAX_VALUE {
        return Err(Error::InvalidInput(format!(
            "varint value {} is outside [0, 2^63)",
            n
        )));
    }

    // Groups come out least-significant first; the terminal byte is produced
    // first and must be written last.
    let mut groups = [0u8; MAX_ENCODED_LEN];
    let mut len = 0;
    let mut n = n;
    loop {
        let flag = if len == 0 { 0 } else { CONTINUATION };
        groups[len] = (n & GROUP_MASK) as u8 | flag;
        len += 1;
        if n <= GROUP_MASK {
            break;
        }
        n = (n >> 7) - 1;
    }

    for byte in groups[..len].iter().rev() {
        buf.put_u8(*byte);
    }
    Ok(())
}

/// Read one varint from the front of `buf`, advancing past it
pub fn get_varint<B: Buf>(buf: &mut B) -> Result<u64> {
    let mut n: u64 = 0;

    for _ in 0..MAX_ENCODED_LEN {
        if !buf.has_remaining() {
            return Err(Error::InvalidInput("truncated varint".into()));
        }
        let byte = buf.get_u8();

        if n > (u64::MAX >> 7) {
            return Err(Error::InvalidInput("varint overflows 64 bits".into()));
        }
        n = (n << 7) | u64::from(byte & GROUP_MASK as u8);

        if byte & CONTINUATION == 0 {
            if n > MAX_VALUE {
                return Err(Error::InvalidInput(format!(
                    "varint value {} is outside [0, 2^63)",
                    n
                )));
            }
            return Ok(n);
        }

        // Undo the minus-one applied to every group above the lowest
        n = n
            .checked_add(1)
            .ok_or_else(|| Error::InvalidInput("varint overflows 64 bits".into()))?;
    }

    Err(Error::InvalidInput(format!(
        "varint longer than {} bytes",
        MAX_ENCODED_LEN
    )))
}

/// Decode a varint from the start of `bytes`.
///
/// Returns the value and the number of bytes it occupied; trailing bytes are
/// left untouched.
pub fn decode(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut cursor = bytes;
    let value = get_varint(&mut cursor)?;
    Ok((value, bytes.len() - cursor.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_single_byte_values() {
        assert_eq!(encode(0).unwrap(), vec![0x00]);
        assert_eq!(encode(1).unwrap(), vec![0x01]);
        assert_eq!(encode(127).unwrap(), vec![0x7f]);
    }

    #[test]
    fn test_group_boundaries() {
        // Bijective: 128 is the first two-byte value, 16511 the last.
        assert_eq!(encode(128).unwrap(), vec![0x80, 0x00]);
        assert_eq!(encode(255).unwrap(), vec![0x80, 0x7f]);
        assert_eq!(encode(16511).unwrap(), vec![0xff, 0x7f]);
        assert_eq!(encode(16512).unwrap(), vec![0x80, 0x80, 0x00]);
    }

    #[test]
    fn test_decode_boundaries() {
        assert_eq!(decode(&[0x00]).unwrap(), (0, 1));
        assert_eq!(decode(&[0x7f]).unwrap(), (127, 1));
        assert_eq!(decode(&[0x80, 0x00]).unwrap(), (128, 2));
        assert_eq!(decode(&[0xff, 0x7f]).unwrap(), (16511, 2));
        assert_eq!(decode(&[0x80, 0x80, 0x00]).unwrap(), (16512, 3));
    }

    #[test]
    fn test_decode_leaves_trailing_bytes() {
        let (value, used) = decode(&[0x80, 0x00, 0xaa, 0xbb]).unwrap();
        assert_eq!(value, 128);
        assert_eq!(used, 2);
    }

    #[test]
    fn test_round_trip_random() {
        let mut rng = rand::thread_rng();
        for _ in 0..10_000 {
            let n: u64 = rng.gen_range(0..(1u64 << 48));
            let bytes = encode(n).unwrap();
            assert_eq!(decode(&bytes).unwrap(), (n, bytes.len()), "value {}", n);
        }
    }

    #[test]
    fn test_round_trip_powers_of_two() {
        for shift in 0..63 {
            for n in [(1u64 << shift) - 1, 1u64 << shift, (1u64 << shift) + 1] {
                let bytes = encode(n).unwrap();
                assert_eq!(decode(&bytes).unwrap(), (n, bytes.len()), "value {}", n);
            }
        }
        let bytes = encode(MAX_VALUE).unwrap();
        assert_eq!(decode(&bytes).unwrap().0, MAX_VALUE);
    }

    #[test]
    fn test_encoded_len_matches_and_is_monotonic() {
        let mut previous = 0;
        let mut n = 0u64;
        while n < (1u64 << 48) {
            let len = encoded_len(n);
            assert_eq!(len, encode(n).unwrap().len());
            assert!(len >= previous, "length shrank at {}", n);
            previous = len;
            n = n * 3 + 1;
        }
    }

    #[test]
    fn test_only_last_byte_terminates() {
        let bytes = encode(1u64 << 40).unwrap();
        let (last, rest) = bytes.split_last().unwrap();
        assert_eq!(last & CONTINUATION, 0);
        assert!(rest.iter().all(|b| b & CONTINUATION != 0));
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(matches!(encode(1u64 << 63), Err(Error::InvalidInput(_))));
        assert!(matches!(encode(u64::MAX), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode(&[]), Err(Error::InvalidInput(_))));
        assert!(matches!(decode(&[0x80]), Err(Error::InvalidInput(_))));
        assert!(matches!(decode(&[0xff; 12]), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_get_varint_advances_buffer() {
        let mut out = Vec::new();
        put_varint(&mut out, 300).unwrap();
        put_varint(&mut out, 5).unwrap();

        let mut cursor = &out[..];
        assert_eq!(get_varint(&mut cursor).unwrap(), 300);
        assert_eq!(get_varint(&mut cursor).unwrap(), 5);
        assert!(cursor.is_empty());
    }
}
