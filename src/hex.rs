//! Hex helpers shared by the packet codec and the request builders.
//!
//! RSP encodes numbers as big-endian hex digit runs and memory/register contents
//! as pairs of hex digits per byte.

use crate::error::{Error, Result};

const DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Encode a byte as two lower-case ASCII hex digits.
pub fn encode_hex_byte(b: u8) -> [u8; 2] {
    [DIGITS[(b >> 4) as usize], DIGITS[(b & 0xf) as usize]]
}

/// Append the hex encoding of `data` to `out`.
pub fn encode_hex_into(data: &[u8], out: &mut Vec<u8>) {
    out.reserve(data.len() * 2);

    for b in data {
        out.extend_from_slice(&encode_hex_byte(*b));
    }
}

pub fn encode_hex(data: &[u8]) -> String {
    let mut out = Vec::with_capacity(data.len() * 2);
    encode_hex_into(data, &mut out);

    // Only ASCII hex digits were pushed.
    String::from_utf8_lossy(&out).into_owned()
}

/// Decode one hex digit (either case) into its nibble value.
pub fn decode_hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Decode up to `n` leading hex digits of `bytes` as a big-endian number.
///
/// Decoding stops at the first non-hex byte or after `n` digits, returning the value
/// accumulated so far. Fixed-width fields (signal numbers, checksums) rely on this, so
/// a short or invalid run is not an error.
pub fn decode_hex_run(bytes: &[u8], n: usize) -> u64 {
    let mut value: u64 = 0;

    for c in bytes.iter().take(n) {
        match decode_hex_digit(*c) {
            Some(nibble) => value = (value << 4) | u64::from(nibble),
            None => break,
        }
    }

    value
}

/// Decode a whole hex number, or fail if `bytes` is empty or holds a non-hex byte.
pub fn decode_hex_number(bytes: &[u8]) -> Result<u64> {
    if bytes.is_empty() || bytes.len() > 16 || !bytes.iter().all(u8::is_ascii_hexdigit) {
        return Err(Error::InvalidHex);
    }

    Ok(decode_hex_run(bytes, bytes.len()))
}

/// Decode the first `n` bytes of `bytes` as hex pairs into `out`.
///
/// Fails if `n` is odd, `bytes` is short, or any pair is not hex. On failure, the
/// contents of `out` are unspecified.
pub fn decode_hex_buffer(bytes: &[u8], n: usize, out: &mut Vec<u8>) -> Result<()> {
    if n % 2 != 0 || bytes.len() < n {
        return Err(Error::InvalidHex);
    }

    out.reserve(n / 2);

    for pair in bytes[..n].chunks_exact(2) {
        let hi = decode_hex_digit(pair[0]).ok_or(Error::InvalidHex)?;
        let lo = decode_hex_digit(pair[1]).ok_or(Error::InvalidHex)?;
        out.push((hi << 4) | lo);
    }

    Ok(())
}

pub fn decode_hex(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    decode_hex_buffer(bytes, bytes.len(), &mut out)?;
    Ok(out)
}
