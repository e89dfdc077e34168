use anyhow::Result;
use pretty_assertions::assert_eq;
use rsptrace::hex::*;

#[test]
fn test_byte_round_trip() {
    for b in 0..=255u8 {
        let [hi, lo] = encode_hex_byte(b);
        let decoded = decode_hex_digit(hi).unwrap() << 4 | decode_hex_digit(lo).unwrap();
        assert_eq!(decoded, b);
    }
}

#[test]
fn test_encoding_is_lower_case() {
    assert_eq!(&encode_hex_byte(0xab), b"ab");
    assert_eq!(encode_hex(b"\x00\x7f\xff"), "007fff");
}

#[test]
fn test_run_accepts_partial() {
    assert_eq!(decode_hex_run(b"0x", 2), 0);
    assert_eq!(decode_hex_run(b"ff", 2), 255);
    assert_eq!(decode_hex_run(b"1234", 2), 0x12);
    assert_eq!(decode_hex_run(b"7", 2), 7);
    assert_eq!(decode_hex_run(b"", 2), 0);
}

#[test]
fn test_buffer_round_trip() -> Result<()> {
    let hex = b"00ff10a5c3";
    let decoded = decode_hex(hex)?;

    assert_eq!(decoded, vec![0x00, 0xff, 0x10, 0xa5, 0xc3]);
    assert_eq!(encode_hex(&decoded).as_bytes(), hex);

    Ok(())
}

#[test]
fn test_buffer_rejects_bad_input() {
    let mut out = vec![];

    assert!(decode_hex_buffer(b"abc", 3, &mut out).is_err());
    assert!(decode_hex_buffer(b"zz", 2, &mut out).is_err());
    assert!(decode_hex_buffer(b"ab", 4, &mut out).is_err());
}

#[test]
fn test_number() -> Result<()> {
    assert_eq!(decode_hex_number(b"1a")?, 0x1a);
    assert!(decode_hex_number(b"").is_err());
    assert!(decode_hex_number(b"-1").is_err());

    Ok(())
}
