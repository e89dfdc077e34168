use std::io::Cursor;

use anyhow::Result;
use pretty_assertions::assert_eq;
use rsptrace::packet::{self, read_packet};
use rsptrace::Error;

#[macro_use]
mod support;
use support::*;

fn read(bytes: &[u8]) -> rsptrace::error::Result<(rsptrace::packet::Packet, bool)> {
    read_packet(&mut Cursor::new(bytes.to_vec()))
}

#[test]
fn test_run_length() -> Result<()> {
    // `.` is 46, for 17 repeats after the first `a`.
    let (packet, ok) = read(&packet::frame(b"a*."))?;

    assert!(ok);
    assert_eq!(packet.data(), "a".repeat(18).as_bytes());

    Ok(())
}

#[test]
fn test_run_length_invalid_count() -> Result<()> {
    let (packet, ok) = read(&packet::frame(b"a*\x10b"))?;

    assert!(ok);
    assert_eq!(packet.data(), b"a*\x10b");

    Ok(())
}

#[test]
fn test_run_length_delimiter_count() -> Result<()> {
    // `#` still ends the packet, and the checksum covers the `*`.
    let (packet, ok) = read(b"$a*#8b")?;

    assert!(ok);
    assert_eq!(packet.data(), b"a*");

    // `$` still starts a new packet.
    let (packet, ok) = read(b"$a*$OK#9a")?;

    assert!(ok);
    assert!(packet.is_ok());

    Ok(())
}

#[test]
fn test_escape() -> Result<()> {
    let (packet, ok) = read(&packet::frame(b"x}\x03y"))?;

    assert!(ok);
    assert_eq!(packet.data(), b"x#y");

    Ok(())
}

#[test]
fn test_escape_round_trip() -> Result<()> {
    let data = b"$#%}*plain";
    let mut escaped = vec![];
    packet::escape(data, &mut escaped);

    let (packet, ok) = read(&packet::frame(&escaped))?;

    assert!(ok);
    assert_eq!(packet.data(), &data[..]);

    Ok(())
}

#[test]
fn test_checksum() -> Result<()> {
    let (packet, ok) = read(b"$OK#9a")?;
    assert!(ok);
    assert!(packet.is_ok());

    let (packet, ok) = read(b"$OK#00")?;
    assert!(!ok);
    assert_eq!(packet.data(), b"OK");

    Ok(())
}

#[test]
fn test_skips_stray_bytes() -> Result<()> {
    let (packet, ok) = read(b"++-$OK#9a")?;

    assert!(ok);
    assert!(packet.is_ok());

    Ok(())
}

#[test]
fn test_restart_inside_payload() -> Result<()> {
    let (packet, ok) = read(b"$garbage$OK#9a")?;

    assert!(ok);
    assert_eq!(packet.data(), b"OK");

    Ok(())
}

#[test]
fn test_notification_header() -> Result<()> {
    let framed = notification("Stop:T05syscall_entry:3c;thread:p1.1;");
    let (packet, ok) = read(&framed)?;

    assert!(ok);
    assert!(packet.is_notification());
    assert!(packet.is_syscall_stop());
    assert_eq!(packet.data(), b"T05syscall_entry:3c;thread:p1.1;");

    Ok(())
}

#[test]
fn test_torn_stream() {
    let result = read(b"$OK#9");

    assert!(matches!(result, Err(Error::Disconnected)));
    assert!(result.unwrap_err().is_fatal());
}

#[test]
fn test_error_reply() -> Result<()> {
    let (packet, _) = read(&support::packet("E0e"))?;

    assert_eq!(packet.error_code(), Some(0x0e));
    assert!(!packet.is_ok());

    Ok(())
}
