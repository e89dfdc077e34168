use anyhow::Result;
use ntest::timeout;
use pretty_assertions::assert_eq;
use rsptrace::Error;

#[macro_use]
mod support;
use support::*;

#[test]
#[timeout(1000)]
fn test_nack_bad_checksum() -> Result<()> {
    let (mut conn, capture) = Script::new()
        .raw(b"$OK#00")
        .raw(b"$OK#9a")
        .connect()?;

    let packet = conn.recv(false)?;

    assert!(packet.is_ok());
    assert_eq!(capture.acks(), "+-+");

    Ok(())
}

#[test]
#[timeout(1000)]
fn test_resend_on_nack() -> Result<()> {
    let (mut conn, capture) = Script::new().nack().ack().connect()?;

    conn.send_str("g")?;

    assert_eq!(capture.packets(), vec!["g", "g"]);

    Ok(())
}

#[test]
#[timeout(1000)]
fn test_enable_noack() -> Result<()> {
    let (mut conn, capture) = Script::new()
        .reply("OK")
        .no_ack()
        .raw(b"$OK#00")
        .connect()?;

    assert!(conn.acks_enabled());
    assert!(conn.enable_noack()?);
    assert!(!conn.acks_enabled());

    // Accepted despite the checksum, and not acked.
    let packet = conn.recv(false)?;
    assert!(packet.is_ok());

    // No ack awaited.
    conn.send_str("g")?;

    assert_eq!(capture.packets(), vec!["QStartNoAckMode", "g"]);
    assert_eq!(capture.acks(), "++");

    Ok(())
}

#[test]
#[timeout(1000)]
fn test_enable_noack_refused() -> Result<()> {
    let (mut conn, _capture) = Script::new().reply("").connect()?;

    assert!(!conn.enable_noack()?);
    assert!(conn.acks_enabled());

    Ok(())
}

#[test]
#[timeout(1000)]
fn test_syscall_stop_diverted() -> Result<()> {
    let (mut conn, _capture) = Script::new()
        .ack()
        .notify("Stop:T05syscall_entry:3c;thread:p1.2;")
        .send("T05syscall_return:3c;thread:p1.3;")
        .send("2a")
        .connect()?;

    let reply = conn.request_str("m1000,1")?;

    assert_eq!(reply.data(), b"2a");
    assert_eq!(conn.notifications().len(), 2);
    assert!(conn.has_pending_notification());

    let first = conn.notifications_mut().pop().unwrap();
    assert_eq!(first.data(), b"T05syscall_entry:3c;thread:p1.2;");

    Ok(())
}

#[test]
#[timeout(1000)]
fn test_other_notification_deferred() -> Result<()> {
    let (mut conn, _capture) = Script::new()
        .ack()
        .notify("Stop:T0bthread:p1.2;")
        .send("OK")
        .connect()?;

    let reply = conn.request_str("Hgp1.2")?;

    assert!(reply.is_ok());
    assert!(conn.notifications().is_empty());
    assert!(conn.has_pending_notification());

    let deferred = conn.take_deferred().unwrap();
    assert_eq!(deferred.data(), b"T0bthread:p1.2;");
    assert!(!conn.has_pending_notification());

    Ok(())
}

#[test]
#[timeout(1000)]
fn test_stop_not_diverted_when_wanted() -> Result<()> {
    let (mut conn, _capture) = Script::new()
        .send("T05syscall_entry:3c;thread:p1.2;")
        .connect()?;

    let stop = conn.recv(true)?;

    assert!(stop.is_syscall_stop());
    assert!(!conn.has_pending_notification());

    Ok(())
}

#[test]
#[timeout(1000)]
fn test_request_ok_error() -> Result<()> {
    let (mut conn, _capture) = Script::new().reply("E01").reply("").connect()?;

    match conn.request_ok("QCatchSyscalls:1") {
        Err(Error::Remote { code, .. }) => assert_eq!(code, 1),
        other => panic!("unexpected result: {:?}", other),
    }

    match conn.request_ok("QNonStop:1") {
        Err(err @ Error::UnexpectedReply { .. }) => assert!(err.is_fatal()),
        other => panic!("unexpected result: {:?}", other),
    }

    Ok(())
}

#[test]
#[timeout(1000)]
fn test_disconnected() -> Result<()> {
    let (mut conn, _capture) = Script::new().ack().connect()?;

    let result = conn.request_str("?");

    assert!(matches!(result, Err(Error::Disconnected)));

    Ok(())
}
