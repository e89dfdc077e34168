use anyhow::Result;
use pretty_assertions::assert_eq;
use rsptrace::notify::{NotificationQueue, DEFAULT_CAPACITY};
use rsptrace::packet::Packet;
use rsptrace::Error;

fn syscall_stop(tid: u32) -> Packet {
    Packet::notification(format!("T05syscall_entry:3c;thread:p1.{:x};", tid))
}

#[test]
fn test_fifo() -> Result<()> {
    let mut queue = NotificationQueue::default();
    assert_eq!(queue.capacity(), DEFAULT_CAPACITY);

    for tid in 1..=3 {
        assert!(queue.push(syscall_stop(tid))?);
    }

    assert!(queue.has_pending());
    assert_eq!(queue.pop(), Some(syscall_stop(1)));
    assert_eq!(queue.pop(), Some(syscall_stop(2)));
    assert_eq!(queue.pop(), Some(syscall_stop(3)));
    assert_eq!(queue.pop(), None);
    assert!(!queue.has_pending());

    Ok(())
}

#[test]
fn test_overflow() -> Result<()> {
    let mut queue = NotificationQueue::with_capacity(2);

    queue.push(syscall_stop(1))?;
    queue.push(syscall_stop(2))?;

    let overflow = queue.push(syscall_stop(3));
    assert!(matches!(overflow, Err(Error::QueueFull)));
    assert!(!overflow.unwrap_err().is_fatal());

    // Unchanged by the failed push.
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.pop(), Some(syscall_stop(1)));

    Ok(())
}

#[test]
fn test_grow() -> Result<()> {
    let mut queue = NotificationQueue::with_capacity(1);

    queue.push(syscall_stop(1))?;
    assert!(queue.push(syscall_stop(2)).is_err());

    queue.grow(1);
    assert_eq!(queue.capacity(), 2);
    assert!(queue.push(syscall_stop(2))?);

    Ok(())
}

#[test]
fn test_discard_other_stops() -> Result<()> {
    let mut queue = NotificationQueue::default();

    assert!(!queue.push(Packet::notification("T0bthread:p1.1;"))?);
    assert!(!queue.push(Packet::new("OK"))?);

    assert!(queue.is_empty());

    Ok(())
}
