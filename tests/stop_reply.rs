use pretty_assertions::assert_eq;
use rsptrace::{StopKind, StopReply, ThreadId};

#[macro_use]
mod support;

#[test]
fn test_error() {
    let parsed = stop!("E01");

    assert_eq!(parsed.stop.kind, StopKind::Error);
    assert_eq!(parsed.stop.code, 1);
}

#[test]
fn test_trap_with_thread() {
    let parsed = stop!("T0508thread:p1234.5678;");

    assert_eq!(parsed.stop, StopReply {
        kind: StopKind::Trap,
        code: 5,
        pid: Some(pid!(0x1234)),
        tid: Some(pid!(0x5678)),
    });
    assert_eq!(parsed.focus, None);
}

#[test]
fn test_exited() {
    let parsed = stop!("W00;process:1a");

    assert_eq!(parsed.stop, StopReply {
        kind: StopKind::Exited,
        code: 0,
        pid: Some(pid!(0x1a)),
        tid: Some(pid!(0x1a)),
    });
}

#[test]
fn test_terminated() {
    let parsed = stop!("X09;process:1a");

    assert_eq!(parsed.stop.kind, StopKind::Terminated);
    assert_eq!(parsed.stop.signal(), Some(9));
    assert_eq!(parsed.stop.pid, Some(pid!(0x1a)));
}

#[test]
fn test_syscall_entry() {
    let parsed = stop!("T05syscall_entry:e7;thread:p10.11;");

    assert_eq!(parsed.stop.kind, StopKind::SyscallEntry);
    assert_eq!(parsed.stop.code, 0xe7);
    assert_eq!(parsed.stop.tid, Some(pid!(0x11)));
}

#[test]
fn test_syscall_return() {
    let parsed = stop!("T05syscall_return:3c;thread:p10.10;");

    assert_eq!(parsed.stop.kind, StopKind::SyscallReturn);
    assert_eq!(parsed.stop.code, 0x3c);
}

#[test]
fn test_signal() {
    let parsed = stop!("T0bthread:p10.12;");

    assert_eq!(parsed.stop.kind, StopKind::Signal);
    assert_eq!(parsed.stop.signal(), Some(11));

    // Only a trap can be refined into a syscall stop.
    let parsed = stop!("T0bsyscall_entry:3c;thread:p10.12;");
    assert_eq!(parsed.stop.kind, StopKind::Signal);
    assert_eq!(parsed.stop.code, 0xb);
}

#[test]
fn test_no_signal_is_trap() {
    let parsed = stop!("S00");

    assert_eq!(parsed.stop.kind, StopKind::Trap);
    assert_eq!(parsed.stop.tid, None);
}

#[test]
fn test_second_thread_sets_focus() {
    let parsed = stop!("T05thread:p10.11;thread:p10.12;");

    assert_eq!(parsed.stop.tid, Some(pid!(0x11)));
    assert_eq!(parsed.focus, Some(ThreadId::new(pid!(0x10), pid!(0x12))));
}

#[test]
fn test_malformed_annotation_skipped() {
    let parsed = stop!("T05garbage;thread:p10.12;");

    assert_eq!(parsed.stop.kind, StopKind::Trap);
    assert_eq!(parsed.stop.tid, Some(pid!(0x12)));
}

#[test]
fn test_unknown() {
    assert_eq!(stop!("T0").stop.kind, StopKind::Unknown);
    assert_eq!(stop!("Zabc").stop.kind, StopKind::Unknown);
    assert_eq!(stop!("").stop, StopReply::unknown());
}

#[test]
fn test_thread_ids() {
    assert_eq!(ThreadId::parse(b"p1a.1b"), Some(ThreadId::new(pid!(0x1a), pid!(0x1b))));
    assert_eq!(ThreadId::parse(b"p1a"), Some(ThreadId::leader(pid!(0x1a))));
    assert_eq!(ThreadId::parse(b"1b"), Some(ThreadId::leader(pid!(0x1b))));
    assert_eq!(ThreadId::parse(b"px"), None);

    let all = ThreadId::parse(b"p1a.-1").unwrap();
    assert_eq!(all.tid, pid!(-1));
    assert_eq!(all.encode(true), "p1a.-1");

    let thread = ThreadId::new(pid!(0x1a), pid!(0x1b));
    assert_eq!(thread.encode(true), "p1a.1b");
    assert_eq!(thread.encode(false), "1b");
}
