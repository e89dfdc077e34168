//! x86 register layouts of the `g` packet, as sent by gdbserver for Linux targets.

use crate::error::{Error, Result};
use crate::signal::Personality;

/// Register number of `orig_rax` in the amd64 Linux target description.
const ORIG_RAX_REGNO: usize = 57;

/// Register number of `orig_eax` in the i386 Linux target description.
const ORIG_EAX_REGNO: usize = 41;

/// Byte offset of `orig_rax`, past the x87 and SSE state.
const ORIG_RAX_OFFSET: usize = 536;

/// Byte offset of `orig_eax`, past the x87 and SSE state.
const ORIG_EAX_OFFSET: usize = 308;

/// Size of the general purpose block of the amd64 layout: 17 8-byte registers,
/// `eflags` and 6 segment registers of 4 bytes each.
const AMD64_GENERAL_LEN: usize = 17 * 8 + 7 * 4;

/// Size of the general purpose block of the i386 layout.
const I386_GENERAL_LEN: usize = 16 * 4;

const EXIT_X86_64: u64 = 60;
const EXIT_GROUP_X86_64: u64 = 231;
const EXIT_I386: u64 = 1;
const EXIT_GROUP_I386: u64 = 252;

/// General registers of a 32-bit tracee, in `g` packet order.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct I386Registers {
    pub eax: u32,
    pub ecx: u32,
    pub edx: u32,
    pub ebx: u32,
    pub esp: u32,
    pub ebp: u32,
    pub esi: u32,
    pub edi: u32,
    pub eip: u32,
    pub eflags: u32,
    pub cs: u32,
    pub ss: u32,
    pub ds: u32,
    pub es: u32,
    pub fs: u32,
    pub gs: u32,
    pub orig_eax: u32,
}

/// Register state of a tracee.
#[derive(Clone, Copy)]
pub enum Registers {
    X86_64(libc::user_regs_struct),
    I386(I386Registers),
}

impl Registers {
    /// Decode the binary contents of a `g` reply.
    pub(crate) fn decode(bytes: &[u8], personality: Personality) -> Result<Self> {
        match personality {
            Personality::Native => decode_amd64(bytes).map(Registers::X86_64),
            Personality::Compat32 => decode_i386(bytes).map(Registers::I386),
        }
    }

    /// The syscall number register, as left by syscall entry.
    pub fn syscall_number(&self) -> u64 {
        match self {
            Registers::X86_64(regs) => regs.orig_rax as u64,
            Registers::I386(regs) => u64::from(regs.orig_eax),
        }
    }

    pub fn instruction_pointer(&self) -> u64 {
        match self {
            Registers::X86_64(regs) => regs.rip as u64,
            Registers::I386(regs) => u64::from(regs.eip),
        }
    }
}

/// Register number to write a new syscall number to.
pub(crate) fn syscall_regno(personality: Personality) -> usize {
    match personality {
        Personality::Native => ORIG_RAX_REGNO,
        Personality::Compat32 => ORIG_EAX_REGNO,
    }
}

/// `exit` and `exit_group` syscall numbers.
pub(crate) fn exit_syscalls(personality: Personality) -> (u64, u64) {
    match personality {
        Personality::Native => (EXIT_X86_64, EXIT_GROUP_X86_64),
        Personality::Compat32 => (EXIT_I386, EXIT_GROUP_I386),
    }
}

/// Personality named by a target description `<architecture>`.
pub(crate) fn personality_of(architecture: &str) -> Option<Personality> {
    match architecture {
        "i386:x86-64" => Some(Personality::Native),
        "i386" => Some(Personality::Compat32),
        _ => None,
    }
}

fn u64_at(bytes: &[u8], off: usize) -> u64 {
    let mut word = [0u8; 8];

    if let Some(src) = bytes.get(off..off + 8) {
        word.copy_from_slice(src);
    }

    u64::from_le_bytes(word)
}

fn u32_at(bytes: &[u8], off: usize) -> u32 {
    let mut word = [0u8; 4];

    if let Some(src) = bytes.get(off..off + 4) {
        word.copy_from_slice(src);
    }

    u32::from_le_bytes(word)
}

fn decode_amd64(bytes: &[u8]) -> Result<libc::user_regs_struct> {
    if bytes.len() < AMD64_GENERAL_LEN {
        return Err(Error::unexpected("g", bytes));
    }

    // SAFETY: `user_regs_struct` is plain integer fields, for which zero is valid.
    let mut regs: libc::user_regs_struct = unsafe { std::mem::zeroed() };

    regs.rax = u64_at(bytes, 0);
    regs.rbx = u64_at(bytes, 8);
    regs.rcx = u64_at(bytes, 16);
    regs.rdx = u64_at(bytes, 24);
    regs.rsi = u64_at(bytes, 32);
    regs.rdi = u64_at(bytes, 40);
    regs.rbp = u64_at(bytes, 48);
    regs.rsp = u64_at(bytes, 56);
    regs.r8 = u64_at(bytes, 64);
    regs.r9 = u64_at(bytes, 72);
    regs.r10 = u64_at(bytes, 80);
    regs.r11 = u64_at(bytes, 88);
    regs.r12 = u64_at(bytes, 96);
    regs.r13 = u64_at(bytes, 104);
    regs.r14 = u64_at(bytes, 112);
    regs.r15 = u64_at(bytes, 120);
    regs.rip = u64_at(bytes, 128);
    regs.eflags = u64::from(u32_at(bytes, 136));
    regs.cs = u64::from(u32_at(bytes, 140));
    regs.ss = u64::from(u32_at(bytes, 144));
    regs.ds = u64::from(u32_at(bytes, 148));
    regs.es = u64::from(u32_at(bytes, 152));
    regs.fs = u64::from(u32_at(bytes, 156));
    regs.gs = u64::from(u32_at(bytes, 160));

    // Absent from stubs that omit the Linux-specific registers.
    regs.orig_rax = u64_at(bytes, ORIG_RAX_OFFSET);
    regs.fs_base = u64_at(bytes, ORIG_RAX_OFFSET + 8);
    regs.gs_base = u64_at(bytes, ORIG_RAX_OFFSET + 16);

    Ok(regs)
}

fn decode_i386(bytes: &[u8]) -> Result<I386Registers> {
    if bytes.len() < I386_GENERAL_LEN {
        return Err(Error::unexpected("g", bytes));
    }

    let reg = |n: usize| u32_at(bytes, n * 4);

    Ok(I386Registers {
        eax: reg(0),
        ecx: reg(1),
        edx: reg(2),
        ebx: reg(3),
        esp: reg(4),
        ebp: reg(5),
        esi: reg(6),
        edi: reg(7),
        eip: reg(8),
        eflags: reg(9),
        cs: reg(10),
        ss: reg(11),
        ds: reg(12),
        es: reg(13),
        fs: reg(14),
        gs: reg(15),
        orig_eax: u32_at(bytes, ORIG_EAX_OFFSET),
    })
}
