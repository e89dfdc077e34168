//! aarch64 register layout of the `g` packet.

use crate::error::{Error, Result};
use crate::signal::Personality;

/// The syscall number is passed in `x8`.
const SYSCALL_REGNO: usize = 8;

/// `x0`-`x30`, `sp` and `pc` at 8 bytes each, then a 4-byte `cpsr`.
const GENERAL_LEN: usize = 33 * 8 + 4;

const EXIT: u64 = 93;
const EXIT_GROUP: u64 = 94;

/// Defined in [`arch/arm64/include/uapi/asm/ptrace.h`](https://android.googlesource.com/kernel/common/+/refs/heads/android-mainline/arch/arm64/include/uapi/asm/ptrace.h#88).
#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct user_pt_regs {
    pub regs: [u64; 31],
    pub sp: u64,
    pub pc: u64,
    pub pstate: u64
}

/// Register state of a tracee.
pub type Registers = user_pt_regs;

impl user_pt_regs {
    pub(crate) fn decode(bytes: &[u8], personality: Personality) -> Result<Self> {
        if personality != Personality::Native {
            return Err(Error::Unsupported { what: "32-bit arm register layout" });
        }

        if bytes.len() < GENERAL_LEN {
            return Err(Error::unexpected("g", bytes));
        }

        let word = |off: usize| {
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[off..off + 8]);
            u64::from_le_bytes(word)
        };

        let mut regs = Self::default();

        for (n, reg) in regs.regs.iter_mut().enumerate() {
            *reg = word(n * 8);
        }

        regs.sp = word(31 * 8);
        regs.pc = word(32 * 8);

        let mut cpsr = [0u8; 4];
        cpsr.copy_from_slice(&bytes[33 * 8..GENERAL_LEN]);
        regs.pstate = u64::from(u32::from_le_bytes(cpsr));

        Ok(regs)
    }

    pub fn syscall_number(&self) -> u64 {
        self.regs[SYSCALL_REGNO]
    }

    pub fn instruction_pointer(&self) -> u64 {
        self.pc
    }
}

pub(crate) fn syscall_regno(_personality: Personality) -> usize {
    SYSCALL_REGNO
}

pub(crate) fn exit_syscalls(_personality: Personality) -> (u64, u64) {
    (EXIT, EXIT_GROUP)
}

pub(crate) fn personality_of(architecture: &str) -> Option<Personality> {
    match architecture {
        "aarch64" => Some(Personality::Native),
        "arm" => Some(Personality::Compat32),
        _ => None,
    }
}
