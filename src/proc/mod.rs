//! Process control block and process table (components E-I).

pub mod procs;

pub use procs::{ProcSnapshot, ProcTable, WaitOutcome};

use crate::hal::TrapFrame;
use crate::param::{MAXPROCNAME, MAX_OPEN_FILES, NO_EVENT};
use crate::signal::{SignalAction, NSIG};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Init,
    Ready,
    Running,
    Sleep,
    Killed,
}

/// Process control block (§3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pcb {
    pub pid: i32,
    pub ppid: i32,
    pub name: [u8; MAXPROCNAME],
    pub state: ProcState,
    /// Bits 0-6: terminating signal. Bits 8-15: voluntary exit(2) code.
    pub status: i32,
    pub signals: u32,
    /// Pid being waited for: -1 = any child, 0 = not waiting.
    pub wpid: i32,
    pub daemon: bool,
    pub event: u32,
    pub handlers: [SignalAction; NSIG],
    pub kstack: Option<crate::hal::Page>,
    pub page_map: Option<crate::hal::Page>,
    /// Saved kernel stack pointer; opaque to everything but `Hal::swap`.
    pub sp: usize,
    pub reg_context: TrapFrame,
    /// Index into the global open-file table per fd slot; `None` = free.
    pub fd_table: [Option<u16>; MAX_OPEN_FILES],
}

impl Pcb {
    const fn unused() -> Self {
        Self {
            pid: -1,
            ppid: -1,
            name: [0; MAXPROCNAME],
            state: ProcState::Unused,
            status: 0,
            signals: 0,
            wpid: 0,
            daemon: false,
            event: NO_EVENT,
            handlers: [SignalAction::Default; NSIG],
            kstack: None,
            page_map: None,
            sp: 0,
            reg_context: TrapFrame {
                elr: 0,
                sp0: 0,
                spsr: 0,
                x0: 0,
                x1: 0,
                x2: 0,
                x3: 0,
                x4: 0,
                x5: 0,
                x6: 0,
                x7: 0,
                x29: 0,
                x30: 0,
            },
            fd_table: [None; MAX_OPEN_FILES],
        }
    }

    pub fn is_alive(&self) -> bool {
        !matches!(self.state, ProcState::Unused)
    }

    pub fn set_name(&mut self, name: &[u8]) {
        self.name = [0; MAXPROCNAME];
        let n = name.len().min(MAXPROCNAME - 1);
        self.name[..n].copy_from_slice(&name[..n]);
    }
}

pub(crate) const UNUSED_PCB: Pcb = Pcb::unused();

pub fn sig_bit(sig: u32) -> u32 {
    1u32 << sig
}

/// One-letter state code, matching the ps utility's `state_rep` convention.
pub fn state_code(state: ProcState) -> char {
    match state {
        ProcState::Unused => '-',
        ProcState::Init => 'i',
        ProcState::Ready => 'r',
        ProcState::Running => 'R',
        ProcState::Sleep => 's',
        ProcState::Killed => 'z',
    }
}

