//! Process-lifecycle syscalls: fork/exec/exit/wait/kill/sleep/signal and the
//! introspection pair (§6). Each handler decodes its own arguments out of the
//! trapping process's registers via [`super::arg`]/[`super::fetch_str`] and
//! delegates straight into `ProcTable`; none of them touch `ProcTable`'s
//! internals directly.

use arrayvec::ArrayVec;

use crate::kernel::Kernel;
use crate::param::{ARGV_SCRATCH_CAP, MAXARG, MAXARGLEN, MAXPATH, NPROC};
use crate::proc::WaitOutcome;
use crate::signal::SignalAction;

use super::{arg, fetch_str, write_bytes, write_word};

/// `wait`'s third argument: return immediately instead of blocking if no
/// child has exited yet.
const WNOHANG: usize = 1;

/// A handler address of 0 restores the default disposition; 1 ignores the
/// signal. Any other value is a userspace handler's entry point. Mirrors the
/// `SIG_DFL`/`SIG_IGN` convention `signal(2)` callers expect.
const SIG_DFL: usize = 0;
const SIG_IGN: usize = 1;

fn encode_action(action: SignalAction) -> i32 {
    match action {
        SignalAction::Default => SIG_DFL as i32,
        SignalAction::Ignore => SIG_IGN as i32,
        SignalAction::Handler(addr) => addr as i32,
    }
}

fn decode_action(addr: usize) -> SignalAction {
    match addr {
        SIG_DFL => SignalAction::Default,
        SIG_IGN => SignalAction::Ignore,
        _ => SignalAction::Handler(addr),
    }
}

/// Create a process. Returns the child's pid, or -1 if the table is full.
pub fn sys_fork(kernel: &mut Kernel, pid: i32) -> Result<i32, ()> {
    debug_assert_eq!(pid, kernel.procs.current(), "sys_fork for a non-current pid");
    let child = kernel.procs.fork(kernel.hal, &mut kernel.ftable, &mut kernel.inodes);
    if child < 0 {
        Err(())
    } else {
        Ok(child)
    }
}

/// Replace the calling process's image with `path`, run with `argv`. A
/// trailing `"&"` argv entry marks the new process a daemon. Argv is read
/// as a NUL-terminated array of user pointers, xv6-`exec`-style.
pub fn sys_exec(kernel: &mut Kernel, pid: i32) -> Result<i32, ()> {
    let path_addr = arg(kernel, pid, 0)?;
    let argv_addr = arg(kernel, pid, 1)?;

    let mut path_buf = [0u8; MAXPATH];
    let path = fetch_str(kernel, pid, path_addr, &mut path_buf)?;

    const WORD: usize = core::mem::size_of::<usize>();
    let page_map = kernel.procs.page_map_of(pid).ok_or(())?;
    let mut arg_addrs: ArrayVec<usize, MAXARG> = ArrayVec::new();
    {
        let bytes = kernel.hal.page_bytes_mut(page_map);
        let mut off = argv_addr;
        while off + WORD <= bytes.len() && !arg_addrs.is_full() {
            let word = usize::from_le_bytes(bytes[off..off + WORD].try_into().unwrap());
            if word == 0 {
                break;
            }
            arg_addrs.push(word);
            off += WORD;
        }
    }

    let mut storage = [[0u8; MAXARGLEN]; MAXARG];
    let mut lens = [0usize; MAXARG];
    let mut n = 0usize;
    for &a in &arg_addrs {
        let s = fetch_str(kernel, pid, a, &mut storage[n])?;
        lens[n] = s.len();
        n += 1;
    }
    let mut argv: ArrayVec<&[u8], MAXARG> = ArrayVec::new();
    for (slot, &len) in storage[..n].iter().zip(&lens[..n]) {
        argv.push(&slot[..len]);
    }

    kernel
        .procs
        .exec(kernel.hal, &kernel.fs, &mut kernel.ftable, &mut kernel.inodes, pid, path, &argv)
        .map_err(|_| ())?;
    Ok(0)
}

/// Terminate the calling process with `status` (bits 8-15 of the packed exit
/// status `wait` reports). Does not return to `pid` — the next `syscall()`
/// write-back lands on a `Killed` slot, which is harmless.
pub fn sys_exit(kernel: &mut Kernel, pid: i32) -> Result<i32, ()> {
    let status = arg(kernel, pid, 0)? as i32;
    kernel.procs.exit(kernel.hal, pid, status, false);
    Ok(0)
}

/// Wait for a child (`pid == -1`: any child) to exit, writing its packed
/// status to `*wstatus`. With `WNOHANG` set, returns 0 instead of blocking
/// when no child has exited yet.
pub fn sys_wait(kernel: &mut Kernel, pid: i32) -> Result<i32, ()> {
    let target = arg(kernel, pid, 0)? as i32;
    let wstatus_addr = arg(kernel, pid, 1)?;
    let options = arg(kernel, pid, 2)?;
    let wnohang = options & WNOHANG != 0;

    let outcome = kernel
        .procs
        .wait(kernel.hal, &mut kernel.ftable, &mut kernel.inodes, pid, target, wnohang)
        .map_err(|_| ())?;
    match outcome {
        WaitOutcome::Reaped { pid: reaped, status } => {
            write_word(kernel, pid, wstatus_addr, status)?;
            Ok(reaped)
        }
        WaitOutcome::WouldBlock => Ok(0),
    }
}

/// Send `sig` to `target` (`0`: every child of the caller, `-1`: system-wide
/// broadcast per §4.I).
pub fn sys_kill(kernel: &mut Kernel, pid: i32) -> Result<i32, ()> {
    let target = arg(kernel, pid, 0)? as i32;
    let sig = arg(kernel, pid, 1)? as u32;
    kernel
        .procs
        .kill(kernel.hal, &mut kernel.ftable, &mut kernel.inodes, pid, target, sig)
        .map_err(|_| ())?;
    Ok(0)
}

/// Block the caller until the free-running tick counter has advanced by
/// `n`. There is no separate killed-while-asleep check here: a signal
/// delivered while asleep runs at the next dispatch through the normal
/// `check_pending_signals` path, which is enough to terminate the process
/// without this syscall needing to poll for it.
pub fn sys_sleep(kernel: &mut Kernel, pid: i32) -> Result<i32, ()> {
    let n = arg(kernel, pid, 0)? as u32;
    let ticks0 = kernel.ticks;
    while kernel.ticks.wrapping_sub(ticks0) < n {
        kernel.procs.sleep(kernel.hal, crate::param::EVENT_TICKS);
    }
    Ok(0)
}

/// Install a new disposition for `sig`, returning the one it replaced.
pub fn sys_signal(kernel: &mut Kernel, pid: i32) -> Result<i32, ()> {
    let sig = arg(kernel, pid, 0)? as u32;
    let handler_addr = arg(kernel, pid, 1)?;
    let prev = kernel
        .procs
        .set_handler(pid, sig, decode_action(handler_addr))
        .ok_or(())?;
    Ok(encode_action(prev))
}

/// Fill `list` (if non-null) with every live pid and return the live count.
pub fn sys_get_active_procs(kernel: &mut Kernel, pid: i32) -> Result<i32, ()> {
    let list_addr = arg(kernel, pid, 0)?;
    let mut buf = [0i32; NPROC];
    let count = if list_addr == 0 {
        kernel.procs.get_active_procs(None)
    } else {
        kernel.procs.get_active_procs(Some(&mut buf))
    };
    if list_addr != 0 {
        let n = count.min(NPROC);
        for (i, &p) in buf[..n].iter().enumerate() {
            write_word(kernel, pid, list_addr + i * core::mem::size_of::<i32>(), p)?;
        }
    }
    Ok(count as i32)
}

/// Write `target`'s ppid, state code, and name out through the caller's
/// pointers, plus its argv (NUL-separated, program name omitted since `name`
/// already reports that) through `argbuf` if non-null. Returns the argv
/// blob's total byte size regardless of whether `argbuf` was null.
pub fn sys_get_proc_data(kernel: &mut Kernel, pid: i32) -> Result<i32, ()> {
    let target = arg(kernel, pid, 0)? as i32;
    let ppid_addr = arg(kernel, pid, 1)?;
    let state_addr = arg(kernel, pid, 2)?;
    let name_addr = arg(kernel, pid, 3)?;
    let argbuf_addr = arg(kernel, pid, 4)?;

    let snap = kernel.procs.get_proc_data(target).ok_or(())?;
    write_word(kernel, pid, ppid_addr, snap.ppid)?;
    write_word(kernel, pid, state_addr, crate::proc::state_code(snap.state) as i32)?;
    write_bytes(kernel, pid, name_addr, &snap.name)?;

    let mut argbuf = [0u8; ARGV_SCRATCH_CAP];
    let argsize = kernel.procs.copy_argv(kernel.hal, target, &mut argbuf).unwrap_or(0);
    if argbuf_addr != 0 {
        write_bytes(kernel, pid, argbuf_addr, &argbuf[..argsize])?;
    }
    Ok(argsize as i32)
}
