//! Syscall dispatcher (§6): decodes the trapping process's argument
//! registers, calls the matching process-table or file-table operation, and
//! writes the result back into `x0`. Argument/return-value fetching follows
//! an `argint`/`argaddr`/`fetchstr` split, generalized to this core's
//! flat per-process `Page` model (hal.rs).

pub mod file;
pub mod proc;

use crate::kernel::Kernel;
use crate::param::TOTAL_SYSCALL_FUNCTIONS;

pub mod numbers {
    pub const FORK: usize = 1;
    pub const EXIT: usize = 2;
    pub const WAIT: usize = 3;
    pub const KILL: usize = 4;
    pub const SLEEP: usize = 5;
    pub const SIGNAL: usize = 6;
    pub const GETPID: usize = 7;
    pub const GET_ACTIVE_PROCS: usize = 8;
    pub const GET_PROC_DATA: usize = 9;
    pub const EXEC: usize = 10;
    pub const OPEN: usize = 11;
    pub const CLOSE: usize = 12;
    pub const READ: usize = 13;
    pub const FILE_SIZE: usize = 14;
    pub const WRITE: usize = 15;
}

/// Reads a NUL-terminated string out of `pid`'s flat page at byte offset
/// `addr`, into `buf`. Out-of-scope collaborator (real address-space
/// validation) stands in as a page-relative bounds check.
pub(crate) fn fetch_str<'a>(
    kernel: &Kernel,
    pid: i32,
    addr: usize,
    buf: &'a mut [u8],
) -> Result<&'a str, ()> {
    let page_map = kernel.procs.page_map_of(pid).ok_or(())?;
    let bytes = kernel.hal.page_bytes_mut(page_map);
    let start = addr.min(bytes.len());
    let nul = bytes[start..].iter().position(|&b| b == 0).ok_or(())?;
    let len = nul.min(buf.len() - 1);
    buf[..len].copy_from_slice(&bytes[start..start + len]);
    core::str::from_utf8(&buf[..len]).map_err(|_| ())
}

/// Reads argument register `index` (0-7) out of `pid`'s saved trap frame.
/// Covers what `argint`/`argaddr` would separately do — both are just
/// register reads in this flat-address-space core, so one helper covers both.
pub(crate) fn arg(kernel: &Kernel, pid: i32, index: usize) -> Result<usize, ()> {
    kernel
        .procs
        .get(pid)
        .map(|p| p.reg_context.get_param_reg(index))
        .ok_or(())
}

/// Writes `data` into `pid`'s flat page at byte offset `addr`. The
/// counterpart to `fetch_str`, for syscalls that hand results back through
/// an out-pointer (`wait`'s `*wstatus`, `get_proc_data`'s out params).
pub(crate) fn write_bytes(kernel: &Kernel, pid: i32, addr: usize, data: &[u8]) -> Result<(), ()> {
    let page_map = kernel.procs.page_map_of(pid).ok_or(())?;
    let bytes = kernel.hal.page_bytes_mut(page_map);
    let fits = matches!(addr.checked_add(data.len()), Some(end) if end <= bytes.len());
    if !fits {
        return Err(());
    }
    bytes[addr..addr + data.len()].copy_from_slice(data);
    Ok(())
}

/// Writes a single `i32` out-param, little-endian.
pub(crate) fn write_word(kernel: &Kernel, pid: i32, addr: usize, val: i32) -> Result<(), ()> {
    write_bytes(kernel, pid, addr, &val.to_le_bytes())
}

/// Decodes syscall `num` for `pid` and writes its return value into `x0`.
/// Unknown syscall numbers return `-1` rather than panicking.
pub fn syscall(kernel: &mut Kernel, pid: i32, num: usize) {
    if num == 0 || num > TOTAL_SYSCALL_FUNCTIONS {
        write_ret(kernel, pid, Err(()));
        return;
    }
    let ret = match num {
        numbers::FORK => proc::sys_fork(kernel, pid),
        numbers::EXIT => proc::sys_exit(kernel, pid),
        numbers::WAIT => proc::sys_wait(kernel, pid),
        numbers::KILL => proc::sys_kill(kernel, pid),
        numbers::SLEEP => proc::sys_sleep(kernel, pid),
        numbers::SIGNAL => proc::sys_signal(kernel, pid),
        numbers::GETPID => Ok(pid),
        numbers::GET_ACTIVE_PROCS => proc::sys_get_active_procs(kernel, pid),
        numbers::GET_PROC_DATA => proc::sys_get_proc_data(kernel, pid),
        numbers::EXEC => proc::sys_exec(kernel, pid),
        numbers::OPEN => file::sys_open(kernel, pid),
        numbers::CLOSE => file::sys_close(kernel, pid),
        numbers::READ => file::sys_read(kernel, pid),
        numbers::FILE_SIZE => file::sys_file_size(kernel, pid),
        numbers::WRITE => file::sys_write(kernel, pid),
        _ => Err(()),
    };
    write_ret(kernel, pid, ret);
}

fn write_ret(kernel: &mut Kernel, pid: i32, ret: Result<i32, ()>) {
    if let Some(ctx) = kernel.procs.reg_context_mut(pid) {
        ctx.set_ret_val(ret.unwrap_or(-1) as usize);
    }
}
