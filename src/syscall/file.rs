//! Open-file syscalls: `open`/`close`/`read`/`file_size` thin over
//! [`crate::file::FileTable`], plus `write`, which (per §6's ABI — `write`
//! takes no fd) always targets the console.

use crate::kernel::Kernel;
use crate::param::MAXPATH;

use super::arg;

/// Resolve `path` through the mounted FAT16 volume and install it in a free
/// fd slot of the caller's fd table. Returns the fd, or -1 on a missing
/// file, a full fd table, or a full global open-file table.
pub fn sys_open(kernel: &mut Kernel, pid: i32) -> Result<i32, ()> {
    let path_addr = arg(kernel, pid, 0)?;
    let mut buf = [0u8; MAXPATH];
    let path = super::fetch_str(kernel, pid, path_addr, &mut buf)?;

    let fd_table = kernel.procs.fd_table_mut(pid).ok_or(())?;
    let fd = kernel
        .ftable
        .open_file(kernel.hal, &kernel.fs, &mut kernel.inodes, fd_table, path)
        .map_err(|_| ())?;
    Ok(fd as i32)
}

/// Release `fd`. A no-op on an already-closed fd, matching
/// `FileTable::close_file`.
pub fn sys_close(kernel: &mut Kernel, pid: i32) -> Result<i32, ()> {
    let fd = arg(kernel, pid, 0)? as usize;
    let fd_table = kernel.procs.fd_table_mut(pid).ok_or(())?;
    kernel.ftable.close_file(&mut kernel.inodes, fd_table, fd);
    Ok(0)
}

/// Read up to `n` bytes from `fd` into the caller's buffer at `buf_addr`,
/// honoring the open-file entry's read cursor. Returns the number of bytes
/// actually read.
pub fn sys_read(kernel: &mut Kernel, pid: i32) -> Result<i32, ()> {
    let fd = arg(kernel, pid, 0)? as usize;
    let buf_addr = arg(kernel, pid, 1)?;
    let n = arg(kernel, pid, 2)?;

    let page_map = kernel.procs.page_map_of(pid).ok_or(())?;
    let fd_table = kernel.procs.get(pid).ok_or(())?.fd_table;
    let bytes = kernel.hal.page_bytes_mut(page_map);
    let end = buf_addr.saturating_add(n).min(bytes.len());
    let start = buf_addr.min(end);

    let read = kernel
        .ftable
        .read_fd(kernel.hal, &kernel.fs, &kernel.inodes, &fd_table, fd, &mut bytes[start..end])
        .map_err(|_| ())?;
    Ok(read as i32)
}

/// Return the size in bytes of the file open on `fd`.
pub fn sys_file_size(kernel: &mut Kernel, pid: i32) -> Result<i32, ()> {
    let fd = arg(kernel, pid, 0)? as usize;
    let fd_table = kernel.procs.get(pid).ok_or(())?.fd_table;
    let size = kernel
        .ftable
        .file_size(&kernel.inodes, &fd_table, fd)
        .map_err(|_| ())?;
    Ok(size as i32)
}

/// Write `n` bytes from the caller's buffer at `buf_addr` to the console.
/// There is no fd argument (§6): this core has no writable files, so
/// `write` always targets the one sink that exists.
pub fn sys_write(kernel: &mut Kernel, pid: i32) -> Result<i32, ()> {
    let buf_addr = arg(kernel, pid, 0)?;
    let n = arg(kernel, pid, 1)?;

    let page_map = kernel.procs.page_map_of(pid).ok_or(())?;
    let bytes = kernel.hal.page_bytes_mut(page_map);
    let end = buf_addr.saturating_add(n).min(bytes.len());
    let start = buf_addr.min(end);

    let s = core::str::from_utf8(&bytes[start..end]).map_err(|_| ())?;
    kernel.hal.console_write(s);
    Ok((end - start) as i32)
}
