//! Production [`crate::hal::Hal`] for the aarch64 `virt` machine.
//!
//! Bridges the core to the handful of `arch/arm` primitives it actually
//! needs: [`super::arm::uart::Uart`] for `console_write`, and a simple
//! physical page freelist for everything that needs a page-sized chunk of
//! memory. Address-space switching is out of scope (§1): `Page`s here are
//! flat physical buffers, not real page-table-mapped ranges, matching the
//! model the in-memory test `Hal` already uses.

use core::ptr;

use super::arm::uart::Uart;
use crate::hal::{Hal, HalError, Page};
use crate::param::PAGE_SIZE;

extern "C" {
    /// First address after the kernel image; provided by the linker script.
    static mut end: u8;
    /// Saves the caller's stack pointer to `*old_sp`, then resumes at
    /// `new_sp`. Implemented in assembly; out of scope for this crate (§1).
    fn swtch(old_sp: *mut usize, new_sp: usize);
}

/// qemu `virt` machine layout (`arch/arm/memlayout.rs`).
const UART0: usize = 0x0900_0000;
const KERNBASE: usize = 0x4000_0000;
const PHYSTOP: usize = KERNBASE + 128 * 1024 * 1024;

struct Run {
    next: *mut Run,
}

/// Freelist of physical pages, carved out of `[end, PHYSTOP)` at boot.
pub struct AarchHal {
    uart: Uart,
    freelist: core::cell::UnsafeCell<*mut Run>,
}

// SAFETY: this kernel runs on a single hart; nothing else touches `freelist`
// concurrently.
unsafe impl Sync for AarchHal {}

impl AarchHal {
    /// # Safety
    ///
    /// Must be called exactly once, before any other `Hal` method, with the
    /// UART already mapped at `MemLayoutImpl::UART0`.
    pub unsafe fn init() -> Self {
        let hal = Self {
            // SAFETY: UART0 is a valid, owned MMIO range on this machine.
            uart: unsafe { Uart::new(UART0) },
            freelist: core::cell::UnsafeCell::new(ptr::null_mut()),
        };
        hal.uart.init();

        // SAFETY: `end` is provided by the linker and marks the first byte
        // not occupied by the kernel image.
        let start = pgroundup(unsafe { ptr::addr_of!(end) as usize });
        let mut pa = start;
        while pa + PAGE_SIZE <= PHYSTOP {
            // SAFETY: `pa` is page-aligned and lies in the free region this
            // kernel owns exclusively at boot.
            unsafe { hal.free_page_raw(pa) };
            pa += PAGE_SIZE;
        }
        hal
    }

    unsafe fn free_page_raw(&self, pa: usize) {
        let run = pa as *mut Run;
        // SAFETY: `pa` is a page this allocator owns and isn't aliased.
        unsafe {
            (*run).next = *self.freelist.get();
            *self.freelist.get() = run;
        }
    }
}

const fn pgroundup(addr: usize) -> usize {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

impl Hal for AarchHal {
    fn alloc_page(&self) -> Result<Page, HalError> {
        // SAFETY: single-hart, no concurrent mutation of the freelist.
        let head = unsafe { *self.freelist.get() };
        if head.is_null() {
            return Err(HalError::OutOfPages);
        }
        // SAFETY: `head` is the freelist's first node by its invariant.
        unsafe {
            *self.freelist.get() = (*head).next;
        }
        Ok(head as usize as Page)
    }

    fn free_page(&self, page: Page) {
        // SAFETY: `page` was returned by `alloc_page` and not freed since.
        unsafe { self.free_page_raw(page as usize) };
    }

    fn page_bytes_mut(&self, page: Page) -> &mut [u8] {
        // SAFETY: `page` is a page-aligned address inside the allocator's
        // owned region, exclusively held by whichever caller has the handle.
        unsafe { core::slice::from_raw_parts_mut(page as usize as *mut u8, PAGE_SIZE) }
    }

    fn setup_uvm(&self, _page_map: Page) {}

    fn copy_uvm(&self, dst: Page, src: Page, size: usize) {
        let src_bytes = self.page_bytes_mut(src);
        let dst_bytes = self.page_bytes_mut(dst);
        dst_bytes[..size].copy_from_slice(&src_bytes[..size]);
    }

    fn free_uvm(&self, _page_map: Page) {}

    fn switch_vm(&self, _page_map: Page) {}

    fn swap(&self, old_sp: &mut usize, new_sp: usize) {
        // SAFETY: `new_sp` was saved by a prior `swap` call for a process
        // that is valid and not currently running elsewhere.
        unsafe { swtch(old_sp as *mut usize, new_sp) };
    }

    fn install_argv(&self, page_map: Page, argv: &[&[u8]]) -> usize {
        let buf = self.page_bytes_mut(page_map);
        let top = buf.len();
        let mut cursor = top - core::mem::size_of::<usize>() * (argv.len() + 1);
        let ptr_table_addr = cursor;

        let mut data_cursor = ptr_table_addr;
        for (i, arg) in argv.iter().enumerate() {
            data_cursor -= arg.len() + 1;
            buf[data_cursor..data_cursor + arg.len()].copy_from_slice(arg);
            buf[data_cursor + arg.len()] = 0;
            let slot = ptr_table_addr + i * core::mem::size_of::<usize>();
            buf[slot..slot + core::mem::size_of::<usize>()]
                .copy_from_slice(&(page_map as usize + data_cursor).to_ne_bytes());
            cursor = data_cursor;
        }
        let _ = cursor;
        page_map as usize + ptr_table_addr
    }

    fn console_write(&self, s: &str) {
        for &b in s.as_bytes() {
            while self.uart.is_full() {}
            self.uart.putc(b);
        }
    }
}
