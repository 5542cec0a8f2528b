//! Kernel singleton: composition root, boot sequence, and the `print!`/
//! `println!`/`klog!` macros every other module reaches for (§10, §12).

use core::sync::atomic::{AtomicBool, Ordering};

use crate::file::FileTable;
use crate::fs::fat16::Fat16;
use crate::fs::inode::InodeTable;
use crate::hal::Hal;
use crate::proc::ProcTable;

/// Everything the core owns: the process table, the two file-layer tables,
/// and the mounted boot volume. Single-writer by construction — this is a
/// single-hart, cooperatively-scheduled kernel, so `&mut Kernel` access is
/// always from the one logical "currently executing" context, the way the
/// teacher's own `Procs`/`KernelBuilder` pair is only ever mutated from the
/// running hart holding the relevant lock.
pub struct Kernel {
    pub hal: &'static dyn Hal,
    pub procs: ProcTable,
    pub ftable: FileTable,
    pub inodes: InodeTable,
    pub fs: Fat16,
    /// Free-running tick counter, advanced by the out-of-scope timer ISR
    /// calling [`Kernel::tick`]. Backs the `sleep(ticks)` syscall.
    pub ticks: u32,
}

impl Kernel {
    /// Mounts `partition` and creates the idle process's counterpart: the
    /// actual table-level work (`ProcTable::new`) already created idle at
    /// construction, so this just prepares the tables that sit beside it.
    pub fn mount(hal: &'static dyn Hal, partition: crate::hal::Page) -> Result<Self, crate::fs::fat16::FatError> {
        let fs = Fat16::mount(hal, partition)?;
        Ok(Self {
            hal,
            procs: ProcTable::new(),
            ftable: FileTable::new(),
            inodes: InodeTable::new(),
            fs,
            ticks: 0,
        })
    }

    /// Advances the free-running clock by one tick and wakes anyone sleeping
    /// on it. Called from the out-of-scope timer ISR, separately from
    /// `ProcTable::trigger_scheduler` (which governs preemption, not time).
    pub fn tick(&mut self) {
        self.ticks = self.ticks.wrapping_add(1);
        self.procs.wake_up(crate::param::EVENT_TICKS);
    }

    /// Boots init (pid 1, `/init`) and returns its pid. Panics if `/init` is
    /// missing or unreadable: an unbootable volume is fatal, not a syscall
    /// error (§7).
    pub fn boot_init(&mut self) -> i32 {
        let pid = self.procs.spawn_init(self.hal);
        self.procs
            .exec(self.hal, &self.fs, &mut self.ftable, &mut self.inodes, pid, "INIT", &[])
            .expect("failed to exec /init");
        pid
    }

    /// Runs until the idle process observes a shutdown signal (§4.F, §9).
    pub fn run(&mut self) -> ! {
        loop {
            self.procs.schedule(self.hal);
            if self.procs.shutdown {
                crate::klog!(self.hal, LogLevel::Info, "shutdown complete");
                loop {
                    core::hint::spin_loop();
                }
            }
        }
    }
}

static mut KERNEL: Option<Kernel> = None;
static KERNEL_READY: AtomicBool = AtomicBool::new(false);

/// # Safety
///
/// Must be called exactly once, before `kernel_mut()`, from the boot hart
/// before interrupts are enabled.
pub unsafe fn init_kernel(kernel: Kernel) {
    // SAFETY: single hart, called once before any concurrent access.
    unsafe { KERNEL = Some(kernel) };
    KERNEL_READY.store(true, Ordering::Release);
}

/// Panics if called before `init_kernel`.
pub fn kernel_mut() -> &'static mut Kernel {
    assert!(KERNEL_READY.load(Ordering::Acquire), "kernel used before init");
    // SAFETY: single hart; `KERNEL_READY` only flips after initialization.
    unsafe { KERNEL.as_mut().expect("kernel used before init") }
}

/// `print!` writes to the console through the active `Hal`.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {{
        use core::fmt::Write as _;
        let mut w = $crate::kernel::ConsoleWriter;
        let _ = write!(w, $($arg)*);
    }};
}

/// `println!` is `print!` plus a trailing newline.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

/// Kernel log severity. Fixed to a two-level name table with no registerable
/// sink: this kernel has exactly one console, reached through the same `Hal`
/// every other message already goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Info,
    Debug,
}

impl LogLevel {
    pub const fn name(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Leveled kernel log, in the vein of the `log` crate's macros but routed
/// through `console_write` since there is no heap-backed subscriber here.
/// Takes the `Hal` explicitly rather than going through the `KERNEL`
/// singleton: every scheduler/lifecycle method this core logs from (`fork`,
/// `exec`, `exit`, `wait`, `kill`, `schedule`) already takes `hal: &dyn Hal`
/// as a parameter (so the same code runs against the host test fake or the
/// real aarch64 HAL without a live singleton), and routing logging through
/// that same parameter keeps it exercisable under test instead of requiring
/// `init_kernel` to have run first.
#[macro_export]
macro_rules! klog {
    ($hal:expr, $level:expr, $($arg:tt)*) => {{
        use core::fmt::Write as _;
        let mut w = $crate::kernel::HalWriter($hal);
        let _ = write!(w, "[{}] {}\n", $level.name(), format_args!($($arg)*));
    }};
}

/// Adapter so `print!`/`println!` can use `write!` against the active
/// `Hal`'s `console_write`, without threading a formatter through every call
/// site.
pub struct ConsoleWriter;

impl core::fmt::Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        kernel_mut().hal.console_write(s);
        Ok(())
    }
}

/// `klog!`'s counterpart to `ConsoleWriter`, writing through a `Hal`
/// reference passed in directly rather than the `KERNEL` singleton.
pub struct HalWriter<'a>(pub &'a dyn Hal);

impl core::fmt::Write for HalWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.0.console_write(s);
        Ok(())
    }
}

/// Boot entry point for the aarch64 target: initializes the `Hal`, mounts
/// the boot volume, spawns init, and runs the scheduler forever.
#[cfg(not(test))]
pub unsafe fn kernel_main(partition: crate::hal::Page) -> ! {
    // SAFETY: called once, at boot, before anything touches the console or
    // the page allocator.
    let hal = unsafe { crate::arch::AarchHal::init() };
    let hal: &'static crate::arch::AarchHal = {
        static mut HAL_STORAGE: core::mem::MaybeUninit<crate::arch::AarchHal> =
            core::mem::MaybeUninit::uninit();
        // SAFETY: single-shot initialization of a boot-time static.
        unsafe {
            HAL_STORAGE.write(hal);
            HAL_STORAGE.assume_init_ref()
        }
    };

    let mut kernel = Kernel::mount(hal, partition).expect("failed to mount boot volume");
    kernel.boot_init();
    // SAFETY: first and only call, before `kernel_mut()` is used elsewhere.
    unsafe { init_kernel(kernel) };

    println!();
    println!("kernel is booting");
    println!();

    kernel_mut().run()
}

/// Multi-module lifecycle scenarios (§8's S1-S6): these need a fully
/// composed `Kernel` rather than one component in isolation, so they live
/// here instead of in `proc/procs.rs` (whose own `fork_exit_wait_round_trip`
/// is explicitly "minus real exec") or in `syscall/mod.rs`.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::fake::FakeHal;
    use crate::param::TOTAL_SYSCALL_FUNCTIONS;
    use crate::syscall::{numbers, syscall};

    const WORD: usize = core::mem::size_of::<usize>();

    /// Mounts a two-file FAT16 image (`INIT.BIN`, `TEST.BIN`) on a fresh
    /// `Kernel`. The `FakeHal` is leaked to satisfy `Kernel::hal`'s
    /// `'static` lifetime, the usual workaround for a singleton-shaped type
    /// under test.
    fn boot_fixture() -> Kernel {
        let bytes_per_sector: u16 = 512;
        let reserved: u16 = 1;
        let root_entry_count: u16 = 8;
        let root_off = reserved as u32 * bytes_per_sector as u32 + bytes_per_sector as u32;
        let data_off = root_off + root_entry_count as u32 * 32;
        let files: [(&[u8; 8], &[u8; 3], &[u8]); 2] = [
            (b"INIT    ", b"BIN", b"INIT-IMG"),
            (b"TEST    ", b"BIN", b"TEST-IMG"),
        ];
        let total = data_off as usize + files.len() * 512 + 512;

        let hal: &'static FakeHal = Box::leak(Box::new(FakeHal::new(total)));
        let boot_page = hal.alloc_page().unwrap();
        {
            let buf = hal.page_bytes_mut(boot_page);
            buf[11..13].copy_from_slice(&bytes_per_sector.to_le_bytes());
            buf[13] = 1;
            buf[14..16].copy_from_slice(&reserved.to_le_bytes());
            buf[16] = 1;
            buf[17..19].copy_from_slice(&root_entry_count.to_le_bytes());
            buf[22..24].copy_from_slice(&1u16.to_le_bytes());
            buf[510] = 0x55;
            buf[511] = 0xAA;
            let fat_off = reserved as usize * bytes_per_sector as usize;
            for (i, (stem, ext, contents)) in files.iter().enumerate() {
                let cluster = 2 + i as u16;
                let fo = fat_off + cluster as usize * 2;
                buf[fo..fo + 2].copy_from_slice(&0xFFF8u16.to_le_bytes());
                let e = root_off as usize + i * 32;
                buf[e..e + 8].copy_from_slice(*stem);
                buf[e + 8..e + 11].copy_from_slice(*ext);
                buf[e + 11] = 0x20;
                buf[e + 26..e + 28].copy_from_slice(&cluster.to_le_bytes());
                buf[e + 28..e + 32].copy_from_slice(&(contents.len() as u32).to_le_bytes());
                let coff = data_off as usize + i * 512;
                buf[coff..coff + contents.len()].copy_from_slice(contents);
            }
        }
        Kernel::mount(hal, boot_page).unwrap()
    }

    fn poke_str(kernel: &Kernel, pid: i32, addr: usize, s: &[u8]) {
        let page = kernel.procs.page_map_of(pid).unwrap();
        let bytes = kernel.hal.page_bytes_mut(page);
        bytes[addr..addr + s.len()].copy_from_slice(s);
        bytes[addr + s.len()] = 0;
    }

    fn poke_word(kernel: &Kernel, pid: i32, addr: usize, val: usize) {
        let page = kernel.procs.page_map_of(pid).unwrap();
        kernel.hal.page_bytes_mut(page)[addr..addr + WORD].copy_from_slice(&val.to_le_bytes());
    }

    #[test]
    fn s1_fork_exec_wait_round_trip_through_syscalls() {
        let mut kernel = boot_fixture();
        let init = kernel.procs.spawn_init(kernel.hal);
        kernel.procs.schedule(kernel.hal);
        assert_eq!(kernel.procs.current(), init);

        // exec("TEST.BIN", ["-v"])
        poke_str(&kernel, init, 0x300, b"-v");
        poke_word(&kernel, init, 0x200, 0x300);
        poke_word(&kernel, init, 0x200 + WORD, 0);
        poke_str(&kernel, init, 0x100, b"TEST.BIN");
        {
            let ctx = kernel.procs.reg_context_mut(init).unwrap();
            ctx.set_param_reg(0, 0x100);
            ctx.set_param_reg(1, 0x200);
        }
        syscall(&mut kernel, init, numbers::EXEC);
        assert_eq!(kernel.procs.get(init).unwrap().reg_context.x0, 0);
        let page = kernel.procs.page_map_of(init).unwrap();
        assert_eq!(&kernel.hal.page_bytes_mut(page)[..8], b"TEST-IMG");
        assert_eq!(kernel.procs.get(init).unwrap().reg_context.x2, 2); // argc: path + "-v"

        // get_proc_data(init, &ppid, &state, &name, &argbuf) reads the argv
        // exec just serialized onto init's kstack back out through argbuf.
        {
            let ctx = kernel.procs.reg_context_mut(init).unwrap();
            ctx.set_param_reg(0, init as usize);
            ctx.set_param_reg(1, 0x500);
            ctx.set_param_reg(2, 0x504);
            ctx.set_param_reg(3, 0x508);
            ctx.set_param_reg(4, 0x520);
        }
        syscall(&mut kernel, init, numbers::GET_PROC_DATA);
        let argsize = kernel.procs.get(init).unwrap().reg_context.x0;
        assert_eq!(argsize, 3); // "-v\0"
        let bytes = kernel.hal.page_bytes_mut(page);
        let mut ppid_bytes = [0u8; 4];
        ppid_bytes.copy_from_slice(&bytes[0x500..0x504]);
        assert_eq!(i32::from_le_bytes(ppid_bytes), kernel.procs.get(init).unwrap().ppid);
        assert_eq!(&bytes[0x520..0x520 + 3], b"-v\0");

        // fork()
        syscall(&mut kernel, init, numbers::FORK);
        let child = kernel.procs.get(init).unwrap().reg_context.x0 as i32;
        assert_eq!(child, init + 1);

        // round-robin the child onto the CPU and have it exit(7).
        kernel.procs.trigger_scheduler(kernel.hal);
        assert_eq!(kernel.procs.current(), child);
        kernel.procs.reg_context_mut(child).unwrap().set_param_reg(0, 7);
        syscall(&mut kernel, child, numbers::EXIT);
        assert_eq!(kernel.procs.current(), init);

        // wait(-1, &status, 0) from init reaps the zombie.
        {
            let ctx = kernel.procs.reg_context_mut(init).unwrap();
            ctx.set_param_reg(0, -1i32 as usize);
            ctx.set_param_reg(1, 0x400);
            ctx.set_param_reg(2, 0);
        }
        syscall(&mut kernel, init, numbers::WAIT);
        assert_eq!(kernel.procs.get(init).unwrap().reg_context.x0, child as usize);
        let mut status_bytes = [0u8; 4];
        status_bytes.copy_from_slice(&kernel.hal.page_bytes_mut(page)[0x400..0x404]);
        assert_eq!(i32::from_le_bytes(status_bytes), 7 << 8);
        assert!(kernel.procs.get(child).is_none());
    }

    #[test]
    fn open_read_close_round_trip_through_syscalls() {
        let mut kernel = boot_fixture();
        let init = kernel.procs.spawn_init(kernel.hal);
        kernel.procs.schedule(kernel.hal);

        poke_str(&kernel, init, 0x100, b"INIT.BIN");
        kernel.procs.reg_context_mut(init).unwrap().set_param_reg(0, 0x100);
        syscall(&mut kernel, init, numbers::OPEN);
        let fd = kernel.procs.get(init).unwrap().reg_context.x0 as i32;
        assert_eq!(fd, 0);

        {
            let ctx = kernel.procs.reg_context_mut(init).unwrap();
            ctx.set_param_reg(0, fd as usize);
            ctx.set_param_reg(1, 0x200);
            ctx.set_param_reg(2, 64);
        }
        syscall(&mut kernel, init, numbers::READ);
        assert_eq!(kernel.procs.get(init).unwrap().reg_context.x0, 8);
        let page = kernel.procs.page_map_of(init).unwrap();
        assert_eq!(&kernel.hal.page_bytes_mut(page)[0x200..0x208], b"INIT-IMG");

        kernel.procs.reg_context_mut(init).unwrap().set_param_reg(0, fd as usize);
        syscall(&mut kernel, init, numbers::CLOSE);
        assert_eq!(kernel.procs.get(init).unwrap().reg_context.x0, 0);

        // a second read on the now-closed fd fails.
        {
            let ctx = kernel.procs.reg_context_mut(init).unwrap();
            ctx.set_param_reg(0, fd as usize);
            ctx.set_param_reg(1, 0x200);
            ctx.set_param_reg(2, 8);
        }
        syscall(&mut kernel, init, numbers::READ);
        assert_eq!(kernel.procs.get(init).unwrap().reg_context.x0 as i32, -1);
    }

    #[test]
    fn s6_fifo_scheduling_through_trigger_scheduler() {
        let mut kernel = boot_fixture();
        let init = kernel.procs.spawn_init(kernel.hal);
        kernel.procs.schedule(kernel.hal);
        assert_eq!(kernel.procs.current(), init);

        // Three children of init, all READY, enqueued in this order.
        let a = kernel.procs.fork(kernel.hal, &mut kernel.ftable, &mut kernel.inodes);
        let b = kernel.procs.fork(kernel.hal, &mut kernel.ftable, &mut kernel.inodes);
        let c = kernel.procs.fork(kernel.hal, &mut kernel.ftable, &mut kernel.inodes);

        // init itself rejoins the back of the queue on the first tick, so
        // the round-robin visits a, b, c, init, a, ... in strict FIFO order.
        for expected in [a, b, c, init, a] {
            kernel.procs.trigger_scheduler(kernel.hal);
            assert_eq!(kernel.procs.current(), expected);
        }
    }

    #[test]
    fn unknown_syscall_number_writes_back_minus_one() {
        let mut kernel = boot_fixture();
        let init = kernel.procs.spawn_init(kernel.hal);
        kernel.procs.schedule(kernel.hal);
        syscall(&mut kernel, init, 0);
        assert_eq!(kernel.procs.get(init).unwrap().reg_context.x0 as i32, -1);
        syscall(&mut kernel, init, TOTAL_SYSCALL_FUNCTIONS + 1);
        assert_eq!(kernel.procs.get(init).unwrap().reg_context.x0 as i32, -1);
    }

    #[test]
    fn tick_advances_the_free_running_counter() {
        let mut kernel = boot_fixture();
        assert_eq!(kernel.ticks, 0);
        kernel.tick();
        kernel.tick();
        assert_eq!(kernel.ticks, 2);
    }
}
