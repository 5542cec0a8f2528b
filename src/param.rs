//! Compile-time constants tuning the process table, file tables, and FAT16 layout.
//!
//! This is the only configuration surface the kernel has: there is no runtime
//! config file to parse, so every tunable the core needs lives here, the way
//! the upstream kernel this crate grew out of keeps its own `param.rs`.

/// Maximum number of processes, including the idle process at slot 0.
pub const NPROC: usize = 64;

/// Open files per process (width of a PCB's fd table).
pub const MAX_OPEN_FILES: usize = 16;

/// Open files per system (size of the global open-file table).
pub const NFILE: usize = 128;

/// Maximum number of active in-core inodes. Sized to the FAT16 root
/// directory's entry count, since the inode cache is indexed positionally
/// by root-directory slot (invariant 9).
pub const NINODE: usize = ROOT_ENTRY_COUNT;

/// Expected FAT16 root directory entry count on the boot volume.
pub const ROOT_ENTRY_COUNT: usize = 512;

/// Max exec arguments.
pub const MAXARG: usize = 32;

/// Max length of a single exec argument the syscall layer will copy in from
/// user memory (path and each argv entry), NUL included.
pub const MAXARGLEN: usize = 64;

/// Upper bound on the NUL-separated argv blob `get_proc_data` reads back out
/// of a process's kernel-stack scratch region: every argv entry `exec` can
/// have serialized there is at most `MAXARGLEN` bytes, and there are at most
/// `MAXARG` of them.
pub const ARGV_SCRATCH_CAP: usize = MAXARG * MAXARGLEN;

/// Maximum length of a process name, NUL included.
pub const MAXPROCNAME: usize = 16;

/// Maximum 8.3 path length ("NAME.EXT\0").
pub const MAXPATH: usize = 12;

/// Number of entries in the syscall dispatch table.
pub const TOTAL_SYSCALL_FUNCTIONS: usize = 15;

/// Base virtual address of a freshly exec'd user image.
pub const USERSPACE_BASE: usize = 0x0000_0000_0040_0000;

/// Page size used for the user image and kernel stacks.
pub const PAGE_SIZE: usize = 0x0020_0000;

/// pid of the idle process (process table slot 0).
pub const IDLE_PID: i32 = 0;

/// pid of the init process, the reparenting target for orphans.
pub const INIT_PID: i32 = 1;

/// Sentinel meaning "not sleeping on anything".
pub const NO_EVENT: u32 = 0;

/// Well-known sleep events used to multicast wakeups.
pub const EVENT_ZOMBIE_CLEANUP: u32 = 1;
pub const EVENT_FG_PAUSED: u32 = 2;
/// Sleep key for the `sleep(ticks)` syscall (§6); distinct from the two
/// events above so a tick-sleeper and a zombie/fg waiter are never confused
/// by `wake_up`.
pub const EVENT_TICKS: u32 = 3;
