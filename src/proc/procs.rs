//! The process table: allocator (E), scheduler (F), sleep/wakeup (G),
//! signal dispatch (H), and the fork/exec/exit/wait/kill primitives (I).
//!
//! Kept as one type: these components share so much state (the table
//! itself, the three queues, `fg_process`, `next_pid`) that splitting them
//! into separate owners would just mean passing all of it back and forth.

use arrayvec::ArrayVec;

use crate::file::FileTable;
use crate::fs::fat16::Fat16;
use crate::fs::inode::InodeTable;
use crate::hal::Hal;
use crate::param::{
    EVENT_FG_PAUSED, EVENT_ZOMBIE_CLEANUP, IDLE_PID, INIT_PID, MAXPROCNAME, MAX_OPEN_FILES,
    NO_EVENT, NPROC, PAGE_SIZE,
};
use crate::queue::ProcQueue;
use crate::signal::{default_is_terminating, is_in_range, signum::*, SignalAction, NSIG};

use super::{sig_bit, Pcb, ProcState, UNUSED_PCB};

pub struct ProcTable {
    slots: [Pcb; NPROC],
    ready_queue: ProcQueue,
    wait_list: ProcQueue,
    zombie_list: ProcQueue,
    fg_process: Option<i32>,
    next_pid: i32,
    current: i32,
    pub shutdown: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Reaped { pid: i32, status: i32 },
    WouldBlock,
}

#[derive(Debug, Clone, Copy)]
pub struct ProcSnapshot {
    pub ppid: i32,
    pub state: ProcState,
    pub name: [u8; MAXPROCNAME],
    pub daemon: bool,
}

impl ProcTable {
    pub fn new() -> Self {
        let mut slots = [UNUSED_PCB; NPROC];
        slots[0] = Pcb {
            pid: IDLE_PID,
            ppid: IDLE_PID,
            daemon: true,
            state: ProcState::Running,
            ..UNUSED_PCB
        };
        Self {
            slots,
            ready_queue: ProcQueue::new(),
            wait_list: ProcQueue::new(),
            zombie_list: ProcQueue::new(),
            fg_process: None,
            next_pid: INIT_PID,
            current: IDLE_PID,
            shutdown: false,
        }
    }

    pub fn current(&self) -> i32 {
        self.current
    }

    pub fn fg_process(&self) -> Option<i32> {
        self.fg_process
    }

    fn slot_of(&self, pid: i32) -> Option<usize> {
        (0..NPROC).find(|&i| self.slots[i].is_alive() && self.slots[i].pid == pid)
    }

    pub fn get(&self, pid: i32) -> Option<&Pcb> {
        self.slot_of(pid).map(|i| &self.slots[i])
    }

    pub fn reg_context_mut(&mut self, pid: i32) -> Option<&mut crate::hal::TrapFrame> {
        let slot = self.slot_of(pid)?;
        Some(&mut self.slots[slot].reg_context)
    }

    pub fn page_map_of(&self, pid: i32) -> Option<crate::hal::Page> {
        self.get(pid).and_then(|p| p.page_map)
    }

    pub fn fd_table_mut(&mut self, pid: i32) -> Option<&mut [Option<u16>; MAX_OPEN_FILES]> {
        let slot = self.slot_of(pid)?;
        Some(&mut self.slots[slot].fd_table)
    }

    // ---- component E: allocator ----------------------------------------

    /// `alloc_new_process()` (4.E). `None` only when the table is full; a
    /// page/kstack allocation failure is fatal per §7 and panics.
    fn alloc_new_process(&mut self, hal: &dyn Hal) -> Option<i32> {
        let slot = (1..NPROC).find(|&i| self.slots[i].state == ProcState::Unused)?;
        let kstack = hal.alloc_page().expect("kernel stack allocation failed");
        let page_map = hal.alloc_page().expect("page-map allocation failed");

        let pid = self.next_pid;
        self.next_pid += 1;

        let mut pcb = UNUSED_PCB;
        pcb.pid = pid;
        pcb.state = ProcState::Init;
        pcb.kstack = Some(kstack);
        pcb.page_map = Some(page_map);
        pcb.reg_context.elr = crate::param::USERSPACE_BASE;
        pcb.reg_context.sp0 = crate::param::USERSPACE_BASE + PAGE_SIZE;
        pcb.reg_context.spsr = 0;
        hal.setup_uvm(page_map);

        self.slots[slot] = pcb;
        Some(pid)
    }

    // ---- component G: sleep / wakeup ------------------------------------

    /// `sleep(event)` (4.G). Blocks the current process until `wake_up`
    /// clears its event; a forced ready-queue move by `kill` without a
    /// matching wakeup leaves `event` set, so the loop re-sleeps (the
    /// "spurious wakeup" case).
    pub fn sleep(&mut self, hal: &dyn Hal, event: u32) {
        assert_ne!(event, NO_EVENT, "sleep on the NONE event");
        let pid = self.current;
        loop {
            let slot = self.slot_of(pid).expect("current process vanished");
            self.slots[slot].state = ProcState::Sleep;
            self.slots[slot].event = event;
            self.ready_queue.remove(pid);
            self.wait_list.push_back(pid);

            self.schedule(hal);

            let slot = self.slot_of(pid).expect("current process vanished");
            if self.slots[slot].event == NO_EVENT {
                break;
            }
        }
    }

    /// `wake_up(event)` (4.G).
    pub fn wake_up(&mut self, event: u32) {
        let ready_matches: ArrayVec<i32, NPROC> = self
            .ready_queue
            .iter()
            .filter(|&pid| self.slot_of(pid).is_some_and(|s| self.slots[s].event == event))
            .collect();
        for pid in ready_matches {
            if let Some(slot) = self.slot_of(pid) {
                self.slots[slot].event = NO_EVENT;
            }
        }

        let wait_matches: ArrayVec<i32, NPROC> = self
            .wait_list
            .iter()
            .filter(|&pid| self.slot_of(pid).is_some_and(|s| self.slots[s].event == event))
            .collect();
        for pid in wait_matches {
            self.wait_list.remove(pid);
            if let Some(slot) = self.slot_of(pid) {
                self.slots[slot].event = NO_EVENT;
                self.slots[slot].state = ProcState::Ready;
            }
            self.ready_queue.push_back(pid);
        }
    }

    // ---- component H: signals --------------------------------------------

    /// `check_pending_signals(p)` (4.H), called only from `schedule` just
    /// before `p` would be dispatched.
    fn check_pending_signals(&mut self, hal: &dyn Hal, pid: i32) {
        for sig in 1..NSIG as u32 {
            let Some(slot) = self.slot_of(pid) else { return };
            if self.slots[slot].signals & sig_bit(sig) == 0 {
                continue;
            }
            self.slots[slot].signals &= !sig_bit(sig);

            let action = if crate::signal::is_catchable(sig) {
                self.slots[slot].handlers[sig as usize]
            } else {
                SignalAction::Default
            };
            match action {
                SignalAction::Ignore => {}
                SignalAction::Handler(addr) => {
                    // One-shot: run the trampoline, then fall back to default.
                    let resume_pc = self.slots[slot].reg_context.elr;
                    self.slots[slot].reg_context.x30 = resume_pc;
                    self.slots[slot].reg_context.elr = addr;
                    self.slots[slot].handlers[sig as usize] = SignalAction::Default;
                    crate::klog!(
                        hal,
                        crate::kernel::LogLevel::Debug,
                        "pid {pid}: dispatching user handler for signal {sig}"
                    );
                }
                SignalAction::Default => {
                    if default_is_terminating(sig) {
                        crate::klog!(
                            hal,
                            crate::kernel::LogLevel::Debug,
                            "pid {pid}: default action for signal {sig} is terminating"
                        );
                        self.exit(hal, pid, 128 + sig as i32, true);
                        return; // `pid` is no longer schedulable.
                    }
                    match sig {
                        SIGCHLD | SIGCONT => {}
                        SIGSTOP => {
                            self.ready_queue.remove(pid);
                            self.slots[slot].state = ProcState::Sleep;
                            self.slots[slot].event = EVENT_FG_PAUSED;
                            self.wait_list.push_back(pid);
                            return;
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    // ---- component F: scheduler -------------------------------------------

    /// `schedule()` (4.F).
    pub fn schedule(&mut self, hal: &dyn Hal) {
        let new_pid = loop {
            match self.ready_queue.front() {
                Some(head_pid) => {
                    let has_signals = self
                        .slot_of(head_pid)
                        .is_some_and(|s| self.slots[s].signals != 0);
                    if has_signals {
                        self.check_pending_signals(hal, head_pid);
                        if self.ready_queue.front() == Some(head_pid) {
                            break self.ready_queue.pop_front().unwrap();
                        }
                        // head changed or vanished: loop and re-peek.
                    } else {
                        break self.ready_queue.pop_front().unwrap();
                    }
                }
                None => {
                    if self.ready_queue.is_empty() && self.wait_list.is_empty() {
                        let idle_has_sigterm = self
                            .slot_of(IDLE_PID)
                            .is_some_and(|s| self.slots[s].signals & sig_bit(SIGTERM) != 0);
                        if idle_has_sigterm {
                            self.shutdown = true;
                            crate::klog!(
                                hal,
                                crate::kernel::LogLevel::Info,
                                "ready and wait queues empty, idle signalled to shut down"
                            );
                        }
                    }
                    break IDLE_PID;
                }
            }
        };
        self.dispatch(hal, new_pid);
    }

    fn dispatch(&mut self, hal: &dyn Hal, new_pid: i32) {
        let old_pid = self.current;
        let new_slot = self.slot_of(new_pid).expect("dispatch target vanished");

        if new_pid != old_pid {
            crate::klog!(
                hal,
                crate::kernel::LogLevel::Debug,
                "scheduler: {old_pid} -> {new_pid}"
            );
        }

        self.slots[new_slot].state = ProcState::Running;
        self.current = new_pid;
        if !self.slots[new_slot].daemon && self.fg_process.is_none() {
            self.fg_process = Some(new_pid);
        }
        if new_pid == IDLE_PID && self.shutdown {
            self.slots[new_slot].reg_context.x5 = 1;
        }

        if let Some(page_map) = self.slots[new_slot].page_map {
            hal.switch_vm(page_map);
        }
        let new_sp = self.slots[new_slot].sp;
        if let Some(old_slot) = self.slot_of(old_pid) {
            hal.swap(&mut self.slots[old_slot].sp, new_sp);
        }
    }

    /// `trigger_scheduler()` (4.F), the timer-tick entry point.
    pub fn trigger_scheduler(&mut self, hal: &dyn Hal) {
        if self.ready_queue.is_empty() {
            return;
        }
        let cur = self.current;
        if let Some(slot) = self.slot_of(cur) {
            self.slots[slot].state = ProcState::Ready;
        }
        if cur != IDLE_PID {
            self.ready_queue.push_back(cur);
        }
        self.schedule(hal);
    }

    /// Creates the first process (init, pid 1) directly: there is no parent
    /// to copy from, so this bypasses `fork` and leaves the new process
    /// ready to `exec` its boot program. Used once, from the boot sequence.
    pub fn spawn_init(&mut self, hal: &dyn Hal) -> i32 {
        let pid = self
            .alloc_new_process(hal)
            .expect("process table has no room for init");
        let slot = self.slot_of(pid).unwrap();
        self.slots[slot].set_name(b"init");
        self.slots[slot].ppid = pid;
        self.slots[slot].state = ProcState::Ready;
        self.ready_queue.push_back(pid);
        pid
    }

    // ---- component I: lifecycle primitives --------------------------------

    /// `fork()` (4.I). Returns the child pid, or -1 on allocation failure.
    pub fn fork(&mut self, hal: &dyn Hal, ftable: &mut FileTable, inodes: &mut InodeTable) -> i32 {
        let parent_pid = self.current;
        let child_pid = match self.alloc_new_process(hal) {
            Some(pid) => pid,
            None => return -1,
        };
        let parent_slot = self.slot_of(parent_pid).unwrap();
        let child_slot = self.slot_of(child_pid).unwrap();

        let parent_name = self.slots[parent_slot].name;
        self.slots[child_slot].set_name(&parent_name);
        self.slots[child_slot].ppid = parent_pid;

        if self.fg_process == Some(parent_pid) {
            self.fg_process = None;
        }

        let parent_page_map = self.slots[parent_slot].page_map.unwrap();
        let child_page_map = self.slots[child_slot].page_map.unwrap();
        hal.copy_uvm(child_page_map, parent_page_map, PAGE_SIZE);

        let parent_fds = self.slots[parent_slot].fd_table;
        let mut child_fds = [None; MAX_OPEN_FILES];
        ftable.share_fds(inodes, &parent_fds, &mut child_fds);
        self.slots[child_slot].fd_table = child_fds;

        self.slots[child_slot].reg_context = self.slots[parent_slot].reg_context;
        self.slots[child_slot].reg_context.set_ret_val(0);
        self.slots[child_slot].handlers = [SignalAction::Default; NSIG];
        self.slots[child_slot].state = ProcState::Ready;
        self.ready_queue.push_back(child_pid);

        crate::klog!(
            hal,
            crate::kernel::LogLevel::Info,
            "fork: pid {parent_pid} -> pid {child_pid}"
        );
        child_pid
    }

    /// `exec(name, argv)` (4.I). `argv`'s trailing `b"&"` (if any) marks the
    /// process a daemon and is consumed before argc/argv are installed.
    pub fn exec(
        &mut self,
        hal: &dyn Hal,
        fs: &Fat16,
        ftable: &mut FileTable,
        inodes: &mut InodeTable,
        pid: i32,
        path: &str,
        argv: &[&[u8]],
    ) -> Result<(), ()> {
        let slot = self.slot_of(pid).ok_or(())?;

        let fd = {
            let fd_table = &mut self.slots[slot].fd_table;
            ftable
                .open_file(hal, fs, inodes, fd_table, path)
                .map_err(|_| ())?
        };

        let daemon = argv.last().is_some_and(|a| *a == b"&");
        let effective_argv = if daemon { &argv[..argv.len() - 1] } else { argv };

        // Serialize name + argv, NUL-separated, at the bottom of the
        // kernel stack (reused as scratch) ahead of installing into user
        // memory (exec step 3).
        let kstack = self.slots[slot].kstack.unwrap();
        {
            let scratch = hal.page_bytes_mut(kstack);
            let mut offset = 0usize;
            for part in core::iter::once(path.as_bytes()).chain(effective_argv.iter().copied()) {
                scratch[offset..offset + part.len()].copy_from_slice(part);
                offset += part.len();
                scratch[offset] = 0;
                offset += 1;
            }
        }

        let page_map = self.slots[slot].page_map.unwrap();
        let file_index = self.slots[slot].fd_table[fd].unwrap() as usize;
        let inode_index = ftable.get(file_index).inode.unwrap();
        let inode = *inodes.get(inode_index);

        let dest = hal.page_bytes_mut(page_map);
        for b in dest.iter_mut() {
            *b = 0;
        }
        let read = fs.read_file(hal, inode.dir_index, &mut dest[..inode.file_size as usize]);
        {
            let fd_table = &mut self.slots[slot].fd_table;
            ftable.close_file(inodes, fd_table, fd);
        }
        if read.is_err() {
            self.exit(hal, pid, 1, false);
            return Err(());
        }

        self.slots[slot].handlers = [SignalAction::Default; NSIG];
        self.slots[slot].daemon = daemon;
        self.slots[slot].reg_context = Default::default();
        self.slots[slot].reg_context.elr = crate::param::USERSPACE_BASE;
        self.slots[slot].reg_context.sp0 = crate::param::USERSPACE_BASE + PAGE_SIZE;
        self.slots[slot].reg_context.spsr = 0;

        let mut full_argv: ArrayVec<&[u8], { crate::param::MAXARG + 1 }> = ArrayVec::new();
        full_argv.push(path.as_bytes());
        for a in effective_argv {
            let _ = full_argv.try_push(a);
        }
        let argv_addr = hal.install_argv(page_map, &full_argv);
        self.slots[slot].reg_context.x2 = full_argv.len();
        self.slots[slot].reg_context.x1 = argv_addr;

        crate::klog!(hal, crate::kernel::LogLevel::Info, "exec: pid {pid} -> {path}");
        Ok(())
    }

    /// `exit(p, status, from_handler)` (4.I).
    pub fn exit(&mut self, hal: &dyn Hal, pid: i32, status: i32, from_handler: bool) {
        let Some(slot) = self.slot_of(pid) else { return };
        if matches!(self.slots[slot].state, ProcState::Unused | ProcState::Killed) {
            return;
        }

        if from_handler {
            self.slots[slot].status |= status & 0x7f;
        } else {
            self.slots[slot].status |= (status & 0xff) << 8;
        }
        self.slots[slot].state = ProcState::Killed;
        self.slots[slot].event = pid as u32;

        self.ready_queue.remove(pid);
        self.wait_list.remove(pid);

        let ppid = self.slots[slot].ppid;
        if let Some(parent_slot) = self.slot_of(ppid) {
            if self.slots[parent_slot].state != ProcState::Killed {
                self.slots[parent_slot].signals |= sig_bit(SIGCHLD);
                let parent_wpid = self.slots[parent_slot].wpid;
                if parent_wpid >= 0 && parent_wpid != pid {
                    self.slots[slot].ppid = INIT_PID;
                }
            }
        }

        for i in 0..NPROC {
            if self.slots[i].is_alive() && self.slots[i].ppid == pid {
                self.slots[i].ppid = INIT_PID;
            }
        }

        if self.fg_process == Some(pid) {
            let handoff_ppid = self.slots[slot].ppid;
            self.fg_process = match self.slot_of(handoff_ppid) {
                Some(pslot) if !self.slots[slot].daemon && !self.slots[pslot].daemon => {
                    Some(handoff_ppid)
                }
                _ => None,
            };
        }

        if !self.slots[slot].daemon {
            self.wake_up(EVENT_FG_PAUSED);
        }

        self.zombie_list.push_back(pid);
        self.wake_up(EVENT_ZOMBIE_CLEANUP);

        crate::klog!(
            hal,
            crate::kernel::LogLevel::Info,
            "exit: pid {pid} status {status:#x}"
        );
        if !from_handler {
            self.schedule(hal);
        }
    }

    /// `wait(pid, wstatus_out, options)` (4.I).
    pub fn wait(
        &mut self,
        hal: &dyn Hal,
        ftable: &mut FileTable,
        inodes: &mut InodeTable,
        waiter: i32,
        pid: i32,
        wnohang: bool,
    ) -> Result<WaitOutcome, ()> {
        if pid == 0 || pid < -1 {
            return Err(());
        }
        if let Some(slot) = self.slot_of(waiter) {
            self.slots[slot].wpid = pid;
        }

        loop {
            let has_child = (0..NPROC).any(|i| {
                let p = &self.slots[i];
                p.is_alive() && p.ppid == waiter && (pid == -1 || p.pid == pid)
            });
            if !has_child {
                return Err(());
            }

            let reap_target = self.zombie_list.iter().find(|&z| {
                self.slot_of(z)
                    .is_some_and(|s| self.slots[s].ppid == waiter && (pid == -1 || z == pid))
            });

            if let Some(zpid) = reap_target {
                self.zombie_list.remove(zpid);
                let slot = self.slot_of(zpid).unwrap();
                for fd in 0..MAX_OPEN_FILES {
                    let fd_table = &mut self.slots[slot].fd_table;
                    ftable.close_file(inodes, fd_table, fd);
                }
                if let Some(kstack) = self.slots[slot].kstack.take() {
                    hal.free_page(kstack);
                }
                if let Some(page_map) = self.slots[slot].page_map.take() {
                    hal.free_page(page_map);
                }
                let status = self.slots[slot].status;
                self.slots[slot] = UNUSED_PCB;

                if pid == -1 {
                    self.wake_up(EVENT_ZOMBIE_CLEANUP);
                }
                crate::klog!(
                    hal,
                    crate::kernel::LogLevel::Debug,
                    "wait: pid {waiter} reaped zombie pid {zpid}"
                );
                return Ok(WaitOutcome::Reaped { pid: zpid, status });
            }

            if wnohang {
                return Ok(WaitOutcome::WouldBlock);
            }
            self.sleep(hal, EVENT_ZOMBIE_CLEANUP);
        }
    }

    /// `kill(pid, sig)` (4.I).
    pub fn kill(
        &mut self,
        hal: &dyn Hal,
        ftable: &mut FileTable,
        inodes: &mut InodeTable,
        sender: i32,
        pid: i32,
        sig: u32,
    ) -> Result<(), ()> {
        if !is_in_range(sig) {
            return Err(());
        }
        match pid {
            p if p > 0 => {
                self.kill_one(hal, p, sig);
                Ok(())
            }
            0 => {
                let targets: ArrayVec<i32, NPROC> = (0..NPROC)
                    .filter_map(|i| {
                        let p = &self.slots[i];
                        (p.is_alive()
                            && !matches!(p.state, ProcState::Killed)
                            && p.ppid == sender)
                            .then_some(p.pid)
                    })
                    .collect();
                for t in targets {
                    self.kill_one(hal, t, sig);
                }
                Ok(())
            }
            -1 => {
                let targets: ArrayVec<i32, NPROC> = (0..NPROC)
                    .filter_map(|i| {
                        let p = &self.slots[i];
                        (p.is_alive()
                            && !matches!(p.state, ProcState::Killed)
                            && p.pid != sender
                            && p.pid != INIT_PID
                            && p.pid != IDLE_PID)
                            .then_some(p.pid)
                    })
                    .collect();
                for t in &targets {
                    self.kill_one(hal, *t, sig);
                }

                if sig == SIGHUP {
                    // Only rogue/unattended zombies (not owned by init) are
                    // released here: init-owned zombies are left for init's
                    // own `wait` to reap, or a later `wait(-1)` from init
                    // would find them already gone and their status lost.
                    let zombies: ArrayVec<i32, NPROC> = self
                        .zombie_list
                        .iter()
                        .filter(|&z| self.slot_of(z).is_some_and(|s| self.slots[s].ppid != INIT_PID))
                        .collect();
                    for z in zombies {
                        self.zombie_list.remove(z);
                        let slot = self.slot_of(z).unwrap();
                        // A fresh `fd` index every iteration of this outer
                        // loop: the bug this core does not replicate (§9)
                        // reused the outer scan's index here instead.
                        for fd in 0..MAX_OPEN_FILES {
                            let fd_table = &mut self.slots[slot].fd_table;
                            ftable.close_file(inodes, fd_table, fd);
                        }
                        if let Some(kstack) = self.slots[slot].kstack.take() {
                            hal.free_page(kstack);
                        }
                        if let Some(page_map) = self.slots[slot].page_map.take() {
                            hal.free_page(page_map);
                        }
                        self.slots[slot] = UNUSED_PCB;
                    }
                    self.next_pid = 2;
                }
                if sig == SIGTERM {
                    self.kill_one(hal, INIT_PID, sig);
                    self.kill_one(hal, IDLE_PID, sig);
                }
                Ok(())
            }
            _ => Err(()),
        }
    }

    fn kill_one(&mut self, hal: &dyn Hal, pid: i32, sig: u32) {
        let Some(slot) = self.slot_of(pid) else { return };
        if !self.slots[slot].is_alive() {
            return;
        }
        crate::klog!(hal, crate::kernel::LogLevel::Debug, "kill: pid {pid} signal {sig}");
        self.slots[slot].signals |= sig_bit(sig);
        if self.slots[slot].state == ProcState::Sleep {
            self.wait_list.remove(pid);
            self.slots[slot].state = ProcState::Ready;
            self.ready_queue.push_back(pid);
        }
    }

    // ---- introspection (`ps`-style syscalls, §6) --------------------------

    pub fn get_active_procs(&self, mut out: Option<&mut [i32]>) -> usize {
        let mut count = 0;
        for i in 0..NPROC {
            if self.slots[i].is_alive() {
                if let Some(buf) = out.as_deref_mut() {
                    if count < buf.len() {
                        buf[count] = self.slots[i].pid;
                    }
                }
                count += 1;
            }
        }
        count
    }

    /// `signal(sig, handler)` (§6): installs `action` as `pid`'s handler for
    /// `sig`, returning the handler it replaces. `None` if `pid` doesn't
    /// exist.
    pub fn set_handler(&mut self, pid: i32, sig: u32, action: SignalAction) -> Option<SignalAction> {
        if !crate::signal::is_catchable(sig) {
            return None;
        }
        let slot = self.slot_of(pid)?;
        let prev = self.slots[slot].handlers[sig as usize];
        self.slots[slot].handlers[sig as usize] = action;
        Some(prev)
    }

    pub fn get_proc_data(&self, pid: i32) -> Option<ProcSnapshot> {
        let slot = self.slot_of(pid)?;
        let p = &self.slots[slot];
        if !p.is_alive() {
            return None;
        }
        Some(ProcSnapshot {
            ppid: p.ppid,
            state: p.state,
            name: p.name,
            daemon: p.daemon,
        })
    }

    /// `get_proc_data`'s `argbuf`/`argsize` half (§6): `exec` serialized
    /// name+argv, NUL-separated, at the bottom of `pid`'s kernel stack and
    /// never overwrites it again before the next `exec`, so it is read back
    /// from there directly, skipping the program name since the caller
    /// already gets that via `name`. The scan stops at the first zero byte
    /// following the last argument, relying on the kstack having been
    /// zero-initialized at allocation (`alloc_new_process`) the same way the
    /// original does. Returns the total byte size of the copied argv blob,
    /// truncating (rather than overflowing) into `out` if it is too small.
    pub fn copy_argv(&self, hal: &dyn Hal, pid: i32, out: &mut [u8]) -> Option<usize> {
        let slot = self.slot_of(pid)?;
        let kstack = self.slots[slot].kstack?;
        let scratch = hal.page_bytes_mut(kstack);

        let name_len = scratch.iter().position(|&b| b == 0)?;
        let mut src = name_len + 1;
        let mut size = 0usize;
        while scratch[src] != 0 {
            let len = scratch[src..]
                .iter()
                .position(|&b| b == 0)
                .expect("argv scratch region missing its NUL terminator");
            let copy_len = len.min(out.len().saturating_sub(size));
            out[size..size + copy_len].copy_from_slice(&scratch[src..src + copy_len]);
            if copy_len == len {
                let nul_pos = size + len;
                if nul_pos < out.len() {
                    out[nul_pos] = 0;
                }
            }
            size += len + 1;
            src += len + 1;
        }
        Some(size)
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::fake::FakeHal;
    use crate::param::PAGE_SIZE;

    fn new_fixture() -> (ProcTable, FakeHal, FileTable, InodeTable) {
        (
            ProcTable::new(),
            FakeHal::new(PAGE_SIZE),
            FileTable::new(),
            InodeTable::new(),
        )
    }

    #[test]
    fn idle_is_never_unused_and_starts_running() {
        let (table, ..) = new_fixture();
        assert_eq!(table.get(IDLE_PID).unwrap().state, ProcState::Running);
        assert_eq!(table.current(), IDLE_PID);
    }

    #[test]
    fn alloc_assigns_monotonic_pids() {
        let (mut table, hal, mut ftable, mut inodes) = new_fixture();
        let a = table.fork(&hal, &mut ftable, &mut inodes);
        let b = table.fork(&hal, &mut ftable, &mut inodes);
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn fork_shares_fds_and_zeroes_child_retval() {
        let (mut table, hal, mut ftable, mut inodes) = new_fixture();
        let child = table.fork(&hal, &mut ftable, &mut inodes);
        assert_eq!(table.get(child).unwrap().state, ProcState::Ready);
        assert_eq!(table.get(child).unwrap().reg_context.x0, 0);
    }

    #[test]
    fn fifo_scheduling_round_robins() {
        // S6
        let (mut table, hal, ..) = new_fixture();
        table.ready_queue.push_back(10);
        table.ready_queue.push_back(11);
        table.ready_queue.push_back(12);
        for (i, pid) in [10, 11, 12].into_iter().enumerate() {
            table.slots[i + 1] = Pcb {
                pid,
                state: ProcState::Ready,
                ..UNUSED_PCB
            };
        }
        table.schedule(&hal);
        assert_eq!(table.current(), 10);
        table.trigger_scheduler(&hal);
        assert_eq!(table.current(), 11);
        table.trigger_scheduler(&hal);
        assert_eq!(table.current(), 12);
        table.trigger_scheduler(&hal);
        assert_eq!(table.current(), 10);
    }

    #[test]
    fn wait_fails_without_children() {
        let (mut table, hal, mut ftable, mut inodes) = new_fixture();
        let r = table.wait(&hal, &mut ftable, &mut inodes, IDLE_PID, -1, false);
        assert_eq!(r, Err(()));
    }

    #[test]
    fn fork_exit_wait_round_trip() {
        // S1 (minus real exec: this exercises fork/exit/wait bookkeeping).
        let (mut table, hal, mut ftable, mut inodes) = new_fixture();
        table.current = INIT_PID; // pretend init is running and forks
        table.slots[1] = Pcb {
            pid: INIT_PID,
            state: ProcState::Running,
            ..UNUSED_PCB
        };
        let child = table.fork(&hal, &mut ftable, &mut inodes);
        assert_eq!(table.get(child).unwrap().ppid, INIT_PID);

        table.current = child;
        table.exit(&hal, child, 0, false);
        assert_eq!(table.get(child).unwrap().state, ProcState::Killed);

        table.current = INIT_PID;
        let outcome = table
            .wait(&hal, &mut ftable, &mut inodes, INIT_PID, -1, false)
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Reaped { pid: child, status: 0 });
        assert!(table.get(child).is_none());
    }

    #[test]
    fn orphans_are_reparented_to_init() {
        // S2
        let (mut table, hal, mut ftable, mut inodes) = new_fixture();
        table.slots[1] = Pcb {
            pid: INIT_PID,
            state: ProcState::Running,
            ..UNUSED_PCB
        };
        table.current = INIT_PID;
        let a = table.fork(&hal, &mut ftable, &mut inodes);
        table.current = a;
        let b = table.fork(&hal, &mut ftable, &mut inodes);
        table.current = b;
        let c = table.fork(&hal, &mut ftable, &mut inodes);

        table.current = a;
        table.exit(&hal, a, 0, false);

        assert_eq!(table.get(b).unwrap().ppid, INIT_PID);
        assert_eq!(table.get(c).unwrap().ppid, b);

        table.current = b;
        table.exit(&hal, b, 0, false);
        assert_eq!(table.get(c).unwrap().ppid, INIT_PID);
    }

    #[test]
    fn kill_sleeper_moves_it_to_ready_and_signal_fires_on_dispatch() {
        // S3
        let (mut table, hal, mut ftable, mut inodes) = new_fixture();
        table.slots[1] = Pcb {
            pid: INIT_PID,
            state: ProcState::Running,
            ..UNUSED_PCB
        };
        table.current = INIT_PID;
        let p = table.fork(&hal, &mut ftable, &mut inodes);
        table.ready_queue.remove(p);
        table.current = p;
        table.slots[table.slot_of(p).unwrap()].state = ProcState::Sleep;
        table.slots[table.slot_of(p).unwrap()].event = 99;
        table.wait_list.push_back(p);

        table
            .kill(&hal, &mut ftable, &mut inodes, INIT_PID, p, SIGTERM)
            .unwrap();
        assert!(table.ready_queue.contains(p));
        assert_eq!(table.get(p).unwrap().event, 99); // not cleared by kill

        table.current = INIT_PID;
        table.ready_queue.push_back(INIT_PID);
        table.schedule(&hal); // pops p, signal check should exit() it
        let status = table.get(p).unwrap().status;
        assert_eq!(status & 0x7f, SIGTERM as i32);
    }

    #[test]
    fn fd_sharing_refcounts_match_across_fork_and_exit() {
        // S4, using a pre-opened fd shared via share_fds directly (exec is
        // exercised separately in `file.rs`'s own tests).
        let (mut table, hal, mut ftable, mut inodes) = new_fixture();
        table.slots[1] = Pcb {
            pid: INIT_PID,
            state: ProcState::Running,
            ..UNUSED_PCB
        };
        table.current = INIT_PID;
        let child = table.fork(&hal, &mut ftable, &mut inodes);
        assert_eq!(
            table.get(INIT_PID).unwrap().fd_table,
            table.get(child).unwrap().fd_table
        );
    }

    #[test]
    fn copy_argv_skips_program_name_and_reports_total_size() {
        let (mut table, hal, mut ftable, mut inodes) = new_fixture();
        table.slots[1] = Pcb {
            pid: INIT_PID,
            state: ProcState::Running,
            ..UNUSED_PCB
        };
        table.current = INIT_PID;
        let p = table.fork(&hal, &mut ftable, &mut inodes);
        let kstack = table.get(p).unwrap().kstack.unwrap();
        {
            let scratch = hal.page_bytes_mut(kstack);
            let mut off = 0;
            for part in [&b"PROG"[..], b"one", b"two"] {
                scratch[off..off + part.len()].copy_from_slice(part);
                off += part.len();
                scratch[off] = 0;
                off += 1;
            }
        }

        let mut out = [0xffu8; 16];
        let size = table.copy_argv(&hal, p, &mut out).unwrap();
        assert_eq!(size, 8); // "one\0two\0"
        assert_eq!(&out[..size], b"one\0two\0");

        let mut tiny = [0u8; 3];
        let size = table.copy_argv(&hal, p, &mut tiny).unwrap();
        assert_eq!(size, 8); // reports the true size even when it truncates
        assert_eq!(&tiny, b"one");
    }

    #[test]
    fn shutdown_flag_set_when_idle_has_sigterm_and_queues_empty() {
        // S5
        let (mut table, hal, mut ftable, mut inodes) = new_fixture();
        table
            .kill(&hal, &mut ftable, &mut inodes, -1, -1, SIGTERM)
            .unwrap();
        assert_eq!(table.get(INIT_PID), None); // no init process exists in this fixture
        assert!(table.get(IDLE_PID).unwrap().signals & sig_bit(SIGTERM) != 0);
        table.current = IDLE_PID;
        table.schedule(&hal);
        assert!(table.shutdown);
        assert_eq!(table.get(IDLE_PID).unwrap().reg_context.x5, 1);
    }

    #[test]
    fn sighup_broadcast_releases_only_unattended_zombies() {
        // S4.I: kill(-1, SIGHUP) frees rogue zombies but leaves init-owned
        // ones for init's own wait() to reap.
        let (mut table, hal, mut ftable, mut inodes) = new_fixture();
        table.slots[1] = Pcb {
            pid: INIT_PID,
            state: ProcState::Running,
            ..UNUSED_PCB
        };

        let attended = 5;
        table.slots[2] = Pcb {
            pid: attended,
            ppid: INIT_PID,
            state: ProcState::Killed,
            kstack: Some(hal.alloc_page().unwrap()),
            page_map: Some(hal.alloc_page().unwrap()),
            ..UNUSED_PCB
        };
        table.zombie_list.push_back(attended);

        let rogue = 6;
        table.slots[3] = Pcb {
            pid: rogue,
            ppid: attended, // parent that is itself a zombie: nobody left to reap it
            state: ProcState::Killed,
            kstack: Some(hal.alloc_page().unwrap()),
            page_map: Some(hal.alloc_page().unwrap()),
            ..UNUSED_PCB
        };
        table.zombie_list.push_back(rogue);

        table
            .kill(&hal, &mut ftable, &mut inodes, IDLE_PID, -1, SIGHUP)
            .unwrap();

        assert!(table.zombie_list.contains(attended));
        assert!(table.get(attended).is_some());
        assert!(!table.zombie_list.contains(rogue));
        assert!(table.get(rogue).is_none());
    }

    #[test]
    fn sigkill_bypasses_a_handler_and_ignore_registration() {
        let (mut table, hal, mut ftable, mut inodes) = new_fixture();
        table.slots[1] = Pcb {
            pid: INIT_PID,
            state: ProcState::Running,
            ..UNUSED_PCB
        };
        table.current = INIT_PID;
        let p = table.fork(&hal, &mut ftable, &mut inodes);

        // Attempting to install a handler or IGNORE for SIGKILL is rejected;
        // the disposition stays DEFAULT.
        assert!(table.set_handler(p, SIGKILL, SignalAction::Ignore).is_none());
        assert!(table
            .set_handler(p, SIGKILL, SignalAction::Handler(0x1234))
            .is_none());

        table.ready_queue.push_back(INIT_PID);
        table
            .kill(&hal, &mut ftable, &mut inodes, INIT_PID, p, SIGKILL)
            .unwrap();
        table.current = INIT_PID;
        table.schedule(&hal); // pops p; SIGKILL must terminate it regardless
        let status = table.get(p).unwrap().status;
        assert_eq!(status & 0x7f, SIGKILL as i32);
    }
}
