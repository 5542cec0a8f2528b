//! FIFO queues of process nodes (component A).
//!
//! A linked list through `next` pointers stored in the PCB itself is unsound
//! to express safely with owned PCBs in a fixed array, so queues here hold
//! small PCB indices instead, backed by a fixed-capacity
//! [`arrayvec::ArrayVec`]. A pid only ever sits on one queue at a time;
//! callers are responsible for that invariant (§3).

use arrayvec::ArrayVec;

use crate::param::NPROC;

/// FIFO of pids, capacity bounded by the process table size.
pub struct ProcQueue {
    entries: ArrayVec<i32, NPROC>,
}

impl ProcQueue {
    pub const fn new() -> Self {
        Self {
            entries: ArrayVec::new_const(),
        }
    }

    pub fn push_back(&mut self, pid: i32) {
        self.entries
            .try_push(pid)
            .expect("process queue overflow: more than NPROC pids enqueued");
    }

    pub fn pop_front(&mut self) -> Option<i32> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    pub fn front(&self) -> Option<i32> {
        self.entries.first().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, pid: i32) -> bool {
        self.entries.contains(&pid)
    }

    /// Removes the first occurrence of `pid`. Returns whether it was present.
    pub fn remove(&mut self, pid: i32) -> bool {
        match self.entries.iter().position(|&p| p == pid) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    /// `find_by_event`: returns the first pid for which `pred` holds.
    pub fn find_by<F: Fn(i32) -> bool>(&self, pred: F) -> Option<i32> {
        self.entries.iter().copied().find(|&pid| pred(pid))
    }

    /// `remove_by_event`: removes and returns the first pid for which `pred` holds.
    pub fn remove_by<F: Fn(i32) -> bool>(&mut self, pred: F) -> Option<i32> {
        let idx = self.entries.iter().position(|&pid| pred(pid))?;
        Some(self.entries.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.entries.iter().copied()
    }
}

impl Default for ProcQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut q = ProcQueue::new();
        q.push_back(3);
        q.push_back(1);
        q.push_back(2);
        assert_eq!(q.pop_front(), Some(3));
        assert_eq!(q.pop_front(), Some(1));
        assert_eq!(q.pop_front(), Some(2));
        assert_eq!(q.pop_front(), None);
    }

    #[test]
    fn remove_by_event_removes_exactly_one() {
        let mut q = ProcQueue::new();
        q.push_back(5);
        q.push_back(6);
        q.push_back(7);
        // pretend event(pid) == pid for this test
        let removed = q.remove_by(|pid| pid == 6);
        assert_eq!(removed, Some(6));
        assert!(!q.contains(6));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn membership_and_removal() {
        let mut q = ProcQueue::new();
        q.push_back(1);
        q.push_back(2);
        assert!(q.contains(1));
        assert!(q.remove(1));
        assert!(!q.contains(1));
        assert!(!q.remove(1));
    }
}
