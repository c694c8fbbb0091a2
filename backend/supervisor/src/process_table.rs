//! OS Process Table
//!
//! Thin wrapper over `sysinfo` giving parent/child relationships, liveness
//! checks keyed on (pid, start time), and signal delivery.

use std::collections::{HashMap, HashSet, VecDeque};

use sysinfo::{Pid, Process, ProcessStatus, ProcessesToUpdate, Signal, System};
use tracing::debug;

/// A pid paired with its start time, so a recycled pid never matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessIdentity {
    pub pid: u32,
    pub start_time: u64,
}

/// Result of delivering one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Delivered,
    /// The process exited (or its pid was reused) before the signal.
    Gone,
    /// The process is still there but refused the signal (usually EPERM).
    Refused,
}

pub struct ProcessTable {
    system: System,
}

impl ProcessTable {
    /// Snapshot the full process list.
    pub fn capture() -> Self {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        Self { system }
    }

    /// Snapshot only the given pids.
    pub fn observe(pids: &[u32]) -> Self {
        let mut table = Self {
            system: System::new(),
        };
        table.refresh(pids);
        table
    }

    /// Re-read the given pids, dropping the ones that no longer exist.
    pub fn refresh(&mut self, pids: &[u32]) {
        let pids: Vec<Pid> = pids.iter().copied().map(Pid::from_u32).collect();
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&pids), true);
    }

    fn live(&self, pid: u32) -> Option<&Process> {
        self.system
            .process(Pid::from_u32(pid))
            .filter(|process| is_live(process))
    }

    /// Identity of `pid` if it is a live process in this snapshot.
    pub fn identity(&self, pid: u32) -> Option<ProcessIdentity> {
        self.live(pid).map(|process| ProcessIdentity {
            pid,
            start_time: process.start_time(),
        })
    }

    pub fn is_alive(&self, identity: &ProcessIdentity) -> bool {
        self.live(identity.pid)
            .is_some_and(|process| process.start_time() == identity.start_time)
    }

    /// Live direct children of `parent`.
    pub fn children_of(&self, parent: u32) -> Vec<ProcessIdentity> {
        let parent = Pid::from_u32(parent);
        let mut children: Vec<_> = self
            .system
            .processes()
            .iter()
            .filter(|(_, process)| is_live(process) && process.parent() == Some(parent))
            .map(|(pid, process)| ProcessIdentity {
                pid: pid.as_u32(),
                start_time: process.start_time(),
            })
            .collect();
        children.sort_by_key(|identity| identity.pid);
        children
    }

    /// Every live descendant of `root`, parents before their children.
    pub fn descendants_of(&self, root: u32) -> Vec<ProcessIdentity> {
        let mut by_parent: HashMap<u32, Vec<ProcessIdentity>> = HashMap::new();
        for (pid, process) in self.system.processes() {
            if !is_live(process) {
                continue;
            }
            if let Some(parent) = process.parent() {
                by_parent
                    .entry(parent.as_u32())
                    .or_default()
                    .push(ProcessIdentity {
                        pid: pid.as_u32(),
                        start_time: process.start_time(),
                    });
            }
        }

        let mut seen = HashSet::from([root]);
        let mut queue = VecDeque::from([root]);
        let mut descendants = Vec::new();
        while let Some(parent) = queue.pop_front() {
            let Some(children) = by_parent.get(&parent) else {
                continue;
            };
            for child in children {
                if seen.insert(child.pid) {
                    descendants.push(*child);
                    queue.push_back(child.pid);
                }
            }
        }
        descendants
    }

    /// Ask `identity` to exit. Falls back to a forceful kill on platforms
    /// without a graceful termination signal.
    pub fn terminate(&mut self, identity: &ProcessIdentity) -> SignalOutcome {
        self.send(identity, Some(Signal::Term))
    }

    /// Kill `identity` immediately.
    pub fn force_kill(&mut self, identity: &ProcessIdentity) -> SignalOutcome {
        self.send(identity, None)
    }

    fn send(&mut self, identity: &ProcessIdentity, signal: Option<Signal>) -> SignalOutcome {
        self.refresh(&[identity.pid]);
        let Some(process) = self
            .live(identity.pid)
            .filter(|process| process.start_time() == identity.start_time)
        else {
            return SignalOutcome::Gone;
        };

        let delivered = match signal {
            Some(signal) => process.kill_with(signal).unwrap_or_else(|| process.kill()),
            None => process.kill(),
        };
        if delivered {
            return SignalOutcome::Delivered;
        }

        // Distinguish a process that exited under us from one we may not signal.
        self.refresh(&[identity.pid]);
        if self.is_alive(identity) {
            debug!(pid = identity.pid, "Signal refused");
            SignalOutcome::Refused
        } else {
            SignalOutcome::Gone
        }
    }
}

fn is_live(process: &Process) -> bool {
    process.thread_kind().is_none()
        && !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_is_visible() {
        let own = std::process::id();
        let table = ProcessTable::observe(&[own]);
        let identity = table.identity(own).expect("own process should be listed");
        assert_eq!(identity.pid, own);
        assert!(table.is_alive(&identity));
    }

    #[test]
    fn test_start_time_mismatch_is_not_alive() {
        let own = std::process::id();
        let table = ProcessTable::observe(&[own]);
        let identity = table.identity(own).unwrap();
        let recycled = ProcessIdentity {
            pid: own,
            start_time: identity.start_time.wrapping_add(1),
        };
        assert!(!table.is_alive(&recycled));
    }

    #[test]
    fn test_descendants_exclude_root() {
        let own = std::process::id();
        let table = ProcessTable::capture();
        assert!(table.descendants_of(own).iter().all(|d| d.pid != own));
    }
}
