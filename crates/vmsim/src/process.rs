/// Simulated user processes.
///
/// Each process is a thread that keeps generating memory references (random,
/// loop bursts, locality-biased, or driven by the global reference string)
/// and occasionally queues an I/O request, until the MMU reports termination
/// or the I/O device stops accepting requests.

use std::sync::{Condvar, Mutex};

use rand::rngs::ThreadRng;
use rand::Rng;

use crate::mm::paging::PagingState;
use crate::proclog::ProcessLog;
use crate::report::ProcStats;
use crate::sim::SimContext;

/// Accesses per simulated loop burst
const LOOP_ITERATIONS: u32 = 8;
/// Stride of one burst element, bytes
const ITEM_SIZE: u32 = 10;
/// Locality step for a temporally-close re-access, bytes
const LOCALITY_STEP: u32 = 1024;

/// Completion slot a process blocks on after queueing an I/O request.
///
/// The flag keeps a completion that lands before the process starts
/// waiting, so the wakeup cannot be lost.
#[derive(Debug, Default)]
pub struct IoWait {
    done: Mutex<bool>,
    cv: Condvar,
}

impl IoWait {
    pub fn wait(&self) {
        let mut done = self.done.lock().unwrap();
        while !*done {
            done = self.cv.wait(done).unwrap();
        }
        *done = false;
    }

    pub fn signal(&self) {
        let mut done = self.done.lock().unwrap();
        *done = true;
        self.cv.notify_one();
    }
}

/// Process-table entry. Identity and page count are fixed at init; the
/// stats are bumped by the MMU and I/O threads, the log by all three.
pub struct ProcessEntry {
    /// PID, equal to the index in the process table
    pub pid: usize,
    /// Pages allocated to this process (fixed)
    pub page_count: u32,
    /// Probability of a memory access over an I/O request, percent
    pub mem_probability: u8,
    pub stats: ProcStats,
    pub io_wait: IoWait,
    pub log: ProcessLog,
}

impl ProcessEntry {
    pub fn new(pid: usize, page_count: u32, mem_probability: u8, log: ProcessLog) -> Self {
        Self {
            pid,
            page_count,
            mem_probability,
            stats: ProcStats::default(),
            io_wait: IoWait::default(),
            log,
        }
    }
}

/// Workload state owned by the process thread itself.
struct Workload<'a> {
    ctx: &'a SimContext,
    procnum: usize,
    /// Data-space size: page_count * page_size
    dss: u32,
    rng: ThreadRng,
    last_address: Option<u32>,
    reference_item: usize,
}

impl<'a> Workload<'a> {
    fn new(ctx: &'a SimContext, procnum: usize) -> Self {
        let dss = ctx.procs[procnum].page_count * ctx.cfg.frame_size;
        Self {
            ctx,
            procnum,
            dss,
            rng: rand::thread_rng(),
            last_address: None,
            reference_item: 0,
        }
    }

    /// One MMU round trip; false means the simulation terminated.
    fn access(&mut self, vaddr: u32, write: bool) -> bool {
        self.ctx
            .mmu
            .memory_access(self.procnum, vaddr, write)
            .is_some()
    }

    fn coin_write(&mut self) -> bool {
        self.ctx.cfg.write_enabled && self.rng.gen_range(0..=100u32) > 50
    }

    /// Next access of the deterministic reference string, cycling.
    fn reference_access(&mut self) -> bool {
        let reference = self
            .ctx
            .cfg
            .reference_string
            .as_ref()
            .expect("reference workload without a reference string");
        if self.reference_item >= reference.len() {
            self.reference_item = 0;
        }
        let vaddr = reference[self.reference_item] * self.ctx.cfg.frame_size;
        self.reference_item += 1;
        self.access(vaddr, false)
    }

    /// Iterate over a small contiguous vector, one access per element.
    fn loop_burst(&mut self) -> bool {
        let span = LOOP_ITERATIONS * ITEM_SIZE;
        let base = self.rng.gen_range(0..=self.dss - span);
        for i in 0..LOOP_ITERATIONS {
            let write = self.coin_write();
            if !self.access(base + i * ITEM_SIZE, write) {
                return false;
            }
        }
        true
    }

    /// Single access: temporally close to the previous one with the
    /// configured probability, uniform over the data space otherwise.
    fn random_access(&mut self) -> bool {
        let vaddr = match self.last_address {
            None => self.rng.gen_range(0..self.dss),
            Some(last) => {
                if self.rng.gen_range(0..=100u32) <= u32::from(self.ctx.cfg.temporal_locality) {
                    let next = last + LOCALITY_STEP;
                    if next >= self.dss {
                        last
                    } else {
                        next
                    }
                } else {
                    self.rng.gen_range(0..self.dss)
                }
            }
        };
        self.last_address = Some(vaddr);
        let write = self.coin_write();
        self.access(vaddr, write)
    }

    fn run(&mut self) {
        loop {
            if self.ctx.cfg.reference_string.is_some() {
                if !self.reference_access() {
                    break;
                }
                continue;
            }

            let proc = &self.ctx.procs[self.procnum];
            if self.rng.gen_range(0..=100u32) <= u32::from(proc.mem_probability) {
                let burst = self.rng.gen_range(0..=100u32) <= 30
                    && self.dss >= LOOP_ITERATIONS * ITEM_SIZE;
                let alive = if burst {
                    self.loop_burst()
                } else {
                    self.random_access()
                };
                if !alive {
                    break;
                }
            } else if self.ctx.io.read(proc) {
                proc.io_wait.wait();
            } else {
                break;
            }
        }
    }
}

/// Body of one process thread.
pub fn workload_loop(ctx: &SimContext, procnum: usize) {
    let proc = &ctx.procs[procnum];
    proc.log.line(format!(
        "PROCESS START\n\
         ======================\n\
         PID             = {}\n\
         VIRTUAL PAGES   = {}\n\
         PROBABILITY     = {}%\n\
         ======================",
        proc.pid, proc.page_count, proc.mem_probability
    ));

    Workload::new(ctx, procnum).run();
}

/// Append the process's page-state snapshot to its log (debug mode).
pub fn dump_page_states(paging: &PagingState, proc: &ProcessEntry) {
    for page in paging.pages(proc.pid) {
        let state = match page.frame_id {
            Some(frame) if page.is_present() => {
                let referenced = if page.is_referenced() { "[REF" } else { "[NOT REF" };
                let dirty = if page.is_dirty() { ", DIRTY]" } else { "]" };
                format!("FRAME {frame:2} {referenced}{dirty}")
            }
            _ => String::new(),
        };
        proc.log
            .line(format!("         PAGE {:2} : {}", page.id, state));
    }
    proc.log
        .line("============================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn io_wait_keeps_an_early_completion() {
        let wait = IoWait::default();
        wait.signal();
        // returns immediately, nothing was lost
        wait.wait();
    }

    #[test]
    fn io_wait_blocks_until_signaled() {
        let wait = IoWait::default();
        let woke = AtomicBool::new(false);
        thread::scope(|scope| {
            scope.spawn(|| {
                wait.wait();
                woke.store(true, Ordering::SeqCst);
            });
            thread::sleep(Duration::from_millis(20));
            assert!(!woke.load(Ordering::SeqCst));
            wait.signal();
        });
        assert!(woke.load(Ordering::SeqCst));
    }

    #[test]
    fn io_wait_resets_after_wakeup() {
        let wait = IoWait::default();
        wait.signal();
        wait.wait();
        // a second wait must block again until the next signal
        thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(10));
                wait.signal();
            });
            wait.wait();
        });
    }
}
