/// MMU engine: request rendezvous, translation, global shutdown.
///
/// Processes hand requests to the MMU thread through a single-slot
/// rendezvous: a tri-state slot guarded by a mutex and one condition
/// variable, serialized by an outer entry lock so that at most one request
/// is outstanding at any instant. The caller holds the entry lock across
/// the whole handshake, which makes the slot private to that caller.
///
/// The same entry lock carries the termination decision: once served
/// requests reach the configured cap, the first caller to notice announces
/// shutdown exactly once (I/O device first, then the translation loop) and
/// every caller from then on gets the terminated sentinel.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use log::info;

use super::page::{AddressLayout, PhysAddr, VirtAddr};
use super::paging::{PageEvent, PagingState};
use crate::io_device::IoDevice;
use crate::process::ProcessEntry;

/// A request published into the rendezvous slot.
#[derive(Debug, Clone, Copy)]
pub struct MmuRequest {
    pub procnum: usize,
    pub vaddr: VirtAddr,
    pub write: bool,
}

#[derive(Debug, Clone, Copy)]
enum SlotState {
    Empty,
    Data(MmuRequest),
    Result(PhysAddr),
}

#[derive(Debug, Default)]
struct EntryGate {
    /// Latch: the shutdown cascade ran already
    announced: bool,
}

pub struct Mmu {
    layout: AddressLayout,
    total_access: u32,
    anticipatory: bool,
    hits: AtomicU32,
    faults: AtomicU32,
    entry: Mutex<EntryGate>,
    slot: Mutex<SlotState>,
    slot_cv: Condvar,
    should_exit: AtomicBool,
    io: Arc<IoDevice>,
}

impl Mmu {
    pub fn new(
        layout: AddressLayout,
        total_access: u32,
        anticipatory: bool,
        io: Arc<IoDevice>,
    ) -> Self {
        Self {
            layout,
            total_access,
            anticipatory,
            hits: AtomicU32::new(0),
            faults: AtomicU32::new(0),
            entry: Mutex::new(EntryGate::default()),
            slot: Mutex::new(SlotState::Empty),
            slot_cv: Condvar::new(),
            should_exit: AtomicBool::new(false),
            io,
        }
    }

    pub fn layout(&self) -> AddressLayout {
        self.layout
    }

    pub fn anticipatory(&self) -> bool {
        self.anticipatory
    }

    pub fn total_access(&self) -> u32 {
        self.total_access
    }

    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn faults(&self) -> u32 {
        self.faults.load(Ordering::Relaxed)
    }

    /// Requests served so far (hits + faults).
    pub fn requests(&self) -> u32 {
        self.hits() + self.faults()
    }

    /// Translate a virtual address for process `procnum`.
    ///
    /// Returns the translated physical address, or `None` once the access
    /// cap is reached and the caller must terminate. The first call that
    /// observes the cap runs the shutdown cascade.
    pub fn memory_access(
        &self,
        procnum: usize,
        vaddr: VirtAddr,
        write: bool,
    ) -> Option<PhysAddr> {
        let mut gate = self.entry.lock().unwrap();

        if self.requests() >= self.total_access {
            if !gate.announced {
                gate.announced = true;
                self.io.request_shutdown();
                self.should_exit.store(true, Ordering::SeqCst);
                // wake the translation loop parked on the slot
                let _slot = self.slot.lock().unwrap();
                self.slot_cv.notify_all();
            }
            return None;
        }

        let mut slot = self.slot.lock().unwrap();
        debug_assert!(matches!(*slot, SlotState::Empty));
        *slot = SlotState::Data(MmuRequest {
            procnum,
            vaddr,
            write,
        });
        self.slot_cv.notify_all();
        loop {
            if let SlotState::Result(translated) = *slot {
                *slot = SlotState::Empty;
                return Some(translated);
            }
            slot = self.slot_cv.wait(slot).unwrap();
        }
    }

    /// Consumer side: park until a request is published or shutdown is
    /// signaled. The slot keeps holding the request while it is served.
    fn wait_for_request(&self) -> Option<MmuRequest> {
        let mut slot = self.slot.lock().unwrap();
        loop {
            if self.should_exit.load(Ordering::SeqCst) {
                return None;
            }
            if let SlotState::Data(request) = *slot {
                return Some(request);
            }
            slot = self.slot_cv.wait(slot).unwrap();
        }
    }

    /// Consumer side: publish the translated address and wake the caller.
    fn complete(&self, translated: PhysAddr) {
        let mut slot = self.slot.lock().unwrap();
        *slot = SlotState::Result(translated);
        self.slot_cv.notify_all();
    }

    fn record(&self, hit: bool, proc: &ProcessEntry) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.faults.fetch_add(1, Ordering::Relaxed);
            proc.stats.page_faults.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Translate the page events of one access into the process log files:
/// write-backs land in the evicted owner's log, eviction and assignment
/// lines in the requester's.
fn log_page_events(procs: &[ProcessEntry], procnum: usize, events: &[PageEvent]) {
    for event in events {
        match *event {
            PageEvent::WriteBack { procnum: owner, page } => {
                procs[owner].log.line(format!("Write-back of page {page}"));
            }
            PageEvent::Evicted { procnum: owner, page, frame } => {
                procs[procnum].log.line(format!(
                    "<-- Page {page} of process {owner} evicted from memory (frame {frame})"
                ));
            }
            PageEvent::Assigned { page, frame } => {
                procs[procnum]
                    .log
                    .line(format!("--> Virtual page {page} assigned to frame {frame}"));
            }
        }
    }
}

/// Consumer loop, run on the MMU thread. When `debug` is positive, the
/// requesting process's page-state snapshot is appended to its log after
/// every served access.
pub fn translation_loop(
    mmu: &Mmu,
    paging: &Mutex<PagingState>,
    procs: &[ProcessEntry],
    debug: u8,
) {
    {
        let paging = paging.lock().unwrap();
        info!(
            "MMU thread started [ram={}, page_size={}, frames={}, total_access={}, procs={}]",
            paging.frames().total() as u32 * mmu.layout.page_size,
            mmu.layout.page_size,
            paging.frames().total(),
            mmu.total_access,
            procs.len()
        );
    }

    while let Some(request) = mmu.wait_for_request() {
        let proc = &procs[request.procnum];
        let page = mmu.layout.page_of(request.vaddr);
        let offset = mmu.layout.offset_of(request.vaddr);
        debug_assert!(page < proc.page_count);

        proc.log.line(format!(
            "\n{} virtual address {} [page {} - offset {}]",
            if request.write { "Write" } else { "Read" },
            request.vaddr,
            page,
            offset
        ));

        let mut paging = paging.lock().unwrap();
        let outcome = paging.access(request.procnum, page);
        mmu.record(outcome.hit, proc);
        log_page_events(procs, request.procnum, &outcome.events);

        if mmu.anticipatory {
            // touch the neighbouring pages too; these may fault and replace
            // silently but never contribute to the counters
            if page > 0 {
                let silent = paging.access(request.procnum, page - 1);
                log_page_events(procs, request.procnum, &silent.events);
            }
            if page + 1 < proc.page_count {
                let silent = paging.access(request.procnum, page + 1);
                log_page_events(procs, request.procnum, &silent.events);
            }
        }

        proc.stats.mem_accesses.fetch_add(1, Ordering::Relaxed);
        let translated = paging.frames().get(outcome.frame).base + offset;
        proc.log.line(format!(
            "[PAGE {}] Virtual address {} corresponds to physical {}",
            if outcome.hit { "HIT" } else { "FAULT" },
            request.vaddr,
            translated
        ));
        if request.write {
            paging.set_dirty(request.procnum, page);
        }
        if debug > 0 {
            crate::process::dump_page_states(&paging, proc);
        }
        drop(paging);

        mmu.complete(translated);
    }

    info!("MMU thread terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn mmu(total_access: u32) -> (Mmu, Arc<IoDevice>) {
        let io = Arc::new(IoDevice::new(0, 0));
        (
            Mmu::new(AddressLayout::new(4096), total_access, false, Arc::clone(&io)),
            io,
        )
    }

    #[test]
    fn rendezvous_round_trip_then_cap_terminates() {
        let (mmu, io) = mmu(2);
        assert_eq!(mmu.total_access(), 2);
        thread::scope(|scope| {
            scope.spawn(|| {
                while let Some(request) = mmu.wait_for_request() {
                    mmu.hits.fetch_add(1, Ordering::Relaxed);
                    mmu.complete(request.vaddr + 1);
                }
            });
            assert_eq!(mmu.memory_access(0, 10, false), Some(11));
            assert_eq!(mmu.memory_access(0, 20, false), Some(21));
            // cap reached: terminated, shutdown cascades exactly once
            assert_eq!(mmu.memory_access(0, 30, false), None);
            assert_eq!(mmu.memory_access(0, 40, false), None);
        });
        assert!(io.shutdown_requested());
        assert_eq!(mmu.requests(), 2);
    }

    #[test]
    fn zero_cap_terminates_the_first_access() {
        let (mmu, io) = mmu(0);
        // no consumer needed: the entry check fires before the slot is used
        assert_eq!(mmu.memory_access(0, 0, false), None);
        assert!(io.shutdown_requested());
        assert_eq!(mmu.requests(), 0);
    }

    #[test]
    fn producers_are_serialized_through_the_slot() {
        let (mmu, _io) = mmu(100);
        let mmu = &mmu;
        thread::scope(|scope| {
            scope.spawn(move || {
                while let Some(request) = mmu.wait_for_request() {
                    mmu.hits.fetch_add(1, Ordering::Relaxed);
                    mmu.complete(request.vaddr * 2);
                }
            });
            let workers: Vec<_> = (0..4u32)
                .map(|worker| {
                    scope.spawn(move || {
                        for i in 0..10u32 {
                            let vaddr = worker * 100 + i;
                            assert_eq!(mmu.memory_access(0, vaddr, false), Some(vaddr * 2));
                        }
                    })
                })
                .collect();
            for worker in workers {
                worker.join().unwrap();
            }
            assert_eq!(mmu.requests(), 40);
            // unpark the consumer
            mmu.should_exit.store(true, Ordering::SeqCst);
            let _slot = mmu.slot.lock().unwrap();
            mmu.slot_cv.notify_all();
        });
    }
}
