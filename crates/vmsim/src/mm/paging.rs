/// Shared paging state and the Enhanced Second-Chance replacement policy.
///
/// `PagingState` bundles everything the replacement policy mutates: the
/// per-process page tables, the frame arena with its free/used lists, and
/// the resident-page list whose FIFO order is the replacement-scan order.
/// It is guarded by a single mutex and mutated only by the MMU translation
/// loop, so the transitions below are plain single-threaded code.
///
/// `access` is a pure state transition: it never logs and never touches
/// statistics. Everything an observer needs (write-backs, evictions, frame
/// assignments, in the order they happened) comes back as `PageEvent`s, and
/// the caller decides whether the access counts toward the hit/fault
/// statistics. That is what lets anticipatory touches share the exact same
/// path as counted accesses.

use std::collections::VecDeque;

use super::frame::FrameTable;
use super::page::{AddressLayout, Page};

/// One entry of the resident-page list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResidentPage {
    pub procnum: usize,
    pub page: u32,
}

/// Observable side effect of a page access, in occurrence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// A dirty page was written back during the replacement scan
    WriteBack { procnum: usize, page: u32 },
    /// The chosen victim was detached from its frame
    Evicted { procnum: usize, page: u32, frame: u32 },
    /// The faulting page was attached to a frame
    Assigned { page: u32, frame: u32 },
}

/// Result of a single page access.
#[derive(Debug)]
pub struct AccessOutcome {
    /// True when the page was already resident
    pub hit: bool,
    /// Frame serving the page after the access
    pub frame: u32,
    pub events: Vec<PageEvent>,
}

pub struct PagingState {
    frames: FrameTable,
    page_tables: Vec<Vec<Page>>,
    resident: VecDeque<ResidentPage>,
}

impl PagingState {
    /// Build the page tables (`page_counts[i]` pages for process i) and
    /// partition RAM into `max_frames` free frames in id order.
    pub fn new(layout: AddressLayout, max_frames: u32, page_counts: &[u32]) -> Self {
        let page_tables = page_counts
            .iter()
            .map(|&count| (0..count).map(Page::new).collect())
            .collect();
        Self {
            frames: FrameTable::new(max_frames, layout.page_size),
            page_tables,
            resident: VecDeque::new(),
        }
    }

    pub fn frames(&self) -> &FrameTable {
        &self.frames
    }

    pub fn pages(&self, procnum: usize) -> &[Page] {
        &self.page_tables[procnum]
    }

    pub fn resident_len(&self) -> usize {
        self.resident.len()
    }

    /// Touch `page` of process `procnum`, paging it in if needed.
    ///
    /// Hit: the referenced bit is set and the backing frame returned.
    /// Fault with a free frame: pure demand paging, the free-list head is
    /// assigned. Fault with no free frame: the resident list is scanned in
    /// FIFO order, cycling until a victim with neither the referenced nor
    /// the dirty bit is found; dirty pages are written back (both bits
    /// cleared), referenced pages get their second chance (bit cleared).
    /// The victim chosen by the scan is recorded and exactly that entry is
    /// removed. Re-admitted pages always join the resident tail.
    pub fn access(&mut self, procnum: usize, page: u32) -> AccessOutcome {
        let mut events = Vec::new();

        let entry = &mut self.page_tables[procnum][page as usize];
        if let (true, Some(frame)) = (entry.is_present(), entry.frame_id) {
            entry.set_referenced();
            debug_assert!(self.frames.get(frame).valid);
            return AccessOutcome {
                hit: true,
                frame,
                events,
            };
        }

        if let Some(frame) = self.frames.allocate() {
            // pure demand paging off the free list
            self.frames.get_mut(frame).owner = Some((procnum, page));
            self.page_tables[procnum][page as usize].assign_frame(frame);
            self.resident.push_back(ResidentPage { procnum, page });
            events.push(PageEvent::Assigned { page, frame });
            return AccessOutcome {
                hit: false,
                frame,
                events,
            };
        }

        // No free frame: enhanced second-chance scan over the resident FIFO.
        debug_assert!(!self.resident.is_empty());
        let victim_index = loop {
            let mut chosen = None;
            for index in 0..self.resident.len() {
                let ResidentPage { procnum: p, page: q } = self.resident[index];
                let candidate = &mut self.page_tables[p][q as usize];
                if candidate.is_dirty() {
                    candidate.clear_dirty();
                    candidate.clear_referenced();
                    events.push(PageEvent::WriteBack { procnum: p, page: q });
                    continue;
                }
                if !candidate.is_referenced() {
                    chosen = Some(index);
                    break;
                }
                candidate.clear_referenced();
            }
            if let Some(index) = chosen {
                break index;
            }
        };

        let Some(ResidentPage {
            procnum: victim_proc,
            page: victim_page,
        }) = self.resident.remove(victim_index)
        else {
            unreachable!("victim index points into the resident list");
        };
        let frame = match self.page_tables[victim_proc][victim_page as usize].evict() {
            Some(frame) => frame,
            None => unreachable!("resident page without a backing frame"),
        };
        events.push(PageEvent::Evicted {
            procnum: victim_proc,
            page: victim_page,
            frame,
        });

        let slot = self.frames.get_mut(frame);
        slot.owner = Some((procnum, page));
        self.frames.reuse(frame);
        self.page_tables[procnum][page as usize].assign_frame(frame);
        self.resident.push_back(ResidentPage { procnum, page });
        events.push(PageEvent::Assigned { page, frame });

        AccessOutcome {
            hit: false,
            frame,
            events,
        }
    }

    /// Mark `page` of process `procnum` dirty (write access).
    pub fn set_dirty(&mut self, procnum: usize, page: u32) {
        self.page_tables[procnum][page as usize].set_dirty();
    }

    /// Check the structural invariants of the paging state. Panics on
    /// violation; meant for tests and debugging, cheap enough to call after
    /// every transition.
    pub fn assert_invariants(&self) {
        assert_eq!(
            self.frames.free_len() + self.frames.used_len(),
            self.frames.total(),
            "free and used lists must partition the frame arena"
        );
        for id in self.frames.free_ids() {
            assert!(!self.frames.get(id).valid, "free frame {id} marked valid");
        }
        for id in self.frames.used_ids() {
            assert!(self.frames.get(id).valid, "used frame {id} marked invalid");
        }

        let present: usize = self
            .page_tables
            .iter()
            .map(|table| table.iter().filter(|page| page.is_present()).count())
            .sum();
        assert_eq!(
            self.resident.len(),
            present,
            "resident list must have one entry per present page"
        );

        for &ResidentPage { procnum, page } in &self.resident {
            let entry = &self.page_tables[procnum][page as usize];
            assert!(entry.is_present(), "resident page ({procnum},{page}) not present");
            let frame_id = entry.frame_id.expect("present page without a frame");
            let frame = self.frames.get(frame_id);
            assert!(frame.valid);
            assert_eq!(
                frame.owner,
                Some((procnum, page)),
                "frame {frame_id} back-link does not match its page"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::page::AddressLayout;
    use proptest::prelude::*;

    fn state(frames: u32, page_counts: &[u32]) -> PagingState {
        PagingState::new(AddressLayout::new(4096), frames, page_counts)
    }

    fn run_reference(frames: u32, pages: u32, sequence: &[u32]) -> (u32, u32) {
        let mut st = state(frames, &[pages]);
        let mut hits = 0;
        let mut faults = 0;
        for &page in sequence {
            if st.access(0, page).hit {
                hits += 1;
            } else {
                faults += 1;
            }
            st.assert_invariants();
        }
        (hits, faults)
    }

    #[test]
    fn first_access_faults_then_hits() {
        let mut st = state(1, &[1]);
        let first = st.access(0, 0);
        assert!(!first.hit);
        assert_eq!(first.frame, 0);
        assert_eq!(
            first.events,
            vec![PageEvent::Assigned { page: 0, frame: 0 }]
        );
        assert_eq!(st.frames().free_len(), 0);
        for _ in 0..4 {
            let outcome = st.access(0, 0);
            assert!(outcome.hit);
            assert_eq!(outcome.frame, 0);
            assert!(outcome.events.is_empty());
        }
        st.assert_invariants();
    }

    #[test]
    fn eviction_on_a_full_frame_table() {
        // Two frames, reference sequence 1 2 3 1 over a four-page table:
        // pages 1 and 2 fill the frames, page 3 evicts the FIFO-oldest
        // unreferenced page, the final 1 evicts again.
        let mut st = state(2, &[4]);
        let (hits, faults) = {
            let mut hits = 0;
            let mut faults = 0;
            for page in [1, 2, 3, 1] {
                if st.access(0, page).hit {
                    hits += 1;
                } else {
                    faults += 1;
                }
                st.assert_invariants();
            }
            (hits, faults)
        };
        assert_eq!(faults, 4);
        assert_eq!(hits, 0);
        assert_eq!(st.resident_len(), 2);
        assert_eq!(st.frames().free_len(), 0);
    }

    #[test]
    fn eviction_resets_the_victim_page() {
        let mut st = state(1, &[2]);
        st.access(0, 0);
        let outcome = st.access(0, 1);
        assert_eq!(
            outcome.events,
            vec![
                PageEvent::Evicted { procnum: 0, page: 0, frame: 0 },
                PageEvent::Assigned { page: 1, frame: 0 },
            ]
        );
        let victim = &st.pages(0)[0];
        assert!(!victim.is_present());
        assert!(!victim.is_referenced());
        assert!(!victim.is_dirty());
        assert_eq!(victim.frame_id, None);
        st.assert_invariants();
    }

    #[test]
    fn dirty_victim_is_written_back_before_eviction() {
        let mut st = state(1, &[2]);
        st.access(0, 0);
        st.set_dirty(0, 0);
        let outcome = st.access(0, 1);
        assert_eq!(
            outcome.events,
            vec![
                PageEvent::WriteBack { procnum: 0, page: 0 },
                PageEvent::Evicted { procnum: 0, page: 0, frame: 0 },
                PageEvent::Assigned { page: 1, frame: 0 },
            ]
        );
        assert!(!st.pages(0)[0].is_dirty());
        st.assert_invariants();
    }

    #[test]
    fn referenced_pages_get_a_second_chance() {
        // All resident pages referenced: the first pass demotes them all,
        // the second pass takes the FIFO-oldest.
        let mut st = state(2, &[3]);
        st.access(0, 0);
        st.access(0, 1);
        let outcome = st.access(0, 2);
        assert_eq!(
            outcome.events,
            vec![
                PageEvent::Evicted { procnum: 0, page: 0, frame: 0 },
                PageEvent::Assigned { page: 2, frame: 0 },
            ]
        );
        // the survivor lost its referenced bit during the first pass
        assert!(!st.pages(0)[1].is_referenced());
        st.assert_invariants();
    }

    #[test]
    fn classic_reference_string_fault_counts() {
        let sequence = [1, 2, 3, 4, 1, 2, 5, 1, 2, 3, 4, 5];
        let (hits, faults) = run_reference(3, 6, &sequence);
        assert_eq!(faults, 9);
        assert_eq!(hits, 3);
        let (hits, faults) = run_reference(4, 6, &sequence);
        assert_eq!(faults, 10);
        assert_eq!(hits, 2);
    }

    #[test]
    fn replacement_spans_processes_in_resident_order() {
        let mut st = state(2, &[2, 2]);
        st.access(0, 0);
        st.access(1, 0);
        // both referenced; process 0's page entered first and is demoted
        // first, then evicted on the second pass
        let outcome = st.access(0, 1);
        assert_eq!(
            outcome.events,
            vec![
                PageEvent::Evicted { procnum: 0, page: 0, frame: 0 },
                PageEvent::Assigned { page: 1, frame: 0 },
            ]
        );
        assert!(st.pages(1)[0].is_present());
        st.assert_invariants();
    }

    #[test]
    fn reused_frames_move_to_the_used_tail() {
        let mut st = state(2, &[4]);
        st.access(0, 0);
        st.access(0, 1);
        st.access(0, 2); // evicts page 0 from frame 0
        assert_eq!(st.frames().used_ids().collect::<Vec<_>>(), vec![1, 0]);
    }

    proptest! {
        #[test]
        fn random_workloads_preserve_the_invariants(
            ops in proptest::collection::vec((0usize..2, 0u32..8, any::<bool>()), 1..200)
        ) {
            let mut st = state(4, &[8, 8]);
            for (procnum, page, write) in ops {
                st.access(procnum, page);
                if write {
                    st.set_dirty(procnum, page);
                }
                st.assert_invariants();
            }
        }
    }
}
