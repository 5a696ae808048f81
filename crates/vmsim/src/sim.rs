//! Simulation context and driver.
//!
//! `SimContext` bundles everything the actors share: the resolved
//! configuration, the MMU, the I/O device, the mutex-guarded paging state
//! and the process table. It is built once, shared immutably, and the
//! guarded substructures carry their own synchronization.
//!
//! The driver spawns the MMU thread, the I/O thread and one thread per
//! process, then tears everything down in order: join the MMU (it exits when
//! the access cap is announced), shut down and join the I/O device, signal
//! every process's I/O wait slot so nobody stays parked, join the processes,
//! and render the report.

use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::{Context, Result};
use log::info;
use rand::Rng;

use crate::config::SimConfig;
use crate::io_device::{self, IoDevice};
use crate::mm::mmu::{self, Mmu};
use crate::mm::page::ADDRESS_BITS;
use crate::mm::paging::PagingState;
use crate::process::{self, ProcessEntry};
use crate::proclog::ProcessLog;
use crate::report::{ProcessRow, SimReport};

pub struct SimContext {
    pub cfg: SimConfig,
    pub mmu: Mmu,
    pub io: Arc<IoDevice>,
    pub paging: Mutex<PagingState>,
    pub procs: Vec<ProcessEntry>,
}

pub struct Simulation {
    ctx: Arc<SimContext>,
}

impl Simulation {
    /// Build the whole simulation state: page tables, frame lists, log
    /// files, devices. No thread is started yet.
    pub fn new(cfg: SimConfig) -> Result<Self> {
        let layout = cfg.layout();
        let max_frames = cfg.max_frames();
        info!("simulator initialized with {ADDRESS_BITS}-bit addresses");

        // the frame/process ratio decides whether prefetching neighbours
        // is worth anything at all
        let anticipatory = cfg.anticipatory
            && cfg.reference_string.is_none()
            && (max_frames as f64 / cfg.processes as f64) >= 3.0;

        let mut rng = rand::thread_rng();
        let full_allocation = cfg.all_memory || cfg.reference_string.is_some();
        let mut procs = Vec::with_capacity(cfg.processes);
        let mut page_counts = Vec::with_capacity(cfg.processes);
        for pid in 0..cfg.processes {
            let page_count = if full_allocation {
                layout.max_page_count()
            } else {
                rng.gen_range(1..=layout.max_page_count())
            };
            let probability = match &cfg.process_probabilities {
                Some(list) => list[pid],
                None => cfg.mem_probability,
            };
            let log = ProcessLog::create(&cfg.log_dir, pid)
                .with_context(|| format!("cannot create the log file of process {pid}"))?;
            procs.push(ProcessEntry::new(pid, page_count, probability, log));
            page_counts.push(page_count);
        }

        let paging = Mutex::new(PagingState::new(layout, max_frames, &page_counts));
        let io = Arc::new(IoDevice::new(cfg.tmin_ms, cfg.tmax_ms));
        let mmu = Mmu::new(layout, cfg.max_access, anticipatory, Arc::clone(&io));

        Ok(Self {
            ctx: Arc::new(SimContext {
                cfg,
                mmu,
                io,
                paging,
                procs,
            }),
        })
    }

    pub fn context(&self) -> &Arc<SimContext> {
        &self.ctx
    }

    /// Run the simulation to completion and return the aggregate report.
    pub fn run(&self) -> SimReport {
        let ctx = &self.ctx;

        let mmu_thread = {
            let ctx = Arc::clone(ctx);
            thread::spawn(move || {
                mmu::translation_loop(&ctx.mmu, &ctx.paging, &ctx.procs, ctx.cfg.debug)
            })
        };
        let io_thread = {
            let ctx = Arc::clone(ctx);
            thread::spawn(move || io_device::service_loop(&ctx.io, &ctx.procs))
        };
        let proc_threads: Vec<_> = (0..ctx.procs.len())
            .map(|procnum| {
                let ctx = Arc::clone(ctx);
                thread::spawn(move || process::workload_loop(&ctx, procnum))
            })
            .collect();
        info!(
            "process threads started [num={}, oper={}, locality={}%]",
            ctx.procs.len(),
            if ctx.cfg.write_enabled { "RW" } else { "R" },
            ctx.cfg.temporal_locality
        );

        // the MMU exits once the access cap has been announced
        mmu_thread.join().expect("MMU thread panicked");
        // idempotent: the announcing access already requested this
        ctx.io.request_shutdown();
        io_thread.join().expect("I/O device thread panicked");
        // release any process still parked on its I/O wait slot
        for proc in &ctx.procs {
            proc.io_wait.signal();
        }
        for handle in proc_threads {
            handle.join().expect("process thread panicked");
        }

        self.report()
    }

    fn report(&self) -> SimReport {
        let ctx = &self.ctx;
        let rows = ctx
            .procs
            .iter()
            .map(|proc| ProcessRow {
                pid: proc.pid,
                pages: proc.page_count,
                probability: proc.mem_probability,
                stats: proc.stats.snapshot(),
            })
            .collect();
        SimReport {
            rows,
            total_access: ctx.cfg.max_access,
            io_served: ctx.io.served(),
            page_size: ctx.cfg.frame_size,
        }
    }
}
