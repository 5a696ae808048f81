/// Simulated block I/O device.
///
/// Processes enqueue read requests into a FIFO; a single consumer thread
/// serves them one at a time, sleeping a bounded-random interval per request
/// and waking the originating process. Shutdown is cooperative: once
/// announced, no new request is accepted, but everything already queued is
/// drained before the consumer stops.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::Duration;

use log::info;
use rand::Rng;

use crate::process::ProcessEntry;

/// One queued request.
#[derive(Debug, Clone, Copy)]
pub struct IoRequest {
    /// PID of the requesting process
    pub pid: usize,
    /// Index of the requesting process in the process table
    pub procnum: usize,
}

pub struct IoDevice {
    tmin_ms: u64,
    tmax_ms: u64,
    /// FIFO of pending requests; the condvar signals non-empty (and shutdown)
    queue: Mutex<VecDeque<IoRequest>>,
    nonempty: Condvar,
    /// Request gate: held across the shutdown check and the enqueue so a
    /// late `read` cannot race a late shutdown announcement
    gate: Mutex<()>,
    shutdown: AtomicBool,
    /// Requests served over the device lifetime
    served: AtomicU32,
}

impl IoDevice {
    /// Service time is drawn uniformly from `[tmin_ms, tmax_ms]`. A maximum
    /// below the minimum is clamped to the minimum (degenerate but legal).
    pub fn new(tmin_ms: u64, tmax_ms: u64) -> Self {
        let tmax_ms = tmax_ms.max(tmin_ms);
        Self {
            tmin_ms,
            tmax_ms,
            queue: Mutex::new(VecDeque::new()),
            nonempty: Condvar::new(),
            gate: Mutex::new(()),
            shutdown: AtomicBool::new(false),
            served: AtomicU32::new(0),
        }
    }

    pub fn bounds(&self) -> (u64, u64) {
        (self.tmin_ms, self.tmax_ms)
    }

    pub fn served(&self) -> u32 {
        self.served.load(Ordering::Relaxed)
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Enqueue a read request for `proc`. Returns false (queueing nothing)
    /// once shutdown was announced; the caller should then terminate.
    pub fn read(&self, proc: &ProcessEntry) -> bool {
        let _gate = self.gate.lock().unwrap();
        if self.shutdown.load(Ordering::SeqCst) {
            return false;
        }
        let mut queue = self.queue.lock().unwrap();
        queue.push_back(IoRequest {
            pid: proc.pid,
            procnum: proc.pid,
        });
        proc.log.line("\nI/O device request enqueued");
        self.nonempty.notify_one();
        true
    }

    /// Announce shutdown and wake the consumer. Idempotent.
    pub fn request_shutdown(&self) {
        let _gate = self.gate.lock().unwrap();
        self.shutdown.store(true, Ordering::SeqCst);
        let _queue = self.queue.lock().unwrap();
        self.nonempty.notify_all();
    }
}

/// Consumer loop, run on the I/O device thread.
pub fn service_loop(dev: &IoDevice, procs: &[ProcessEntry]) {
    info!(
        "I/O device thread started [tmin={} ms, tmax={} ms]",
        dev.tmin_ms, dev.tmax_ms
    );
    let mut rng = rand::thread_rng();
    loop {
        let request = {
            let mut queue = dev.queue.lock().unwrap();
            while queue.is_empty() && !dev.shutdown.load(Ordering::SeqCst) {
                queue = dev.nonempty.wait(queue).unwrap();
            }
            match queue.pop_front() {
                Some(request) => request,
                // shutdown announced and the queue fully drained
                None => break,
            }
        };

        let delay_ms = rng.gen_range(dev.tmin_ms..=dev.tmax_ms);
        thread::sleep(Duration::from_millis(delay_ms));

        let proc = &procs[request.procnum];
        proc.log.line(format!("Request served in {delay_ms} ms"));
        dev.served.fetch_add(1, Ordering::Relaxed);
        proc.stats.io_requests.fetch_add(1, Ordering::Relaxed);
        proc.stats.io_time_ms.fetch_add(delay_ms, Ordering::Relaxed);
        proc.io_wait.signal();
    }
    info!("I/O device thread terminated");
}
