/// Statistics accounting and the final aggregate report.
///
/// Counters are atomics: the MMU translation loop bumps memory accesses and
/// faults, the I/O device bumps request counts and service time, and the
/// driver snapshots everything once the threads are joined.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Per-process counters, updated by the MMU and I/O threads.
#[derive(Debug, Default)]
pub struct ProcStats {
    /// Memory accesses served for this process
    pub mem_accesses: AtomicU32,
    /// Page faults charged to this process
    pub page_faults: AtomicU32,
    /// I/O requests served for this process
    pub io_requests: AtomicU32,
    /// Total I/O service time, ms
    pub io_time_ms: AtomicU64,
}

impl ProcStats {
    pub fn snapshot(&self) -> ProcStatsSnapshot {
        ProcStatsSnapshot {
            mem_accesses: self.mem_accesses.load(Ordering::Relaxed),
            page_faults: self.page_faults.load(Ordering::Relaxed),
            io_requests: self.io_requests.load(Ordering::Relaxed),
            io_time_ms: self.io_time_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcStatsSnapshot {
    pub mem_accesses: u32,
    pub page_faults: u32,
    pub io_requests: u32,
    pub io_time_ms: u64,
}

/// One row of the final table.
#[derive(Debug, Clone)]
pub struct ProcessRow {
    pub pid: usize,
    pub pages: u32,
    /// Memory-access probability, percent
    pub probability: u8,
    pub stats: ProcStatsSnapshot,
}

impl ProcessRow {
    pub fn fault_pct(&self) -> f64 {
        if self.stats.mem_accesses == 0 {
            0.0
        } else {
            f64::from(self.stats.page_faults) / f64::from(self.stats.mem_accesses) * 100.0
        }
    }

    pub fn mean_io_ms(&self) -> f64 {
        if self.stats.io_requests == 0 {
            0.0
        } else {
            self.stats.io_time_ms as f64 / f64::from(self.stats.io_requests)
        }
    }
}

/// Final aggregate report, rendered as the stdout statistics table.
#[derive(Debug, Clone)]
pub struct SimReport {
    pub rows: Vec<ProcessRow>,
    /// The configured access cap
    pub total_access: u32,
    /// Requests served by the I/O device
    pub io_served: u32,
    pub page_size: u32,
}

impl SimReport {
    pub fn total_faults(&self) -> u32 {
        self.rows.iter().map(|row| row.stats.page_faults).sum()
    }

    pub fn total_mem_accesses(&self) -> u32 {
        self.rows.iter().map(|row| row.stats.mem_accesses).sum()
    }

    pub fn allocated_pages(&self) -> u64 {
        self.rows.iter().map(|row| u64::from(row.pages)).sum()
    }

    fn global_fault_pct(&self) -> f64 {
        if self.total_access == 0 {
            0.0
        } else {
            f64::from(self.total_faults()) / f64::from(self.total_access) * 100.0
        }
    }

    fn global_mean_io_ms(&self) -> f64 {
        if self.io_served == 0 {
            0.0
        } else {
            self.rows.iter().map(|row| row.stats.io_time_ms).sum::<u64>() as f64
                / f64::from(self.io_served)
        }
    }
}

impl fmt::Display for SimReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "+==================================================================+")?;
        writeln!(f, "|                       S T A T I S T I C S                        |")?;
        writeln!(f, "+==================================================================+")?;
        writeln!(f, "| PID | NUM  | PROB | MEMORY  |  PAGE   | FAULT |   I/O   |  MEAN  |")?;
        writeln!(f, "|     | PAG  |      | ACCESS  |  FAULT  |  (%)  |  COUNT  |  (ms)  |")?;
        writeln!(f, "+-----+------+------+---------+---------+-------+---------+--------+")?;
        for row in &self.rows {
            writeln!(
                f,
                "| {:>3} | {:>4} | {:>3}% | {:>7} | {:>7} | {:>4.0}% | {:>7} | {:>6.0} |",
                row.pid,
                row.pages,
                row.probability,
                row.stats.mem_accesses,
                row.stats.page_faults,
                row.fault_pct(),
                row.stats.io_requests,
                row.mean_io_ms(),
            )?;
        }
        writeln!(f, "+-----+------+------+---------+---------+-------+---------+--------+")?;
        writeln!(
            f,
            "                    | {:>7} | {:>7} | {:>4.0}% | {:>7} | {:>6.0} |",
            self.total_access,
            self.total_faults(),
            self.global_fault_pct(),
            self.io_served,
            self.global_mean_io_ms(),
        )?;
        writeln!(f, "                    +---------+---------+-------+---------+--------+")?;
        writeln!(f)?;
        let pages = self.allocated_pages();
        let bytes = pages * u64::from(self.page_size);
        writeln!(f, "Allocated virtual pages   = {pages:>12}")?;
        writeln!(
            f,
            "Allocated virtual memory  = {:>12} (~ {:.1} MiB)",
            bytes,
            bytes as f64 / (1024.0 * 1024.0)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(accesses: u32, faults: u32, io: u32, io_ms: u64) -> ProcessRow {
        ProcessRow {
            pid: 0,
            pages: 16,
            probability: 80,
            stats: ProcStatsSnapshot {
                mem_accesses: accesses,
                page_faults: faults,
                io_requests: io,
                io_time_ms: io_ms,
            },
        }
    }

    #[test]
    fn percentages_and_means() {
        let r = row(50, 10, 4, 100);
        assert!((r.fault_pct() - 20.0).abs() < f64::EPSILON);
        assert!((r.mean_io_ms() - 25.0).abs() < f64::EPSILON);
        let idle = row(0, 0, 0, 0);
        assert_eq!(idle.fault_pct(), 0.0);
        assert_eq!(idle.mean_io_ms(), 0.0);
    }

    #[test]
    fn totals_sum_over_rows() {
        let report = SimReport {
            rows: vec![row(30, 5, 2, 40), row(20, 7, 1, 10)],
            total_access: 50,
            io_served: 3,
            page_size: 4096,
        };
        assert_eq!(report.total_faults(), 12);
        assert_eq!(report.total_mem_accesses(), 50);
        assert_eq!(report.allocated_pages(), 32);
        let rendered = report.to_string();
        assert!(rendered.contains("S T A T I S T I C S"));
        assert!(rendered.contains("Allocated virtual pages"));
    }

    #[test]
    fn zero_cap_report_renders_without_dividing_by_zero() {
        let report = SimReport {
            rows: vec![row(0, 0, 0, 0)],
            total_access: 0,
            io_served: 0,
            page_size: 4096,
        };
        assert!(report.to_string().contains("0%"));
    }
}
