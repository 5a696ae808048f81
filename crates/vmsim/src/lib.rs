//! Paged virtual-memory simulator.
//!
//! Simulates demand paging over a 20-bit address space: N process threads
//! generate memory references, a single MMU thread translates them (running
//! enhanced second-chance replacement when memory is full), and an I/O
//! device thread serves asynchronous requests through a FIFO. Each process
//! writes a `PROC_%02d.log` trace; the run ends when the configured number
//! of memory accesses has been served and prints an aggregate statistics
//! table.

pub mod config;
pub mod io_device;
pub mod mm;
pub mod process;
pub mod proclog;
pub mod report;
pub mod sim;

pub use config::{Cli, ConfigError, SimConfig};
pub use io_device::IoDevice;
pub use mm::{AddressLayout, Mmu, PagingState, ADDRESS_BITS};
pub use process::ProcessEntry;
pub use report::SimReport;
pub use sim::{SimContext, Simulation};

pub fn setup_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
