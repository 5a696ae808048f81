//! Command line surface and validated simulation parameters.
//!
//! `Cli` is the raw clap-parsed argument set; `SimConfig::from_cli` checks
//! the numeric ranges, parses the colon-separated lists and applies the
//! reference-string forcing rules, all before any thread starts.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use thiserror::Error;

use crate::mm::page::{AddressLayout, ADDRESS_BITS};

const EXAMPLES: &str = "\
Examples:
  - Run 7 concurrent processes and perform 10 memory accesses
      vmsim --memory-read=10 --processes=7
  - Run 3 processes with custom I/O device delays
      vmsim --processes=3 --Tmin=2 --Tmax=30
  - Set the probability of a memory access over an I/O request
      vmsim --probability=0.3
  - Give every process its own probability
      vmsim --probabilities=0.3:0.2:0.78:0.93:0.8
  - Measure page faults over a fixed reference string
      vmsim --reference=1:2:3:4:1:2:5:1:2:3:4:5";

#[derive(Debug, Parser)]
#[command(
    name = "vmsim",
    version,
    about = "Paged virtual-memory simulator (demand paging, enhanced second-chance)",
    after_help = EXAMPLES
)]
pub struct Cli {
    /// Disable anticipatory paging
    #[arg(short = 'a', long = "anticipatory")]
    pub no_anticipatory: bool,

    /// Increase log-file verbosity (repeatable)
    #[arg(short = 'd', long = "debug", action = ArgAction::Count)]
    pub debug: u8,

    /// Temporal-locality percentage (0-100)
    #[arg(short = 'L', long = "locality", default_value_t = 30)]
    pub locality: u32,

    /// Colon-separated per-process memory-access probabilities (0.0-1.0 each)
    #[arg(short = 'l', long = "probabilities")]
    pub probabilities: Option<String>,

    /// Force every process to allocate the whole virtual address space
    #[arg(short = 'M', long = "all-memory")]
    pub all_memory: bool,

    /// Total number of memory accesses before the simulation stops
    #[arg(short = 'm', long = "memory-read", default_value_t = 50)]
    pub memory_read: u32,

    /// Number of concurrent processes
    #[arg(short = 'p', long = "processes", default_value_t = 5)]
    pub processes: usize,

    /// Global probability of a memory access over an I/O request (0.01-1.0)
    #[arg(short = 'P', long = "probability", default_value_t = 0.8)]
    pub probability: f64,

    /// Colon-separated reference string of page indices
    #[arg(short = 'r', long = "reference")]
    pub reference: Option<String>,

    /// Main-memory size in bytes
    #[arg(short = 'R', long = "ram-size", default_value_t = 1 << ADDRESS_BITS)]
    pub ram_size: u32,

    /// Frame/page size in bytes (power of two)
    #[arg(short = 's', long = "frame-size", default_value_t = 4096)]
    pub frame_size: u32,

    /// Minimum I/O device service time, ms
    #[arg(short = 't', long = "Tmin", default_value_t = 1)]
    pub tmin: u64,

    /// Maximum I/O device service time, ms
    #[arg(short = 'T', long = "Tmax", default_value_t = 100)]
    pub tmax: u64,

    /// Allow write accesses to memory
    #[arg(short = 'w', long = "write-enabled")]
    pub write_enabled: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("temporal locality must be between 0 and 100, got {0}")]
    LocalityOutOfRange(u32),
    #[error("memory-access probability must be between 0.01 and 1.0, got {0}")]
    ProbabilityOutOfRange(f64),
    #[error("the number of processes must be positive")]
    NoProcesses,
    #[error("RAM size must not exceed {max} bytes, got {got}")]
    RamTooLarge { got: u32, max: u32 },
    #[error("frame size must be a power of two, got {0}")]
    FrameSizeNotPowerOfTwo(u32),
    #[error("frame size ({frame}) must not exceed RAM size ({ram})")]
    FrameLargerThanRam { frame: u32, ram: u32 },
    #[error("invalid probability list entry {0:?}")]
    BadProbabilityEntry(String),
    #[error("invalid reference string entry {0:?}")]
    BadReferenceEntry(String),
    #[error("reference page {page} is outside the {max}-page address space")]
    ReferenceOutOfRange { page: u32, max: u32 },
}

/// Validated, fully resolved simulation parameters.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub ram_size: u32,
    pub frame_size: u32,
    /// Access cap; zero terminates the very first access
    pub max_access: u32,
    pub processes: usize,
    /// Global memory-access probability, percent
    pub mem_probability: u8,
    /// Per-process overrides of `mem_probability`, percent
    pub process_probabilities: Option<Vec<u8>>,
    /// Temporal-locality probability, percent
    pub temporal_locality: u8,
    pub write_enabled: bool,
    pub all_memory: bool,
    pub anticipatory: bool,
    pub tmin_ms: u64,
    pub tmax_ms: u64,
    pub reference_string: Option<Vec<u32>>,
    pub debug: u8,
    /// Directory receiving the per-process log files
    pub log_dir: PathBuf,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            ram_size: 1 << ADDRESS_BITS,
            frame_size: 4096,
            max_access: 50,
            processes: 5,
            mem_probability: 80,
            process_probabilities: None,
            temporal_locality: 30,
            write_enabled: false,
            all_memory: false,
            anticipatory: true,
            tmin_ms: 1,
            tmax_ms: 100,
            reference_string: None,
            debug: 0,
            log_dir: PathBuf::from("."),
        }
    }
}

impl SimConfig {
    pub fn layout(&self) -> AddressLayout {
        AddressLayout::new(self.frame_size)
    }

    pub fn max_frames(&self) -> u32 {
        self.ram_size / self.frame_size
    }

    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        if cli.locality > 100 {
            return Err(ConfigError::LocalityOutOfRange(cli.locality));
        }
        if !(0.01..=1.0).contains(&cli.probability) {
            return Err(ConfigError::ProbabilityOutOfRange(cli.probability));
        }
        if cli.processes == 0 {
            return Err(ConfigError::NoProcesses);
        }
        if cli.ram_size > 1 << ADDRESS_BITS {
            return Err(ConfigError::RamTooLarge {
                got: cli.ram_size,
                max: 1 << ADDRESS_BITS,
            });
        }
        if !cli.frame_size.is_power_of_two() {
            return Err(ConfigError::FrameSizeNotPowerOfTwo(cli.frame_size));
        }
        if cli.frame_size > cli.ram_size {
            return Err(ConfigError::FrameLargerThanRam {
                frame: cli.frame_size,
                ram: cli.ram_size,
            });
        }

        let layout = AddressLayout::new(cli.frame_size);
        let mem_probability = (cli.probability * 100.0).round() as u8;

        let mut config = Self {
            ram_size: cli.ram_size,
            frame_size: cli.frame_size,
            max_access: cli.memory_read,
            processes: cli.processes,
            mem_probability,
            process_probabilities: None,
            temporal_locality: cli.locality as u8,
            write_enabled: cli.write_enabled,
            all_memory: cli.all_memory,
            anticipatory: !cli.no_anticipatory,
            tmin_ms: cli.tmin,
            tmax_ms: cli.tmax,
            reference_string: None,
            debug: cli.debug,
            log_dir: PathBuf::from("."),
        };

        if let Some(list) = cli.probabilities.as_deref() {
            config.process_probabilities = Some(parse_probability_list(
                list,
                cli.processes,
                mem_probability,
            )?);
        }

        if let Some(list) = cli.reference.as_deref() {
            let reference = parse_reference_string(list, layout.max_page_count())?;
            // reference mode: one read-only process walking the whole
            // address space, no anticipatory paging, cap = string length
            config.max_access = reference.len() as u32;
            config.processes = 1;
            config.mem_probability = 100;
            config.process_probabilities = None;
            config.write_enabled = false;
            config.all_memory = true;
            config.anticipatory = false;
            config.reference_string = Some(reference);
        }

        Ok(config)
    }
}

fn parse_probability_list(
    list: &str,
    processes: usize,
    default_pct: u8,
) -> Result<Vec<u8>, ConfigError> {
    let mut probabilities = vec![default_pct; processes];
    for (slot, entry) in probabilities
        .iter_mut()
        .zip(list.split(':').filter(|entry| !entry.is_empty()))
    {
        let value: f64 = entry
            .parse()
            .map_err(|_| ConfigError::BadProbabilityEntry(entry.to_string()))?;
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::BadProbabilityEntry(entry.to_string()));
        }
        *slot = (value * 100.0).round() as u8;
    }
    Ok(probabilities)
}

fn parse_reference_string(list: &str, max_pages: u32) -> Result<Vec<u32>, ConfigError> {
    let mut reference = Vec::new();
    for entry in list.split(':').filter(|entry| !entry.is_empty()) {
        let page: u32 = entry
            .parse()
            .map_err(|_| ConfigError::BadReferenceEntry(entry.to_string()))?;
        if page >= max_pages {
            return Err(ConfigError::ReferenceOutOfRange {
                page,
                max: max_pages,
            });
        }
        reference.push(page);
    }
    if reference.is_empty() {
        return Err(ConfigError::BadReferenceEntry(list.to_string()));
    }
    Ok(reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<SimConfig, ConfigError> {
        let mut argv = vec!["vmsim"];
        argv.extend_from_slice(args);
        SimConfig::from_cli(Cli::parse_from(argv))
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.ram_size, 1 << 20);
        assert_eq!(config.frame_size, 4096);
        assert_eq!(config.max_access, 50);
        assert_eq!(config.processes, 5);
        assert_eq!(config.mem_probability, 80);
        assert_eq!(config.temporal_locality, 30);
        assert!(config.anticipatory);
        assert!(!config.write_enabled);
        assert_eq!((config.tmin_ms, config.tmax_ms), (1, 100));
    }

    #[test]
    fn zero_cap_is_accepted() {
        let config = parse(&["--memory-read=0"]).unwrap();
        assert_eq!(config.max_access, 0);
    }

    #[test]
    fn range_violations_are_rejected() {
        assert!(matches!(
            parse(&["--locality=101"]),
            Err(ConfigError::LocalityOutOfRange(101))
        ));
        assert!(matches!(
            parse(&["--probability=0.005"]),
            Err(ConfigError::ProbabilityOutOfRange(_))
        ));
        assert!(matches!(
            parse(&["--probability=1.5"]),
            Err(ConfigError::ProbabilityOutOfRange(_))
        ));
        assert!(matches!(parse(&["--processes=0"]), Err(ConfigError::NoProcesses)));
        assert!(matches!(
            parse(&["--ram-size=2097152"]),
            Err(ConfigError::RamTooLarge { .. })
        ));
        assert!(matches!(
            parse(&["--frame-size=3000"]),
            Err(ConfigError::FrameSizeNotPowerOfTwo(3000))
        ));
        assert!(matches!(
            parse(&["--ram-size=2048", "--frame-size=4096"]),
            Err(ConfigError::FrameLargerThanRam { .. })
        ));
    }

    #[test]
    fn probability_list_pads_with_the_global_default() {
        let config = parse(&["--probabilities=0.3:0.2", "--probability=0.9"]).unwrap();
        assert_eq!(
            config.process_probabilities,
            Some(vec![30, 20, 90, 90, 90])
        );
    }

    #[test]
    fn bad_probability_entries_are_rejected() {
        assert!(matches!(
            parse(&["--probabilities=0.3:oops"]),
            Err(ConfigError::BadProbabilityEntry(_))
        ));
        assert!(matches!(
            parse(&["--probabilities=1.7"]),
            Err(ConfigError::BadProbabilityEntry(_))
        ));
    }

    #[test]
    fn reference_mode_forces_a_deterministic_single_process() {
        let config = parse(&["--reference=1:2:3:4:1:2:5:1:2:3:4:5"]).unwrap();
        assert_eq!(config.processes, 1);
        assert_eq!(config.max_access, 12);
        assert_eq!(config.mem_probability, 100);
        assert!(!config.write_enabled);
        assert!(config.all_memory);
        assert!(!config.anticipatory);
        assert_eq!(
            config.reference_string.as_deref(),
            Some(&[1, 2, 3, 4, 1, 2, 5, 1, 2, 3, 4, 5][..])
        );
    }

    #[test]
    fn reference_pages_must_fit_the_address_space() {
        // frame 4096 in a 20-bit space leaves 256 pages
        assert!(matches!(
            parse(&["--reference=1:2:300"]),
            Err(ConfigError::ReferenceOutOfRange { page: 300, max: 256 })
        ));
        assert!(matches!(
            parse(&["--reference=:"]),
            Err(ConfigError::BadReferenceEntry(_))
        ));
    }
}
