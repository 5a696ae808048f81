/// Per-process log sinks.
///
/// Every simulated process gets its own `PROC_%02d.log` file. The process
/// thread, the MMU translation loop and the I/O device all append to it, so
/// the writer sits behind a mutex. Lines are best-effort: a failed write is
/// dropped rather than tearing down the simulation.

use std::fs::File;
use std::io::{self, LineWriter, Write};
use std::path::Path;
use std::sync::Mutex;

pub struct ProcessLog {
    writer: Mutex<LineWriter<File>>,
}

impl ProcessLog {
    /// Create (truncating) the log file for process `pid` under `dir`.
    pub fn create(dir: &Path, pid: usize) -> io::Result<Self> {
        let file = File::create(dir.join(format!("PROC_{pid:02}.log")))?;
        Ok(Self {
            writer: Mutex::new(LineWriter::new(file)),
        })
    }

    /// Append one line (the text may itself contain newlines).
    pub fn line(&self, text: impl AsRef<str>) {
        let mut writer = self.writer.lock().unwrap();
        let _ = writeln!(writer, "{}", text.as_ref());
    }
}
