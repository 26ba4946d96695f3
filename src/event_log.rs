use crate::prelude::*;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// Append-only text log of notable events: start, stop and every failed
/// meter reading.
///
/// Each entry is `<timestamp>  <message>`, optionally followed by one line of
/// trace detail.
#[derive(Debug, Clone)]
pub struct EventLog {
    file: Arc<Mutex<std::fs::File>>,
    path: String,
}

impl EventLog {
    pub fn new(path: &str) -> Result<Self> {
        info!("Opening event log at {}", path);

        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| crate::file_error_with_source!(err, "cannot open event log {}", path))?;

        Ok(Self {
            file: Arc::new(Mutex::new(file)),
            path: path.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn append(&self, message: &str, trace: Option<&str>) -> Result<()> {
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT);

        let mut entry = format!("{}  {}\n", timestamp, message);
        if let Some(trace) = trace {
            entry.push_str(trace);
            entry.push('\n');
        }

        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow!("Failed to lock event log"))?;

        if let Err(err) = file.write_all(entry.as_bytes()).and_then(|_| file.flush()) {
            error!("Failed to write to event log {}: {}", self.path, err);
            return Err(err.into());
        }

        Ok(())
    }
}
