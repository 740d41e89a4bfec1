//! Cross-process signal log
//!
//! Broadcasting appends one JSON line to `{dir}/signals.jsonl` under an
//! exclusive lock. Each process tails the file from where it last stopped and
//! republishes new lines on a local broadcast channel.
//!
//! The first line of the file is a header carrying a generation id. Once the
//! log grows past `max_bytes` the next broadcaster truncates it and writes a
//! fresh header before appending. A reader that sees a generation other than
//! the one its offset belongs to restarts just past the new header, however
//! long the file has grown since. Signals a reader had not caught up on before
//! the truncation are lost, which the protocol tolerates.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use eyre::{Context, Result, eyre};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use slotstore::{MIN_POLL_INTERVAL, WatcherGuard};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::types::Signal;
use super::{SignalChannel, SignalSubscription};
use crate::identity::InstanceId;

/// File name of the log inside the store directory
pub const SIGNAL_LOG_FILE: &str = "signals.jsonl";

/// Size past which the log is truncated on the next broadcast
pub const DEFAULT_MAX_LOG_BYTES: u64 = 64 * 1024;

/// First line of every log generation
#[derive(Debug, Serialize, Deserialize)]
struct LogHeader {
    generation: String,
}

/// Where this process stopped reading
#[derive(Debug, Default)]
struct ReadCursor {
    /// Generation the offset belongs to; `None` for a log without a header
    generation: Option<String>,
    offset: u64,
}

/// Signal channel shared by processes through an append-only file
pub struct FileSignalLog {
    path: PathBuf,
    max_bytes: u64,
    cursor: Mutex<ReadCursor>,
    tx: broadcast::Sender<Signal>,
}

/// Shared lock released on drop
struct Locked<'a> {
    file: &'a File,
}

impl Drop for Locked<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(self.file);
    }
}

/// Generation named by the first line, and that line's length
///
/// Reads from the current position, which must be the start of the file.
fn read_header(file: &File) -> Result<(Option<String>, u64)> {
    let mut line = Vec::new();
    BufReader::new(file)
        .read_until(b'\n', &mut line)
        .context("Failed to read signal log header")?;
    if line.last() != Some(&b'\n') {
        return Ok((None, 0));
    }
    match serde_json::from_slice::<LogHeader>(&line) {
        Ok(header) => Ok((Some(header.generation), line.len() as u64)),
        Err(_) => Ok((None, 0)),
    }
}

impl FileSignalLog {
    /// Open the log in `dir`, starting to read at its current end
    ///
    /// A `capacity` of 0 is raised to 1.
    pub fn open(dir: impl AsRef<Path>, max_bytes: u64, capacity: usize) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).context("Failed to create signal log directory")?;
        let path = dir.join(SIGNAL_LOG_FILE);

        let cursor = match File::open(&path) {
            Ok(file) => {
                FileExt::lock_shared(&file).context("Failed to lock signal log")?;
                let locked = Locked { file: &file };
                let (generation, _) = read_header(locked.file)?;
                ReadCursor {
                    generation,
                    offset: locked.file.metadata()?.len(),
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => ReadCursor::default(),
            Err(e) => return Err(e).context(format!("Failed to open {}", path.display())),
        };
        debug!(?path, ?cursor, max_bytes, "FileSignalLog::open: called");

        if capacity == 0 {
            warn!("Signal log capacity of 0 raised to 1");
        }
        let (tx, _) = broadcast::channel(capacity.max(1));
        Ok(Self {
            path,
            max_bytes,
            cursor: Mutex::new(cursor),
            tx,
        })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, signal: &Signal) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("Failed to open signal log")?;
        FileExt::lock_exclusive(&file).context("Failed to lock signal log")?;
        let _locked = Locked { file: &file };

        let len = file.metadata()?.len();
        if len == 0 || len > self.max_bytes {
            if len > 0 {
                info!(len, max_bytes = self.max_bytes, "Compacting signal log");
                file.set_len(0).context("Failed to truncate signal log")?;
            }
            let header = LogHeader {
                generation: Uuid::now_v7().to_string(),
            };
            writeln!(&file, "{}", serde_json::to_string(&header)?)?;
        }

        let line = serde_json::to_string(signal)?;
        writeln!(&file, "{}", line)?;
        (&file).flush()?;
        Ok(())
    }

    /// Read signals appended since the last poll and publish them locally
    ///
    /// Returns the number of signals published.
    pub fn poll(&self) -> Result<usize> {
        let mut cursor = self.cursor.lock().map_err(|_| eyre!("Signal log cursor poisoned"))?;

        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                *cursor = ReadCursor::default();
                return Ok(0);
            }
            Err(e) => return Err(e).context("Failed to open signal log"),
        };
        FileExt::lock_shared(&file).context("Failed to lock signal log")?;
        let locked = Locked { file: &file };

        let len = locked.file.metadata()?.len();
        let (generation, header_len) = read_header(locked.file)?;
        if generation != cursor.generation {
            debug!(?generation, previous = ?cursor.generation, "FileSignalLog::poll: new log generation, rewinding");
            cursor.generation = generation;
            cursor.offset = header_len;
        } else if len < cursor.offset {
            // Headerless log truncated behind our back
            debug!(len, offset = cursor.offset, "FileSignalLog::poll: log shrank, rewinding");
            cursor.offset = header_len;
        }
        if len <= cursor.offset {
            return Ok(0);
        }

        let mut buf = Vec::new();
        {
            let mut reader: &File = locked.file;
            reader.seek(SeekFrom::Start(cursor.offset))?;
            reader.read_to_end(&mut buf)?;
        }
        drop(locked);

        // Only whole lines; a trailing fragment is picked up next time
        let Some(end) = buf.iter().rposition(|b| *b == b'\n') else {
            return Ok(0);
        };
        let consumed = &buf[..=end];
        cursor.offset += consumed.len() as u64;

        let mut published = 0;
        for line in String::from_utf8_lossy(consumed).lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Signal>(line) {
                Ok(signal) => {
                    let _ = self.tx.send(signal);
                    published += 1;
                }
                Err(e) => {
                    warn!(line, error = %e, "FileSignalLog::poll: failed to parse line");
                }
            }
        }

        Ok(published)
    }
}

impl SignalChannel for FileSignalLog {
    fn broadcast(&self, signal: Signal) {
        debug!(name = %signal.name, origin = %signal.origin, "FileSignalLog::broadcast");
        if let Err(e) = self.append(&signal) {
            warn!(error = %e, "Failed to append signal, dropping it");
        }
    }

    fn subscribe(&self, name: &str, origin: &InstanceId) -> SignalSubscription {
        SignalSubscription::new(self.tx.subscribe(), name, origin.clone())
    }
}

/// Background tail of a [`FileSignalLog`]
pub struct SignalTail {
    log: Arc<FileSignalLog>,
    interval: Duration,
}

impl SignalTail {
    /// Tail `log` every `interval`, but no faster than [`MIN_POLL_INTERVAL`]
    pub fn new(log: Arc<FileSignalLog>, interval: Duration) -> Self {
        Self {
            log,
            interval: interval.max(MIN_POLL_INTERVAL),
        }
    }

    /// Poll forever
    pub async fn run(self) {
        info!(path = ?self.log.path(), interval_ms = self.interval.as_millis() as u64, "SignalTail started");
        loop {
            match self.log.poll() {
                Ok(0) => {}
                Ok(n) => debug!(count = n, "SignalTail: published signals"),
                Err(e) => error!(error = %e, "Error tailing signal log"),
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Spawn onto the current runtime; the task stops when the guard drops
    pub fn spawn(self) -> WatcherGuard {
        WatcherGuard::new(tokio::spawn(self.run()))
    }
}
