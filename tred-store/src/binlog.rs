//! Scoped ownership of the append-only mutation log.
//!
//! One [`Binlog`] owns the log file for the life of the process: it replays existing records
//! into the caller's handler at open, accepts buffered appends while open, and flushes on
//! close. A background thread syncs the file once per interval, so acknowledged appends are
//! durable only eventually.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek, SeekFrom};
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use tred_common::error::{TredError, TredResult};

use crate::codec::{BinlogReader, BinlogWriter, CodecError};

/// Record magic for one key/value write.
pub const SET_RECORD_MAGIC: u32 = 0xd1ab_8645;
/// Record magic for one key removal.
pub const DEL_RECORD_MAGIC: u32 = 0x41f7_82f6;

/// How often the background thread syncs the log file.
const FSYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Error surfaced by a replay handler while consuming one record payload.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The payload ended before the record was complete.
    #[error("record payload ended early")]
    TruncatedRecord,
    /// The record kind or contents are not understood.
    #[error("{0}")]
    Corrupt(String),
    /// The underlying read failed.
    #[error("io error: {0}")]
    Io(String),
}

impl From<CodecError> for ReplayError {
    fn from(error: CodecError) -> Self {
        match error {
            CodecError::Eof => Self::TruncatedRecord,
            CodecError::Io(error) => Self::Io(error.to_string()),
        }
    }
}

enum FsyncCommand {
    Shutdown,
}

#[derive(Debug)]
struct FsyncTask {
    sender: mpsc::Sender<FsyncCommand>,
    join: JoinHandle<()>,
}

impl FsyncTask {
    fn shutdown(self) {
        let _ = self.sender.send(FsyncCommand::Shutdown);
        let _ = self.join.join();
    }
}

/// Append-only log of mutation records.
///
/// Appends are serialized by the internal writer mutex; the fsync thread only ever touches its
/// own duplicated file handle, so `append`, `flush`, and `sync_data` never race on the buffered
/// writer.
#[derive(Debug)]
pub struct Binlog {
    file: File,
    writer: Mutex<Option<BinlogWriter<BufWriter<File>>>>,
    fsync: Mutex<Option<FsyncTask>>,
}

impl Binlog {
    /// Opens the log at `path` (creating it if absent), replays every whole record into
    /// `handler`, and starts the background fsync thread.
    ///
    /// The handler is invoked once per record with the record magic and a reader positioned at
    /// the start of the payload; it must consume exactly that payload. A partial trailing
    /// record is discarded: the file is truncated back to the last whole-record boundary before
    /// appends resume.
    ///
    /// # Errors
    ///
    /// Returns `TredError::Io` when the file cannot be opened or read, and `TredError::Corrupt`
    /// when the handler reports an unknown or malformed record.
    pub fn open<H>(path: &Path, mut handler: H) -> TredResult<Self>
    where
        H: FnMut(u32, &mut BinlogReader<BufReader<File>>) -> Result<(), ReplayError>,
    {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|error| {
                TredError::Io(format!("open binlog {} failed: {error}", path.display()))
            })?;

        debug!(path = %path.display(), "scanning binlog");
        let checkpoint = Self::replay(&file, &mut handler)?;

        let log_len = file
            .metadata()
            .map_err(|error| TredError::Io(format!("query binlog length failed: {error}")))?
            .len();
        if checkpoint < log_len {
            warn!(
                checkpoint,
                log_len, "discarding partial trailing record from binlog"
            );
            file.set_len(checkpoint)
                .map_err(|error| TredError::Io(format!("truncate binlog failed: {error}")))?;
        }

        let mut write_file = file
            .try_clone()
            .map_err(|error| TredError::Io(format!("duplicate binlog handle failed: {error}")))?;
        write_file
            .seek(SeekFrom::End(0))
            .map_err(|error| TredError::Io(format!("seek binlog tail failed: {error}")))?;
        let writer = BinlogWriter::new(BufWriter::new(write_file));

        let fsync = Self::start_fsync_thread(&file)?;

        Ok(Self {
            file,
            writer: Mutex::new(Some(writer)),
            fsync: Mutex::new(Some(fsync)),
        })
    }

    /// Scans records from offset 0 and returns the end offset of the last whole record.
    fn replay<H>(file: &File, handler: &mut H) -> TredResult<u64>
    where
        H: FnMut(u32, &mut BinlogReader<BufReader<File>>) -> Result<(), ReplayError>,
    {
        let read_file = file
            .try_clone()
            .map_err(|error| TredError::Io(format!("duplicate binlog handle failed: {error}")))?;
        let mut reader = BinlogReader::new(BufReader::new(read_file));
        let mut checkpoint = 0_u64;

        loop {
            let magic = match reader.read_u32() {
                Ok(magic) => magic,
                Err(CodecError::Eof) => break,
                Err(CodecError::Io(error)) => {
                    return Err(TredError::Io(format!("read record magic failed: {error}")));
                }
            };

            match handler(magic, &mut reader) {
                Ok(()) => checkpoint = reader.consumed(),
                Err(ReplayError::TruncatedRecord) => break,
                Err(ReplayError::Corrupt(message)) => return Err(TredError::Corrupt(message)),
                Err(ReplayError::Io(message)) => {
                    return Err(TredError::Io(format!("read record payload failed: {message}")));
                }
            }
        }

        Ok(checkpoint)
    }

    fn start_fsync_thread(file: &File) -> TredResult<FsyncTask> {
        let sync_file = file
            .try_clone()
            .map_err(|error| TredError::Io(format!("duplicate binlog handle failed: {error}")))?;
        let (sender, receiver) = mpsc::channel::<FsyncCommand>();

        info!("starting binlog fsync thread");
        let join = thread::Builder::new()
            .name("tred-binlog-fsync".to_owned())
            .spawn(move || fsync_thread_main(&sync_file, &receiver))
            .map_err(|error| TredError::Io(format!("spawn fsync thread failed: {error}")))?;

        Ok(FsyncTask { sender, join })
    }

    /// Appends one record (magic, then payload) to the buffered writer.
    ///
    /// The record is written under the writer mutex, so records are never interleaved or split
    /// across concurrent appends.
    ///
    /// # Errors
    ///
    /// Returns `TredError::InvalidState` after `close`, and `TredError::Io` when the buffered
    /// write fails.
    pub fn append(&self, magic: u32, payload: &[u8]) -> TredResult<()> {
        let mut guard = self.writer.lock();
        let Some(writer) = guard.as_mut() else {
            return Err(TredError::InvalidState("binlog is closed"));
        };

        writer
            .write_u32(magic)
            .map_err(|error| TredError::Io(format!("append record magic failed: {error}")))?;
        writer
            .write_bytes(payload)
            .map_err(|error| TredError::Io(format!("append record payload failed: {error}")))?;
        Ok(())
    }

    /// Stops the fsync thread, flushes buffered records, and syncs the file.
    ///
    /// # Errors
    ///
    /// Returns `TredError::InvalidState` when the binlog is already closed, and `TredError::Io`
    /// when the final flush or sync fails.
    pub fn close(&self) -> TredResult<()> {
        if let Some(task) = self.fsync.lock().take() {
            task.shutdown();
        }

        let Some(mut writer) = self.writer.lock().take() else {
            return Err(TredError::InvalidState("binlog is already closed"));
        };
        writer
            .flush()
            .map_err(|error| TredError::Io(format!("flush binlog failed: {error}")))?;
        self.file
            .sync_data()
            .map_err(|error| TredError::Io(format!("sync binlog failed: {error}")))?;
        Ok(())
    }
}

fn fsync_thread_main(file: &File, receiver: &mpsc::Receiver<FsyncCommand>) {
    loop {
        match receiver.recv_timeout(FSYNC_INTERVAL) {
            Ok(FsyncCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {
                // Sync failures must not take the server down; the next tick retries.
                if let Err(sync_error) = file.sync_data() {
                    error!(%sync_error, "binlog fsync failed");
                }
            }
        }
    }
}
