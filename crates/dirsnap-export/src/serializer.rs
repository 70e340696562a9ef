//! Compact folder-array encoding.
//!
//! Every folder becomes one `D.p([...])` record whose elements are:
//!
//! 1. `"<dir path>*0*<modified>"`
//! 2. one `"<name>*<size>*<modified>*<hash>*<status>"` per file
//! 3. the folder's immediate-file byte total
//! 4. `"<child>*<child>..."`, the array indices of its subfolders
//!
//! A folder's index is its position in the input plus the start offset.
//! Children are found through their parent-path string; a folder whose
//! parent is not among the input folders is left out of every child list.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use itertools::Itertools;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use dirsnap_core::SnappedFolder;
use dirsnap_scan::{ProgressSink, ProgressThrottle, ScanPhase};

use crate::error::ExportError;
use crate::escape::{escape_dir_path, push_escaped};

/// Size of the buffered chunk handed to the sink in one write.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// How a serialization run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializeOutcome {
    /// Every record and the footer were written.
    Completed { records: usize, bytes: u64 },
    /// Stopped between records; the footer was not written.
    Cancelled { records: usize, bytes: u64 },
}

/// Streams folders into a sink as the compact array format.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotSerializer {
    start_index: usize,
    chunk_size: usize,
}

impl SnapshotSerializer {
    /// Serializer numbering folders from zero.
    pub fn new() -> Self {
        Self {
            start_index: 0,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Number folders from `start_index`, for appending to an earlier batch.
    pub fn with_start_index(mut self, start_index: usize) -> Self {
        self.start_index = start_index;
        self
    }

    /// Override the flush threshold.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Child index lists, one per folder, resolved through parent paths.
    ///
    /// Every folder's full path is a lookup key, the root entry's included,
    /// so a lone root still gets an (empty) bucket.
    pub fn child_indices(&self, folders: &[SnappedFolder]) -> Vec<Vec<usize>> {
        let mut slots: HashMap<String, usize> = HashMap::with_capacity(folders.len() + 1);
        for (position, folder) in folders.iter().enumerate() {
            slots.insert(folder.full_path(), position);
        }

        let mut children = vec![Vec::new(); folders.len()];
        for (position, folder) in folders.iter().enumerate() {
            if folder.is_root() {
                continue;
            }
            match slots.get(&folder.path) {
                Some(&parent) => children[parent].push(position + self.start_index),
                None => debug!(path = %folder.full_path(), "orphaned folder left out of child lists"),
            }
        }
        children
    }

    /// Write header, one record per folder, then footer.
    ///
    /// Output is buffered and flushed every `chunk_size` bytes. Cancellation
    /// is checked between records; already written bytes are left in place.
    pub fn write<W: Write>(
        &self,
        folders: &[SnappedFolder],
        header: &str,
        footer: &str,
        sink: &mut W,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<SerializeOutcome, ExportError> {
        let throttle = ProgressThrottle::new(progress, ScanPhase::Writing);
        let children = self.child_indices(folders);
        let mut out = ChunkWriter::new(sink, self.chunk_size);

        out.push(header)?;
        let mut record = String::new();
        for (folder, child_list) in folders.iter().zip(&children) {
            if cancel.is_cancelled() {
                out.flush()?;
                return Ok(SerializeOutcome::Cancelled {
                    records: throttle.processed() as usize,
                    bytes: out.written,
                });
            }

            record.clear();
            encode_record(&mut record, folder, child_list);
            out.push(&record)?;
            throttle.tick("Writing snapshot", Path::new(&folder.full_path()));
        }
        out.push(footer)?;
        out.flush()?;

        throttle.finish("Snapshot written", Path::new(""));
        Ok(SerializeOutcome::Completed {
            records: folders.len(),
            bytes: out.written,
        })
    }

    /// Encode into an in-memory string with no header or footer.
    pub fn encode_to_string(&self, folders: &[SnappedFolder]) -> String {
        let children = self.child_indices(folders);
        let mut out = String::new();
        for (folder, child_list) in folders.iter().zip(&children) {
            encode_record(&mut out, folder, child_list);
        }
        out
    }
}

impl Default for SnapshotSerializer {
    fn default() -> Self {
        Self::new()
    }
}

/// Append one folder record, including its trailing newline.
fn encode_record(out: &mut String, folder: &SnappedFolder, children: &[usize]) {
    // Writing into a String cannot fail.
    out.push_str("D.p([\"");
    out.push_str(&escape_dir_path(&folder.full_path()));
    let _ = write!(out, "*0*{}\",", folder.modified);

    for file in &folder.files {
        out.push('"');
        push_escaped(out, &file.name);
        let _ = write!(
            out,
            "*{}*{}*{}*{}\",",
            file.size,
            file.modified,
            file.hash,
            file.integrity.code()
        );
    }

    let _ = writeln!(out, "{},\"{}\"])", folder.total_size(), children.iter().join("*"));
}

/// Accumulates text and hands it to the sink in fixed-size chunks.
struct ChunkWriter<'w, W: Write> {
    sink: &'w mut W,
    buffer: Vec<u8>,
    chunk_size: usize,
    written: u64,
}

impl<'w, W: Write> ChunkWriter<'w, W> {
    fn new(sink: &'w mut W, chunk_size: usize) -> Self {
        Self {
            sink,
            buffer: Vec::with_capacity(chunk_size),
            chunk_size,
            written: 0,
        }
    }

    fn push(&mut self, text: &str) -> Result<(), ExportError> {
        self.buffer.extend_from_slice(text.as_bytes());
        if self.buffer.len() >= self.chunk_size {
            self.drain()?;
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<(), ExportError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.sink
            .write_all(&self.buffer)
            .map_err(|source| ExportError::Write { source })?;
        self.written += self.buffer.len() as u64;
        self.buffer.clear();
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ExportError> {
        self.drain()?;
        self.sink
            .flush()
            .map_err(|source| ExportError::Write { source })
    }
}
