//! Two-tier image integrity validation.
//!
//! Tier 1 compares a short file prefix against known magic numbers.
//! Tier 2 hands the file to the `image` crate's format reader, which parses
//! the container header far enough to report dimensions without decoding
//! pixel data.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, bounded, unbounded};
use image::{ImageFormat, ImageReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use dirsnap_core::{IntegrityLevel, IntegrityStatus, ScanError};

/// Bytes read for the signature check.
const PREFIX_LEN: usize = 16;

/// Capacity of the job queue between producer and consumers.
const JOB_QUEUE_CAPACITY: usize = 256;

/// How often a blocked producer re-checks cancellation.
const PRODUCER_POLL: Duration = Duration::from_millis(20);

/// Lower-case extensions treated as images.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "jpe", "jfif", "png", "gif", "bmp", "dib", "webp", "tif", "tiff",
];

struct Signature {
    format: ImageFormat,
    offset: usize,
    magic: &'static [u8],
    // Second magic required at a fixed offset (WebP inside RIFF).
    secondary: Option<(usize, &'static [u8])>,
}

const SIGNATURES: &[Signature] = &[
    Signature {
        format: ImageFormat::Jpeg,
        offset: 0,
        magic: &[0xFF, 0xD8, 0xFF],
        secondary: None,
    },
    Signature {
        format: ImageFormat::Png,
        offset: 0,
        magic: &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A],
        secondary: None,
    },
    Signature {
        format: ImageFormat::Gif,
        offset: 0,
        magic: b"GIF87a",
        secondary: None,
    },
    Signature {
        format: ImageFormat::Gif,
        offset: 0,
        magic: b"GIF89a",
        secondary: None,
    },
    Signature {
        format: ImageFormat::Bmp,
        offset: 0,
        magic: b"BM",
        secondary: None,
    },
    Signature {
        format: ImageFormat::WebP,
        offset: 0,
        magic: b"RIFF",
        secondary: Some((8, b"WEBP")),
    },
    Signature {
        format: ImageFormat::Tiff,
        offset: 0,
        magic: &[b'I', b'I', 0x2A, 0x00],
        secondary: None,
    },
    Signature {
        format: ImageFormat::Tiff,
        offset: 0,
        magic: &[b'M', b'M', 0x00, 0x2A],
        secondary: None,
    },
];

impl Signature {
    fn matches(&self, prefix: &[u8]) -> bool {
        let hit = |offset: usize, magic: &[u8]| {
            prefix
                .get(offset..offset + magic.len())
                .is_some_and(|window| window == magic)
        };
        hit(self.offset, self.magic) && self.secondary.is_none_or(|(off, magic)| hit(off, magic))
    }
}

/// Check whether a path carries a recognized image extension.
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Match a byte prefix against the signature table.
pub fn detect_format(prefix: &[u8]) -> Option<ImageFormat> {
    SIGNATURES
        .iter()
        .find(|sig| sig.matches(prefix))
        .map(|sig| sig.format)
}

/// Validates image files at a fixed level.
#[derive(Debug, Clone, Copy)]
pub struct ImageValidator {
    level: IntegrityLevel,
}

impl ImageValidator {
    /// Create a validator for the given level.
    pub fn new(level: IntegrityLevel) -> Self {
        Self { level }
    }

    /// The configured level.
    pub fn level(&self) -> IntegrityLevel {
        self.level
    }

    /// Classify one file.
    ///
    /// Non-image extensions return `NotAnImage` without touching the file.
    /// Unreadable files are logged and return `Unknown`; use
    /// [`try_validate`](Self::try_validate) to get the read error instead.
    pub fn validate(&self, path: &Path) -> IntegrityStatus {
        self.try_validate(path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "failed to read image prefix");
            IntegrityStatus::Unknown
        })
    }

    /// Classify one file, failing when its prefix cannot be read.
    pub fn try_validate(&self, path: &Path) -> io::Result<IntegrityStatus> {
        if self.level == IntegrityLevel::None {
            return Ok(IntegrityStatus::Unknown);
        }
        if !is_image_path(path) {
            return Ok(IntegrityStatus::NotAnImage);
        }

        let Some(format) = detect_format(&read_prefix(path)?) else {
            return Ok(IntegrityStatus::InvalidSignature);
        };
        if self.level == IntegrityLevel::SignatureOnly {
            return Ok(IntegrityStatus::Valid);
        }

        Ok(match read_dimensions(path, format) {
            Ok((width, height)) => {
                debug!(path = %path.display(), width, height, "image header parsed");
                IntegrityStatus::Valid
            }
            Err(err) => {
                debug!(path = %path.display(), error = %err, "image header rejected");
                IntegrityStatus::DecodeFailed
            }
        })
    }

    /// Validate many files through a bounded producer/consumer pipeline.
    ///
    /// One producer keeps only image extensions and feeds a bounded queue,
    /// blocking when it is full. `2 × available parallelism` consumers drain
    /// it. Results come back unordered; non-image paths are not reported.
    /// A file whose prefix cannot be read is reported with its error.
    pub fn validate_batch(
        &self,
        paths: Vec<PathBuf>,
        cancel: CancellationToken,
    ) -> Result<ValidationStream, ScanError> {
        let consumers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            * 2;
        let (job_tx, job_rx) = bounded::<PathBuf>(JOB_QUEUE_CAPACITY);
        let (result_tx, result_rx) = unbounded();

        let producer_cancel = cancel.clone();
        spawn_named("dirsnap-validate-feed", move || {
            produce(paths, job_tx, producer_cancel)
        })?;

        for i in 0..consumers {
            let validator = *self;
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let cancel = cancel.clone();
            spawn_named(&format!("dirsnap-validate-{i}"), move || {
                for path in job_rx.iter() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let status = validator.try_validate(&path);
                    if result_tx.send((path, status)).is_err() {
                        break;
                    }
                }
            })?;
        }

        Ok(ValidationStream {
            rx: result_rx,
            cancel,
        })
    }
}

fn produce(paths: Vec<PathBuf>, job_tx: Sender<PathBuf>, cancel: CancellationToken) {
    for path in paths.into_iter().filter(|p| is_image_path(p)) {
        let mut pending = path;
        loop {
            if cancel.is_cancelled() {
                return;
            }
            match job_tx.send_timeout(pending, PRODUCER_POLL) {
                Ok(()) => break,
                Err(SendTimeoutError::Timeout(path)) => pending = path,
                Err(SendTimeoutError::Disconnected(_)) => return,
            }
        }
    }
}

fn spawn_named<F>(name: &str, f: F) -> Result<(), ScanError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map(|_| ())
        .map_err(|e| ScanError::ThreadPool {
            message: e.to_string(),
        })
}

fn read_prefix(path: &Path) -> io::Result<Vec<u8>> {
    let mut prefix = Vec::with_capacity(PREFIX_LEN);
    File::open(path)?
        .take(PREFIX_LEN as u64)
        .read_to_end(&mut prefix)?;
    Ok(prefix)
}

fn read_dimensions(path: &Path, format: ImageFormat) -> image::ImageResult<(u32, u32)> {
    let file = File::open(path)?;
    ImageReader::with_format(BufReader::new(file), format).into_dimensions()
}

/// A path paired with its status, or the error that prevented reading it.
pub type Validation = (PathBuf, io::Result<IntegrityStatus>);

/// Lazy, unordered sequence of validation results.
///
/// Closes once every consumer finished or the token is cancelled.
pub struct ValidationStream {
    rx: Receiver<Validation>,
    cancel: CancellationToken,
}

impl Iterator for ValidationStream {
    type Item = Validation;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.rx.recv().ok()
    }
}
