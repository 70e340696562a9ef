//! Cross-platform metadata helpers.

use std::fs::Metadata;
use std::time::SystemTime;

use chrono::{DateTime, Local};

use dirsnap_core::ScanOptions;

/// Check whether an entry should be dropped by the hidden/system filters.
pub(crate) fn is_excluded(name: &str, metadata: Option<&Metadata>, options: &ScanOptions) -> bool {
    (options.skip_hidden && is_hidden(name, metadata))
        || (options.skip_system && is_system(metadata))
}

/// Hidden attribute: dot-names on Unix.
#[cfg(not(windows))]
fn is_hidden(name: &str, _metadata: Option<&Metadata>) -> bool {
    name.starts_with('.')
}

/// Hidden attribute: `FILE_ATTRIBUTE_HIDDEN` on Windows.
#[cfg(windows)]
fn is_hidden(_name: &str, metadata: Option<&Metadata>) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    metadata.is_some_and(|m| m.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0)
}

#[cfg(not(windows))]
fn is_system(_metadata: Option<&Metadata>) -> bool {
    false // No system attribute outside Windows
}

#[cfg(windows)]
fn is_system(metadata: Option<&Metadata>) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;
    metadata.is_some_and(|m| m.file_attributes() & FILE_ATTRIBUTE_SYSTEM != 0)
}

/// Whether the filters need metadata to decide (attribute-based platforms).
pub(crate) fn filter_needs_metadata(options: &ScanOptions) -> bool {
    cfg!(windows) && (options.skip_hidden || options.skip_system)
}

/// Seconds since the Unix epoch on the local wall clock.
pub(crate) fn local_timestamp(time: SystemTime) -> i64 {
    let local: DateTime<Local> = time.into();
    local.naive_local().and_utc().timestamp()
}

/// Local modified and created timestamps; creation falls back to modified.
pub(crate) fn timestamps(metadata: &Metadata) -> (i64, i64) {
    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    let created = metadata.created().unwrap_or(modified);
    (local_timestamp(modified), local_timestamp(created))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[cfg(not(windows))]
    #[test]
    fn test_dot_names_are_hidden() {
        let mut options = ScanOptions::new("/");
        assert!(is_excluded(".git", None, &options));
        assert!(!is_excluded("src", None, &options));

        options.skip_hidden = false;
        assert!(!is_excluded(".git", None, &options));
    }

    #[test]
    fn test_local_timestamp_is_offset_from_utc() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let offset = Local::now().offset().local_minus_utc() as i64;
        let diff = local_timestamp(time) - 1_700_000_000;
        // DST may shift the offset by an hour relative to "now".
        assert!((diff - offset).abs() <= 3600);
    }
}
