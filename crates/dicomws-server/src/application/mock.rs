//! Mock series source for unit testing.
//!
//! Lets tests script what a scan or extraction returns, slow it down, and
//! inspect which paths were asked for, without writing DICOM files to disk.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use dicomws_core::{ExtractError, IndexError, PixelPayload, SeriesMember};

use super::source::SeriesSource;

/// A scripted [`SeriesSource`].
///
/// With nothing configured, `index` fails with `DirectoryNotFound` and
/// `extract` fails with `UnreadableImage`.
pub struct MockSeriesSource {
    members: Mutex<Option<Vec<SeriesMember>>>,
    payload: Mutex<Option<PixelPayload>>,
    delay: Mutex<Duration>,
    requested: Mutex<Vec<PathBuf>>,
}

impl MockSeriesSource {
    pub fn new() -> Self {
        Self {
            members: Mutex::new(None),
            payload: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Makes every `index` call succeed with `members`.
    pub fn with_members(self, members: Vec<SeriesMember>) -> Self {
        *self.members.lock().expect("lock poisoned") = Some(members);
        self
    }

    /// Makes every `extract` call succeed with `payload`.
    pub fn with_payload(self, payload: PixelPayload) -> Self {
        *self.payload.lock().expect("lock poisoned") = Some(payload);
        self
    }

    /// Blocks the calling thread for `delay` before answering.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().expect("lock poisoned") = delay;
        self
    }

    /// Every path passed to `index` or `extract`, in call order.
    pub fn requested_paths(&self) -> Vec<PathBuf> {
        self.requested.lock().expect("lock poisoned").clone()
    }

    fn record(&self, path: &Path) {
        self.requested
            .lock()
            .expect("lock poisoned")
            .push(path.to_path_buf());
        let delay = *self.delay.lock().expect("lock poisoned");
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

impl Default for MockSeriesSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SeriesSource for MockSeriesSource {
    fn index(&self, folder: &Path) -> Result<Vec<SeriesMember>, IndexError> {
        self.record(folder);
        self.members
            .lock()
            .expect("lock poisoned")
            .clone()
            .ok_or_else(|| IndexError::DirectoryNotFound {
                path: folder.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "mock has no members"),
            })
    }

    fn extract(&self, file: &Path) -> Result<PixelPayload, ExtractError> {
        self.record(file);
        self.payload
            .lock()
            .expect("lock poisoned")
            .clone()
            .ok_or_else(|| ExtractError::UnreadableImage {
                path: file.to_path_buf(),
                reason: "mock has no payload".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_mock_fails_both_calls() {
        // Arrange
        let source = MockSeriesSource::new();

        // Act
        let indexed = source.index(Path::new("/nowhere"));
        let extracted = source.extract(Path::new("/nowhere/a.dcm"));

        // Assert
        assert!(matches!(indexed, Err(IndexError::DirectoryNotFound { .. })));
        assert!(matches!(extracted, Err(ExtractError::UnreadableImage { .. })));
    }

    #[test]
    fn test_mock_records_requested_paths_in_order() {
        let source = MockSeriesSource::new().with_members(Vec::new());

        let _ = source.index(Path::new("/first"));
        let _ = source.extract(Path::new("/second.dcm"));

        assert_eq!(
            source.requested_paths(),
            vec![PathBuf::from("/first"), PathBuf::from("/second.dcm")]
        );
    }
}
