//! The seam between request handling and the file system.
//!
//! [`RequestService`](super::request_service::RequestService) never touches
//! DICOM files directly; it asks a [`SeriesSource`].  Production uses
//! [`FsSeriesSource`], tests use [`MockSeriesSource`](super::mock::MockSeriesSource).
//!
//! Both methods are blocking.  The service calls them from tokio's blocking
//! pool, never from the event loop.

use std::path::Path;

use dicomws_core::{ExtractError, IndexError, PixelPayload, SeriesMember};

/// Something that can list a series and read one slice of it.
pub trait SeriesSource: Send + Sync + 'static {
    /// Returns every placeable file under `folder`, sorted.
    fn index(&self, folder: &Path) -> Result<Vec<SeriesMember>, IndexError>;

    /// Reads the pixels and geometry of `file`.
    fn extract(&self, file: &Path) -> Result<PixelPayload, ExtractError>;
}

/// Reads real DICOM files through `dicomws-core`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSeriesSource;

impl SeriesSource for FsSeriesSource {
    fn index(&self, folder: &Path) -> Result<Vec<SeriesMember>, IndexError> {
        dicomws_core::index(folder)
    }

    fn extract(&self, file: &Path) -> Result<PixelPayload, ExtractError> {
        dicomws_core::extract(file)
    }
}
