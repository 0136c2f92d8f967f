//! Plain data types shared by the scanner and the pixel extractor.
//!
//! Nothing in this module performs I/O.  Both types are computed fresh for
//! every request and never cached.

use std::path::PathBuf;

/// Protocol name used when a file carries no `ProtocolName` (0018,1030).
pub const UNKNOWN_PROTOCOL: &str = "Unknown";

/// Instance key used when a file carries no `SOPInstanceUID` (0008,0018).
pub const UNKNOWN_INSTANCE_KEY: &str = "000000";

/// A patient-space position: `[x, y, z]` in millimetres.
pub type Position = [f64; 3];

/// Two direction cosines: `[row_x, row_y, row_z, col_x, col_y, col_z]`.
pub type Orientation = [f64; 6];

/// One file believed to belong to an imaging series.
///
/// A member is only ever built for a file that parsed as DICOM *and* carries
/// both spatial attributes; files that cannot be placed in patient space are
/// not members.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesMember {
    /// Path of the file, as reached from the scanned root.
    pub file_path: PathBuf,

    /// Series label.  [`UNKNOWN_PROTOCOL`] when the attribute is absent.
    pub protocol_name: String,

    /// Acquisition-order key within the protocol group.
    ///
    /// Compared as a plain string; it is never parsed as a number or a time.
    /// [`UNKNOWN_INSTANCE_KEY`] when the attribute is absent.
    pub instance_key: String,

    /// `ImagePositionPatient` (0020,0032).
    pub image_position: Position,

    /// `ImageOrientationPatient` (0020,0037).
    pub image_orientation: Orientation,
}

impl SeriesMember {
    /// The composite key the indexer sorts by.
    pub fn sort_key(&self) -> (&str, &str) {
        (self.protocol_name.as_str(), self.instance_key.as_str())
    }
}

/// The image content of one file plus the geometry needed to place it.
///
/// # Invariant
///
/// `samples.len()` always equals the product of `shape`.  The only way to
/// build a payload is [`PixelPayload::new`], which checks this.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelPayload {
    origin: Position,
    orientation: Orientation,
    shape: Vec<usize>,
    samples: Vec<i64>,
}

/// Number of samples an array of `shape` holds.
///
/// `None` if the product does not fit in `usize`.  Dimensions read from a
/// file header are untrusted, so callers must not multiply them directly.
pub fn sample_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1_usize, |count, &dim| count.checked_mul(dim))
}

/// Returned by [`PixelPayload::new`] when the sample buffer cannot match the shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("shape {shape:?} describes {expected} samples but {actual} were supplied")]
    Mismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("shape {shape:?} describes more samples than can be addressed")]
    Overflow { shape: Vec<usize> },
}

impl PixelPayload {
    /// Builds a payload, rejecting sample buffers whose length disagrees with `shape`.
    pub fn new(
        origin: Position,
        orientation: Orientation,
        shape: Vec<usize>,
        samples: Vec<i64>,
    ) -> Result<Self, ShapeError> {
        let Some(expected) = sample_count(&shape) else {
            return Err(ShapeError::Overflow { shape });
        };
        if expected != samples.len() {
            return Err(ShapeError::Mismatch {
                shape,
                expected,
                actual: samples.len(),
            });
        }
        Ok(Self {
            origin,
            orientation,
            shape,
            samples,
        })
    }

    pub fn origin(&self) -> Position {
        self.origin
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Dimensions, outermost first (`[rows, cols]` for a plain 2-D slice).
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Row-major flattened samples.
    pub fn samples(&self) -> &[i64] {
        &self.samples
    }

    /// Consumes the payload, returning the sample buffer without copying it.
    pub fn into_samples(self) -> Vec<i64> {
        self.samples
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
