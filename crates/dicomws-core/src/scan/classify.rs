//! File Classifier: decides whether a path is a placeable DICOM image.
//!
//! File extensions mean nothing for DICOM (many archives use none at all), so
//! the only reliable test is to try parsing the file.  Instead of letting the
//! parse failure escape as a panic or an opaque error, [`classify`] returns an
//! explicit [`ClassifyError`] describing why the file was rejected.  The
//! indexer logs that reason and moves on.

use std::path::Path;

use dicom_dictionary_std::tags;
use dicom_object::OpenFileOptions;
use thiserror::Error;

use crate::model::{SeriesMember, UNKNOWN_INSTANCE_KEY, UNKNOWN_PROTOCOL};
use crate::scan::attributes;

/// Why a file is not a series member.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    /// The file could not be parsed as DICOM (bad preamble, truncated, not DICOM at all).
    #[error("not a readable DICOM file: {reason}")]
    NotDicom { reason: String },

    /// The file is DICOM but lacks a spatial attribute, so it cannot be placed.
    #[error("DICOM file has no usable {attribute}")]
    MissingGeometry { attribute: &'static str },
}

impl ClassifyError {
    /// `true` when the file parsed as DICOM but was still rejected.
    ///
    /// The indexer logs these louder than plain non-DICOM files, since a
    /// folder full of unrelated files is normal but a DICOM slice without
    /// geometry usually means the series will render with a gap.
    pub fn is_dicom(&self) -> bool {
        matches!(self, ClassifyError::MissingGeometry { .. })
    }
}

/// Classifies one file.
///
/// Parsing stops before the pixel data element: classification only needs
/// the header attributes, and skipping the pixel bulk keeps a multi-thousand
/// file scan cheap.
///
/// # Errors
///
/// - [`ClassifyError::NotDicom`] if the file does not parse.
/// - [`ClassifyError::MissingGeometry`] if `ImagePositionPatient` or
///   `ImageOrientationPatient` is absent or does not hold 3 / 6 numbers.
pub fn classify(path: &Path) -> Result<SeriesMember, ClassifyError> {
    let object = OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .map_err(|err| ClassifyError::NotDicom {
            reason: err.to_string(),
        })?;

    let image_position =
        attributes::image_position(&object).ok_or(ClassifyError::MissingGeometry {
            attribute: "ImagePositionPatient",
        })?;
    let image_orientation =
        attributes::image_orientation(&object).ok_or(ClassifyError::MissingGeometry {
            attribute: "ImageOrientationPatient",
        })?;

    let protocol_name = attributes::text(&object, tags::PROTOCOL_NAME)
        .unwrap_or_else(|| UNKNOWN_PROTOCOL.to_string());
    let instance_key = attributes::text(&object, tags::SOP_INSTANCE_UID)
        .unwrap_or_else(|| UNKNOWN_INSTANCE_KEY.to_string());

    Ok(SeriesMember {
        file_path: path.to_path_buf(),
        protocol_name,
        instance_key,
        image_position,
        image_orientation,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
