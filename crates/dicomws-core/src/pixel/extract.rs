//! Pixel Extractor: loads one file's image array and its geometry.
//!
//! # Sample conversion
//!
//! Every sample is converted to `i64` by truncation toward zero.  For integer
//! pixel data this is lossless.  For floating-point pixel data it drops the
//! fractional part (`1.9` becomes `1`, `-1.9` becomes `-1`); values are never
//! rounded.  Downstream consumers rely on exactly these integers, so the
//! truncation is part of the contract.
//!
//! # Supported encodings
//!
//! | Attribute                           | Decoded by        | Samples                        |
//! |-------------------------------------|-------------------|--------------------------------|
//! | Pixel Data (7FE0,0010)              | `dicom-pixeldata` | 8/16/32-bit, unsigned or signed |
//! | Float Pixel Data (7FE0,0008)        | `dicom-object`    | 32-bit IEEE float              |
//! | Double Float Pixel Data (7FE0,0009) | `dicom-object`    | 64-bit IEEE double             |
//!
//! Stored values are returned as-is: no rescale slope or intercept is
//! applied.  Signed values stored in fewer bits than allocated are
//! sign-extended from `BitsStored`, and colour-by-plane data
//! (`PlanarConfiguration = 1`) is reordered so that every layout comes out
//! row-major with the sample axis last.
//!
//! Encapsulated (compressed) pixel data is rejected with
//! [`ExtractError::UnsupportedPixelData`].

use std::path::{Path, PathBuf};

use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_object::{open_file, DefaultDicomObject};
use dicom_pixeldata::{
    ConvertOptions, ModalityLutOption, PixelDecoder, PixelRepresentation, PlanarConfiguration,
};
use thiserror::Error;
use tracing::debug;

use crate::model::{sample_count, PixelPayload};
use crate::scan::attributes;

const FLOAT_PIXEL_DATA: Tag = Tag(0x7FE0, 0x0008);
const DOUBLE_FLOAT_PIXEL_DATA: Tag = Tag(0x7FE0, 0x0009);

/// Errors that fail a pixel extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The file is not a readable DICOM image.
    #[error("unreadable image {}: {reason}", path.display())]
    UnreadableImage { path: PathBuf, reason: String },

    /// The image has no usable position or orientation.
    #[error("{} has no usable {attribute}", path.display())]
    MissingGeometry {
        path: PathBuf,
        attribute: &'static str,
    },

    /// The pixel data uses an encoding this service does not decode.
    #[error("unsupported pixel data in {}: {reason}", path.display())]
    UnsupportedPixelData { path: PathBuf, reason: String },
}

/// Image dimensions as declared by the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Dimensions {
    frames: usize,
    rows: usize,
    cols: usize,
    samples_per_pixel: usize,
}

impl Dimensions {
    fn read(object: &DefaultDicomObject) -> Option<Self> {
        Some(Self {
            frames: attributes::unsigned(object, tags::NUMBER_OF_FRAMES).unwrap_or(1) as usize,
            rows: attributes::unsigned(object, tags::ROWS)? as usize,
            cols: attributes::unsigned(object, tags::COLUMNS)? as usize,
            samples_per_pixel: attributes::unsigned(object, tags::SAMPLES_PER_PIXEL).unwrap_or(1)
                as usize,
        })
    }

    /// The native shape with unit axes dropped.
    fn shape(&self) -> Vec<usize> {
        let mut shape = Vec::with_capacity(4);
        if self.frames > 1 {
            shape.push(self.frames);
        }
        shape.push(self.rows);
        shape.push(self.cols);
        if self.samples_per_pixel > 1 {
            shape.push(self.samples_per_pixel);
        }
        shape
    }
}

/// Loads the image array and geometry of the DICOM file at `path`.
///
/// The returned payload's shape follows the file's native dimensionality
/// with unit axes dropped: `[rows, cols]` for a single-frame greyscale slice,
/// `[rows, cols, samples]` for colour, `[frames, rows, cols]` for native
/// multi-frame data.
///
/// # Errors
///
/// - [`ExtractError::UnreadableImage`] if the file does not parse as DICOM,
///   lacks the image pixel attributes, declares dimensions too large to
///   address, or its pixel data is shorter than the dimensions require.
/// - [`ExtractError::MissingGeometry`] if position or orientation is absent.
/// - [`ExtractError::UnsupportedPixelData`] for compressed or unusual bit depths.
pub fn extract(path: &Path) -> Result<PixelPayload, ExtractError> {
    let unreadable = |reason: String| ExtractError::UnreadableImage {
        path: path.to_path_buf(),
        reason,
    };

    let object = open_file(path).map_err(|err| unreadable(err.to_string()))?;

    let origin = attributes::image_position(&object).ok_or(ExtractError::MissingGeometry {
        path: path.to_path_buf(),
        attribute: "ImagePositionPatient",
    })?;
    let orientation =
        attributes::image_orientation(&object).ok_or(ExtractError::MissingGeometry {
            path: path.to_path_buf(),
            attribute: "ImageOrientationPatient",
        })?;

    let dims = Dimensions::read(&object)
        .ok_or_else(|| unreadable("missing Rows or Columns".to_string()))?;
    let shape = dims.shape();
    let expected = sample_count(&shape)
        .ok_or_else(|| unreadable(format!("dimensions {shape:?} are too large")))?;

    let mut samples = if object.element(tags::PIXEL_DATA).is_ok() {
        native_samples(&object, path, dims, expected)?
    } else if let Ok(element) = object.element(FLOAT_PIXEL_DATA) {
        float_samples(element.to_multi_float64(), path)?
    } else if let Ok(element) = object.element(DOUBLE_FLOAT_PIXEL_DATA) {
        float_samples(element.to_multi_float64(), path)?
    } else {
        return Err(unreadable("no pixel data".to_string()));
    };

    if samples.len() < expected {
        return Err(unreadable(format!(
            "pixel data holds {} samples but {expected} are required",
            samples.len()
        )));
    }
    // Odd-length 8-bit pixel data carries one trailing pad byte; anything
    // past the expected count is ignored.
    samples.truncate(expected);
    debug!("extracted {} (shape {:?})", path.display(), shape);

    PixelPayload::new(origin, orientation, shape, samples)
        .map_err(|err| unreadable(err.to_string()))
}

/// Truncates each value toward zero.
///
/// NaN maps to 0 and out-of-range values saturate at the `i64` bounds.
pub fn truncate_samples<I>(values: I) -> Vec<i64>
where
    I: IntoIterator<Item = f64>,
{
    // `as` from float to int truncates toward zero.
    values.into_iter().map(|v| v as i64).collect()
}

/// Decodes Pixel Data (7FE0,0010) into stored values, row-major with the
/// sample axis last.
fn native_samples(
    object: &DefaultDicomObject,
    path: &Path,
    dims: Dimensions,
    expected: usize,
) -> Result<Vec<i64>, ExtractError> {
    // A truncated buffer is an unreadable file, not an unsupported encoding.
    let width =
        (attributes::unsigned(object, tags::BITS_ALLOCATED).unwrap_or(16) as usize).div_ceil(8);
    let stored = object
        .element(tags::PIXEL_DATA)
        .ok()
        .and_then(|element| element.to_bytes().ok())
        .map(|bytes| bytes.len());
    if let (Some(stored), Some(required)) = (stored, expected.checked_mul(width)) {
        if stored < required {
            return Err(ExtractError::UnreadableImage {
                path: path.to_path_buf(),
                reason: format!("pixel data holds {stored} bytes but {required} are required"),
            });
        }
    }

    let unsupported = |reason: String| ExtractError::UnsupportedPixelData {
        path: path.to_path_buf(),
        reason,
    };

    let decoded = object
        .decode_pixel_data()
        .map_err(|err| unsupported(err.to_string()))?;
    let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
    let values: Vec<f64> = decoded
        .to_vec_with_options(&options)
        .map_err(|err| unsupported(err.to_string()))?;
    let mut samples = truncate_samples(values);

    if matches!(decoded.pixel_representation(), PixelRepresentation::Signed) {
        let bits_stored = decoded.bits_stored();
        for sample in &mut samples {
            *sample = sign_extend(*sample, bits_stored);
        }
    }
    if dims.samples_per_pixel > 1
        && matches!(decoded.planar_configuration(), PlanarConfiguration::PixelFirst)
    {
        samples = interleave_planes(&samples, dims.rows * dims.cols, dims.samples_per_pixel);
    }
    Ok(samples)
}

fn float_samples<E: std::fmt::Display>(
    values: Result<Vec<f64>, E>,
    path: &Path,
) -> Result<Vec<i64>, ExtractError> {
    values
        .map(truncate_samples)
        .map_err(|err| ExtractError::UnsupportedPixelData {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
}

/// Reads the low `bits_stored` bits of `value` as a two's complement number.
///
/// Idempotent: a value already sign-extended is returned unchanged.
fn sign_extend(value: i64, bits_stored: u16) -> i64 {
    if bits_stored == 0 || bits_stored >= 64 {
        return value;
    }
    let shift = 64 - u32::from(bits_stored);
    (value << shift) >> shift
}

/// Reorders colour-by-plane samples (`RRR..GGG..BBB..` per frame) into
/// colour-by-pixel order (`RGBRGB..`).
fn interleave_planes(samples: &[i64], pixels_per_frame: usize, planes: usize) -> Vec<i64> {
    let frame_len = pixels_per_frame * planes;
    if frame_len == 0 {
        return samples.to_vec();
    }
    let mut interleaved = Vec::with_capacity(samples.len());
    for frame in samples.chunks(frame_len) {
        if frame.len() < frame_len {
            // Trailing bytes past the last full frame; dropped by the caller.
            interleaved.extend_from_slice(frame);
            continue;
        }
        for pixel in 0..pixels_per_frame {
            for plane in 0..planes {
                interleaved.push(frame[plane * pixels_per_frame + pixel]);
            }
        }
    }
    interleaved
}

// ── Tests ─────────────────────────────────────────────────────────────────────
