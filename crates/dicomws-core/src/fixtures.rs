//! Synthetic DICOM files for tests.
//!
//! Builds small Part 10 files (Explicit VR Little Endian) carrying only the
//! attributes the scanner and extractor look at.  Compiled for this crate's
//! unit tests and, behind the `test-fixtures` feature, for other crates.

use std::path::Path;

use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::{tags, uids};
use dicom_object::meta::FileMetaTableBuilder;
use dicom_object::InMemDicomObject;

/// Float Pixel Data (7FE0,0008).
pub const FLOAT_PIXEL_DATA: Tag = Tag(0x7FE0, 0x0008);

/// Double Float Pixel Data (7FE0,0009).
pub const DOUBLE_FLOAT_PIXEL_DATA: Tag = Tag(0x7FE0, 0x0009);

/// Pixel content of a synthetic image.
#[derive(Debug, Clone)]
pub enum FixturePixels {
    /// No pixel attribute at all.
    None,
    /// 16-bit greyscale Pixel Data; `signed` sets PixelRepresentation = 1.
    U16 { rows: u16, cols: u16, signed: bool, values: Vec<u16> },
    /// Any other native Pixel Data layout.
    Native(NativePixels),
    /// 32-bit Float Pixel Data.
    F32 { rows: u16, cols: u16, values: Vec<f32> },
    /// 64-bit Double Float Pixel Data.
    F64 { rows: u16, cols: u16, values: Vec<f64> },
}

/// Native Pixel Data with full control over the Image Pixel module.
///
/// `data` holds the stored little-endian bytes exactly as they go into the
/// file; an odd-length buffer is padded with one zero byte when written.
#[derive(Debug, Clone)]
pub struct NativePixels {
    pub frames: u32,
    pub rows: u16,
    pub cols: u16,
    pub samples_per_pixel: u16,
    /// Writes PlanarConfiguration = 1 (colour-by-plane) when set.
    pub planar: bool,
    pub bits_allocated: u16,
    pub bits_stored: u16,
    pub signed: bool,
    pub data: Vec<u8>,
}

impl NativePixels {
    /// Unsigned 8-bit greyscale, one frame.
    pub fn u8(rows: u16, cols: u16, values: Vec<u8>) -> Self {
        Self {
            frames: 1,
            rows,
            cols,
            samples_per_pixel: 1,
            planar: false,
            bits_allocated: 8,
            bits_stored: 8,
            signed: false,
            data: values,
        }
    }

    /// Signed 8-bit greyscale, one frame.
    pub fn i8(rows: u16, cols: u16, values: Vec<i8>) -> Self {
        Self {
            signed: true,
            ..Self::u8(rows, cols, values.into_iter().map(|v| v as u8).collect())
        }
    }

    /// 16-bit greyscale with `bits_stored` significant bits.
    pub fn u16_stored(rows: u16, cols: u16, bits_stored: u16, signed: bool, values: Vec<u16>) -> Self {
        Self {
            bits_allocated: 16,
            bits_stored,
            signed,
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            ..Self::u8(rows, cols, Vec::new())
        }
    }

    /// Unsigned 32-bit greyscale, one frame.
    pub fn u32(rows: u16, cols: u16, values: Vec<u32>) -> Self {
        Self {
            bits_allocated: 32,
            bits_stored: 32,
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            ..Self::u8(rows, cols, Vec::new())
        }
    }

    /// Signed 32-bit greyscale, one frame.
    pub fn i32(rows: u16, cols: u16, values: Vec<i32>) -> Self {
        Self {
            bits_allocated: 32,
            bits_stored: 32,
            signed: true,
            data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            ..Self::u8(rows, cols, Vec::new())
        }
    }

    /// 8-bit RGB; `data` is interleaved or by plane according to `planar`.
    pub fn rgb8(rows: u16, cols: u16, planar: bool, data: Vec<u8>) -> Self {
        Self {
            samples_per_pixel: 3,
            planar,
            ..Self::u8(rows, cols, data)
        }
    }

    pub fn with_frames(mut self, frames: u32) -> Self {
        self.frames = frames;
        self
    }
}

/// Description of one synthetic DICOM file.
#[derive(Debug, Clone)]
pub struct FixtureImage {
    pub protocol_name: Option<String>,
    pub sop_instance_uid: Option<String>,
    pub image_position: Option<[f64; 3]>,
    pub image_orientation: Option<[f64; 6]>,
    pub pixels: FixturePixels,
}

impl FixtureImage {
    /// An axial slice with a protocol and instance key and a 2×2 image.
    pub fn slice(protocol: &str, instance: &str) -> Self {
        Self {
            protocol_name: Some(protocol.to_string()),
            sop_instance_uid: Some(instance.to_string()),
            image_position: Some([0.0, 0.0, 0.0]),
            image_orientation: Some([1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
            pixels: FixturePixels::U16 {
                rows: 2,
                cols: 2,
                signed: false,
                values: vec![1, 2, 3, 4],
            },
        }
    }

    pub fn with_position(mut self, position: [f64; 3]) -> Self {
        self.image_position = Some(position);
        self
    }

    pub fn with_pixels(mut self, pixels: FixturePixels) -> Self {
        self.pixels = pixels;
        self
    }

    pub fn without_protocol(mut self) -> Self {
        self.protocol_name = None;
        self
    }

    pub fn without_instance(mut self) -> Self {
        self.sop_instance_uid = None;
        self
    }

    pub fn without_geometry(mut self) -> Self {
        self.image_position = None;
        self.image_orientation = None;
        self
    }
}

/// Writes `image` as a DICOM Part 10 file at `path`.
pub fn write_dicom(path: &Path, image: &FixtureImage) -> Result<(), Box<dyn std::error::Error>> {
    let mut obj = InMemDicomObject::new_empty();
    obj.put(DataElement::new(
        tags::SOP_CLASS_UID,
        VR::UI,
        PrimitiveValue::from(uids::CT_IMAGE_STORAGE),
    ));
    if let Some(uid) = &image.sop_instance_uid {
        obj.put(DataElement::new(
            tags::SOP_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(uid.as_str()),
        ));
    }
    if let Some(name) = &image.protocol_name {
        obj.put(DataElement::new(
            tags::PROTOCOL_NAME,
            VR::LO,
            PrimitiveValue::from(name.as_str()),
        ));
    }
    if let Some(position) = image.image_position {
        obj.put(DataElement::new(
            tags::IMAGE_POSITION_PATIENT,
            VR::DS,
            PrimitiveValue::from(decimal_strings(&position)),
        ));
    }
    if let Some(orientation) = image.image_orientation {
        obj.put(DataElement::new(
            tags::IMAGE_ORIENTATION_PATIENT,
            VR::DS,
            PrimitiveValue::from(decimal_strings(&orientation)),
        ));
    }

    match &image.pixels {
        FixturePixels::None => {}
        FixturePixels::U16 {
            rows,
            cols,
            signed,
            values,
        } => {
            let module = NativePixels::u16_stored(*rows, *cols, 16, *signed, Vec::new());
            put_image_pixel_module(&mut obj, &module);
            obj.put(DataElement::new(
                tags::PIXEL_DATA,
                VR::OW,
                PrimitiveValue::U16(values.clone().into()),
            ));
        }
        FixturePixels::Native(native) => {
            put_image_pixel_module(&mut obj, native);
            let mut data = native.data.clone();
            if data.len() % 2 == 1 {
                data.push(0);
            }
            let vr = if native.bits_allocated <= 8 { VR::OB } else { VR::OW };
            obj.put(DataElement::new(
                tags::PIXEL_DATA,
                vr,
                PrimitiveValue::U8(data.into()),
            ));
        }
        FixturePixels::F32 { rows, cols, values } => {
            put_image_pixel_module(&mut obj, &float_module(*rows, *cols, 32));
            obj.put(DataElement::new(
                FLOAT_PIXEL_DATA,
                VR::OF,
                PrimitiveValue::F32(values.clone().into()),
            ));
        }
        FixturePixels::F64 { rows, cols, values } => {
            put_image_pixel_module(&mut obj, &float_module(*rows, *cols, 64));
            obj.put(DataElement::new(
                DOUBLE_FLOAT_PIXEL_DATA,
                VR::OD,
                PrimitiveValue::F64(values.clone().into()),
            ));
        }
    }

    let instance_uid = image
        .sop_instance_uid
        .clone()
        .unwrap_or_else(|| "1.2.826.0.1.3680043.2.1125.1".to_string());
    let file_obj = obj.with_meta(
        FileMetaTableBuilder::new()
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
            .media_storage_sop_instance_uid(instance_uid),
    )?;
    file_obj.write_to_file(path)?;
    Ok(())
}

fn float_module(rows: u16, cols: u16, bits: u16) -> NativePixels {
    NativePixels {
        bits_allocated: bits,
        bits_stored: bits,
        ..NativePixels::u8(rows, cols, Vec::new())
    }
}

fn put_image_pixel_module(obj: &mut InMemDicomObject, pixels: &NativePixels) {
    let us = |tag: Tag, value: u16| DataElement::new(tag, VR::US, PrimitiveValue::from(value));

    obj.put(us(tags::SAMPLES_PER_PIXEL, pixels.samples_per_pixel));
    let photometric = if pixels.samples_per_pixel == 3 { "RGB" } else { "MONOCHROME2" };
    obj.put(DataElement::new(
        tags::PHOTOMETRIC_INTERPRETATION,
        VR::CS,
        PrimitiveValue::from(photometric),
    ));
    if pixels.samples_per_pixel > 1 {
        obj.put(us(tags::PLANAR_CONFIGURATION, u16::from(pixels.planar)));
    }
    if pixels.frames > 1 {
        obj.put(DataElement::new(
            tags::NUMBER_OF_FRAMES,
            VR::IS,
            PrimitiveValue::from(pixels.frames.to_string()),
        ));
    }
    obj.put(us(tags::ROWS, pixels.rows));
    obj.put(us(tags::COLUMNS, pixels.cols));
    obj.put(us(tags::BITS_ALLOCATED, pixels.bits_allocated));
    obj.put(us(tags::BITS_STORED, pixels.bits_stored));
    obj.put(us(tags::HIGH_BIT, pixels.bits_stored.saturating_sub(1)));
    obj.put(us(tags::PIXEL_REPRESENTATION, u16::from(pixels.signed)));
}

/// Renders numbers as a backslash-separated DS value.
fn decimal_strings(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("\\")
}
