//! Attribute lookups shared by the classifier and the pixel extractor.

use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_object::DefaultDicomObject;

use crate::model::{Orientation, Position};

/// Returns the text of a string attribute with DICOM padding removed.
///
/// `None` when the attribute is absent or not textual.  An attribute that is
/// present but empty yields `Some("")`.
pub(crate) fn text(object: &DefaultDicomObject, tag: Tag) -> Option<String> {
    object
        .element(tag)
        .ok()
        .and_then(|element| element.to_str().ok())
        .map(|value| value.trim_end_matches([' ', '\0']).to_string())
}

pub(crate) fn image_position(object: &DefaultDicomObject) -> Option<Position> {
    floats(object, tags::IMAGE_POSITION_PATIENT).and_then(|values| values.try_into().ok())
}

pub(crate) fn image_orientation(object: &DefaultDicomObject) -> Option<Orientation> {
    floats(object, tags::IMAGE_ORIENTATION_PATIENT).and_then(|values| values.try_into().ok())
}

/// Reads an unsigned integer attribute such as `Rows` or `BitsAllocated`.
pub(crate) fn unsigned(object: &DefaultDicomObject, tag: Tag) -> Option<u32> {
    object
        .element(tag)
        .ok()
        .and_then(|element| element.to_int::<u32>().ok())
}

fn floats(object: &DefaultDicomObject, tag: Tag) -> Option<Vec<f64>> {
    object
        .element(tag)
        .ok()
        .and_then(|element| element.to_multi_float64().ok())
}
