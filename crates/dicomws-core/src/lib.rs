//! # dicomws-core
//!
//! Shared library for the DICOM-WS data service. It turns a directory of
//! DICOM files into an ordered series listing, and a single DICOM file into a
//! pixel payload that can be shipped to a browser.
//!
//! This crate has no dependencies on sockets, async runtimes, or UI code.  All
//! functions here are plain blocking calls over the file system, which keeps
//! them easy to test and lets the server decide which thread runs them.
//!
//! # Architecture overview (for beginners)
//!
//! A CT or MR acquisition produces one file per slice.  The files on disk are
//! not in any useful order, and a folder may contain several acquisitions
//! (called *series*, labelled by their protocol name) mixed together with
//! unrelated files.  This crate provides:
//!
//! - **`scan`** – Probes each file (`classify`) and walks a directory tree
//!   (`index`) to produce a [`SeriesMember`] list sorted by
//!   `(protocol_name, instance_key)`.
//!
//! - **`pixel`** – Loads the numeric image array of one file (`extract`) and
//!   encodes the samples as a compact MessagePack array (`codec`).
//!
//! - **`model`** – The plain data types passed between the two.

pub mod model;
pub mod pixel;
pub mod scan;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

// Re-export the most-used items at the crate root so callers can write
// `dicomws_core::index` instead of `dicomws_core::scan::index::index`.
pub use model::{sample_count, PixelPayload, SeriesMember, ShapeError, UNKNOWN_INSTANCE_KEY, UNKNOWN_PROTOCOL};
pub use pixel::codec::{decode_samples, encode_samples, CodecError};
pub use pixel::extract::{extract, truncate_samples, ExtractError};
pub use scan::classify::{classify, ClassifyError};
pub use scan::index::{index, sort_members, IndexError};
