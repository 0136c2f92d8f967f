//! File classification and directory indexing.
//!
//! [`classify`](classify::classify) decides whether one path is a placeable
//! DICOM image; [`index`](index::index) applies it to every file under a
//! directory and sorts the survivors.

pub(crate) mod attributes;
pub mod classify;
pub mod index;

pub use classify::{classify, ClassifyError};
pub use index::{index, sort_members, IndexError};
