//! Application layer for dicomws-server.
//!
//! Knows *what* to answer to each control request, but not how frames get
//! on the wire.  File access goes through the [`SeriesSource`] trait so that
//! request handling can be tested without DICOM files.

pub mod mock;
pub mod request_service;
pub mod source;

pub use request_service::{RequestError, RequestService};
pub use source::{FsSeriesSource, SeriesSource};
