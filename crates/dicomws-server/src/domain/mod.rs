//! Domain layer for dicomws-server.
//!
//! Pure types with no I/O: the control-protocol messages and the server
//! configuration.  No `tokio` or WebSocket types appear here; the transport
//! converts [`OutboundFrame`] into its own frame type.

pub mod config;
pub mod messages;

pub use config::{ConfigError, Deployment, FileConfig, ServerConfig};
pub use messages::{
    ControlRequest, ErrorResponse, MetadataFrame, OutboundFrame, PayloadFrame, PixelDataReply,
    Reply, RequestParseError, SeriesEntry, SortedDicomResponse,
};
