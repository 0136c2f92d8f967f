//! JSON message types for the browser-facing control protocol.
//!
//! Every client request is one JSON text frame carrying an `"action"` field:
//!
//! ```json
//! {"action":"get_sorted_dicom","dicom_folder":"/data/case"}
//! {"action":"get_dicom_pixel_data","file_path":"/data/case/slice-001.dcm"}
//! ```
//!
//! # Replies
//!
//! | Request                | Frames sent back                                  |
//! |------------------------|---------------------------------------------------|
//! | `get_sorted_dicom`     | one text frame ([`SortedDicomResponse`])          |
//! | `get_dicom_pixel_data` | text ([`MetadataFrame`]) then binary ([`PayloadFrame`]) |
//! | anything that fails    | one text frame ([`ErrorResponse`])                |
//!
//! The pixel reply is two frames because the sample array is large and the
//! browser decodes it as MessagePack; only the small header goes as JSON.
//!
//! # Malformed input
//!
//! A frame that is not a JSON object with an `action` key gets no reply at
//! all.  Any other failure gets exactly one [`ErrorResponse`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use dicomws_core::{PixelPayload, SeriesMember};

pub const ACTION_GET_SORTED_DICOM: &str = "get_sorted_dicom";
pub const ACTION_GET_PIXEL_DATA: &str = "get_dicom_pixel_data";

/// Value of the `status` field in every successful reply.
pub const STATUS_SUCCESS: &str = "success";

// ── Client → server ───────────────────────────────────────────────────────────

/// A validated client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    /// List every placeable DICOM file under a directory, sorted.
    GetSortedDicom { dicom_folder: String },
    /// Fetch the pixels and geometry of one file.
    GetDicomPixelData { file_path: String },
}

/// Why a text frame did not become a [`ControlRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestParseError {
    /// Not a JSON object with an `action` key.  No reply is sent.
    #[error("malformed control frame: {0}")]
    Malformed(String),

    /// `action` is present but names nothing this server does.
    #[error("Invalid action")]
    InvalidAction,

    /// The action's required field is absent, empty, or not a string.
    #[error("{0} not provided")]
    MissingField(&'static str),
}

impl RequestParseError {
    /// `true` when the client is owed an error reply.
    pub fn expects_reply(&self) -> bool {
        !matches!(self, RequestParseError::Malformed(_))
    }
}

/// Raw shape of an incoming frame.  Fields are loose `Value`s so that a
/// wrongly typed field is reported as "not provided" instead of a parse error.
#[derive(Deserialize)]
struct Envelope {
    action: Value,
    #[serde(default)]
    dicom_folder: Option<Value>,
    #[serde(default)]
    file_path: Option<Value>,
}

impl ControlRequest {
    /// Parses and validates one text frame.
    pub fn parse(text: &str) -> Result<Self, RequestParseError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|err| RequestParseError::Malformed(err.to_string()))?;
        if !value.is_object() {
            return Err(RequestParseError::Malformed(
                "expected a JSON object".to_string(),
            ));
        }
        let envelope: Envelope = serde_json::from_value(value)
            .map_err(|err| RequestParseError::Malformed(err.to_string()))?;

        match envelope.action.as_str() {
            Some(ACTION_GET_SORTED_DICOM) => Ok(ControlRequest::GetSortedDicom {
                dicom_folder: required(envelope.dicom_folder, "dicom_folder")?,
            }),
            Some(ACTION_GET_PIXEL_DATA) => Ok(ControlRequest::GetDicomPixelData {
                file_path: required(envelope.file_path, "file_path")?,
            }),
            _ => Err(RequestParseError::InvalidAction),
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            ControlRequest::GetSortedDicom { .. } => ACTION_GET_SORTED_DICOM,
            ControlRequest::GetDicomPixelData { .. } => ACTION_GET_PIXEL_DATA,
        }
    }
}

fn required(value: Option<Value>, field: &'static str) -> Result<String, RequestParseError> {
    match value {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        _ => Err(RequestParseError::MissingField(field)),
    }
}

// ── Server → client ───────────────────────────────────────────────────────────

/// One entry of `sorted_dicom_files`.
///
/// `scan_time` is the wire name of the instance key.  The field is named
/// after a timestamp but carries whatever string the files were sorted by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesEntry {
    pub file_path: String,
    pub protocol_name: String,
    pub scan_time: String,
    pub image_position: [f64; 3],
    pub image_orientation: [f64; 6],
}

impl From<&SeriesMember> for SeriesEntry {
    fn from(member: &SeriesMember) -> Self {
        Self {
            file_path: member.file_path.to_string_lossy().into_owned(),
            protocol_name: member.protocol_name.clone(),
            scan_time: member.instance_key.clone(),
            image_position: member.image_position,
            image_orientation: member.image_orientation,
        }
    }
}

/// Reply to `get_sorted_dicom`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortedDicomResponse {
    pub status: String,
    pub sorted_dicom_files: Vec<SeriesEntry>,
}

impl SortedDicomResponse {
    pub fn success(members: &[SeriesMember]) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            sorted_dicom_files: members.iter().map(SeriesEntry::from).collect(),
        }
    }
}

/// First frame of a pixel reply: everything except the samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataFrame {
    pub status: String,
    pub origin: [f64; 3],
    pub orientation: [f64; 6],
    pub shape: Vec<usize>,
}

impl MetadataFrame {
    pub fn success(payload: &PixelPayload) -> Self {
        Self {
            status: STATUS_SUCCESS.to_string(),
            origin: payload.origin(),
            orientation: payload.orientation(),
            shape: payload.shape().to_vec(),
        }
    }
}

/// Second frame of a pixel reply: the MessagePack-encoded sample array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadFrame(pub Vec<u8>);

/// A complete pixel reply.  The metadata frame always goes first.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelDataReply {
    pub metadata: MetadataFrame,
    pub payload: PayloadFrame,
}

/// Reply to any request that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// A frame ready for the transport, independent of any WebSocket library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Everything the server can answer to one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    SortedDicom(SortedDicomResponse),
    PixelData(PixelDataReply),
    Error(ErrorResponse),
}

impl Reply {
    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error(ErrorResponse::new(message))
    }

    /// Serialises the reply into the frames sent, in send order.
    pub fn into_frames(self) -> Result<Vec<OutboundFrame>, serde_json::Error> {
        let frames = match self {
            Reply::SortedDicom(response) => {
                vec![OutboundFrame::Text(serde_json::to_string(&response)?)]
            }
            Reply::PixelData(PixelDataReply { metadata, payload }) => vec![
                OutboundFrame::Text(serde_json::to_string(&metadata)?),
                OutboundFrame::Binary(payload.0),
            ],
            Reply::Error(response) => vec![OutboundFrame::Text(serde_json::to_string(&response)?)],
        };
        Ok(frames)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
