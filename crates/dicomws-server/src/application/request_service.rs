//! Turns one inbound text frame into the frames that answer it.
//!
//! ```text
//! text ─▶ ControlRequest::parse ─▶ dispatch ─▶ Reply ─▶ Vec<OutboundFrame>
//!                 │                    │
//!                 │ Malformed          │ any failure
//!                 ▼                    ▼
//!              (no reply)        {"error": "<message>"}
//! ```
//!
//! Scans and extractions are blocking file I/O, so they run on tokio's
//! blocking pool under an optional time limit.  The event loop only awaits
//! them.  Requests on one connection are still answered strictly in order
//! because the connection loop awaits each reply before reading the next
//! frame.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, warn};

use dicomws_core::{encode_samples, CodecError, ExtractError, IndexError};

use crate::application::source::SeriesSource;
use crate::domain::config::ServerConfig;
use crate::domain::messages::{
    ControlRequest, MetadataFrame, OutboundFrame, PayloadFrame, PixelDataReply, Reply,
    RequestParseError, SortedDicomResponse,
};

/// Sent when a reply cannot be serialised, which should never happen.
const SERIALIZE_FAILED: &str = r#"{"error":"failed to serialize response"}"#;

/// Why a well-formed request could not be answered.
///
/// The `Display` text is what the client sees in the `error` field.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("failed to encode samples: {0}")]
    Codec(#[from] CodecError),

    #[error("request timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    /// The blocking task panicked or was cancelled.
    #[error("request worker failed: {0}")]
    Worker(String),
}

/// Answers control requests using a [`SeriesSource`].
pub struct RequestService<S: SeriesSource> {
    source: Arc<S>,
    base_directory: Option<PathBuf>,
    scan_timeout: Option<Duration>,
}

impl<S: SeriesSource> RequestService<S> {
    pub fn new(source: S, config: &ServerConfig) -> Self {
        Self {
            source: Arc::new(source),
            base_directory: config.base_directory.clone(),
            scan_timeout: config.scan_timeout,
        }
    }

    /// Handles one text frame.
    ///
    /// Returns `None` when the frame is malformed and nothing should be sent.
    /// Otherwise returns the frames to send, in order: one for a listing or
    /// an error, two for pixel data.
    pub async fn handle_text(&self, text: &str) -> Option<Vec<OutboundFrame>> {
        let request = match ControlRequest::parse(text) {
            Ok(request) => request,
            Err(err) if !err.expects_reply() => {
                warn!("dropping {err}");
                return None;
            }
            Err(err) => {
                debug!("rejecting request: {err}");
                return Some(serialize(Reply::error(err.to_string())));
            }
        };

        let action = request.action();
        let reply = match self.dispatch(request).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!("{action} failed: {err}");
                Reply::error(err.to_string())
            }
        };
        Some(serialize(reply))
    }

    /// Runs a validated request to completion.
    pub async fn dispatch(&self, request: ControlRequest) -> Result<Reply, RequestError> {
        match request {
            ControlRequest::GetSortedDicom { dicom_folder } => {
                let folder = self.resolve(&dicom_folder);
                debug!("indexing {}", folder.display());
                let members = self
                    .run_blocking(move |source| Ok(source.index(&folder)?))
                    .await?;
                Ok(Reply::SortedDicom(SortedDicomResponse::success(&members)))
            }
            ControlRequest::GetDicomPixelData { file_path } => {
                let file = self.resolve(&file_path);
                debug!("extracting {}", file.display());
                let reply = self
                    .run_blocking(move |source| {
                        let payload = source.extract(&file)?;
                        let metadata = MetadataFrame::success(&payload);
                        let bytes = encode_samples(payload.samples())?;
                        Ok(PixelDataReply {
                            metadata,
                            payload: PayloadFrame(bytes),
                        })
                    })
                    .await?;
                Ok(Reply::PixelData(reply))
            }
        }
    }

    /// Joins relative client paths onto the configured base directory.
    fn resolve(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw);
        match &self.base_directory {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    async fn run_blocking<T, F>(&self, job: F) -> Result<T, RequestError>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> Result<T, RequestError> + Send + 'static,
    {
        let source = Arc::clone(&self.source);
        let task = tokio::task::spawn_blocking(move || job(source.as_ref()));

        let joined = match self.scan_timeout {
            // On timeout the blocking thread keeps running to completion;
            // only its result is discarded.
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| RequestError::TimedOut(limit))?,
            None => task.await,
        };
        joined.map_err(|err| RequestError::Worker(err.to_string()))?
    }
}

fn serialize(reply: Reply) -> Vec<OutboundFrame> {
    reply.into_frames().unwrap_or_else(|err| {
        error!("failed to serialize reply: {err}");
        vec![OutboundFrame::Text(SERIALIZE_FAILED.to_string())]
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::mock::MockSeriesSource;
    use crate::domain::messages::{ErrorResponse, MetadataFrame};
    use dicomws_core::{decode_samples, PixelPayload, SeriesMember};

    const IDENTITY: [f64; 6] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

    fn service(source: MockSeriesSource) -> RequestService<MockSeriesSource> {
        RequestService::new(source, &ServerConfig::default())
    }

    fn member(path: &str, instance: &str) -> SeriesMember {
        SeriesMember {
            file_path: PathBuf::from(path),
            protocol_name: "CT".to_string(),
            instance_key: instance.to_string(),
            image_position: [0.0; 3],
            image_orientation: IDENTITY,
        }
    }

    fn only_error(frames: Option<Vec<OutboundFrame>>) -> String {
        let frames = frames.expect("a reply is owed");
        assert_eq!(frames.len(), 1, "errors are a single frame");
        let OutboundFrame::Text(text) = &frames[0] else {
            panic!("error reply must be a text frame");
        };
        serde_json::from_str::<ErrorResponse>(text).unwrap().error
    }

    #[tokio::test]
    async fn test_sorted_dicom_lists_members_in_source_order() {
        // Arrange
        let source = MockSeriesSource::new()
            .with_members(vec![member("/d/b.img", "001"), member("/d/a.img", "002")]);
        let service = service(source);

        // Act
        let frames = service
            .handle_text(r#"{"action":"get_sorted_dicom","dicom_folder":"/d"}"#)
            .await
            .unwrap();

        // Assert
        let OutboundFrame::Text(text) = &frames[0] else {
            panic!("listing must be a text frame");
        };
        let response: SortedDicomResponse = serde_json::from_str(text).unwrap();
        assert_eq!(response.status, "success");
        let paths: Vec<_> = response
            .sorted_dicom_files
            .iter()
            .map(|e| e.file_path.as_str())
            .collect();
        assert_eq!(paths, vec!["/d/b.img", "/d/a.img"]);
    }

    #[tokio::test]
    async fn test_pixel_data_sends_metadata_then_samples() {
        let payload =
            PixelPayload::new([0.0, 0.0, 5.0], IDENTITY, vec![2, 3], vec![1, 2, 3, 4, 5, 6])
                .unwrap();
        let service = service(MockSeriesSource::new().with_payload(payload));

        let frames = service
            .handle_text(r#"{"action":"get_dicom_pixel_data","file_path":"/d/a.dcm"}"#)
            .await
            .unwrap();

        assert_eq!(frames.len(), 2);
        let OutboundFrame::Text(text) = &frames[0] else {
            panic!("metadata must come first as text");
        };
        let metadata: MetadataFrame = serde_json::from_str(text).unwrap();
        assert_eq!(metadata.shape, vec![2, 3]);
        assert_eq!(metadata.origin, [0.0, 0.0, 5.0]);
        let OutboundFrame::Binary(bytes) = &frames[1] else {
            panic!("samples must follow as binary");
        };
        assert_eq!(decode_samples(bytes).unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_invalid_action_gets_error_reply() {
        let service = service(MockSeriesSource::new());

        let error = only_error(service.handle_text(r#"{"action":"reboot"}"#).await);

        assert_eq!(error, "Invalid action");
    }

    #[tokio::test]
    async fn test_missing_folder_gets_not_provided_error() {
        let source = MockSeriesSource::new();
        let service = RequestService::new(source, &ServerConfig::default());

        let error = only_error(service.handle_text(r#"{"action":"get_sorted_dicom"}"#).await);

        assert_eq!(error, "dicom_folder not provided");
        assert!(service.source.requested_paths().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_frame_gets_no_reply() {
        let service = service(MockSeriesSource::new());

        assert!(service.handle_text("{oops").await.is_none());
        assert!(service.handle_text(r#"{"file_path":"/a"}"#).await.is_none());
    }

    #[tokio::test]
    async fn test_source_failure_becomes_error_text() {
        let service = service(MockSeriesSource::new());

        let error = only_error(
            service
                .handle_text(r#"{"action":"get_sorted_dicom","dicom_folder":"/missing"}"#)
                .await,
        );

        assert_eq!(error, "directory not found: /missing");
    }

    #[tokio::test]
    async fn test_relative_paths_resolve_against_base_directory() {
        // Arrange
        let config = ServerConfig {
            base_directory: Some(PathBuf::from("/data/cases")),
            ..ServerConfig::default()
        };
        let service = RequestService::new(MockSeriesSource::new().with_members(Vec::new()), &config);

        // Act
        service
            .dispatch(ControlRequest::GetSortedDicom {
                dicom_folder: "patient-7".to_string(),
            })
            .await
            .unwrap();
        service
            .dispatch(ControlRequest::GetSortedDicom {
                dicom_folder: "/abs/path".to_string(),
            })
            .await
            .unwrap();

        // Assert
        assert_eq!(
            service.source.requested_paths(),
            vec![PathBuf::from("/data/cases/patient-7"), PathBuf::from("/abs/path")]
        );
    }

    #[tokio::test]
    async fn test_slow_source_times_out() {
        let config = ServerConfig {
            scan_timeout: Some(Duration::from_millis(50)),
            ..ServerConfig::default()
        };
        let source = MockSeriesSource::new()
            .with_members(Vec::new())
            .with_delay(Duration::from_millis(500));
        let service = RequestService::new(source, &config);

        let result = service
            .dispatch(ControlRequest::GetSortedDicom {
                dicom_folder: "/slow".to_string(),
            })
            .await;

        assert!(matches!(result, Err(RequestError::TimedOut(_))));
    }

    #[test]
    fn test_no_timeout_waits_for_slow_source() {
        let config = ServerConfig {
            scan_timeout: None,
            ..ServerConfig::default()
        };
        let source = MockSeriesSource::new()
            .with_members(vec![member("/d/x.dcm", "1")])
            .with_delay(Duration::from_millis(100));
        let service = RequestService::new(source, &config);

        let reply = tokio_test::block_on(service.dispatch(ControlRequest::GetSortedDicom {
            dicom_folder: "/d".to_string(),
        }))
        .unwrap();

        assert!(matches!(reply, Reply::SortedDicom(r) if r.sorted_dicom_files.len() == 1));
    }
}
