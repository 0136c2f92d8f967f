//! dicomws-server library crate.
//!
//! A WebSocket data service that lets a browser viewer list the DICOM files
//! of a series in display order and fetch the pixels of one slice at a time.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser (JSON control frames, MessagePack pixel frames over WebSocket)
//!         ↕
//! [dicomws-server]
//!   ├── domain/           Pure types: control messages, ServerConfig
//!   ├── application/      Request handling behind the SeriesSource seam
//!   └── infrastructure/
//!         ├── ws_server/         Listener thread, accept loop, connection tasks
//!         └── session_registry/  Live connection bookkeeping
//!         ↕
//! [dicomws-core]  scanning, classification, pixel extraction, sample codec
//! ```
//!
//! # Layer rules
//!
//! - `domain` performs no I/O and knows nothing about WebSockets.
//! - `application` depends on `domain` and `dicomws-core`; the only async it
//!   does is hand blocking file work to tokio's blocking pool.
//! - `infrastructure` depends on all other layers plus `tokio` and `tungstenite`.
//!
//! # Embedding
//!
//! ```no_run
//! use std::sync::Arc;
//! use dicomws_server::application::{FsSeriesSource, RequestService};
//! use dicomws_server::domain::ServerConfig;
//! use dicomws_server::infrastructure::{Listener, SessionRegistry};
//!
//! let config = ServerConfig::default();
//! let service = RequestService::new(FsSeriesSource, &config);
//! let listener = Listener::start(&config, service, Arc::new(SessionRegistry::new()))?;
//! // ... serve until the host application exits ...
//! listener.stop();
//! # Ok::<(), dicomws_server::infrastructure::ListenerError>(())
//! ```

/// Domain layer: pure types (no I/O).
pub mod domain;

/// Application layer: request handling.
pub mod application;

/// Infrastructure layer: WebSocket listener and session registry.
pub mod infrastructure;
