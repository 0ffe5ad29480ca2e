//! Stagecast Core - shared library for the stage coordination server.
//!
//! This crate implements a real-time, many-rooms "watch party for a live
//! stage" protocol: a host creates a room, an audience joins over
//! WebSocket, and the dispatcher keeps everyone's playback, chat, queue, and
//! suggestions in sync.
//!
//! # Architecture
//!
//! - [`model`]: core data types (`User`, `Room`, `QueueItem`, `Suggestion`, ...)
//! - [`registry`]: process-wide room/user index and outbound delivery channels
//! - [`protocol`]: the WebSocket wire protocol (`Inbound`/`Outbound`)
//! - [`dispatcher`]: the protocol state machine
//! - [`queue`]: queue ordering and pre-download scheduling
//! - [`fanout`]: broadcast helpers with per-recipient error isolation
//! - [`external`]: audio analysis / visualizer synthesis / source resolution interfaces
//! - [`storage`]: blob storage for uploaded and pre-downloaded audio
//! - [`runtime`]: task spawning abstraction for async runtime independence
//! - [`state`]: server configuration
//! - [`bootstrap`]: composition root wiring all services together
//! - [`error`]: centralized error types
//! - [`api`]: HTTP/WebSocket transport layer
//!
//! # Abstraction Traits
//!
//! - [`TaskSpawner`](runtime::TaskSpawner): spawning background tasks (pre-download)
//! - [`AudioAnalyzer`](external::AudioAnalyzer), [`ParamSynthesizer`](external::ParamSynthesizer),
//!   [`AudioSourceResolver`](external::AudioSourceResolver): external collaborators
//! - [`BlobStore`](storage::BlobStore): where uploaded/downloaded audio lives

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod dispatcher;
pub mod error;
pub mod external;
pub mod fanout;
pub mod ids;
pub mod model;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod runtime;
pub mod state;
pub mod storage;
pub mod utils;

pub use api::{start_server, AppState, AppStateBuilder, ServerError, WsConnectionManager};
pub use bootstrap::{bootstrap_services, BootstrappedServices};
pub use dispatcher::Dispatcher;
pub use error::{ErrorCode, StageError, StageResult};
pub use external::{AudioAnalyzer, AudioSourceResolver, HttpCollaborator, ParamSynthesizer};
pub use registry::Registry;
pub use runtime::{TaskSpawner, TokioSpawner};
pub use state::Config;
pub use storage::{BlobStore, FsBlobStore};
