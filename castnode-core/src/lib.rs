// castnode-core - ingest machinery for the castnode broadcaster
//
// Layout:
// - profile/segment - media model (formats, profiles, presets, segments)
// - storage/        - object store backends and per-stream sessions
// - webhook         - outbound stream authentication
// - registry        - live connections and identity maps
// - watchdog        - inactivity reaper and liveness kicker
// - transcode       - orchestrator pool and the segment-processing seam
// - node            - process-wide state bundle
// - config/logging  - configuration and tracing setup

pub mod config;
pub mod error;
pub mod logging;
pub mod node;
pub mod playlist;
pub mod profile;
pub mod registry;
pub mod segment;
pub mod storage;
pub mod transcode;
pub mod watchdog;
pub mod webhook;

// Re-exports for convenience
pub use config::Config;
pub use error::{IngestError, IngestResult};
pub use node::IngestNode;
pub use profile::{Format, VideoProfile};
pub use registry::{Connection, ConnectionRegistry};
pub use segment::MediaSegment;
pub use storage::{FileStore, MemoryStore, ObjectStore, StoreSession};
pub use transcode::{OrchestratorPool, PoolSegmentProcessor, SegmentProcessor, SessionManager};
pub use watchdog::{spawn_reaper, start_kicker, KickerGuard};
pub use webhook::{AuthResponse, AuthWebhookClient};
