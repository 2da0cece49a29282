// castnode - HTTP ingest and transcode-dispatch node
//
// The library surface exists for integration tests; the binary in main.rs
// is the deployable node.

pub mod http;
pub mod server;

pub use http::{router, AppState};
pub use server::IngestServer;
