use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use castnode::IngestServer;
use castnode_core::storage::{FileStore, MemoryStore, ObjectStore, StorageBackend};
use castnode_core::{logging, profile, Config, IngestNode, VideoProfile};

#[derive(Parser, Debug)]
#[command(name = "castnode")]
#[command(about = "Live video broadcaster node - HTTP segment ingest and transcode dispatch", long_about = None)]
struct Args {
    /// Config file path (YAML)
    #[arg(long, env = "CASTNODE_CONFIG")]
    config: Option<String>,

    /// HTTP bind host
    #[arg(long, env = "CASTNODE_HOST")]
    host: Option<String>,

    /// HTTP bind port
    #[arg(long, env = "CASTNODE_PORT")]
    port: Option<u16>,

    /// Enable the HTTP segment ingest endpoints
    #[arg(long, env = "CASTNODE_HTTP_INGEST")]
    http_ingest: Option<bool>,

    /// Transcoding options: a JSON profile file path or a comma-separated
    /// list of preset names
    #[arg(long, env = "CASTNODE_TRANSCODING_OPTIONS")]
    transcoding_options: Option<String>,

    /// Auth webhook URL; unset disables stream authentication
    #[arg(long, env = "CASTNODE_AUTH_WEBHOOK_URL")]
    auth_webhook_url: Option<String>,

    /// Push timeout in milliseconds
    #[arg(long, env = "CASTNODE_PUSH_TIMEOUT_MS")]
    push_timeout_ms: Option<u64>,

    /// Maximum concurrent live streams
    #[arg(long, env = "CASTNODE_MAX_SESSIONS")]
    max_sessions: Option<usize>,

    /// Orchestrator endpoint; repeat for a pool
    #[arg(long = "orchestrator", env = "CASTNODE_ORCHESTRATORS", value_delimiter = ',')]
    orchestrators: Vec<String>,

    /// Storage backend (memory, file)
    #[arg(long, env = "CASTNODE_STORAGE_BACKEND")]
    storage_backend: Option<String>,

    /// Base directory for the file storage backend
    #[arg(long, env = "CASTNODE_STORAGE_ROOT")]
    storage_root: Option<String>,

    /// Recording storage backend (memory, file); unset disables recording
    #[arg(long, env = "CASTNODE_RECORD_BACKEND")]
    record_backend: Option<String>,

    /// Node ID used in recording layouts (defaults to the hostname)
    #[arg(long, env = "CASTNODE_NODE_ID")]
    node_id: Option<String>,
}

impl Args {
    /// CLI flags override file/env configuration.
    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(http_ingest) = self.http_ingest {
            config.server.http_ingest = http_ingest;
        }
        if let Some(opts) = self.transcoding_options {
            config.ingest.transcoding_options = opts;
        }
        if let Some(url) = self.auth_webhook_url {
            config.ingest.auth_webhook_url = url;
        }
        if let Some(timeout) = self.push_timeout_ms {
            config.ingest.push_timeout_ms = timeout;
        }
        if let Some(max) = self.max_sessions {
            config.ingest.max_sessions = max;
        }
        if !self.orchestrators.is_empty() {
            config.ingest.orchestrators = self.orchestrators;
        }
        if let Some(backend) = self.storage_backend {
            config.storage.backend = backend;
        }
        if let Some(root) = self.storage_root {
            config.storage.root = root;
        }
        if let Some(backend) = self.record_backend {
            config.storage.record_backend = backend;
        }
        if let Some(node_id) = self.node_id {
            config.ingest.node_id = node_id;
        }
    }
}

/// Resolve `--transcoding-options` into the default profile set.
fn default_profiles(options: &str) -> Result<Vec<VideoProfile>> {
    let options = options.trim();
    if options.is_empty() {
        return Ok(vec![profile::preset("P240p30fps16x9")
            .ok_or_else(|| anyhow::anyhow!("missing built-in default preset"))?]);
    }
    if std::path::Path::new(options).exists() || options.ends_with(".json") {
        let raw = std::fs::read_to_string(options)?;
        return Ok(profile::profiles_from_json(&raw)?);
    }
    Ok(profile::parse_preset_list(options)?)
}

fn build_store(backend: &str, root: &str) -> Result<Arc<dyn ObjectStore>> {
    match StorageBackend::parse(backend) {
        Some(StorageBackend::File) => Ok(Arc::new(FileStore::new(root))),
        Some(StorageBackend::Memory) => Ok(Arc::new(MemoryStore::new())),
        None => anyhow::bail!("invalid storage backend: {backend}"),
    }
}

fn default_node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "castnode".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())
        .map_err(|e| anyhow::anyhow!("failed to load config: {e}"))?;
    args.apply(&mut config);
    if let Err(errors) = config.validate() {
        anyhow::bail!("invalid configuration: {}", errors.join("; "));
    }

    logging::init_logging(&config.logging)?;
    info!("castnode starting on {}", config.http_address());

    let profiles = default_profiles(&config.ingest.transcoding_options)?;
    info!(
        "Default transcoding profiles: {}",
        profiles
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    );

    let node_id = if config.ingest.node_id.is_empty() {
        default_node_id()
    } else {
        config.ingest.node_id.clone()
    };
    info!("Node ID: {}", node_id);

    let mut node = IngestNode::new(
        node_id,
        config.ingest.push_timeout(),
        config.ingest.max_sessions,
    )
    .with_default_profiles(profiles)
    .with_storage(build_store(&config.storage.backend, &config.storage.root)?)
    .with_orchestrators(config.ingest.orchestrators.clone());

    if !config.ingest.auth_webhook_url.is_empty() {
        info!("Auth webhook: {}", config.ingest.auth_webhook_url);
        node = node.with_auth_webhook(config.ingest.auth_webhook_url.clone());
    }
    if !config.storage.record_backend.is_empty() {
        node = node.with_record_storage(build_store(
            &config.storage.record_backend,
            &config.storage.record_root,
        )?);
    }

    IngestServer::new(config, Arc::new(node)).run().await
}
