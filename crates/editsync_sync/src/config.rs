//! Configuration for the sync layer.

use editsync_protocol::MethodEntity;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Default maximum number of concurrent download workers.
pub const DEFAULT_MAX_CONNECTIONS: usize = 5;

/// Port marker the server embeds in upload URLs it hands out.
pub const DEFAULT_INTERNAL_PORT_MARKER: &str = ":8888";

/// Configuration for server communication.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the server, always ending with `/`.
    pub server_host: String,
    /// Maximum number of concurrent download workers.
    pub max_connections: usize,
    /// Socket timeout for every request.
    pub timeout: Duration,
    /// Marker in upload URLs that refers to the server's internal port.
    pub internal_port_marker: String,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl SyncConfig {
    /// Creates a configuration for the given server.
    pub fn new(server_host: impl Into<String>) -> Self {
        Self {
            server_host: with_trailing_slash(server_host.into()),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            timeout: Duration::from_secs(30),
            internal_port_marker: DEFAULT_INTERNAL_PORT_MARKER.to_string(),
            user_agent: format!("editsync/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Sets the maximum number of concurrent download workers.
    ///
    /// Zero is treated as one.
    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.max(1);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the internal port marker.
    #[must_use]
    pub fn with_internal_port_marker(mut self, marker: impl Into<String>) -> Self {
        self.internal_port_marker = marker.into();
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Returns the endpoint URL of a method.
    pub fn method_url(&self, method: &MethodEntity) -> String {
        format!("{}{}", self.server_host, method.method_name())
    }

    /// Points an upload URL handed out by the server at the configured host.
    ///
    /// Everything up to and including the internal port marker (and the
    /// slash following it) is replaced by `server_host`. URLs without the
    /// marker are returned unchanged.
    pub fn rewrite_upload_url(&self, url: &str) -> String {
        if self.internal_port_marker.is_empty() {
            return url.to_string();
        }
        match url.find(&self.internal_port_marker) {
            Some(idx) => {
                let rest = &url[idx + self.internal_port_marker.len()..];
                let rest = rest.strip_prefix('/').unwrap_or(rest);
                format!("{}{}", self.server_host, rest)
            }
            None => url.to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("http://localhost:8080/")
    }
}

/// Configuration for local resource files.
#[derive(Debug, Clone)]
pub struct ResourceConfig {
    /// Directory holding one sub-directory per resource.
    pub resource_root: PathBuf,
    /// How long loaded resources stay cached.
    pub cache_ttl: Duration,
}

impl ResourceConfig {
    /// Creates a configuration rooted at `resource_root`.
    pub fn new(resource_root: impl Into<PathBuf>) -> Self {
        Self {
            resource_root: resource_root.into(),
            cache_ttl: Duration::from_secs(60),
        }
    }

    /// Sets the cache time-to-live.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Returns the directory of a resource.
    pub fn resource_dir(&self, id: Uuid) -> PathBuf {
        self.resource_root.join(id.to_string())
    }

    /// Returns the file holding one revision of a resource.
    pub fn revision_path(&self, id: Uuid, revision: i64) -> PathBuf {
        self.resource_dir(id).join(revision.to_string())
    }

    /// Returns the root directory.
    pub fn resource_root(&self) -> &Path {
        &self.resource_root
    }
}

fn with_trailing_slash(mut host: String) -> String {
    if !host.ends_with('/') {
        host.push('/');
    }
    host
}
