//! Configuration loading and resolution.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pql::sample::{sample_data, sample_registry};
use pql::{DispatchTable, MemoryStore, Registry};

use crate::session::AccessMode;
use crate::types::ServerResult;

pub const REGISTRY_ENV: &str = "PQL_REGISTRY";
pub const DATA_ENV: &str = "PQL_DATA";
pub const TOKEN_ENV: &str = "PQL_TOKEN";

/// Where the registry came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrySource {
    File(PathBuf),
    Sample,
}

impl std::fmt::Display for RegistrySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrySource::File(path) => write!(f, "{}", path.display()),
            RegistrySource::Sample => f.write_str("built-in sample"),
        }
    }
}

/// Resolve the registry file: flag, then `PQL_REGISTRY`, then
/// `./.pql/registry.json`, then `~/.pql/registry.json`. `None` means the
/// built-in sample registry.
pub fn resolve_registry_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    if let Ok(env_path) = std::env::var(REGISTRY_ENV) {
        if !env_path.is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }

    let cwd_registry = PathBuf::from(".pql/registry.json");
    if cwd_registry.exists() {
        return Some(cwd_registry);
    }

    let home_registry = home_dir().join(".pql/registry.json");
    if home_registry.exists() {
        return Some(home_registry);
    }

    None
}

/// Seed data file: flag, then `PQL_DATA`.
pub fn resolve_data_path(explicit: Option<&str>) -> Option<PathBuf> {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var(DATA_ENV).ok().filter(|s| !s.is_empty()))
        .map(PathBuf::from)
}

/// Bearer token: flag, then `PQL_TOKEN`.
pub fn resolve_token(explicit: Option<String>) -> Option<String> {
    explicit.or_else(|| std::env::var(TOKEN_ENV).ok().filter(|s| !s.is_empty()))
}

fn home_dir() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
}

/// Tunables for sessions, execution, and the outbound stream.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub idle_timeout: Duration,
    pub max_session_age: Duration,
    pub sweep_interval: Duration,
    pub execution_timeout: Duration,
    /// Rows per `rows` frame.
    pub batch_size: usize,
    /// Frames buffered per connection before producers wait.
    pub outbound_capacity: usize,
    /// How long a producer waits for outbound space before the connection is dropped.
    pub send_timeout: Duration,
    /// Force every session read-only.
    pub read_only: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30 * 60),
            max_session_age: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60),
            execution_timeout: Duration::from_secs(30),
            batch_size: 100,
            outbound_capacity: 64,
            send_timeout: Duration::from_secs(10),
            read_only: false,
        }
    }
}

impl ServerConfig {
    /// Mode a new session actually gets.
    pub fn effective_mode(&self, requested: AccessMode) -> AccessMode {
        if self.read_only {
            AccessMode::ReadOnly
        } else {
            requested
        }
    }
}

/// Registry plus the adaptors that serve it. Built once at startup.
#[derive(Clone)]
pub struct Backend {
    pub registry: Arc<Registry>,
    pub dispatch: Arc<DispatchTable>,
    pub source: RegistrySource,
}

impl Backend {
    /// Wire a registry to an existing dispatch table, checking both agree.
    pub fn new(registry: Registry, dispatch: DispatchTable, source: RegistrySource) -> ServerResult<Self> {
        registry.validate()?;
        dispatch.verify(&registry)?;
        Ok(Self {
            registry: Arc::new(registry),
            dispatch: Arc::new(dispatch),
            source,
        })
    }

    /// The sample registry over an in-memory store seeded with sample rows.
    pub fn sample() -> ServerResult<Self> {
        let registry = sample_registry();
        let store = MemoryStore::new();
        store.seed(&registry, &sample_data())?;
        let dispatch = store.dispatch(&registry);
        Self::new(registry, dispatch, RegistrySource::Sample)
    }

    /// Resolve the registry and seed file, then build an in-memory backend.
    ///
    /// The sample registry is seeded with sample rows unless a data file is given.
    pub fn open(registry: Option<&str>, data: Option<&str>) -> ServerResult<Self> {
        let (registry, source) = match resolve_registry_path(registry) {
            Some(path) => (Registry::from_path(&path)?, RegistrySource::File(path)),
            None => (sample_registry(), RegistrySource::Sample),
        };
        tracing::info!("Registry: {source} ({} entities)", registry.len());

        let store = MemoryStore::new();
        match resolve_data_path(data) {
            Some(path) => {
                let rows = store.seed_from_path(&registry, &path)?;
                tracing::info!("Seeded {rows} rows from {}", path.display());
            }
            None if source == RegistrySource::Sample => {
                store.seed(&registry, &sample_data())?;
            }
            None => {}
        }

        let dispatch = store.dispatch(&registry);
        Self::new(registry, dispatch, source)
    }

    pub fn registry_path(&self) -> Option<&Path> {
        match &self.source {
            RegistrySource::File(path) => Some(path),
            RegistrySource::Sample => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_registry_wins() {
        assert_eq!(
            resolve_registry_path(Some("/tmp/r.json")),
            Some(PathBuf::from("/tmp/r.json"))
        );
        assert_eq!(resolve_data_path(Some("d.json")), Some(PathBuf::from("d.json")));
        assert_eq!(resolve_token(Some("t".into())).as_deref(), Some("t"));
    }

    #[test]
    fn test_open_registry_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        sample_registry().write_to_path(&path).unwrap();

        let backend = Backend::open(path.to_str(), None).unwrap();
        assert_eq!(backend.registry.len(), 4);
        assert_eq!(backend.registry_path(), Some(path.as_path()));
        assert_eq!(backend.dispatch.len(), 4);
    }

    #[test]
    fn test_sample_backend() {
        let backend = Backend::sample().unwrap();
        assert_eq!(backend.source, RegistrySource::Sample);
        assert!(backend.registry.entity("lease").is_some());
    }

    #[test]
    fn test_read_only_config_forces_mode() {
        let config = ServerConfig {
            read_only: true,
            ..ServerConfig::default()
        };
        assert_eq!(config.effective_mode(AccessMode::ReadWrite), AccessMode::ReadOnly);
        assert_eq!(
            ServerConfig::default().effective_mode(AccessMode::ReadWrite),
            AccessMode::ReadWrite
        );
    }
}
