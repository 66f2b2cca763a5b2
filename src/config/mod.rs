//! Configuration types for storage, sync and the cache worker.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Key the application document is stored under.
pub const DEFAULT_STORAGE_KEY: &str = "pwa-app-data";

/// Version token baked into the cache worker.
pub const DEFAULT_WORKER_VERSION: &str = "v1.0.0";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "DESK_CONFIG";

/// Local document storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the persisted document.
    pub data_dir: PathBuf,
    /// Key (file stem) of the persisted document.
    pub key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            data_dir: data_dir.join("offline-desk"),
            key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

/// Remote sync configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Endpoint used when the `googleScriptUrl` setting is empty.
    pub endpoint: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout_secs: 30,
        }
    }
}

impl SyncConfig {
    /// Sets the fallback endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Cache worker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Application name used as the worker cache-name prefix.
    pub app_name: String,
    /// Version token baked into the worker.
    pub version: String,
    /// Assets fetched into the static bucket on install.
    pub static_assets: Vec<String>,
    /// Document served for uncached navigations while offline.
    pub offline_document: String,
    /// Path of the version manifest checked for updates.
    pub version_manifest: String,
    /// Directory for on-disk cache buckets. `desk serve` uses
    /// `<data_dir>/caches` when unset.
    pub cache_dir: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            app_name: "pwa-app".to_string(),
            version: DEFAULT_WORKER_VERSION.to_string(),
            static_assets: [
                "/",
                "/index.html",
                "/css/styles.css",
                "/js/app.js",
                "/js/features.js",
                "/js/storage.js",
                "/manifest.json",
                "/icons/icon-192x192.png",
                "/icons/icon-512x512.png",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            offline_document: "/index.html".to_string(),
            version_manifest: "/manifest.json".to_string(),
            cache_dir: None,
        }
    }
}

impl WorkerConfig {
    /// Sets the worker version token.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Replaces the static asset manifest.
    #[must_use]
    pub fn with_static_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.static_assets = assets.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the on-disk cache directory.
    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Name of the worker's own cache identity, e.g. `pwa-app-v1.0.0`.
    #[must_use]
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.app_name, self.version)
    }

    /// Name of the static asset bucket.
    #[must_use]
    pub fn static_cache(&self) -> String {
        format!("static-{}", self.version)
    }

    /// Name of the runtime (dynamic) bucket.
    #[must_use]
    pub fn dynamic_cache(&self) -> String {
        format!("dynamic-{}", self.version)
    }
}

/// Caching proxy server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Origin the worker fetches from.
    pub origin: String,
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:8080".to_string(),
            host: "127.0.0.1".to_string(),
            port: 9724,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Document storage.
    pub storage: StorageConfig,
    /// Remote sync.
    pub sync: SyncConfig,
    /// Cache worker.
    pub worker: WorkerConfig,
    /// Caching proxy.
    pub server: ServerConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the config file path: `DESK_CONFIG` if set, otherwise
    /// `$XDG_CONFIG_HOME/offline-desk/config.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            PathBuf::from(path)
        } else {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("offline-desk")
                .join("config.toml")
        }
    }

    /// Loads configuration from `path`, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> crate::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Loads configuration from `path`, writing a default template first if
    /// the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be written or the file
    /// cannot be parsed.
    pub fn load_or_create(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            log::info!("Wrote default config to {}", path.display());
            return Ok(config);
        }
        Self::load(path)
    }

    /// Saves the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }
}
