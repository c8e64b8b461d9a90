//! Configuration for the installer core.
//!
//! All settings are passed explicitly to [`Installer`](super::Installer);
//! the core holds no process-wide configuration.

use std::path::PathBuf;
use std::time::Duration;

use semver::Version;

use super::extract::ToolKind;
use super::retry::RetryPolicy;

/// Default chunk size for the transfer loop (80 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 80 * 1024;

/// Size assumed for percentage display when the server reports none (20 GiB).
pub const DEFAULT_ASSUMED_SIZE: u64 = 20 * 1024 * 1024 * 1024;

/// Overall HTTP transfer ceiling (3 hours).
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(3 * 60 * 60);

/// Longest wait for a response or for the next body bytes.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Free space required on the destination volume before downloading (15 GiB).
pub const DEFAULT_REQUIRED_FREE_SPACE: u64 = 15 * 1024 * 1024 * 1024;

/// Connection establishment timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Extraction subprocess ceiling (10 minutes).
pub const DEFAULT_EXTRACT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Wait before re-checking a locked archive.
pub const DEFAULT_LOCK_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Minimum interval between progress snapshots.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Marker files that indicate a previous installation.
pub const DEFAULT_MARKER_FILES: &[&str] = &[
    "version.txt",
    "Atlas.exe",
    "Atlas_Interactivo.exe",
    "AtlasInteractivo.exe",
    "app.exe",
    "main.exe",
];

/// Settings for the transfer engine.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Overall request timeout.
    pub timeout: Duration,
    /// Connection establishment timeout.
    pub connect_timeout: Duration,
    /// A request without response headers, or a body without new bytes, for
    /// this long fails the attempt as a network error.
    pub stall_timeout: Duration,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
    /// Bytes read from the network per loop iteration.
    pub chunk_size: usize,
    /// Size used for percentages when the server does not report one.
    pub assumed_size: u64,
    /// Minimum interval between progress snapshots.
    pub progress_interval: Duration,
    /// Resume partial downloads with HTTP range requests across attempts.
    pub resume: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TRANSFER_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            user_agent: format!("atlas-installer/{}", crate::VERSION),
            chunk_size: DEFAULT_CHUNK_SIZE,
            assumed_size: DEFAULT_ASSUMED_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            resume: true,
        }
    }
}

/// Settings for the archive extractor.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Tools to try, in order of preference.
    pub preference: Vec<ToolKind>,
    /// Explicit tool binary; skips discovery when set.
    pub tool_path: Option<PathBuf>,
    /// Wall-clock ceiling for one tool invocation.
    pub timeout: Duration,
    /// Wait before re-checking an archive that is still locked.
    pub lock_retry_delay: Duration,
    /// Maximum entries extracted by the fallback strategy.
    pub fallback_entry_limit: usize,
    /// Main executable to mark as executable after extraction (Unix).
    pub executable: Option<String>,
    /// Lift the contents of a single top-level wrapper directory into the
    /// destination.
    pub flatten_wrapper: bool,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            preference: vec![ToolKind::SevenZip, ToolKind::Tar],
            tool_path: None,
            timeout: DEFAULT_EXTRACT_TIMEOUT,
            lock_retry_delay: DEFAULT_LOCK_RETRY_DELAY,
            fallback_entry_limit: 500,
            executable: Some("Atlas_Interactivo".to_string()),
            flatten_wrapper: true,
        }
    }
}

/// Settings for the installation state probe.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// File names whose presence marks a complete installation.
    pub markers: Vec<String>,
    /// An installation with more files than this counts as complete.
    pub min_file_count: usize,
    /// Only the manifest counts as evidence of a complete installation.
    pub require_manifest: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            markers: DEFAULT_MARKER_FILES.iter().map(|s| s.to_string()).collect(),
            min_file_count: 5,
            require_manifest: false,
        }
    }
}

/// Configuration for the installer.
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    /// Short product slug used for temp and manifest file names.
    pub product: String,

    /// Version recorded in the manifest.
    pub product_version: Version,

    /// Directory for temporary downloads.
    pub temp_dir: PathBuf,

    /// Transfer engine settings.
    pub transfer: TransferConfig,

    /// Archive extractor settings.
    pub extractor: ExtractorConfig,

    /// Installation probe settings.
    pub probe: ProbeConfig,

    /// Free space the destination volume must offer before a download
    /// starts. `None` skips the check.
    pub required_free_space: Option<u64>,

    /// Default retry policy (overridden per request by `max_retries`).
    pub retry: RetryPolicy,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            product: "atlas".to_string(),
            product_version: Version::new(1, 0, 0),
            temp_dir: std::env::temp_dir(),
            transfer: TransferConfig::default(),
            extractor: ExtractorConfig::default(),
            probe: ProbeConfig::default(),
            required_free_space: Some(DEFAULT_REQUIRED_FREE_SPACE),
            retry: RetryPolicy::default(),
        }
    }
}

impl InstallerConfig {
    /// Create a configuration for the given product slug.
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            ..Default::default()
        }
    }

    /// Name of the manifest written into the destination directory.
    pub fn manifest_file_name(&self) -> String {
        format!(".{}_version.json", self.product)
    }

    /// Set the temporary directory.
    pub fn with_temp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_dir = path.into();
        self
    }

    /// Set the product version recorded in the manifest.
    pub fn with_product_version(mut self, version: Version) -> Self {
        self.product_version = version;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the transfer settings.
    pub fn with_transfer(mut self, transfer: TransferConfig) -> Self {
        self.transfer = transfer;
        self
    }

    /// Set the extractor settings.
    pub fn with_extractor(mut self, extractor: ExtractorConfig) -> Self {
        self.extractor = extractor;
        self
    }

    /// Set the probe settings.
    pub fn with_probe(mut self, probe: ProbeConfig) -> Self {
        self.probe = probe;
        self
    }

    /// Set the free space required before downloading (`None` disables).
    pub fn with_required_free_space(mut self, bytes: Option<u64>) -> Self {
        self.required_free_space = bytes;
        self
    }
}
