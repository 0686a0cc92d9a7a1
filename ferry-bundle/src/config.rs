use chrono::Duration;

/// Lifetime of a bundle after creation
pub const DEFAULT_TTL_SECS: i64 = 300;

/// Configuration for bundles, chunked uploads and archives
#[derive(Debug, Clone)]
pub struct BundleConfig {
    /// How long a bundle stays retrievable
    pub ttl: Duration,

    /// Fresh codes tried before giving up on `create`
    pub code_attempts: u32,

    /// Upper bound on `total_chunks` for one upload
    pub max_chunks: u32,

    /// Longest accepted file name, in characters
    pub max_display_name_len: usize,

    /// Compression used for archive entries
    pub archive_compression: ArchiveCompression,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::seconds(DEFAULT_TTL_SECS),
            code_attempts: 32,
            max_chunks: 10_000,
            max_display_name_len: 255,
            archive_compression: ArchiveCompression::Deflate,
        }
    }
}

/// How file contents are stored inside the download archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveCompression {
    /// Bytes copied as-is
    Stored,
    #[default]
    Deflate,
}

impl BundleConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bundle lifetime
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set how many codes `create` tries
    pub fn with_code_attempts(mut self, attempts: u32) -> Self {
        self.code_attempts = attempts.max(1);
        self
    }

    /// Set max chunks per upload
    pub fn with_max_chunks(mut self, max: u32) -> Self {
        self.max_chunks = max.max(1);
        self
    }

    pub fn with_max_display_name_len(mut self, len: usize) -> Self {
        self.max_display_name_len = len.max(1);
        self
    }

    pub fn with_archive_compression(mut self, compression: ArchiveCompression) -> Self {
        self.archive_compression = compression;
        self
    }
}
