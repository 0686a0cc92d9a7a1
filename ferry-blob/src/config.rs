/// Configuration for blob stores
#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// Size of each read from a stored blob. Bounds per-stream memory.
    pub read_buffer_bytes: usize,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            read_buffer_bytes: 64 * 1024, // 64KB
        }
    }
}

impl BlobConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set read buffer size (clamped to at least 1 byte)
    pub fn with_read_buffer_bytes(mut self, bytes: usize) -> Self {
        self.read_buffer_bytes = bytes.max(1);
        self
    }
}
