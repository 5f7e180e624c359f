use std::path::{Path, PathBuf};

/// Default maximum number of fields accepted in a form body.
pub const DEFAULT_FIELD_COUNT_LIMIT: usize = 1000;

/// Default maximum size of a buffered request body (1 MiB).
pub const DEFAULT_BODY_SIZE_LIMIT: usize = 1 << 20;

/// Default size of each read when streaming a synchronous body.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Settings shared by the message converters.
///
/// ```rust
/// use syncbridge::ConverterConfig;
///
/// let config = ConverterConfig::default()
///     .with_body_size_limit(4 << 20)
///     .with_field_count_limit(200);
///
/// assert_eq!(config.body_size_limit(), 4 << 20);
/// ```
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    field_count_limit: usize,
    body_size_limit: usize,
    chunk_size: usize,
    tmp_dir: PathBuf,
    server_software: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        ConverterConfig {
            field_count_limit: DEFAULT_FIELD_COUNT_LIMIT,
            body_size_limit: DEFAULT_BODY_SIZE_LIMIT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            tmp_dir: std::env::temp_dir(),
            server_software: concat!("syncbridge/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl ConverterConfig {
    /// Maximum number of form fields, files included.
    pub fn with_field_count_limit(mut self, limit: usize) -> Self {
        self.field_count_limit = limit;
        self
    }

    /// Maximum number of body bytes buffered in memory.
    pub fn with_body_size_limit(mut self, limit: usize) -> Self {
        self.body_size_limit = limit;
        self
    }

    /// Size of each blocking read when streaming a response body. Zero is
    /// treated as one.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Directory that spooled uploads are written to.
    pub fn with_tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = dir.into();
        self
    }

    /// Value reported as the server software in [`ServerParams`](crate::ServerParams).
    pub fn with_server_software(mut self, software: impl Into<String>) -> Self {
        self.server_software = software.into();
        self
    }

    pub fn field_count_limit(&self) -> usize {
        self.field_count_limit
    }

    pub fn body_size_limit(&self) -> usize {
        self.body_size_limit
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    pub fn server_software(&self) -> &str {
        &self.server_software
    }
}
