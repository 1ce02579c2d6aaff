/// Remote chat-completions endpoint.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: "ark.cn-beijing.volces.com".to_owned(),
            port: 443,
            path: "/api/v3/chat/completions".to_owned(),
        }
    }
}

/// Configures the endpoint, socket timeouts, upload chunking and retry behavior.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Where requests are sent.
    pub endpoint: Endpoint,
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Wall-clock deadline for reading the whole response, in milliseconds.
    pub read_timeout_ms: u64,
    /// Total number of attempts, including the first.
    pub max_retries: u32,
    /// Base retry backoff in milliseconds (linear strategy).
    pub retry_backoff_ms: u64,
    /// Request body chunk size in bytes.
    pub chunk_size: usize,
    /// Pause after each written chunk, in milliseconds.
    pub chunk_delay_ms: u64,
    /// Upper bound on an attached base64 image, in bytes.
    pub max_image_bytes: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            connect_timeout_ms: 10_000,
            read_timeout_ms: 300_000,
            max_retries: 3,
            retry_backoff_ms: 1_000,
            chunk_size: 4096,
            chunk_delay_ms: 5,
            max_image_bytes: 256 * 1024,
        }
    }
}
