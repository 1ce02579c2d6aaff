/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum DoubaoError {
    /// Connection could not be established, or dropped while sending.
    #[error("network error: {0}")]
    Network(#[source] std::io::Error),
    /// Connection was open but nothing arrived before the read deadline.
    #[error("timeout: no response within {waited_ms} ms")]
    Timeout { waited_ms: u64 },
    /// Response body was not the expected chat-completion JSON.
    #[error("json parse error: {0}")]
    JsonParse(String),
    /// Caller-supplied credential, settings or text failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The image source could not produce an image.
    #[error("camera error: {0}")]
    Camera(String),
    /// Encoded image exceeds the configured limit.
    #[error("image too large: {size} bytes exceeds limit of {limit} bytes")]
    ImageTooLarge { size: usize, limit: usize },
    /// Non-success HTTP status with the API's error code and message.
    #[error("api error {status}{}: {message}", code_suffix(.code))]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|code| format!(" ({code})"))
        .unwrap_or_default()
}

impl DoubaoError {
    /// Whether a fresh attempt may succeed where this one failed.
    ///
    /// Only network and timeout failures qualify; everything else points at
    /// the request or response contents and will fail the same way again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout { .. })
    }
}
