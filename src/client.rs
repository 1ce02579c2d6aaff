use std::fmt;
use std::time::Duration;

use crate::{
    payload::{
        build_payload, build_url_image_payload, ensure_image_fits, validate_config, validate_text,
    },
    retry::{RetryPolicy, ThreadSleep},
    transport::{HttpTransport, Request, TlsConnector, Transport},
    ChatSettings, ClientOptions, DoubaoError, Image, Result,
};

/// Produces an image on demand, typically a camera frame already encoded as base64.
pub trait ImageSource {
    fn capture(&mut self) -> std::result::Result<Image, String>;
}

#[derive(Clone)]
/// Blocking client for the Ark chat-completions endpoint.
pub struct DoubaoClient<T = HttpTransport<TlsConnector>> {
    transport: T,
    authorization: String,
    settings: ChatSettings,
    options: ClientOptions,
}

impl<T> fmt::Debug for DoubaoClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoubaoClient")
            .field("authorization", &"<redacted>")
            .field("settings", &self.settings)
            .field("options", &self.options)
            .finish()
    }
}

impl DoubaoClient {
    /// Creates a client that talks TLS to the default Ark endpoint.
    ///
    /// If the key is missing the `Bearer ` prefix, it is added automatically.
    pub fn new(api_key: impl AsRef<str>, settings: ChatSettings) -> Self {
        Self {
            transport: HttpTransport::new(TlsConnector),
            authorization: normalize_bearer_authorization(api_key.as_ref()),
            settings,
            options: ClientOptions::default(),
        }
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `ARK_API_KEY` — API key (Bearer prefix optional)
    /// - `ARK_MODEL_ID` — model or endpoint id
    /// - `ARK_SYSTEM_PROMPT` — optional system prompt
    /// - `ARK_TEMPERATURE` — optional temperature in `0.0..=1.0`
    ///
    /// # Example
    ///
    /// ```no_run
    /// use doubao_http::DoubaoClient;
    ///
    /// let client = DoubaoClient::from_env().expect("missing ARK_* env vars");
    /// ```
    pub fn from_env() -> Result<Self> {
        let api_key = required_env("ARK_API_KEY")?;
        let model = required_env("ARK_MODEL_ID")?;

        let mut settings = ChatSettings::new(model);
        if let Ok(prompt) = std::env::var("ARK_SYSTEM_PROMPT") {
            settings = settings.with_system_prompt(prompt);
        }
        if let Ok(raw) = std::env::var("ARK_TEMPERATURE") {
            let temperature = raw.trim().parse::<f32>().map_err(|_| {
                DoubaoError::InvalidInput(format!("ARK_TEMPERATURE is not a number: {raw}"))
            })?;
            settings = settings.with_temperature(temperature);
        }

        let client = Self::new(api_key, settings);
        validate_config(client.api_key(), &client.settings)?;
        Ok(client)
    }
}

impl<T: Transport> DoubaoClient<T> {
    /// Applies client options such as endpoint, timeouts and retry behavior.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    /// Replaces the model settings used by the `ask*` methods.
    pub fn with_settings(mut self, settings: ChatSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Swaps the transport, e.g. for plain TCP or a test double.
    pub fn with_transport<U: Transport>(self, transport: U) -> DoubaoClient<U> {
        DoubaoClient {
            transport,
            authorization: self.authorization,
            settings: self.settings,
            options: self.options,
        }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Sends a prepared JSON payload and returns the reply text.
    ///
    /// Network and timeout failures are retried up to
    /// [`ClientOptions::max_retries`] attempts with linear backoff; once
    /// attempts run out, the last attempt's error is returned as is.
    pub fn perform_request(&self, payload: &str) -> Result<String> {
        if payload.is_empty() {
            return Err(DoubaoError::InvalidInput("payload is empty".to_owned()));
        }
        if self.api_key().is_empty() {
            return Err(DoubaoError::InvalidInput("API key not set".to_owned()));
        }

        let request = Request {
            payload,
            authorization: &self.authorization,
            options: &self.options,
        };
        self.retry_policy()
            .run(&ThreadSleep, |_attempt| self.transport.send(&request))
    }

    /// Asks a text-only question.
    pub fn ask(&self, text: &str) -> Result<String> {
        self.preflight(text)?;
        let payload = build_payload(text, &self.settings, None)?;

        #[cfg(feature = "tracing")]
        tracing::info!("sending text request, payload length: {}", payload.len());

        self.perform_request(&payload)
    }

    /// Asks about an inline base64 image.
    pub fn ask_with_image(&self, text: &str, image: &Image) -> Result<String> {
        self.preflight(text)?;
        ensure_image_fits(image, self.options.max_image_bytes)?;
        let payload = build_payload(text, &self.settings, Some(image))?;

        #[cfg(feature = "tracing")]
        tracing::info!("sending image request, payload length: {}", payload.len());

        self.perform_request(&payload)
    }

    /// Asks about an image the API fetches from `image_url`.
    ///
    /// With an empty URL the question is sent as plain text.
    pub fn ask_with_image_url(&self, text: &str, image_url: &str) -> Result<String> {
        self.preflight(text)?;
        let payload = build_url_image_payload(text, image_url, &self.settings)?;

        #[cfg(feature = "tracing")]
        tracing::info!("sending URL image request, payload length: {}", payload.len());

        self.perform_request(&payload)
    }

    /// Captures an image from `source` and asks about it.
    pub fn ask_with_camera<S>(&self, text: &str, source: &mut S) -> Result<String>
    where
        S: ImageSource + ?Sized,
    {
        self.preflight(text)?;
        let image = source.capture().map_err(DoubaoError::Camera)?;
        if image.is_empty() {
            return Err(DoubaoError::Camera("failed to capture image".to_owned()));
        }
        self.ask_with_image(text, &image)
    }

    fn preflight(&self, text: &str) -> Result<()> {
        validate_config(self.api_key(), &self.settings)?;
        validate_text(text)
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.options.max_retries,
            Duration::from_millis(self.options.retry_backoff_ms),
        )
    }

    fn api_key(&self) -> &str {
        self.authorization
            .get(7..)
            .map(str::trim)
            .unwrap_or_default()
    }
}

fn required_env(name: &str) -> Result<String> {
    let value = std::env::var(name)
        .map_err(|_| DoubaoError::InvalidInput(format!("missing {name} environment variable")))?;
    if value.trim().is_empty() {
        return Err(DoubaoError::InvalidInput(format!("{name} is set but empty")));
    }
    Ok(value)
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
