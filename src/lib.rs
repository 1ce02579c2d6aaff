//! `doubao-http` is a blocking client for the Volcengine Ark (Doubao)
//! chat-completions API, sized for small devices.
//!
//! Request bodies are uploaded with chunked transfer encoding in small,
//! paced writes, and network or timeout failures are retried with linear
//! backoff:
//! - [`DoubaoClient::ask`]
//! - [`DoubaoClient::ask_with_image`]
//! - [`DoubaoClient::ask_with_image_url`]
//! - [`DoubaoClient::ask_with_camera`]
//! - [`DoubaoClient::perform_request`]
//!
//! The default [`TlsConnector`] does **not** verify server certificates.

mod chunked;
mod client;
mod error;
mod options;
mod payload;
mod response;
mod retry;
mod transport;
mod wire;

pub use client::{DoubaoClient, ImageSource};
pub use error::DoubaoError;
pub use options::{ClientOptions, Endpoint};
pub use payload::{build_payload, build_url_image_payload, validate_config, ChatSettings, Image};
pub use response::get_field;
pub use retry::{RetryDecision, RetryPolicy, Sleep, ThreadSleep};
pub use transport::{
    Connector, HttpTransport, PlainConnector, Request, Socket, TlsConnector, Transport,
};

pub type Result<T> = std::result::Result<T, DoubaoError>;
