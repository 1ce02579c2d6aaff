use serde_json::Value as JsonValue;

use crate::{
    chunked::{decode_chunked, find},
    wire::{ApiErrorEnvelope, ChatResponse},
    DoubaoError, Result,
};

const HEADER_END: &[u8] = b"\r\n\r\n";

/// A raw response split at the header boundary.
#[derive(Debug, PartialEq)]
pub(crate) struct ResponseParts<'a> {
    pub status: Option<u16>,
    pub chunked: bool,
    pub body: &'a [u8],
}

/// Splits at the first CRLFCRLF. Without one the whole input is the body
/// and no status is known.
pub(crate) fn split_response(raw: &[u8]) -> ResponseParts<'_> {
    let Some(boundary) = find(raw, HEADER_END) else {
        return ResponseParts {
            status: None,
            chunked: false,
            body: raw,
        };
    };

    let head_len = boundary + HEADER_END.len();
    let (status, chunked) = parse_head(&raw[..head_len]).unwrap_or((None, false));

    ResponseParts {
        status,
        chunked,
        body: &raw[head_len..],
    }
}

/// Status code and chunked flag of a header block. `None` if the block is not
/// a parseable HTTP response head; the body is still split off in that case.
fn parse_head(head: &[u8]) -> Option<(Option<u16>, bool)> {
    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut response = httparse::Response::new(&mut headers);
    match response.parse(head) {
        Ok(httparse::Status::Complete(_)) => {}
        _ => return None,
    }

    let chunked = response.headers.iter().any(|header| {
        header.name.eq_ignore_ascii_case("transfer-encoding")
            && String::from_utf8_lossy(header.value)
                .to_ascii_lowercase()
                .contains("chunked")
    });
    Some((response.code, chunked))
}

/// Turns a full raw HTTP response into the assistant's reply text.
pub(crate) fn decode_response(raw: &[u8]) -> Result<String> {
    let parts = split_response(raw);
    let decoded;
    let body = if parts.chunked {
        match decode_chunked(parts.body) {
            Some(bytes) => {
                decoded = bytes;
                decoded.as_slice()
            }
            None => parts.body,
        }
    } else {
        parts.body
    };

    if let Some(status) = parts.status.filter(|status| !(200..300).contains(status)) {
        return Err(api_error(status, body));
    }

    extract_content(body)
}

/// Reads `choices[0].message.content` from a chat-completion body.
pub(crate) fn extract_content(body: &[u8]) -> Result<String> {
    let response: ChatResponse = serde_json::from_slice(body).map_err(|err| {
        DoubaoError::JsonParse(format!("invalid chat response JSON: {err}"))
    })?;
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| DoubaoError::JsonParse("response has no choices".to_owned()))
}

fn api_error(status: u16, body: &[u8]) -> DoubaoError {
    match serde_json::from_slice::<ApiErrorEnvelope>(body) {
        Ok(envelope) => DoubaoError::Api {
            status,
            code: envelope.error.code,
            message: envelope.error.message,
        },
        Err(_) => DoubaoError::Api {
            status,
            code: None,
            message: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

/// Reads a top-level field of a JSON object as text.
///
/// String values are returned without quotes; any other value is returned
/// in its JSON form.
pub fn get_field(json: &str, key: &str) -> Result<String> {
    let document: JsonValue = serde_json::from_str(json)
        .map_err(|err| DoubaoError::JsonParse(format!("JSON syntax error: {err}")))?;
    match document.get(key) {
        Some(JsonValue::String(text)) => Ok(text.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(DoubaoError::JsonParse(format!("missing key '{key}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAT_BODY: &str = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;

    #[test]
    fn strips_headers_at_first_blank_line() {
        let raw = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{CHAT_BODY}"
        );
        let parts = split_response(raw.as_bytes());
        assert_eq!(parts.status, Some(200));
        assert!(!parts.chunked);
        assert_eq!(parts.body, CHAT_BODY.as_bytes());
        assert_eq!(decode_response(raw.as_bytes()).unwrap(), "hello");
    }

    #[test]
    fn missing_header_boundary_treats_everything_as_body() {
        let parts = split_response(CHAT_BODY.as_bytes());
        assert_eq!(
            parts,
            ResponseParts {
                status: None,
                chunked: false,
                body: CHAT_BODY.as_bytes(),
            }
        );
        assert_eq!(decode_response(CHAT_BODY.as_bytes()).unwrap(), "hello");

        let headers_only = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n";
        assert!(matches!(
            decode_response(headers_only),
            Err(DoubaoError::JsonParse(_))
        ));
    }

    #[test]
    fn unparseable_head_is_still_stripped() {
        let raw = format!("garbage line\r\n\r\n{CHAT_BODY}");
        let parts = split_response(raw.as_bytes());
        assert_eq!(parts.status, None);
        assert_eq!(parts.body, CHAT_BODY.as_bytes());
        assert_eq!(decode_response(raw.as_bytes()).unwrap(), "hello");
    }

    #[test]
    fn chunked_response_body_is_decoded() {
        let raw = format!(
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n{:x}\r\n{CHAT_BODY}\r\n0\r\n\r\n",
            CHAT_BODY.len()
        );
        let parts = split_response(raw.as_bytes());
        assert!(parts.chunked);
        assert_eq!(decode_response(raw.as_bytes()).unwrap(), "hello");
    }

    #[test]
    fn non_success_status_surfaces_api_message() {
        let raw = "HTTP/1.1 401 Unauthorized\r\n\r\n{\"error\":{\"code\":\"AuthenticationError\",\"message\":\"bad key\"}}";
        match decode_response(raw.as_bytes()) {
            Err(DoubaoError::Api {
                status,
                code,
                message,
            }) => {
                assert_eq!(status, 401);
                assert_eq!(code.as_deref(), Some("AuthenticationError"));
                assert_eq!(message, "bad key");
            }
            other => panic!("expected api error, got {other:?}"),
        }

        let raw = "HTTP/1.1 502 Bad Gateway\r\n\r\nupstream down";
        match decode_response(raw.as_bytes()) {
            Err(DoubaoError::Api {
                status,
                code,
                message,
            }) => {
                assert_eq!(status, 502);
                assert_eq!(code, None);
                assert_eq!(message, "upstream down");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn malformed_or_empty_choices_are_parse_errors() {
        let raw = "HTTP/1.1 200 OK\r\n\r\n{\"choices\":";
        assert!(matches!(
            decode_response(raw.as_bytes()),
            Err(DoubaoError::JsonParse(_))
        ));
        assert!(matches!(
            extract_content(b"{\"choices\":[]}"),
            Err(DoubaoError::JsonParse(_))
        ));
    }

    #[test]
    fn get_field_reads_top_level_values() {
        let json = r#"{"answer":"yes","count":3,"nested":{"a":1}}"#;
        assert_eq!(get_field(json, "answer").unwrap(), "yes");
        assert_eq!(get_field(json, "count").unwrap(), "3");
        assert_eq!(get_field(json, "nested").unwrap(), r#"{"a":1}"#);

        match get_field(json, "missing") {
            Err(DoubaoError::JsonParse(message)) => assert!(message.contains("missing key")),
            other => panic!("expected missing key error, got {other:?}"),
        }
        match get_field("{not json", "answer") {
            Err(DoubaoError::JsonParse(message)) => assert!(message.contains("syntax")),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }
}
