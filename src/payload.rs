use crate::{
    wire::{ChatRequest, Content, ContentPart, ImageUrl, Message},
    DoubaoError, Result,
};

/// Model parameters sent with every chat request.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatSettings {
    /// Model or endpoint id, e.g. `doubao-1-5-vision-pro-32k-250115`.
    pub model: String,
    /// System message placed before the user turn.
    pub system_prompt: String,
    /// Sampling temperature in `0.0..=1.0`.
    pub temperature: f32,
}

impl ChatSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: "You are a helpful assistant.".to_owned(),
            temperature: 0.5,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A base64-encoded image attached inline as a data URI.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Image {
    /// Image subtype, e.g. `jpg` or `png`.
    pub format: String,
    /// Base64 data without the `data:` prefix.
    pub base64: String,
}

impl Image {
    pub fn new(format: impl Into<String>, base64: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            base64: base64.into(),
        }
    }

    /// JPEG frame, the format camera modules usually produce.
    pub fn jpeg(base64: impl Into<String>) -> Self {
        Self::new("jpg", base64)
    }

    /// `data:image/<format>;base64,<data>`
    pub fn data_uri(&self) -> String {
        format!("data:image/{};base64,{}", self.format, self.base64)
    }

    /// Capture helpers report failure as an empty or `"NULL"` string.
    pub(crate) fn is_empty(&self) -> bool {
        self.base64.is_empty() || self.base64 == "NULL"
    }
}

/// Pre-flight check of credential and model settings.
///
/// Runs before any network activity; a failure here never reaches the socket.
pub fn validate_config(api_key: &str, settings: &ChatSettings) -> Result<()> {
    if api_key.trim().is_empty() {
        return Err(DoubaoError::InvalidInput("API key not set".to_owned()));
    }
    if settings.model.trim().is_empty() {
        return Err(DoubaoError::InvalidInput("model id not set".to_owned()));
    }
    // NaN fails `contains` as well.
    if !(0.0..=1.0).contains(&settings.temperature) {
        return Err(DoubaoError::InvalidInput(format!(
            "temperature {} out of range (0-1)",
            settings.temperature
        )));
    }
    Ok(())
}

pub(crate) fn validate_text(text: &str) -> Result<()> {
    if text.is_empty() {
        return Err(DoubaoError::InvalidInput("input text is empty".to_owned()));
    }
    Ok(())
}

pub(crate) fn ensure_image_fits(image: &Image, limit: usize) -> Result<()> {
    let size = image.base64.len();
    if size > limit {
        return Err(DoubaoError::ImageTooLarge { size, limit });
    }
    Ok(())
}

/// Builds a chat request whose user content is always a part list: the
/// optional inline image first, then the text.
pub fn build_payload(text: &str, settings: &ChatSettings, image: Option<&Image>) -> Result<String> {
    let mut parts = Vec::with_capacity(2);
    if let Some(image) = image.filter(|image| !image.is_empty()) {
        parts.push(ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: image.data_uri(),
            },
        });
    }
    parts.push(ContentPart::Text { text });
    encode(settings, Content::Parts(parts))
}

/// Builds a chat request referencing a remote image.
///
/// An empty `image_url` sends the text as a plain string content.
pub fn build_url_image_payload(
    text: &str,
    image_url: &str,
    settings: &ChatSettings,
) -> Result<String> {
    let content = if image_url.is_empty() {
        Content::Text(text)
    } else {
        Content::Parts(vec![
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image_url.to_owned(),
                },
            },
            ContentPart::Text { text },
        ])
    };
    encode(settings, content)
}

fn encode(settings: &ChatSettings, user_content: Content<'_>) -> Result<String> {
    let request = ChatRequest {
        model: &settings.model,
        messages: vec![
            Message {
                role: "system",
                content: Content::Text(&settings.system_prompt),
            },
            Message {
                role: "user",
                content: user_content,
            },
        ],
        temperature: settings.temperature,
    };
    serde_json::to_string(&request)
        .map_err(|err| DoubaoError::InvalidInput(format!("payload could not be encoded: {err}")))
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn settings() -> ChatSettings {
        ChatSettings::new("m")
            .with_system_prompt("p")
            .with_temperature(0.5)
    }

    #[test]
    fn text_only_payload_has_single_text_part() {
        let payload = build_payload("hi", &settings(), None).unwrap();
        let parsed: Value = serde_json::from_str(&payload).unwrap();

        assert_eq!(parsed["model"], "m");
        assert_eq!(parsed["temperature"], 0.5);
        assert_eq!(
            parsed["messages"][0],
            json!({"role": "system", "content": "p"})
        );
        assert_eq!(parsed["messages"][1]["role"], "user");
        assert_eq!(
            parsed["messages"][1]["content"],
            json!([{"type": "text", "text": "hi"}])
        );
    }

    #[test]
    fn inline_image_precedes_text() {
        let image = Image::jpeg("QUJD");
        let payload = build_payload("what is this?", &settings(), Some(&image)).unwrap();
        let parsed: Value = serde_json::from_str(&payload).unwrap();

        assert_eq!(
            parsed["messages"][1]["content"],
            json!([
                {"type": "image_url", "image_url": {"url": "data:image/jpg;base64,QUJD"}},
                {"type": "text", "text": "what is this?"}
            ])
        );
    }

    #[test]
    fn null_image_is_left_out() {
        let image = Image::jpeg("NULL");
        let payload = build_payload("hi", &settings(), Some(&image)).unwrap();
        let parsed: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed["messages"][1]["content"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn url_image_payload_switches_on_empty_url() {
        let with_url =
            build_url_image_payload("hi", "https://img.example/cat.png", &settings()).unwrap();
        let parsed: Value = serde_json::from_str(&with_url).unwrap();
        assert_eq!(
            parsed["messages"][1]["content"][0]["image_url"]["url"],
            "https://img.example/cat.png"
        );

        let without_url = build_url_image_payload("hi", "", &settings()).unwrap();
        let parsed: Value = serde_json::from_str(&without_url).unwrap();
        assert_eq!(parsed["messages"][1]["content"], "hi");
    }

    #[test]
    fn text_is_json_escaped() {
        let payload = build_payload("say \"hi\"\n", &settings(), None).unwrap();
        let parsed: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed["messages"][1]["content"][0]["text"], "say \"hi\"\n");
    }

    #[test]
    fn validate_config_rejects_out_of_range_temperature() {
        for temperature in [-0.1, 1.1, f32::NAN] {
            let err = validate_config("key", &settings().with_temperature(temperature))
                .expect_err("temperature must be rejected");
            assert!(matches!(err, DoubaoError::InvalidInput(_)));
        }
        assert!(validate_config("key", &settings().with_temperature(0.0)).is_ok());
        assert!(validate_config("key", &settings().with_temperature(1.0)).is_ok());
    }

    #[test]
    fn validate_config_rejects_missing_key_and_model() {
        assert!(matches!(
            validate_config("", &settings()),
            Err(DoubaoError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_config("key", &ChatSettings::new("")),
            Err(DoubaoError::InvalidInput(_))
        ));
    }

    #[test]
    fn oversized_image_is_rejected() {
        let image = Image::jpeg("A".repeat(10));
        assert!(ensure_image_fits(&image, 10).is_ok());
        assert!(matches!(
            ensure_image_fits(&image, 9),
            Err(DoubaoError::ImageTooLarge { size: 10, limit: 9 })
        ));
    }
}
