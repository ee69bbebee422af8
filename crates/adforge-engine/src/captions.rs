use std::sync::Arc;

use adforge_contracts::brand::BrandContext;
use adforge_contracts::captions::{
    caption_instructions, fallback_caption, sanitize_caption, COPYWRITER_PERSONA,
};
use adforge_contracts::config::{ServiceEndpoint, DEFAULT_CHAT_MODEL};
use adforge_contracts::CreativeError;
use log::warn;
use serde_json::json;

use crate::transport::{chat_completion_text, reply_json, send_checked, HttpRequest, HttpTransport};

const SERVICE: &str = "text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caption {
    pub text: String,
    pub fallback: bool,
}

/// Chat-completion copywriter. `caption` always returns usable text.
#[derive(Clone)]
pub struct CaptionGenerator {
    transport: Arc<dyn HttpTransport>,
    endpoint: Option<ServiceEndpoint>,
}

impl CaptionGenerator {
    pub fn new(transport: Arc<dyn HttpTransport>, endpoint: Option<ServiceEndpoint>) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    pub fn caption(&self, prompt: &str, index: usize, context: &BrandContext) -> Caption {
        let raw = match self.request(prompt, index, context) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("unit {index}: caption request failed ({err}); using fallback");
                return Self::fallback(index);
            }
        };
        match sanitize_caption(&raw) {
            Some(text) => Caption {
                text,
                fallback: false,
            },
            None => {
                warn!("unit {index}: caption empty after cleanup; using fallback");
                Self::fallback(index)
            }
        }
    }

    fn request(
        &self,
        prompt: &str,
        index: usize,
        context: &BrandContext,
    ) -> Result<String, CreativeError> {
        let Some(endpoint) = self.endpoint.as_ref().filter(|ep| ep.api_key.is_some()) else {
            return Err(CreativeError::transport(SERVICE, "text service not configured"));
        };
        let payload = json!({
            "model": endpoint.model.as_deref().unwrap_or(DEFAULT_CHAT_MODEL),
            "temperature": 0.8,
            "max_tokens": 150,
            "messages": [
                {"role": "system", "content": COPYWRITER_PERSONA},
                {"role": "user", "content": caption_instructions(prompt, index, context)},
            ],
        });
        let request = HttpRequest::post_json(endpoint.url("chat/completions"), payload)
            .bearer(endpoint.api_key.as_deref());
        let reply = send_checked(self.transport.as_ref(), SERVICE, &request)?;
        Ok(chat_completion_text(&reply_json(SERVICE, &reply)?))
    }

    fn fallback(index: usize) -> Caption {
        Caption {
            text: fallback_caption(index).to_string(),
            fallback: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{chat_reply, ScriptedTransport};
    use crate::transport::HttpReply;

    fn generator(reply: HttpReply) -> (Arc<ScriptedTransport>, CaptionGenerator) {
        let transport = Arc::new(ScriptedTransport::new().route("/chat/completions", vec![reply]));
        let generator = CaptionGenerator::new(
            transport.clone(),
            Some(ServiceEndpoint::new("https://text.test/v1").with_api_key("sk-text")),
        );
        (transport, generator)
    }

    #[test]
    fn listed_options_reduce_to_one_caption() {
        let (transport, generator) = generator(chat_reply(
            "Here are some options:\n1. Buy now! Shop today.\n2. Another one.",
        ));
        let caption = generator.caption("prompt", 4, &BrandContext::placeholder());
        assert!(!caption.fallback);
        assert_eq!(caption.text, "Buy now! Shop today.");
        assert!(!caption.text.starts_with("1."));

        let body = transport.requests()[0].body.clone().unwrap_or_default();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], COPYWRITER_PERSONA);
        assert!(body["messages"][1]["content"]
            .as_str()
            .unwrap_or_default()
            .contains("elegant and aspirational"));
    }

    #[test]
    fn failures_and_empty_text_use_static_fallbacks() {
        let context = BrandContext::placeholder();
        let (_, failing) = generator(HttpReply::json(500, &json!({"error": "down"})));
        let caption = failing.caption("prompt", 1, &context);
        assert!(caption.fallback);
        assert_eq!(caption.text, fallback_caption(1));

        let (_, empty) = generator(chat_reply("   "));
        assert_eq!(empty.caption("prompt", 2, &context).text, fallback_caption(2));

        let unconfigured = CaptionGenerator::new(Arc::new(ScriptedTransport::new()), None);
        assert!(unconfigured.caption("prompt", 0, &context).fallback);
    }
}
