use std::sync::Arc;

use adforge_contracts::brand::{extract_brand, BrandContext, BrandExtraction, BrandOverrides};
use adforge_contracts::config::ServiceEndpoint;
use adforge_contracts::CreativeError;
use log::{info, warn};
use serde_json::json;

use crate::transport::{
    chat_completion_text, data_url, reply_json, send_checked, HttpRequest, HttpTransport,
};

const SERVICE: &str = "vision";

pub const LOGO_INSTRUCTION: &str = "Identify the brand name shown in this logo. Reply with the \
     brand name only, exactly as written, with no other words.";

pub const PRODUCT_INSTRUCTION: &str = "Identify the product in this photo. If a brand is \
     visible reply as 'Brand - product name', otherwise reply with the product name only. \
     One line, no explanation.";

/// Multimodal description client.
///
/// Every public method that feeds the brand context swallows service errors;
/// only `ask` and `synthesize_prompt` return them so callers can fall back.
#[derive(Clone)]
pub struct VisionDescriber {
    transport: Arc<dyn HttpTransport>,
    endpoint: Option<ServiceEndpoint>,
}

impl VisionDescriber {
    pub fn new(transport: Arc<dyn HttpTransport>, endpoint: Option<ServiceEndpoint>) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint
            .as_ref()
            .map(|endpoint| endpoint.api_key.is_some())
            .unwrap_or(false)
    }

    /// Sends one image plus an instruction and returns the free-text answer.
    pub fn ask(
        &self,
        image: &[u8],
        instruction: &str,
        max_tokens: u32,
    ) -> Result<String, CreativeError> {
        let Some(endpoint) = self.endpoint.as_ref() else {
            return Err(CreativeError::transport(SERVICE, "vision service not configured"));
        };
        let payload = json!({
            "model": endpoint.model.as_deref().unwrap_or("gpt-4o-mini"),
            "max_tokens": max_tokens,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": instruction},
                    {"type": "image_url", "image_url": {"url": data_url(image)}},
                ],
            }],
        });
        let request = HttpRequest::post_json(endpoint.url("chat/completions"), payload)
            .bearer(endpoint.api_key.as_deref());
        let reply = send_checked(self.transport.as_ref(), SERVICE, &request)?;
        let text = chat_completion_text(&reply_json(SERVICE, &reply)?);
        if text.is_empty() {
            return Err(CreativeError::transport(SERVICE, "empty completion"));
        }
        Ok(text)
    }

    /// Resolves the request's brand context. Never fails: any service error
    /// reads as an empty answer and may end in placeholders.
    pub fn describe(
        &self,
        logo: &[u8],
        product: &[u8],
        overrides: &BrandOverrides,
    ) -> BrandContext {
        if overrides.is_complete() {
            return BrandContext::resolve(&BrandExtraction::Unresolved, overrides, "");
        }
        if !self.is_configured() {
            warn!("vision service not configured; brand context from overrides only");
            return BrandContext::resolve(&BrandExtraction::Unresolved, overrides, "");
        }
        let logo_text = self.ask_or_empty(logo, LOGO_INSTRUCTION);
        let product_text = self.ask_or_empty(product, PRODUCT_INSTRUCTION);
        let extraction = extract_brand(&logo_text, &product_text);
        match &extraction {
            BrandExtraction::Extracted { brand, product } => info!(
                "vision extracted brand '{brand}' product '{}'",
                product.as_deref().unwrap_or("-")
            ),
            BrandExtraction::Unresolved => warn!("vision extraction unresolved; using placeholders"),
        }
        BrandContext::resolve(&extraction, overrides, &product_text)
    }

    /// Scene-specific prompt written by the vision model from the product photo.
    pub fn synthesize_prompt(
        &self,
        instruction: &str,
        product: &[u8],
    ) -> Result<String, CreativeError> {
        self.ask(product, instruction, 200)
    }

    fn ask_or_empty(&self, image: &[u8], instruction: &str) -> String {
        match self.ask(image, instruction, 60) {
            Ok(text) => text,
            Err(err) => {
                warn!("vision request failed: {err}");
                String::new()
            }
        }
    }
}
