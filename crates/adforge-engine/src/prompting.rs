use adforge_contracts::brand::BrandContext;
use adforge_contracts::prompts::{
    accept_synthesized_prompt, render_template_prompt, scenario_instruction,
};
use log::warn;

use crate::vision::VisionDescriber;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPrompt {
    pub text: String,
    pub synthesized: bool,
}

/// Renders a unit's edit prompt, optionally asking the vision model for a
/// scene-specific version first.
#[derive(Clone)]
pub struct PromptBuilder {
    rich: Option<VisionDescriber>,
}

impl PromptBuilder {
    pub fn templated() -> Self {
        Self { rich: None }
    }

    pub fn rich(vision: VisionDescriber) -> Self {
        Self { rich: Some(vision) }
    }

    pub fn build(&self, index: usize, context: &BrandContext, product: &[u8]) -> BuiltPrompt {
        if let Some(vision) = self.rich.as_ref() {
            let instruction = scenario_instruction(index, context);
            match vision.synthesize_prompt(&instruction, product) {
                Ok(raw) => {
                    if let Some(text) = accept_synthesized_prompt(&raw) {
                        return BuiltPrompt {
                            text,
                            synthesized: true,
                        };
                    }
                    warn!("unit {index}: synthesized prompt unusable; using template");
                }
                Err(err) => warn!("unit {index}: prompt synthesis failed ({err}); using template"),
            }
        }
        BuiltPrompt {
            text: render_template_prompt(index, context),
            synthesized: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use adforge_contracts::config::ServiceEndpoint;
    use serde_json::json;

    use super::*;
    use crate::transport::testing::{chat_reply, ScriptedTransport};
    use crate::transport::HttpReply;

    fn vision_with(reply: HttpReply) -> VisionDescriber {
        let transport = Arc::new(ScriptedTransport::new().route("/chat/completions", vec![reply]));
        VisionDescriber::new(
            transport,
            Some(ServiceEndpoint::new("https://vision.test/v1").with_api_key("sk")),
        )
    }

    #[test]
    fn rich_mode_uses_synthesized_prompt() {
        let builder = PromptBuilder::rich(vision_with(chat_reply(
            "\"The soda can rests on wet sand as the sun sets behind it\"",
        )));
        let built = builder.build(0, &BrandContext::placeholder(), &[]);
        assert!(built.synthesized);
        assert_eq!(
            built.text,
            "The soda can rests on wet sand as the sun sets behind it"
        );
    }

    #[test]
    fn rich_mode_failure_falls_back_to_template() {
        let context = BrandContext::placeholder();
        let failing = PromptBuilder::rich(vision_with(HttpReply::json(
            503,
            &json!({"error": "overloaded"}),
        )));
        let built = failing.build(2, &context, &[]);
        assert!(!built.synthesized);
        assert_eq!(built.text, render_template_prompt(2, &context));

        let empty = PromptBuilder::rich(vision_with(chat_reply("ok")));
        assert!(!empty.build(2, &context, &[]).synthesized);
    }

    #[test]
    fn templated_builder_never_calls_out() {
        let context = BrandContext::placeholder();
        let built = PromptBuilder::templated().build(5, &context, &[]);
        assert_eq!(built.text, render_template_prompt(5, &context));
    }
}
