use crate::brand::BrandContext;

pub const STYLES: &[&str] = &[
    "clean studio product photography with soft diffused lighting",
    "vibrant pop-art color palette with bold contrast",
    "warm lifestyle photography with natural golden-hour light",
    "minimalist luxury aesthetic with muted tones and deep shadows",
    "energetic social-media style with dynamic lighting and motion",
];

pub const COMPOSITIONS: &[&str] = &[
    "centered hero shot with generous negative space for copy",
    "dramatic low-angle close-up filling most of the frame",
    "rule-of-thirds layout with the product on the left and open sky on the right",
    "flat-lay arrangement seen from directly above with complementary props",
];

pub const SCENARIOS: &[&str] = &[
    "a beach at sunset",
    "an urban skyline at night",
    "a cozy modern kitchen",
    "a mountain trail in early morning mist",
    "a neon-lit city street after rain",
    "a bright minimalist studio",
];

/// Style and composition phrases picked for a variation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variation {
    pub style: &'static str,
    pub composition: &'static str,
}

pub fn variation_for(index: usize) -> Variation {
    Variation {
        style: STYLES[index % STYLES.len()],
        composition: COMPOSITIONS[index % COMPOSITIONS.len()],
    }
}

pub fn scenario_for(index: usize) -> &'static str {
    SCENARIOS[index % SCENARIOS.len()]
}

/// Deterministic prompt used directly or whenever the rich mode fails.
pub fn render_template_prompt(index: usize, context: &BrandContext) -> String {
    let variation = variation_for(index);
    format!(
        "Create a professional advertising image of {subject}. Keep the {product} exactly as it \
         appears in the reference photo and feature it prominently. Style: {style}. \
         Composition: {composition}. Product details: {description}. \
         No text, no watermarks, photorealistic, high detail.",
        subject = context.subject(),
        product = context.product,
        style = variation.style,
        composition = variation.composition,
        description = context.description,
    )
}

/// Instruction sent to the vision service when it writes the scene prompt.
pub fn scenario_instruction(index: usize, context: &BrandContext) -> String {
    let variation = variation_for(index);
    format!(
        "You write prompts for an image-editing model. Look at the attached product photo of \
         {subject} and write one prompt (max 80 words) that places this exact product in \
         {scenario}. Use {style} and a {composition}. Keep the product's shape, label and \
         colors unchanged. Reply with the prompt only, no preamble.",
        subject = context.subject(),
        scenario = scenario_for(index),
        style = variation.style,
        composition = variation.composition,
    )
}

/// Trims a synthesized prompt; `None` means the caller must fall back.
pub fn accept_synthesized_prompt(raw: &str) -> Option<String> {
    let cleaned = raw
        .trim()
        .trim_start_matches("Prompt:")
        .trim()
        .trim_matches(|ch| matches!(ch, '"' | '\'' | '`'))
        .trim()
        .to_string();
    if cleaned.chars().count() < 20 {
        return None;
    }
    Some(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brand::{BrandExtraction, BrandOverrides};

    fn context() -> BrandContext {
        BrandContext::resolve(
            &BrandExtraction::Extracted {
                brand: "Acme".to_string(),
                product: Some("anvil".to_string()),
            },
            &BrandOverrides::default(),
            "a heavy cast-iron anvil",
        )
    }

    #[test]
    fn variation_cycles_by_enumeration_length() {
        for index in 0..40 {
            let variation = variation_for(index);
            assert_eq!(variation.style, STYLES[index % STYLES.len()]);
            assert_eq!(variation.composition, COMPOSITIONS[index % COMPOSITIONS.len()]);
        }
        let period = STYLES.len() * COMPOSITIONS.len();
        assert_eq!(variation_for(3), variation_for(3 + period));
        assert_ne!(variation_for(0), variation_for(1));
    }

    #[test]
    fn template_prompt_is_pure_and_embeds_brand() {
        let ctx = context();
        let first = render_template_prompt(7, &ctx);
        assert_eq!(first, render_template_prompt(7, &ctx));
        assert!(first.contains("Acme anvil"));
        assert!(first.contains("a heavy cast-iron anvil"));
        assert!(first.contains(STYLES[7 % STYLES.len()]));
        assert!(first.contains(COMPOSITIONS[7 % COMPOSITIONS.len()]));
    }

    #[test]
    fn scenario_instruction_names_scene() {
        let ctx = context();
        assert!(scenario_instruction(0, &ctx).contains("a beach at sunset"));
        assert!(scenario_instruction(1, &ctx).contains("an urban skyline at night"));
    }

    #[test]
    fn synthesized_prompt_requires_substance() {
        assert_eq!(accept_synthesized_prompt("  \"\" "), None);
        assert_eq!(accept_synthesized_prompt("ok"), None);
        assert_eq!(
            accept_synthesized_prompt("Prompt: \"A soda can resting on warm sand at dusk\""),
            Some("A soda can resting on warm sand at dusk".to_string())
        );
    }
}
