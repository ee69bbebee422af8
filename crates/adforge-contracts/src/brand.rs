use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::truncate_text;

pub const BRAND_PLACEHOLDER: &str = "the brand";
pub const PRODUCT_PLACEHOLDER: &str = "the product";

const HEDGES: &[&str] = &[
    "unknown",
    "cannot",
    "can't",
    "unable",
    "not sure",
    "unclear",
    "sorry",
    "no brand",
    "not visible",
];

const LEADING_STOPWORDS: &[&str] = &[
    "The", "This", "That", "A", "An", "It", "Its", "I", "In", "Here", "There", "Image", "Photo",
];

static BRAND_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:the\s+)?(?:brand|logo|company)(?:\s+name)?\s*(?:is|:)\s*")
        .expect("brand prefix regex")
});

static PRODUCT_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(?:the\s+)?product(?:\s+name)?\s*(?:is|:)|this\s+is|it\s+is|it's|(?:the\s+)?image\s+shows)\s*(?:an?\s+|the\s+)?",
    )
    .expect("product prefix regex")
});

static DASH_SPLIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\S.{0,38}?)\s*(?:\s-\s|–|—|\s\|\s)\s*(\S.*?)\s*$").expect("dash split regex")
});

static LEADING_CAPITALIZED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Z][A-Za-z0-9&'.]*(?:\s+[A-Z][A-Za-z0-9&'.]*){0,2})")
        .expect("leading capitalized regex")
});

/// Outcome of the best-effort brand/product parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrandExtraction {
    Extracted {
        brand: String,
        product: Option<String>,
    },
    Unresolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrandSource {
    Overrides,
    Vision,
    Placeholder,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrandOverrides {
    pub brand: Option<String>,
    pub product: Option<String>,
}

impl BrandOverrides {
    pub fn new(brand: Option<String>, product: Option<String>) -> Self {
        let clean = |value: Option<String>| {
            value
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };
        Self {
            brand: clean(brand),
            product: clean(product),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.brand.is_some() && self.product.is_some()
    }
}

/// Brand naming shared read-only by every unit of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrandContext {
    pub brand: String,
    pub product: String,
    pub description: String,
    pub source: BrandSource,
}

impl BrandContext {
    pub fn placeholder() -> Self {
        Self {
            brand: BRAND_PLACEHOLDER.to_string(),
            product: PRODUCT_PLACEHOLDER.to_string(),
            description: format!("{BRAND_PLACEHOLDER} {PRODUCT_PLACEHOLDER}"),
            source: BrandSource::Placeholder,
        }
    }

    /// Combines a parser result with user overrides. Overrides always win;
    /// placeholders fill only what neither side resolved.
    pub fn resolve(
        extraction: &BrandExtraction,
        overrides: &BrandOverrides,
        description: &str,
    ) -> Self {
        let (parsed_brand, parsed_product) = match extraction {
            BrandExtraction::Extracted { brand, product } => {
                (Some(brand.clone()), product.clone())
            }
            BrandExtraction::Unresolved => (None, None),
        };
        let source = if overrides.is_complete() {
            BrandSource::Overrides
        } else if parsed_brand.is_some() || parsed_product.is_some() {
            BrandSource::Vision
        } else if overrides.brand.is_some() || overrides.product.is_some() {
            BrandSource::Overrides
        } else {
            BrandSource::Placeholder
        };
        let brand = overrides
            .brand
            .clone()
            .or(parsed_brand)
            .unwrap_or_else(|| BRAND_PLACEHOLDER.to_string());
        let product = overrides
            .product
            .clone()
            .or(parsed_product)
            .unwrap_or_else(|| PRODUCT_PLACEHOLDER.to_string());
        let description = collapse_whitespace(description);
        let description = if description.is_empty() {
            format!("{brand} {product}")
        } else {
            truncate_text(&description, 300)
        };
        Self {
            brand,
            product,
            description,
            source,
        }
    }

    pub fn subject(&self) -> String {
        format!("{} {}", self.brand, self.product)
    }
}

/// Heuristic brand/product extraction over two free-text vision answers.
///
/// The logo answer is trusted first once stripped to alphanumerics. When it
/// is empty, too short, or hedged, the product answer is split on a dash-like
/// separator, then mined for a leading capitalized phrase.
pub fn extract_brand(logo_text: &str, product_text: &str) -> BrandExtraction {
    let product_line = first_line(product_text);
    let product_hedged = is_hedged(&product_line);

    if let Some(brand) = brand_candidate(logo_text) {
        let product = if product_hedged {
            None
        } else {
            split_on_dash(&product_line)
                .map(|(_, product)| product)
                .or_else(|| product_phrase(&product_line))
        };
        return BrandExtraction::Extracted { brand, product };
    }

    if product_hedged || product_line.is_empty() {
        return BrandExtraction::Unresolved;
    }

    if let Some((brand, product)) = split_on_dash(&product_line) {
        return BrandExtraction::Extracted {
            brand,
            product: Some(product),
        };
    }

    if let Some(brand) = leading_capitalized(&product_line) {
        let remainder = product_line[brand.len()..].trim_start();
        let remainder = remainder
            .strip_prefix("'s")
            .unwrap_or(remainder)
            .trim_start_matches([' ', ',', ':', '.', '-']);
        return BrandExtraction::Extracted {
            brand,
            product: product_phrase(remainder),
        };
    }

    BrandExtraction::Unresolved
}

/// Strips a logo answer down to an alphanumeric brand string.
pub fn brand_candidate(logo_text: &str) -> Option<String> {
    let line = first_line(logo_text);
    if is_hedged(&line) {
        return None;
    }
    let line = BRAND_PREFIX.replace(&line, "");
    let stripped: String = line
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || ch.is_whitespace() {
                ch
            } else {
                ' '
            }
        })
        .collect();
    let candidate = collapse_whitespace(&stripped);
    let words = candidate.split_whitespace().count();
    if candidate.chars().count() < 2 || candidate.chars().count() > 40 || words > 4 {
        return None;
    }
    Some(candidate)
}

fn split_on_dash(line: &str) -> Option<(String, String)> {
    let caps = DASH_SPLIT.captures(line)?;
    let brand = brand_candidate(caps.get(1)?.as_str())?;
    let product = product_phrase(caps.get(2)?.as_str())?;
    Some((brand, product))
}

fn leading_capitalized(line: &str) -> Option<String> {
    let caps = LEADING_CAPITALIZED.captures(line)?;
    let phrase = caps.get(1)?.as_str().trim();
    let first_word = phrase.split_whitespace().next()?;
    if LEADING_STOPWORDS.contains(&first_word) || phrase.chars().count() < 2 {
        return None;
    }
    Some(phrase.trim_end_matches('.').to_string())
}

fn product_phrase(text: &str) -> Option<String> {
    let line = first_line(text);
    if is_hedged(&line) {
        return None;
    }
    let line = PRODUCT_PREFIX.replace(&line, "");
    let cleaned: String = line
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || ch.is_whitespace() || matches!(ch, '-' | '&' | '\'') {
                ch
            } else {
                ' '
            }
        })
        .collect();
    let phrase = cleaned
        .split_whitespace()
        .take(6)
        .collect::<Vec<&str>>()
        .join(" ");
    if phrase.chars().count() < 2 {
        return None;
    }
    Some(phrase)
}

fn is_hedged(text: &str) -> bool {
    let lowered = text.to_ascii_lowercase();
    HEDGES.iter().any(|hedge| lowered.contains(hedge))
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<&str>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logo_text_is_stripped_to_alphanumerics() {
        assert_eq!(brand_candidate("P3psi!!"), Some("P3psi".to_string()));
        assert_eq!(brand_candidate("\"Acme Co.\""), Some("Acme Co".to_string()));
        assert_eq!(brand_candidate("The brand name is: Nike."), Some("Nike".to_string()));
    }

    #[test]
    fn hedged_or_tiny_logo_text_is_rejected() {
        assert_eq!(brand_candidate("I cannot determine the brand"), None);
        assert_eq!(brand_candidate("Unknown"), None);
        assert_eq!(brand_candidate("!"), None);
        assert_eq!(
            brand_candidate("a very long sentence describing a logo with many words"),
            None
        );
    }

    #[test]
    fn hedged_everything_resolves_to_placeholders() {
        let extraction = extract_brand("I cannot determine the brand", "");
        assert_eq!(extraction, BrandExtraction::Unresolved);
        let context = BrandContext::resolve(&extraction, &BrandOverrides::default(), "");
        assert_eq!(context.brand, "the brand");
        assert_eq!(context.product, "the product");
        assert_eq!(context.source, BrandSource::Placeholder);
    }

    #[test]
    fn logo_brand_pairs_with_product_phrase() {
        let extraction = extract_brand("P3psi!!", "It's a chilled soda can.");
        assert_eq!(
            extraction,
            BrandExtraction::Extracted {
                brand: "P3psi".to_string(),
                product: Some("chilled soda can".to_string()),
            }
        );
    }

    #[test]
    fn dash_split_recovers_brand_when_logo_fails() {
        let extraction = extract_brand("unknown", "Nike - Air Max 90 running shoe");
        assert_eq!(
            extraction,
            BrandExtraction::Extracted {
                brand: "Nike".to_string(),
                product: Some("Air Max 90 running shoe".to_string()),
            }
        );
        let extraction = extract_brand("", "Lumen — desk lamp");
        assert_eq!(
            extraction,
            BrandExtraction::Extracted {
                brand: "Lumen".to_string(),
                product: Some("desk lamp".to_string()),
            }
        );
    }

    #[test]
    fn hyphenated_names_are_not_split() {
        let extraction = extract_brand("Coca-Cola", "A glass bottle of cola");
        assert_eq!(
            extraction,
            BrandExtraction::Extracted {
                brand: "Coca Cola".to_string(),
                product: Some("A glass bottle of cola".to_string()),
            }
        );
    }

    #[test]
    fn leading_capitalized_phrase_becomes_brand() {
        let extraction = extract_brand("?", "Acme Rockets jet pack with chrome finish");
        assert_eq!(
            extraction,
            BrandExtraction::Extracted {
                brand: "Acme Rockets".to_string(),
                product: Some("jet pack with chrome finish".to_string()),
            }
        );
        assert_eq!(
            extract_brand("", "The image shows a bottle"),
            BrandExtraction::Unresolved
        );
    }

    #[test]
    fn overrides_take_precedence_over_extraction() {
        let extraction = BrandExtraction::Extracted {
            brand: "P3psi".to_string(),
            product: None,
        };
        let overrides = BrandOverrides::new(None, Some("  zero sugar  ".to_string()));
        let context = BrandContext::resolve(&extraction, &overrides, "a can on ice");
        assert_eq!(context.brand, "P3psi");
        assert_eq!(context.product, "zero sugar");
        assert_eq!(context.description, "a can on ice");
        assert_eq!(context.source, BrandSource::Vision);

        let complete = BrandOverrides::new(Some("Acme".to_string()), Some("anvil".to_string()));
        let context = BrandContext::resolve(&BrandExtraction::Unresolved, &complete, "");
        assert_eq!(context.subject(), "Acme anvil");
        assert_eq!(context.description, "Acme anvil");
        assert_eq!(context.source, BrandSource::Overrides);
    }
}
