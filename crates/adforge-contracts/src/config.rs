use std::env;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;

use crate::credentials::{CredentialSet, CREDENTIAL_SLOTS};

pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_UNITS: usize = 10;
pub const DEFAULT_WORKERS: usize = 3;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_POLL_ATTEMPTS: u32 = 60;
pub const DEFAULT_CANVAS: u32 = 1024;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub base_url: String,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

impl ServiceEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base(&base_url.into()),
            model: None,
            api_key: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

/// Strategy used to hand image-edit credentials to units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialPoolKind {
    /// Fixed index-range slots.
    #[default]
    Partitioned,
    /// Least-loaded credential, capped by `credential_max_in_flight`.
    LeastLoaded,
}

impl CredentialPoolKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "partitioned" | "fixed" => Some(Self::Partitioned),
            "least_loaded" | "balanced" => Some(Self::LeastLoaded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub vision: Option<ServiceEndpoint>,
    pub text: Option<ServiceEndpoint>,
    /// Ordered image-edit chain: primary first, legacy fallback after.
    pub image_edit: Vec<ServiceEndpoint>,
    pub credentials: CredentialSet,
    pub units: usize,
    pub workers: usize,
    pub poll: PollSettings,
    pub canvas: u32,
    pub jpeg_quality: u8,
    pub rich_prompts: bool,
    pub credential_pool: CredentialPoolKind,
    pub credential_max_in_flight: usize,
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vision: None,
            text: None,
            image_edit: Vec::new(),
            credentials: CredentialSet::default(),
            units: DEFAULT_UNITS,
            workers: DEFAULT_WORKERS,
            poll: PollSettings::default(),
            canvas: DEFAULT_CANVAS,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            rich_prompts: false,
            credential_pool: CredentialPoolKind::default(),
            credential_max_in_flight: 2,
            request_timeout: Duration::from_secs(90),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let shared_key = get("OPENAI_API_KEY");

        let chat_endpoint = |prefix: &str| -> Option<ServiceEndpoint> {
            let api_key = get(&format!("ADFORGE_{prefix}_API_KEY")).or_else(|| shared_key.clone());
            let base = get(&format!("ADFORGE_{prefix}_API_BASE"))
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE.to_string());
            let model = get(&format!("ADFORGE_{prefix}_MODEL"))
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());
            let mut endpoint = ServiceEndpoint::new(base).with_model(model);
            endpoint.api_key = api_key;
            Some(endpoint)
        };

        let image_model = get("ADFORGE_IMAGE_MODEL");
        let mut image_edit = Vec::new();
        for key in ["ADFORGE_IMAGE_API_BASE", "ADFORGE_IMAGE_FALLBACK_API_BASE"] {
            if let Some(base) = get(key) {
                let mut endpoint = ServiceEndpoint::new(base);
                endpoint.model = image_model.clone();
                image_edit.push(endpoint);
            }
        }

        let slots = (1..=CREDENTIAL_SLOTS)
            .map(|slot| get(&format!("ADFORGE_IMAGE_API_KEY_{slot}")))
            .collect();
        let credentials = CredentialSet::new(get("ADFORGE_IMAGE_API_KEY"), slots);

        let defaults = Self::default();
        Self {
            vision: chat_endpoint("VISION"),
            text: chat_endpoint("TEXT"),
            image_edit,
            credentials,
            units: parse_clamped(get("ADFORGE_UNITS"), defaults.units, 1, 50),
            workers: parse_clamped(get("ADFORGE_WORKERS"), defaults.workers, 1, 16),
            poll: PollSettings {
                interval: Duration::from_millis(parse_clamped(
                    get("ADFORGE_POLL_INTERVAL_MS"),
                    DEFAULT_POLL_INTERVAL_MS,
                    0,
                    30_000,
                )),
                max_attempts: parse_clamped(
                    get("ADFORGE_POLL_ATTEMPTS"),
                    DEFAULT_POLL_ATTEMPTS,
                    1,
                    1000,
                ),
            },
            canvas: parse_clamped(get("ADFORGE_CANVAS"), DEFAULT_CANVAS, 64, 4096),
            jpeg_quality: parse_clamped(get("ADFORGE_JPEG_QUALITY"), DEFAULT_JPEG_QUALITY, 1, 100),
            rich_prompts: get("ADFORGE_RICH_PROMPTS")
                .map(|raw| parse_flag(&raw))
                .unwrap_or(defaults.rich_prompts),
            credential_pool: get("ADFORGE_CREDENTIAL_POOL")
                .and_then(|raw| CredentialPoolKind::parse(&raw))
                .unwrap_or_default(),
            credential_max_in_flight: parse_clamped(
                get("ADFORGE_CREDENTIAL_MAX_IN_FLIGHT"),
                defaults.credential_max_in_flight,
                1,
                32,
            ),
            request_timeout: Duration::from_secs(parse_clamped(
                get("ADFORGE_REQUEST_TIMEOUT_S"),
                90u64,
                5,
                600,
            )),
        }
    }

    /// One-shot startup check of every collaborator this config names.
    pub fn validate(&self) -> ConfigReport {
        let mut checks = IndexMap::new();
        checks.insert(
            "vision".to_string(),
            chat_service_check(self.vision.as_ref(), "brand extraction uses placeholders"),
        );
        checks.insert(
            "text".to_string(),
            chat_service_check(self.text.as_ref(), "captions use static fallbacks"),
        );
        checks.insert(
            "image_edit".to_string(),
            match self.image_edit.first() {
                Some(endpoint) => ConfigCheck::ready(endpoint.base_url.clone()),
                None => ConfigCheck::missing("ADFORGE_IMAGE_API_BASE not set"),
            },
        );
        checks.insert(
            "image_fallback".to_string(),
            match self.image_edit.get(1) {
                Some(endpoint) => ConfigCheck::ready(endpoint.base_url.clone()),
                None => ConfigCheck::degraded("no fallback image API; primary failures are final"),
            },
        );
        let configured = self.credentials.configured_slots();
        checks.insert(
            "credentials".to_string(),
            if self.credentials.is_empty() {
                ConfigCheck::missing("no image API credentials; submissions will be rejected")
            } else if configured < CREDENTIAL_SLOTS {
                ConfigCheck::degraded(format!(
                    "{configured}/{CREDENTIAL_SLOTS} slots configured; others share the default key"
                ))
            } else {
                ConfigCheck::ready(format!("{configured} slots configured"))
            },
        );
        ConfigReport { checks }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ready,
    Degraded,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigCheck {
    pub status: CheckStatus,
    pub detail: String,
}

impl ConfigCheck {
    fn ready(detail: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Ready,
            detail: detail.into(),
        }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Degraded,
            detail: detail.into(),
        }
    }

    fn missing(detail: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Missing,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigReport {
    pub checks: IndexMap<String, ConfigCheck>,
}

impl ConfigReport {
    /// Only a missing image-edit service blocks a run; the rest degrade.
    pub fn is_runnable(&self) -> bool {
        self.checks
            .get("image_edit")
            .map(|check| check.status != CheckStatus::Missing)
            .unwrap_or(false)
    }

    pub fn problems(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|(_, check)| check.status != CheckStatus::Ready)
            .map(|(name, check)| format!("{name}: {}", check.detail))
            .collect()
    }
}

fn chat_service_check(endpoint: Option<&ServiceEndpoint>, degraded_effect: &str) -> ConfigCheck {
    match endpoint {
        Some(endpoint) if endpoint.api_key.is_some() => ConfigCheck::ready(format!(
            "{} ({})",
            endpoint.base_url,
            endpoint.model.as_deref().unwrap_or("default model")
        )),
        Some(_) => ConfigCheck::degraded(format!("no API key; {degraded_effect}")),
        None => ConfigCheck::missing(format!("not configured; {degraded_effect}")),
    }
}

pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn normalize_base(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn parse_clamped<T>(raw: Option<String>, default: T, min: T, max: T) -> T
where
    T: std::str::FromStr + PartialOrd + Copy,
{
    let Some(value) = raw.and_then(|raw| raw.trim().parse::<T>().ok()) else {
        return default;
    };
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
