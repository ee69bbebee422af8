use std::fmt;

/// Number of dedicated image-edit credential slots.
pub const CREDENTIAL_SLOTS: usize = 3;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential {
    pub label: String,
    secret: String,
}

impl Credential {
    pub fn new(label: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            secret: secret.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("label", &self.label)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Fixed partition of unit indices onto 1-based credential slots.
pub fn credential_slot(unit_index: usize) -> usize {
    match unit_index {
        0..=3 => 1,
        4..=6 => 2,
        _ => 3,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    default: Option<String>,
    slots: Vec<Option<String>>,
}

impl CredentialSet {
    pub fn new(default: Option<String>, slots: Vec<Option<String>>) -> Self {
        let slots = slots
            .into_iter()
            .take(CREDENTIAL_SLOTS)
            .map(|slot| slot.filter(|value| !value.trim().is_empty()))
            .collect();
        Self {
            default: default.filter(|value| !value.trim().is_empty()),
            slots,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.default.is_none() && self.slots.iter().all(Option::is_none)
    }

    pub fn configured_slots(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn default_credential(&self) -> Option<Credential> {
        self.default
            .as_ref()
            .map(|secret| Credential::new("default", secret.clone()))
    }

    /// Credential for a unit under the fixed partition.
    ///
    /// An unconfigured slot falls back to the default key, then to any
    /// configured slot; `None` only when nothing is configured at all.
    pub fn for_unit(&self, unit_index: usize) -> Option<Credential> {
        let slot = credential_slot(unit_index);
        if let Some(Some(secret)) = self.slots.get(slot - 1) {
            return Some(Credential::new(format!("slot-{slot}"), secret.clone()));
        }
        self.default_credential().or_else(|| {
            self.slots.iter().enumerate().find_map(|(idx, slot)| {
                slot.as_ref()
                    .map(|secret| Credential::new(format!("slot-{}", idx + 1), secret.clone()))
            })
        })
    }

    /// Every distinct credential, slots first, default last.
    pub fn all(&self) -> Vec<Credential> {
        let mut out: Vec<Credential> = Vec::new();
        for (idx, slot) in self.slots.iter().enumerate() {
            if let Some(secret) = slot {
                if out.iter().any(|existing| existing.secret() == secret) {
                    continue;
                }
                out.push(Credential::new(format!("slot-{}", idx + 1), secret.clone()));
            }
        }
        if let Some(default) = self.default_credential() {
            if !out.iter().any(|existing| existing.secret() == default.secret()) {
                out.push(default);
            }
        }
        out
    }
}
