use thiserror::Error;

/// Failure kinds surfaced by the creative pipeline.
///
/// Vision, caption and rich-prompt stages never produce these; they degrade to
/// static fallbacks. Everything the job submitter raises reaches the
/// orchestrator, which drops the unit and keeps going.
#[derive(Debug, Error)]
pub enum CreativeError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("{service} transport failure: {message}")]
    Transport { service: String, message: String },
    #[error("{service} rejected credentials ({status}): {message}")]
    Auth {
        service: String,
        status: u16,
        message: String,
    },
    #[error("{service} quota exhausted ({status}): {message}")]
    Quota {
        service: String,
        status: u16,
        message: String,
    },
    #[error("remote job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },
    #[error("remote job {job_id} did not finish after {attempts} polls")]
    JobTimeout { job_id: String, attempts: u32 },
    #[error("image encode failed: {0}")]
    Encode(String),
    #[error("all {requested} creative units failed")]
    AllUnitsFailed {
        requested: usize,
        reasons: Vec<String>,
    },
    #[error("archive build failed: {0}")]
    Archive(String),
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
}

impl CreativeError {
    pub fn transport(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Maps a non-success HTTP status onto the matching error kind.
    pub fn from_status(service: &str, status: u16, body: &str) -> Self {
        let message = truncate_text(body.trim(), 512);
        match status {
            401 | 403 => Self::Auth {
                service: service.to_string(),
                status,
                message,
            },
            402 | 429 => Self::Quota {
                service: service.to_string(),
                status,
                message,
            },
            _ => Self::Transport {
                service: service.to_string(),
                message: format!("request failed ({status}): {message}"),
            },
        }
    }

    /// Short tag used in run events and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Transport { .. } => "transport",
            Self::Auth { .. } => "auth",
            Self::Quota { .. } => "quota",
            Self::JobFailed { .. } => "job_failed",
            Self::JobTimeout { .. } => "job_timeout",
            Self::Encode(_) => "encode",
            Self::AllUnitsFailed { .. } => "all_units_failed",
            Self::Archive(_) => "archive",
            Self::Io(_) => "io",
        }
    }
}

pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_separates_auth_quota_and_transport() {
        assert_eq!(CreativeError::from_status("edit", 401, "nope").kind(), "auth");
        assert_eq!(CreativeError::from_status("edit", 403, "nope").kind(), "auth");
        assert_eq!(CreativeError::from_status("edit", 402, "pay").kind(), "quota");
        assert_eq!(CreativeError::from_status("edit", 429, "slow").kind(), "quota");
        let err = CreativeError::from_status("edit", 400, "bad prompt");
        assert_eq!(err.kind(), "transport");
        assert!(err.to_string().contains("(400)"));
    }

    #[test]
    fn truncate_text_appends_ellipsis() {
        assert_eq!(truncate_text("abcdef", 3), "abc…");
        assert_eq!(truncate_text("abc", 3), "abc");
    }
}
