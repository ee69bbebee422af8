use serde_json::Value;

/// Status vocabulary reported by the image-edit service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Created,
    Processing,
    Completed,
    Succeeded,
    Failed,
    Error,
}

impl JobStatus {
    /// Unknown or missing values are read as still processing.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw
            .map(|value| value.trim().to_ascii_lowercase())
            .unwrap_or_default()
            .as_str()
        {
            "created" | "queued" | "pending" => Self::Created,
            "completed" | "complete" => Self::Completed,
            "succeeded" | "success" => Self::Succeeded,
            "failed" | "canceled" | "cancelled" => Self::Failed,
            "error" => Self::Error,
            _ => Self::Processing,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Completed | Self::Succeeded)
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }
}

/// Where a finished job's image lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutput {
    Url(String),
    Inline { data: String },
}

impl JobOutput {
    /// Reads one output entry: a URL, a `data:` URL, a bare base64 string, or
    /// an object carrying `url`, `b64_json` or `image`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(raw) => Self::from_str_entry(raw),
            Value::Object(obj) => ["url", "b64_json", "image", "data"]
                .iter()
                .find_map(|key| obj.get(*key).and_then(Value::as_str))
                .and_then(Self::from_str_entry),
            _ => None,
        }
    }

    fn from_str_entry(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Some(Self::Url(trimmed.to_string()));
        }
        let data = match trimmed.split_once(";base64,") {
            Some((prefix, data)) if prefix.starts_with("data:") => data,
            _ => trimmed,
        };
        Some(Self::Inline {
            data: data.to_string(),
        })
    }
}

pub fn outputs_from_value(value: Option<&Value>) -> Vec<JobOutput> {
    match value {
        Some(Value::Array(rows)) => rows.iter().filter_map(JobOutput::from_value).collect(),
        Some(other) => JobOutput::from_value(other).into_iter().collect(),
        None => Vec::new(),
    }
}

/// One outstanding asynchronous image-edit task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteJob {
    pub id: String,
    pub status_url: String,
    pub status: JobStatus,
    pub outputs: Vec<JobOutput>,
    pub attempts: u32,
}

impl RemoteJob {
    pub fn new(id: impl Into<String>, status_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status_url: status_url.into(),
            status: JobStatus::Created,
            outputs: Vec::new(),
            attempts: 0,
        }
    }
}

/// What one status reply means for the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Polling,
    Succeeded,
    Failed,
}

impl JobPhase {
    pub fn from_status(status: JobStatus) -> Self {
        if status.is_success() {
            Self::Succeeded
        } else if status.is_failure() {
            Self::Failed
        } else {
            Self::Polling
        }
    }
}

/// Poll HTTP statuses that mean "not ready yet" rather than failure.
pub fn is_transient_poll_status(status: u16) -> bool {
    matches!(status, 401 | 404) || (500..=599).contains(&status)
}
