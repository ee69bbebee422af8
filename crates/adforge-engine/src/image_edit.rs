use std::sync::Arc;
use std::thread;

use adforge_contracts::config::{PollSettings, ServiceEndpoint};
use adforge_contracts::credentials::Credential;
use adforge_contracts::events::{emit_best_effort, EventPayload, EventWriter, RunEvent};
use adforge_contracts::jobs::{
    is_transient_poll_status, outputs_from_value, JobOutput, JobPhase, JobStatus, RemoteJob,
};
use adforge_contracts::CreativeError;
use log::{debug, info, warn};
use serde_json::{json, Value};

use crate::transport::{
    data_url, decode_base64, error_chain_text, reply_json, send_checked, HttpRequest,
    HttpTransport,
};

const SERVICE: &str = "image_edit";

/// Bytes produced by one endpoint, plus where they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    pub bytes: Vec<u8>,
    pub endpoint: String,
    pub job_id: Option<String>,
    pub polls: u32,
}

enum Submission {
    Ready(JobOutput),
    Queued(RemoteJob),
}

/// Drives image-edit jobs against an ordered endpoint chain.
#[derive(Clone)]
pub struct ImageEditClient {
    transport: Arc<dyn HttpTransport>,
    endpoints: Vec<ServiceEndpoint>,
    poll: PollSettings,
    events: Option<EventWriter>,
}

impl ImageEditClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        endpoints: Vec<ServiceEndpoint>,
        poll: PollSettings,
    ) -> Self {
        Self {
            transport,
            endpoints,
            poll,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Option<EventWriter>) -> Self {
        self.events = events;
        self
    }

    /// Tries each endpoint in order; the last endpoint's error wins.
    pub fn generate(
        &self,
        unit: usize,
        prompt: &str,
        base_image: &[u8],
        credential: Option<&Credential>,
    ) -> Result<EditOutcome, CreativeError> {
        if self.endpoints.is_empty() {
            return Err(CreativeError::Validation(
                "no image edit endpoint configured".to_string(),
            ));
        }
        let mut last_error = None;
        for (position, endpoint) in self.endpoints.iter().enumerate() {
            match self.run_job(endpoint, unit, prompt, base_image, credential) {
                Ok(outcome) => return Ok(outcome),
                Err(err) => {
                    if position + 1 < self.endpoints.len() {
                        warn!(
                            "unit {unit}: {} failed with {} ({err}); trying next endpoint",
                            endpoint.base_url,
                            err.kind()
                        );
                        self.emit_endpoint_failed(unit, endpoint, &err);
                    }
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            CreativeError::transport(SERVICE, "endpoint chain produced no result")
        }))
    }

    fn run_job(
        &self,
        endpoint: &ServiceEndpoint,
        unit: usize,
        prompt: &str,
        base_image: &[u8],
        credential: Option<&Credential>,
    ) -> Result<EditOutcome, CreativeError> {
        let bearer = credential.map(Credential::secret);
        match self.submit(endpoint, prompt, base_image, bearer)? {
            Submission::Ready(output) => {
                debug!("unit {unit}: {} returned an inline result", endpoint.base_url);
                self.emit_submitted(unit, endpoint, None, credential);
                Ok(EditOutcome {
                    bytes: self.resolve_output(&output)?,
                    endpoint: endpoint.base_url.clone(),
                    job_id: None,
                    polls: 0,
                })
            }
            Submission::Queued(job) => {
                info!("unit {unit}: submitted job {}", job.id);
                self.emit_submitted(unit, endpoint, Some(&job.id), credential);
                let job = self.poll_job(unit, job, bearer)?;
                let bytes = self.first_resolvable(&job)?;
                Ok(EditOutcome {
                    bytes,
                    endpoint: endpoint.base_url.clone(),
                    polls: job.attempts,
                    job_id: Some(job.id),
                })
            }
        }
    }

    fn submit(
        &self,
        endpoint: &ServiceEndpoint,
        prompt: &str,
        base_image: &[u8],
        bearer: Option<&str>,
    ) -> Result<Submission, CreativeError> {
        let mut payload = json!({
            "prompt": prompt,
            "image": data_url(base_image),
            "output_format": "png",
        });
        if let Some(model) = endpoint.model.as_deref() {
            payload["model"] = Value::String(model.to_string());
        }
        let request = HttpRequest::post_json(endpoint.url("edits"), payload).bearer(bearer);
        let reply = send_checked(self.transport.as_ref(), SERVICE, &request)?;
        let payload = reply_json(SERVICE, &reply)?;

        if let Some(output) = inline_result(&payload) {
            return Ok(Submission::Ready(output));
        }
        let Some(job_id) = ["id", "job_id", "request_id"]
            .iter()
            .find_map(|key| payload.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|value| !value.is_empty())
        else {
            return Err(CreativeError::transport(
                SERVICE,
                "submission returned neither an image nor a job id",
            ));
        };
        let status_url = payload
            .get("polling_url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| endpoint.url(&format!("jobs/{job_id}")));
        Ok(Submission::Queued(RemoteJob::new(job_id, status_url)))
    }

    /// Polls until the job reaches a terminal phase. Only a succeeded job with
    /// at least one output comes back as `Ok`.
    pub fn poll_job(
        &self,
        unit: usize,
        mut job: RemoteJob,
        bearer: Option<&str>,
    ) -> Result<RemoteJob, CreativeError> {
        let request = HttpRequest::get(job.status_url.clone()).bearer(bearer);
        for attempt in 1..=self.poll.max_attempts {
            thread::sleep(self.poll.interval);
            job.attempts = attempt;

            let reply = match self.transport.send(&request) {
                Ok(reply) => reply,
                Err(err) => {
                    debug!(
                        "unit {unit}: poll {attempt} for {} failed in transport: {}",
                        job.id,
                        error_chain_text(&err, 256)
                    );
                    continue;
                }
            };
            if !reply.is_success() {
                if is_transient_poll_status(reply.status) {
                    debug!(
                        "unit {unit}: poll {attempt} for {} not ready ({})",
                        job.id, reply.status
                    );
                    self.emit_polled(unit, &job, Some(reply.status));
                    continue;
                }
                return Err(CreativeError::from_status(
                    SERVICE,
                    reply.status,
                    &reply.text(),
                ));
            }

            let payload = reply_json(SERVICE, &reply)?;
            job.status = JobStatus::parse(payload.get("status").and_then(Value::as_str));
            self.emit_polled(unit, &job, None);
            match JobPhase::from_status(job.status) {
                JobPhase::Succeeded => {
                    job.outputs = outputs_from_value(
                        payload.get("outputs").or_else(|| payload.get("output")),
                    );
                    if job.outputs.is_empty() {
                        return Err(CreativeError::JobFailed {
                            job_id: job.id,
                            message: "job finished without outputs".to_string(),
                        });
                    }
                    return Ok(job);
                }
                JobPhase::Failed => {
                    return Err(CreativeError::JobFailed {
                        message: service_error_message(&payload, job.status),
                        job_id: job.id,
                    });
                }
                _ => debug!(
                    "unit {unit}: poll {attempt} for {} is {}",
                    job.id,
                    job.status.as_str()
                ),
            }
        }
        Err(CreativeError::JobTimeout {
            job_id: job.id,
            attempts: self.poll.max_attempts,
        })
    }

    fn first_resolvable(&self, job: &RemoteJob) -> Result<Vec<u8>, CreativeError> {
        let mut last_error = None;
        for output in &job.outputs {
            match self.resolve_output(output) {
                Ok(bytes) => return Ok(bytes),
                Err(err) => {
                    warn!("job {}: output unusable ({err})", job.id);
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| CreativeError::JobFailed {
            job_id: job.id.clone(),
            message: "job finished without outputs".to_string(),
        }))
    }

    fn resolve_output(&self, output: &JobOutput) -> Result<Vec<u8>, CreativeError> {
        let bytes = match output {
            JobOutput::Url(url) => {
                send_checked(self.transport.as_ref(), SERVICE, &HttpRequest::get(url.clone()))?
                    .body
            }
            JobOutput::Inline { data } => decode_base64(data).map_err(|err| {
                CreativeError::transport(SERVICE, error_chain_text(&err, 256))
            })?,
        };
        if bytes.is_empty() {
            return Err(CreativeError::transport(SERVICE, "empty image payload"));
        }
        Ok(bytes)
    }

    fn emit_submitted(
        &self,
        unit: usize,
        endpoint: &ServiceEndpoint,
        job_id: Option<&str>,
        credential: Option<&Credential>,
    ) {
        let mut payload = EventPayload::new();
        payload.insert("unit".to_string(), json!(unit));
        payload.insert("endpoint".to_string(), json!(endpoint.base_url));
        payload.insert("job_id".to_string(), json!(job_id));
        payload.insert(
            "credential".to_string(),
            json!(credential.map(|credential| credential.label.as_str())),
        );
        emit_best_effort(self.events.as_ref(), RunEvent::JobSubmitted, payload);
    }

    fn emit_endpoint_failed(&self, unit: usize, endpoint: &ServiceEndpoint, err: &CreativeError) {
        let mut payload = EventPayload::new();
        payload.insert("unit".to_string(), json!(unit));
        payload.insert("endpoint".to_string(), json!(endpoint.base_url));
        payload.insert("kind".to_string(), json!(err.kind()));
        payload.insert("error".to_string(), json!(err.to_string()));
        emit_best_effort(self.events.as_ref(), RunEvent::EndpointFailed, payload);
    }

    fn emit_polled(&self, unit: usize, job: &RemoteJob, http_status: Option<u16>) {
        let mut payload = EventPayload::new();
        payload.insert("unit".to_string(), json!(unit));
        payload.insert("job_id".to_string(), json!(job.id));
        payload.insert("attempt".to_string(), json!(job.attempts));
        payload.insert("status".to_string(), json!(job.status.as_str()));
        if let Some(code) = http_status {
            payload.insert("http_status".to_string(), json!(code));
        }
        emit_best_effort(self.events.as_ref(), RunEvent::JobPolled, payload);
    }
}

/// Submission replies may carry the finished image directly.
fn inline_result(payload: &Value) -> Option<JobOutput> {
    for key in ["b64_json", "image"] {
        if let Some(output) = payload.get(key).and_then(JobOutput::from_value) {
            return Some(output);
        }
    }
    if let Some(output) = payload
        .get("data")
        .and_then(Value::as_array)
        .and_then(|rows| rows.iter().find_map(JobOutput::from_value))
    {
        return Some(output);
    }
    let status = JobStatus::parse(payload.get("status").and_then(Value::as_str));
    if status.is_success() {
        return outputs_from_value(payload.get("outputs")).into_iter().next();
    }
    None
}

fn service_error_message(payload: &Value, status: JobStatus) -> String {
    let message = ["error", "message", "detail"].iter().find_map(|key| match payload.get(*key) {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Some(Value::Object(obj)) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    });
    message.unwrap_or_else(|| format!("job reported status {}", status.as_str()))
}
