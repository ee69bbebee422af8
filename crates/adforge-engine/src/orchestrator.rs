use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use adforge_contracts::brand::{BrandContext, BrandOverrides};
use adforge_contracts::config::{CredentialPoolKind, EngineConfig};
use adforge_contracts::events::{emit_best_effort, now_utc_iso, EventPayload, EventWriter, RunEvent};
use adforge_contracts::runs::summary::{RunSummary, UnitFailure};
use adforge_contracts::units::GenerationUnit;
use adforge_contracts::CreativeError;
use anyhow::Result;
use chrono::Local;
use log::{info, warn};
use serde_json::json;
use uuid::Uuid;

use crate::archive::{build_archive, StagedUnit, StagingArea};
use crate::captions::CaptionGenerator;
use crate::image_edit::ImageEditClient;
use crate::pool::{CredentialPool, LeastLoadedPool, PartitionedPool};
use crate::postprocess::PostProcessor;
use crate::prompting::PromptBuilder;
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::vision::VisionDescriber;

/// Inputs from the request boundary.
#[derive(Debug, Clone, Default)]
pub struct CreativeRequest {
    pub logo: Vec<u8>,
    pub product: Vec<u8>,
    pub overrides: BrandOverrides,
    /// Overrides the configured unit count when set.
    pub units: Option<usize>,
}

/// A finished request: the archive plus what was dropped on the way.
#[derive(Debug, Clone)]
pub struct CreativeArchive {
    pub run_id: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub brand: BrandContext,
    pub requested: usize,
    pub succeeded: usize,
    pub failures: Vec<UnitFailure>,
    pub started_at: String,
    pub finished_at: String,
}

impl CreativeArchive {
    pub fn summary(&self, archive_sha256: Option<String>) -> RunSummary {
        RunSummary {
            run_id: self.run_id.clone(),
            started_at: self.started_at.clone(),
            finished_at: self.finished_at.clone(),
            requested_units: self.requested,
            succeeded_units: self.succeeded,
            failures: self.failures.clone(),
            archive_name: Some(self.file_name.clone()),
            archive_sha256,
        }
    }
}

pub fn archive_file_name() -> String {
    format!("ad_creatives_{}.zip", Local::now().format("%Y%m%d_%H%M%S"))
}

struct UnitResult {
    index: usize,
    outcome: Result<StagedUnit, CreativeError>,
}

pub struct Orchestrator {
    units: usize,
    workers: usize,
    vision: VisionDescriber,
    prompts: PromptBuilder,
    editor: ImageEditClient,
    captions: CaptionGenerator,
    post: PostProcessor,
    pool: Arc<dyn CredentialPool>,
    events: Option<EventWriter>,
}

impl Orchestrator {
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config.request_timeout)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: &EngineConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let vision = VisionDescriber::new(Arc::clone(&transport), config.vision.clone());
        let prompts = if config.rich_prompts && vision.is_configured() {
            PromptBuilder::rich(vision.clone())
        } else {
            PromptBuilder::templated()
        };
        let pool: Arc<dyn CredentialPool> = match config.credential_pool {
            CredentialPoolKind::Partitioned => {
                Arc::new(PartitionedPool::new(config.credentials.clone()))
            }
            CredentialPoolKind::LeastLoaded => Arc::new(LeastLoadedPool::new(
                config.credentials.all(),
                config.credential_max_in_flight,
            )),
        };
        Self {
            units: config.units.max(1),
            workers: config.workers.max(1),
            editor: ImageEditClient::new(
                Arc::clone(&transport),
                config.image_edit.clone(),
                config.poll.clone(),
            ),
            captions: CaptionGenerator::new(transport, config.text.clone()),
            post: PostProcessor::new(config.canvas, config.jpeg_quality),
            vision,
            prompts,
            pool,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Option<EventWriter>) -> Self {
        self.editor = self.editor.with_events(events.clone());
        self.events = events;
        self
    }

    /// Runs every unit and packages the survivors. Fails only when no unit
    /// survives or the request itself is unusable.
    pub fn run(&self, request: &CreativeRequest) -> Result<CreativeArchive, CreativeError> {
        let started_at = now_utc_iso();
        let run_id = self
            .events
            .as_ref()
            .map(|events| events.run_id().to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let requested = request.units.unwrap_or(self.units).max(1);
        let workers = self.workers.min(requested);

        self.emit(
            RunEvent::RunStarted,
            json!({"units": requested, "workers": workers}),
        );
        if let Err(err) = validate_request(request) {
            self.emit_failure(&err);
            return Err(err);
        }
        let staging = match StagingArea::create() {
            Ok(staging) => staging,
            Err(err) => {
                self.emit_failure(&err);
                return Err(err);
            }
        };

        let brand = self
            .vision
            .describe(&request.logo, &request.product, &request.overrides);
        info!(
            "run {run_id}: brand '{}' product '{}' ({:?})",
            brand.brand, brand.product, brand.source
        );
        self.emit(RunEvent::BrandResolved, json!(brand));

        let mut results = self.run_units(requested, workers, &brand, &request.product, &staging);
        results.sort_by_key(|result| result.index);

        let mut staged = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result.outcome {
                Ok(unit) => staged.push(unit),
                Err(err) => failures.push(UnitFailure {
                    index: result.index,
                    kind: err.kind().to_string(),
                    reason: err.to_string(),
                }),
            }
        }

        if staged.is_empty() {
            staging.close();
            let err = CreativeError::AllUnitsFailed {
                requested,
                reasons: failures.iter().map(|failure| failure.reason.clone()).collect(),
            };
            self.emit_failure(&err);
            return Err(err);
        }

        let built = staging
            .entries(&staged)
            .and_then(|entries| build_archive(&entries));
        for unit in &staged {
            staging.discard(unit);
        }
        staging.close();
        let bytes = match built {
            Ok(bytes) => bytes,
            Err(err) => {
                self.emit_failure(&err);
                return Err(err);
            }
        };

        let file_name = archive_file_name();
        info!(
            "run {run_id}: {} of {requested} creatives archived as {file_name}",
            staged.len()
        );
        self.emit(
            RunEvent::ArchiveWritten,
            json!({"file_name": file_name, "bytes": bytes.len(), "entries": staged.len() * 2}),
        );
        self.emit(
            RunEvent::RunFinished,
            json!({"succeeded": staged.len(), "failed": failures.len()}),
        );
        Ok(CreativeArchive {
            run_id,
            file_name,
            bytes,
            brand,
            requested,
            succeeded: staged.len(),
            failures,
            started_at,
            finished_at: now_utc_iso(),
        })
    }

    /// Fixed-size worker pool over a shared index queue.
    fn run_units(
        &self,
        requested: usize,
        workers: usize,
        brand: &BrandContext,
        product: &[u8],
        staging: &StagingArea,
    ) -> Vec<UnitResult> {
        let queue = Mutex::new((0..requested).collect::<VecDeque<usize>>());
        let (tx, rx) = mpsc::channel::<UnitResult>();
        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let queue = &queue;
                scope.spawn(move || loop {
                    let next = queue
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .pop_front();
                    let Some(index) = next else {
                        break;
                    };
                    let outcome = self.run_unit(index, brand, product, staging);
                    if tx.send(UnitResult { index, outcome }).is_err() {
                        break;
                    }
                });
            }
        });
        drop(tx);
        rx.into_iter().collect()
    }

    fn run_unit(
        &self,
        index: usize,
        brand: &BrandContext,
        product: &[u8],
        staging: &StagingArea,
    ) -> Result<StagedUnit, CreativeError> {
        let mut unit = GenerationUnit::new(index);
        self.emit(
            RunEvent::UnitStarted,
            json!({"unit": index, "style": unit.style, "composition": unit.composition}),
        );
        info!("unit {index}: started ({}, {})", unit.style, unit.composition);

        match self.generate_unit(&mut unit, brand, product, staging) {
            Ok(staged) => {
                info!("unit {index}: completed");
                self.emit(
                    RunEvent::UnitCompleted,
                    json!({"unit": index, "credential": unit.credential}),
                );
                Ok(staged)
            }
            Err(err) => {
                unit.fail(err.to_string());
                warn!("unit {index}: dropped ({err})");
                self.emit(
                    RunEvent::UnitFailed,
                    json!({"unit": index, "kind": err.kind(), "reason": unit.failure}),
                );
                Err(err)
            }
        }
    }

    fn generate_unit(
        &self,
        unit: &mut GenerationUnit,
        brand: &BrandContext,
        product: &[u8],
        staging: &StagingArea,
    ) -> Result<StagedUnit, CreativeError> {
        let prompt = self.prompts.build(unit.index, brand, product);
        unit.prompt = Some(prompt.text.clone());

        let credential = self.pool.acquire(unit.index);
        unit.credential = credential.as_ref().map(|credential| credential.label.clone());
        let edited = self
            .editor
            .generate(unit.index, &prompt.text, product, credential.as_ref());
        if let Some(credential) = credential {
            self.pool.release(credential);
        }

        unit.image = Some(self.post.normalize(&edited?.bytes)?);
        unit.caption = Some(self.captions.caption(&prompt.text, unit.index, brand).text);
        staging.stage(unit)
    }

    fn emit(&self, event: RunEvent, payload: serde_json::Value) {
        let payload = match payload {
            serde_json::Value::Object(map) => map,
            _ => EventPayload::new(),
        };
        emit_best_effort(self.events.as_ref(), event, payload);
    }

    fn emit_failure(&self, err: &CreativeError) {
        self.emit(
            RunEvent::RunFailed,
            json!({"kind": err.kind(), "error": err.to_string()}),
        );
    }
}

fn validate_request(request: &CreativeRequest) -> Result<(), CreativeError> {
    if request.logo.is_empty() {
        return Err(CreativeError::Validation("logo image is required".to_string()));
    }
    if request.product.is_empty() {
        return Err(CreativeError::Validation(
            "product image is required".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use adforge_contracts::config::{PollSettings, ServiceEndpoint};
    use adforge_contracts::credentials::CredentialSet;
    use base64::Engine as _;
    use serde_json::Value;
    use zip::ZipArchive;

    use super::*;
    use crate::transport::testing::{chat_reply, png_bytes, ScriptedTransport};
    use crate::transport::HttpReply;

    fn config(units: usize) -> EngineConfig {
        EngineConfig {
            vision: Some(ServiceEndpoint::new("https://vision.test/v1").with_api_key("sk-v")),
            text: Some(ServiceEndpoint::new("https://text.test/v1").with_api_key("sk-t")),
            image_edit: vec![ServiceEndpoint::new("https://edit.test/v2")],
            credentials: CredentialSet::new(Some("sk-image".to_string()), Vec::new()),
            units,
            workers: 3,
            poll: PollSettings {
                interval: std::time::Duration::ZERO,
                max_attempts: 3,
            },
            canvas: 32,
            ..EngineConfig::default()
        }
    }

    fn request() -> CreativeRequest {
        CreativeRequest {
            logo: png_bytes(8, 8),
            product: png_bytes(12, 8),
            overrides: BrandOverrides::default(),
            units: None,
        }
    }

    fn base_transport() -> ScriptedTransport {
        ScriptedTransport::new()
            .route("vision.test", vec![chat_reply("Acme")])
            .route("text.test", vec![chat_reply("Built to last. Order yours today!")])
    }

    fn zip_names(bytes: &[u8]) -> anyhow::Result<Vec<String>> {
        let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec()))?;
        let mut names = Vec::new();
        for idx in 0..archive.len() {
            names.push(archive.by_index(idx)?.name().to_string());
        }
        Ok(names)
    }

    #[test]
    fn every_unit_succeeding_yields_ordered_pairs() -> anyhow::Result<()> {
        let inline = base64::engine::general_purpose::STANDARD.encode(png_bytes(20, 10));
        let transport = Arc::new(
            base_transport().route("/edits", vec![HttpReply::json(200, &json!({"b64_json": inline}))]),
        );
        let archive = Orchestrator::with_transport(&config(5), transport.clone()).run(&request())?;

        assert_eq!(archive.requested, 5);
        assert_eq!(archive.succeeded, 5);
        assert!(archive.failures.is_empty());
        assert_eq!(archive.brand.brand, "Acme");
        assert!(archive.file_name.starts_with("ad_creatives_"));
        assert!(archive.file_name.ends_with(".zip"));

        let names = zip_names(&archive.bytes)?;
        assert_eq!(names.len(), 10);
        assert_eq!(names[0], "creative_01.jpg");
        assert_eq!(names[1], "creative_01.txt");
        assert_eq!(names[9], "creative_05.txt");

        let mut zip = ZipArchive::new(Cursor::new(archive.bytes.clone()))?;
        let mut caption = String::new();
        zip.by_name("creative_03.txt")?.read_to_string(&mut caption)?;
        assert_eq!(caption, "Built to last. Order yours today!");

        let edits: Vec<_> = transport
            .requests()
            .into_iter()
            .filter(|request| request.url.ends_with("/edits"))
            .collect();
        assert_eq!(edits.len(), 5);
        assert!(edits
            .iter()
            .all(|request| request.bearer.as_deref() == Some("sk-image")));
        Ok(())
    }

    #[test]
    fn least_loaded_pool_saturated_by_more_workers_than_slots() -> anyhow::Result<()> {
        let inline = base64::engine::general_purpose::STANDARD.encode(png_bytes(10, 10));
        let transport = Arc::new(
            base_transport().route("/edits", vec![HttpReply::json(200, &json!({"b64_json": inline}))]),
        );
        let mut config = config(8);
        config.workers = 6;
        config.credentials = CredentialSet::new(
            None,
            vec![Some("sk-1".to_string()), Some("sk-2".to_string())],
        );
        config.credential_pool = CredentialPoolKind::LeastLoaded;
        config.credential_max_in_flight = 1;

        let archive = Orchestrator::with_transport(&config, transport.clone()).run(&request())?;
        assert_eq!(archive.succeeded, 8);
        assert!(archive.failures.is_empty());

        let bearers: Vec<Option<String>> = transport
            .requests()
            .into_iter()
            .filter(|request| request.url.ends_with("/edits"))
            .map(|request| request.bearer)
            .collect();
        assert_eq!(bearers.len(), 8);
        assert!(bearers
            .iter()
            .all(|bearer| matches!(bearer.as_deref(), Some("sk-1" | "sk-2"))));
        Ok(())
    }

    #[test]
    fn archive_holds_exactly_the_succeeded_units() -> anyhow::Result<()> {
        let inline = base64::engine::general_purpose::STANDARD.encode(png_bytes(10, 10));
        let transport = Arc::new(
            base_transport()
                .route("/edits", vec![HttpReply::json(200, &json!({"id": "job"}))])
                .route(
                    "/jobs/job",
                    vec![
                        HttpReply::json(200, &json!({"status": "succeeded", "outputs": [inline]})),
                        HttpReply::json(200, &json!({"status": "failed", "error": "moderated"})),
                    ],
                ),
        );
        let mut cfg = config(4);
        cfg.workers = 1;
        let archive = Orchestrator::with_transport(&cfg, transport).run(&request())?;

        assert_eq!(archive.succeeded, 1);
        assert_eq!(archive.failures.len(), 3);
        assert!(archive
            .failures
            .iter()
            .all(|failure| failure.kind == "job_failed"));
        assert_eq!(zip_names(&archive.bytes)?.len(), archive.succeeded * 2);
        assert_eq!(archive.summary(None).failed_units(), 3);
        Ok(())
    }

    #[test]
    fn zero_survivors_is_a_request_failure() {
        let transport = Arc::new(
            base_transport().route("/edits", vec![HttpReply::json(400, &json!({"error": "bad"}))]),
        );
        let err = Orchestrator::with_transport(&config(3), transport)
            .run(&request())
            .err();
        match err {
            Some(CreativeError::AllUnitsFailed { requested, reasons }) => {
                assert_eq!(requested, 3);
                assert_eq!(reasons.len(), 3);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn missing_upload_is_rejected_before_any_call() {
        let transport = Arc::new(base_transport());
        let mut bad = request();
        bad.product.clear();
        let err = Orchestrator::with_transport(&config(2), transport.clone())
            .run(&bad)
            .err();
        assert_eq!(err.map(|err| err.kind()), Some("validation"));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn run_events_cover_the_lifecycle() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let inline = base64::engine::general_purpose::STANDARD.encode(png_bytes(10, 10));
        let transport = Arc::new(
            base_transport().route("/edits", vec![HttpReply::json(200, &json!({"b64_json": inline}))]),
        );
        let mut request = request();
        request.units = Some(2);
        request.overrides = BrandOverrides::new(Some("Acme".into()), Some("anvil".into()));
        let archive = Orchestrator::with_transport(&config(9), transport)
            .with_events(Some(EventWriter::new(&events_path, "run-xyz")))
            .run(&request)?;
        assert_eq!(archive.run_id, "run-xyz");
        assert_eq!(archive.requested, 2);

        let events: Vec<Value> = std::fs::read_to_string(&events_path)?
            .lines()
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?;
        let kinds: Vec<&str> = events
            .iter()
            .filter_map(|event| event["type"].as_str())
            .collect();
        assert_eq!(kinds.first(), Some(&"run_started"));
        assert_eq!(kinds.get(1), Some(&"brand_resolved"));
        assert_eq!(kinds.last(), Some(&"run_finished"));
        assert_eq!(kinds.iter().filter(|kind| **kind == "unit_completed").count(), 2);
        assert_eq!(events[1]["source"], "overrides");
        Ok(())
    }
}
