//! Orchestration of validation stages
//!
//! One [`Orchestrator`] serves every run against one rules version. It owns
//! the stage registry (an ordered map keyed by [`StageKind`]), the catalog
//! registry and the compiled-artifact caches. Every stage call goes through
//! a fault boundary: an error or a panic inside a stage becomes a single
//! `ENGINE:LEVEL_CRASH` finding for that stage and the run carries on.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use mits_adapter_xml::XmlParser;
use mits_catalog::{CatalogLoader, CatalogState};
use mits_findings::{Finding, StageResult, codes};
use mits_ir::XmlDocument;
use mits_schema::{ArtifactCache, DEFAULT_VERSION, RuleSet, RulesLayout, XsdSchema};
use mits_validation::{
    BusinessRuleStage, SchemaStage, SemanticStage, Stage, StageInput, StageKind, WellFormedStage,
};
use tracing::{debug, info, warn};

use crate::envelope::{InputDescriptor, InputSource, ResultEnvelope, ValidatorInfo};
use crate::intake::check_intake;
use crate::profiles::{Profile, ProfileResolver};

/// How the stages of one run are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// One stage after another on the calling thread
    #[default]
    Sequential,
    /// Each stage on its own scoped thread; results keep profile order
    Parallel,
}

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Directory holding one subdirectory per catalog version
    pub rules_root: PathBuf,
    /// Catalog version to validate against
    pub version: String,
    pub mode: ExecutionMode,
}

impl OrchestratorConfig {
    pub fn new(rules_root: impl Into<PathBuf>) -> Self {
        Self {
            rules_root: rules_root.into(),
            version: DEFAULT_VERSION.to_string(),
            mode: ExecutionMode::default(),
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn layout(&self) -> RulesLayout {
        RulesLayout::new(&self.rules_root, &self.version)
    }
}

/// The bytes to validate and what is known about them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationInput {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub source: InputSource,
    pub filename: Option<String>,
    pub url: Option<String>,
}

impl ValidationInput {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Mark the input as read from a file.
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self.source = InputSource::File;
        self
    }

    /// Mark the input as fetched from a URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self.source = InputSource::Url;
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: InputSource) -> Self {
        self.source = source;
        self
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        u64::try_from(self.bytes.len()).unwrap_or(u64::MAX)
    }

    #[must_use]
    pub fn descriptor(&self) -> InputDescriptor {
        InputDescriptor {
            source: self.source,
            filename: self.filename.clone(),
            url: self.url.clone(),
            size_bytes: self.size(),
            content_type: self.content_type.clone(),
        }
    }
}

/// Runs profiles of stages against documents
pub struct Orchestrator {
    config: OrchestratorConfig,
    stages: BTreeMap<StageKind, Arc<dyn Stage>>,
    catalogs: CatalogState,
    catalog_findings: Vec<Finding>,
    profiles: ProfileResolver,
    parser: XmlParser,
    xsd_cache: ArtifactCache<XsdSchema>,
    rules_cache: ArtifactCache<RuleSet>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("stages", &self.stages.keys().collect::<Vec<_>>())
            .field("catalogs_loaded", &self.catalogs.is_loaded())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Load catalogs and rule artifacts for the configured version and
    /// register every stage. Missing or broken rule files do not fail
    /// construction; they surface as findings when the stage runs.
    pub fn new(config: OrchestratorConfig) -> Self {
        let layout = config.layout();
        let start = Instant::now();

        let (registry, catalog_findings) = CatalogLoader::new(layout.clone()).load();
        let catalogs = match catalog_findings
            .iter()
            .find(|f| f.code() == codes::CATALOG_VERSION_NOT_FOUND)
        {
            Some(finding) => CatalogState::Failed(finding.message().to_string()),
            None => CatalogState::from(registry),
        };

        let mut orchestrator = Self {
            profiles: ProfileResolver::new(layout),
            config,
            stages: BTreeMap::new(),
            catalogs,
            catalog_findings,
            parser: XmlParser::new(),
            xsd_cache: ArtifactCache::new(),
            rules_cache: ArtifactCache::new(),
        };
        orchestrator.reload_rules();

        info!(
            version = orchestrator.config.version.as_str(),
            stages = orchestrator.stages.len(),
            catalogs_loaded = orchestrator.catalogs.is_loaded(),
            catalog_findings = orchestrator.catalog_findings.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "orchestrator ready"
        );
        orchestrator
    }

    /// Re-register the built-in stages, recompiling rule files that changed
    /// on disk since they were last compiled.
    pub fn reload_rules(&mut self) {
        let layout = self.config.layout();
        self.register(Arc::new(WellFormedStage::with_parser(self.parser.clone())));
        self.register(Arc::new(SchemaStage::load(&layout, &self.xsd_cache)));
        self.register(Arc::new(BusinessRuleStage::load(&layout, &self.rules_cache)));
        self.register(Arc::new(SemanticStage::new(self.catalogs.clone())));
    }

    /// Register a stage, replacing any stage of the same kind.
    pub fn register(&mut self, stage: Arc<dyn Stage>) {
        self.stages.insert(stage.kind(), stage);
    }

    /// Remove a stage; profiles enabling it then report it as missing.
    pub fn unregister(&mut self, kind: StageKind) -> Option<Arc<dyn Stage>> {
        self.stages.remove(&kind)
    }

    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    #[must_use]
    pub fn catalogs(&self) -> &CatalogState {
        &self.catalogs
    }

    /// Findings produced while loading the catalogs.
    #[must_use]
    pub fn catalog_findings(&self) -> &[Finding] {
        &self.catalog_findings
    }

    #[must_use]
    pub fn profiles(&self) -> &ProfileResolver {
        &self.profiles
    }

    /// Names of the registered stages in canonical order.
    #[must_use]
    pub fn levels_available(&self) -> Vec<String> {
        self.stages.keys().map(|k| k.name().to_string()).collect()
    }

    /// Validate under a named profile. Never fails.
    #[must_use]
    pub fn validate(&self, input: &ValidationInput, profile: &str) -> ResultEnvelope {
        let profile = self.profiles.resolve(profile);
        self.validate_with(input, &profile)
    }

    /// Validate under an already resolved profile. Never fails.
    #[must_use]
    pub fn validate_with(&self, input: &ValidationInput, profile: &Profile) -> ResultEnvelope {
        let start = Instant::now();
        let validator = self.validator_info(&profile.name);

        let mut intake = Vec::new();
        if let Some(limits) = &profile.intake_limits {
            let found = profile.apply_overrides(check_intake(
                limits,
                input.size(),
                input.content_type.as_deref(),
            ));
            // Rejection only when an error survives the profile's overrides
            if found.iter().any(Finding::is_error) {
                debug!(profile = profile.name.as_str(), findings = found.len(), "input rejected at intake");
                return ResultEnvelope::intake_failure(validator, input.descriptor(), found);
            }
            intake = found;
        }

        let results = self.run_stages(input, profile);
        let envelope = ResultEnvelope::from_stages(validator, input.descriptor(), &results, start.elapsed())
            .with_intake_findings(intake);
        debug!(
            request_id = %envelope.request_id(),
            profile = profile.name.as_str(),
            valid = envelope.summary.valid,
            errors = envelope.summary.errors,
            warnings = envelope.summary.warnings,
            "validation finished"
        );
        envelope
    }

    /// Run the profile's stages and return their results in profile order,
    /// with severity overrides applied.
    #[must_use]
    pub fn run_stages(&self, input: &ValidationInput, profile: &Profile) -> Vec<StageResult> {
        let document = self.parse(&input.bytes);
        let mut stage_input = StageInput::new(&input.bytes);
        stage_input.content_type = input.content_type.as_deref();
        stage_input.document = document.as_ref();

        let planned: Vec<(&str, Option<&dyn Stage>)> = profile
            .enabled_levels
            .iter()
            .map(|level| {
                let stage = StageKind::from_name(level)
                    .and_then(|kind| self.stages.get(&kind))
                    .map(|stage| &**stage);
                (level.as_str(), stage)
            })
            .collect();

        let results: Vec<StageResult> = match self.config.mode {
            ExecutionMode::Sequential => planned
                .iter()
                .map(|(name, stage)| run_guarded(name, *stage, &stage_input))
                .collect(),
            ExecutionMode::Parallel => run_parallel(&planned, &stage_input),
        };

        results
            .into_iter()
            .map(|result| StageResult {
                findings: profile.apply_overrides(result.findings),
                ..result
            })
            .collect()
    }

    fn parse(&self, bytes: &[u8]) -> Option<XmlDocument> {
        match self.parser.parse(bytes) {
            Ok(document) => Some(document),
            Err(e) => {
                debug!(error = %e, "document did not parse; later stages see no tree");
                None
            }
        }
    }

    /// Identity block for envelopes produced under `profile`.
    #[must_use]
    pub fn validator_info(&self, profile: &str) -> ValidatorInfo {
        ValidatorInfo::new(profile, &self.config.version, self.levels_available())
    }
}

fn run_parallel(planned: &[(&str, Option<&dyn Stage>)], input: &StageInput<'_>) -> Vec<StageResult> {
    thread::scope(|scope| {
        let handles: Vec<_> = planned
            .iter()
            .map(|&(name, stage)| (name, scope.spawn(move || run_guarded(name, stage, input))))
            .collect();
        handles
            .into_iter()
            .map(|(name, handle)| {
                handle
                    .join()
                    .unwrap_or_else(|payload| crash(name, &panic_message(&*payload), Duration::ZERO))
            })
            .collect()
    })
}

/// Run one stage behind the fault boundary.
fn run_guarded(name: &str, stage: Option<&dyn Stage>, input: &StageInput<'_>) -> StageResult {
    let Some(stage) = stage else {
        warn!(stage = name, "stage enabled by profile but not registered");
        return StageResult::new(
            name,
            vec![
                Finding::new(
                    codes::ENGINE_RULES_MISSING,
                    format!("Validation level {name} not available"),
                )
                .with_rule_reference(format!("internal://{name}")),
            ],
            Duration::ZERO,
        );
    };

    let start = Instant::now();
    match catch_unwind(AssertUnwindSafe(|| stage.run(input))) {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => crash(name, &e.to_string(), start.elapsed()),
        Err(payload) => crash(name, &panic_message(&*payload), start.elapsed()),
    }
}

fn crash(name: &str, reason: &str, duration: Duration) -> StageResult {
    warn!(stage = name, reason, "validation stage crashed");
    StageResult::new(
        name,
        vec![
            Finding::new(
                codes::ENGINE_LEVEL_CRASH,
                format!("Validation level {name} crashed: {reason}"),
            )
            .with_rule_reference(format!("internal://{name}")),
        ],
        duration,
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "stage panicked".to_string())
}
