use std::time::{Duration, Instant};

use serde::Serialize;

use crate::archive::{self, ExpandResult};
use crate::config::ResolvedConfig;
use crate::error::CurateError;
use crate::layout::{self, FixResult, LayoutRules};
use crate::sidecar::{self, PruneResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Unzip,
    Fix,
    Clean,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Unzip => "unzip",
            Stage::Fix => "fix",
            Stage::Clean => "clean",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AllResult {
    pub unzip: ExpandResult,
    pub fix: FixResult,
    pub clean: PruneResult,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
        }
    }

    fn finished(stage: Stage, started: Instant) -> Self {
        Self {
            message: format!("phase=Done; {}", stage.as_str()),
            elapsed: Some(started.elapsed()),
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Runs the curation stages against one resolved configuration.
#[derive(Debug, Clone)]
pub struct App {
    config: ResolvedConfig,
}

impl App {
    pub fn new(config: ResolvedConfig) -> Self {
        Self { config }
    }

    pub fn expand_archives(&self, sink: &dyn ProgressSink) -> Result<ExpandResult, CurateError> {
        let root = self.config.sourcedata_root()?;
        let started = Instant::now();
        let result = archive::expand_archives(root, &self.config.archive_pattern, sink)?;
        sink.event(ProgressEvent::finished(Stage::Unzip, started));
        Ok(result)
    }

    pub fn fix_layout(&self, sink: &dyn ProgressSink) -> Result<FixResult, CurateError> {
        let root = self.config.dataset_root()?;
        let rules = LayoutRules::from(&self.config);
        let started = Instant::now();
        let result = layout::fix_dataset(root, &rules, sink)?;
        sink.event(ProgressEvent::finished(Stage::Fix, started));
        Ok(result)
    }

    pub fn prune_sidecars(&self, sink: &dyn ProgressSink) -> Result<PruneResult, CurateError> {
        let root = self.config.dataset_root()?;
        let started = Instant::now();
        let result = sidecar::prune_sidecars(root, &self.config.drop_keys, sink)?;
        sink.event(ProgressEvent::finished(Stage::Clean, started));
        Ok(result)
    }

    /// Runs every stage in order. Both roots are checked before anything is
    /// touched.
    pub fn run_all(&self, sink: &dyn ProgressSink) -> Result<AllResult, CurateError> {
        self.config.sourcedata_root()?;
        self.config.dataset_root()?;
        Ok(AllResult {
            unzip: self.expand_archives(sink)?,
            fix: self.fix_layout(sink)?,
            clean: self.prune_sidecars(sink)?,
        })
    }
}
