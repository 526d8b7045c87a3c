//! Processing-stage pipeline
//!
//! A pulled batch passes through an ordered list of stages before ingest.
//! Each stage name maps to an optional hook; a stage without a hook is
//! skipped. Hooks are capability traits composed per data source in
//! [`StageHooks`].
//!
//! `post_processing` works on rows already in the warehouse and normally runs
//! only after ingest. When it is requested in a pre-ingest stage list it still
//! runs, in order, and a warning is logged.

pub mod stages;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::database::DatabaseBackend;
use crate::error::EtlResult;
use crate::models::Batch;

pub use stages::{ColumnRenamer, SourceParser, SpecTyper, SqlScriptPostProcessor};

/// Named processing stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Rename,
    Type,
    Parse,
    PostProcessing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Rename => write!(f, "rename"),
            Stage::Type => write!(f, "type"),
            Stage::Parse => write!(f, "parse"),
            Stage::PostProcessing => write!(f, "post_processing"),
        }
    }
}

/// Renames batch columns onto the warehouse names
pub trait Renamer {
    fn rename(&self, batch: Batch) -> EtlResult<Batch>;
}

/// Coerces batch values onto the declared column types
pub trait Typer {
    fn apply_types(&self, batch: Batch) -> EtlResult<Batch>;
}

/// Source-specific reshaping: derived columns, filtering, stamping
pub trait Parser {
    fn parse(&self, batch: Batch) -> EtlResult<Batch>;
}

/// Runs SQL against rows already landed in the warehouse
#[async_trait(?Send)]
pub trait PostProcessor {
    async fn post_process(&self, backend: &dyn DatabaseBackend) -> EtlResult<()>;
}

/// Optional hook per stage
#[derive(Default)]
pub struct StageHooks {
    pub rename: Option<Box<dyn Renamer>>,
    pub type_: Option<Box<dyn Typer>>,
    pub parse: Option<Box<dyn Parser>>,
    pub post_processing: Option<Box<dyn PostProcessor>>,
}

impl StageHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_renamer(mut self, hook: impl Renamer + 'static) -> Self {
        self.rename = Some(Box::new(hook));
        self
    }

    pub fn with_typer(mut self, hook: impl Typer + 'static) -> Self {
        self.type_ = Some(Box::new(hook));
        self
    }

    pub fn with_parser(mut self, hook: impl Parser + 'static) -> Self {
        self.parse = Some(Box::new(hook));
        self
    }

    pub fn with_post_processor(mut self, hook: impl PostProcessor + 'static) -> Self {
        self.post_processing = Some(Box::new(hook));
        self
    }

    /// Whether a hook is registered for `stage`
    pub fn has(&self, stage: Stage) -> bool {
        match stage {
            Stage::Rename => self.rename.is_some(),
            Stage::Type => self.type_.is_some(),
            Stage::Parse => self.parse.is_some(),
            Stage::PostProcessing => self.post_processing.is_some(),
        }
    }
}

impl fmt::Debug for StageHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageHooks")
            .field("rename", &self.rename.is_some())
            .field("type", &self.type_.is_some())
            .field("parse", &self.parse.is_some())
            .field("post_processing", &self.post_processing.is_some())
            .finish()
    }
}

/// Run `stages` over `batch` in order
///
/// Batch stages replace the batch with their hook's result. A missing hook
/// skips the stage.
pub async fn run_processing(
    mut batch: Batch,
    hooks: &StageHooks,
    stages: &[Stage],
    backend: &dyn DatabaseBackend,
) -> EtlResult<Batch> {
    for stage in stages {
        if !hooks.has(*stage) {
            tracing::debug!(%stage, "No hook registered, skipping stage");
            continue;
        }

        batch = match stage {
            Stage::Rename => match &hooks.rename {
                Some(hook) => hook.rename(batch)?,
                None => batch,
            },
            Stage::Type => match &hooks.type_ {
                Some(hook) => hook.apply_types(batch)?,
                None => batch,
            },
            Stage::Parse => match &hooks.parse {
                Some(hook) => hook.parse(batch)?,
                None => batch,
            },
            Stage::PostProcessing => {
                tracing::warn!(
                    "post_processing requested before ingest; it runs against the warehouse as it is now"
                );
                run_post_processing(hooks, backend).await?;
                batch
            }
        };

        tracing::debug!(%stage, rows = batch.len(), columns = batch.columns().len(), "Stage applied");
    }

    Ok(batch)
}

/// Run the post-processing hook, if any; returns whether one ran
pub async fn run_post_processing(
    hooks: &StageHooks,
    backend: &dyn DatabaseBackend,
) -> EtlResult<bool> {
    match &hooks.post_processing {
        Some(hook) => {
            hook.post_process(backend).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DuckDBBackend;
    use serde_json::{Value, json};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        name: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Renamer for Recorder {
        fn rename(&self, mut batch: Batch) -> EtlResult<Batch> {
            self.log.borrow_mut().push(self.name);
            batch.rename_column("Sessions", "sessions");
            Ok(batch)
        }
    }

    impl Parser for Recorder {
        fn parse(&self, mut batch: Batch) -> EtlResult<Batch> {
            self.log.borrow_mut().push(self.name);
            batch.set_column("data_source", Value::from("ga"));
            Ok(batch)
        }
    }

    #[async_trait(?Send)]
    impl PostProcessor for Recorder {
        async fn post_process(&self, _backend: &dyn DatabaseBackend) -> EtlResult<()> {
            self.log.borrow_mut().push(self.name);
            Ok(())
        }
    }

    fn recorder(name: &'static str, log: &Rc<RefCell<Vec<&'static str>>>) -> Recorder {
        Recorder {
            name,
            log: Rc::clone(log),
        }
    }

    #[test]
    fn test_stage_names() {
        let stages: Vec<Stage> = serde_json::from_value(json!(["rename", "post_processing"])).unwrap();
        assert_eq!(stages, vec![Stage::Rename, Stage::PostProcessing]);
        assert_eq!(Stage::PostProcessing.to_string(), "post_processing");
    }

    #[tokio::test]
    async fn test_stages_run_in_declared_order_and_skip_missing_hooks() {
        let backend = DuckDBBackend::in_memory().unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        let hooks = StageHooks::new()
            .with_parser(recorder("parse", &log))
            .with_renamer(recorder("rename", &log));

        let batch = Batch::from_records(&[json!({"Sessions": 3})]).unwrap();
        let out = run_processing(
            batch,
            &hooks,
            &[Stage::Parse, Stage::Type, Stage::Rename],
            &backend,
        )
        .await
        .unwrap();

        assert_eq!(*log.borrow(), vec!["parse", "rename"]);
        assert_eq!(out.columns(), &["sessions", "data_source"]);
    }

    #[tokio::test]
    async fn test_pre_ingest_post_processing_still_runs() {
        let backend = DuckDBBackend::in_memory().unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        let hooks = StageHooks::new().with_post_processor(recorder("post", &log));

        let batch = Batch::from_records(&[json!({"a": 1})]).unwrap();
        let out = run_processing(batch, &hooks, &[Stage::PostProcessing], &backend)
            .await
            .unwrap();

        assert_eq!(*log.borrow(), vec!["post"]);
        assert_eq!(out.len(), 1);
    }
}
