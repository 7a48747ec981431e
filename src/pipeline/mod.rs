//! The composition pipeline.
//!
//! One request flows strictly forward through the stages below; no stage
//! reads back from a later one, and no stage is re-entered:
//!
//! ```text
//! CompositionRequest
//!     ↓ resolve (master first, fail fast)
//! ResolvedResource[]
//!     ↓ compile (memoized per key)
//! CompiledTemplate registry
//!     ↓ bind (one job per record, request order)
//! RenderJob[] + CompositionParameters
//!     ↓ fill master
//! PaginatedOutput
//!     ↓ export
//! sink bytes
//! ```
//!
//! Everything is request-local; the only shared state is the explicitly
//! injected [`SharedTemplateCache`]. Cancellation is cooperative and checked
//! between stages; the engine's compile/fill calls are opaque and blocking,
//! so a cancelled request finishes its current stage before stopping.

pub mod compiler;
pub mod registry;
pub mod streamer;

pub use compiler::{SharedTemplateCache, TemplateCompiler};
pub use registry::{base_parameters, build_jobs, RenderJob};
pub use streamer::{DocumentStreamer, ResponseMetadata};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::engine::{PaginatedOutput, RenderEngine, RowSource};
use crate::error::{Error, Result};
use crate::request::{CompositionRequest, TemplateKey};
use crate::resolver::ResourceResolver;

/// Pipeline stages, in order. Linear per request, with failure reachable
/// from every non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Request accepted, nothing resolved yet.
    Received,
    /// Resolving template resources.
    ResolvingResources,
    /// Compiling resolved resources.
    CompilingTemplates,
    /// Binding records into render jobs.
    BuildingJobs,
    /// Filling the master template.
    Composing,
    /// Exporting the finished output to the sink.
    Streaming,
    /// Document streamed.
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "request intake",
            Stage::ResolvingResources => "resource resolution",
            Stage::CompilingTemplates => "template compilation",
            Stage::BuildingJobs => "job assembly",
            Stage::Composing => "composing",
            Stage::Streaming => "streaming",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Cooperative cancellation flag, shared with the caller.
///
/// Checked between pipeline stages, never mid-engine-call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. In-flight work stops at the next stage
    /// boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Runs the full composition pipeline for one request at a time.
///
/// Cheap to construct per request; all state in a run is request-local.
pub struct Composer<'a> {
    engine: &'a dyn RenderEngine,
    resolver: &'a dyn ResourceResolver,
    shared_cache: Option<&'a SharedTemplateCache>,
    master_key: TemplateKey,
    cancel: CancelToken,
}

impl<'a> Composer<'a> {
    /// A composer over `engine` and `resolver` with the default master key.
    pub fn new(engine: &'a dyn RenderEngine, resolver: &'a dyn ResourceResolver) -> Self {
        Composer {
            engine,
            resolver,
            shared_cache: None,
            master_key: TemplateKey::master(),
            cancel: CancelToken::new(),
        }
    }

    /// Consult a process-wide template cache during compilation.
    pub fn with_shared_cache(mut self, cache: &'a SharedTemplateCache) -> Self {
        self.shared_cache = Some(cache);
        self
    }

    /// Fill against a master template other than `"master"` (legacy
    /// two-pass flows use a different master per pass).
    pub fn with_master_key(mut self, key: impl Into<TemplateKey>) -> Self {
        self.master_key = key.into();
        self
    }

    /// Observe this token between stages.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run resolve → compile → bind → fill for one request.
    ///
    /// An empty request is rejected before any resource is touched. The
    /// master template is resolved and compiled first; if that fails, no
    /// other key is attempted.
    pub fn compose(&self, request: &CompositionRequest) -> Result<PaginatedOutput> {
        self.checkpoint(Stage::Received)?;
        if request.is_empty() {
            return Err(Error::EmptyRequest);
        }

        self.checkpoint(Stage::ResolvingResources)?;
        let mut compiler = TemplateCompiler::new(self.engine, self.resolver);
        if let Some(cache) = self.shared_cache {
            compiler = compiler.with_shared_cache(cache);
        }

        // Master first: its absence aborts before any data-driven key.
        let master = compiler.compile(&self.master_key)?;

        self.checkpoint(Stage::CompilingTemplates)?;
        for key in request.datasets().keys() {
            if key.is_master() {
                continue;
            }
            compiler.compile(key)?;
        }

        self.checkpoint(Stage::BuildingJobs)?;
        let registry = compiler.into_registry();
        let jobs = build_jobs(request, &registry);
        let parameters = base_parameters(request, &jobs);
        let rows = master_rows(request, jobs.len());

        self.checkpoint(Stage::Composing)?;
        log::info!(
            "composing master '{}' with {} subreport job(s), {} declared row(s)",
            self.master_key,
            jobs.len(),
            rows.row_count()
        );
        let output = self
            .engine
            .fill(&master, &parameters, &rows)
            .map_err(|err| into_render_error(Stage::Composing, err))?;
        log::debug!("master fill produced {} page(s)", output.page_count());
        Ok(output)
    }

    /// Legacy two-document merge: compose `first`, compose `second`, and
    /// concatenate the second pass's pages onto the first.
    pub fn compose_merged(
        &self,
        first: &CompositionRequest,
        second: &CompositionRequest,
    ) -> Result<PaginatedOutput> {
        let mut output = self.compose(first)?;
        let appendix = self.compose(second)?;
        log::debug!(
            "merging passes: {} + {} page(s)",
            output.page_count(),
            appendix.page_count()
        );
        output.append(appendix);
        Ok(output)
    }

    fn checkpoint(&self, stage: Stage) -> Result<()> {
        if self.cancel.is_cancelled() {
            log::warn!("composition cancelled during {}", stage);
            return Err(Error::Cancelled(stage));
        }
        log::trace!("entering stage: {}", stage);
        Ok(())
    }
}

/// The master fill's row source.
///
/// The engine advances once per declared row, one advance per subreport
/// slot, so with sub-jobs present the declared count must equal the job
/// count. A master-only request instead binds the master's own records
/// directly (no subreport inflation). With neither, one empty row renders
/// a static master.
fn master_rows(request: &CompositionRequest, job_count: usize) -> RowSource {
    if job_count > 0 {
        return RowSource::empty(job_count);
    }
    match request.dataset(&TemplateKey::master()) {
        Some(records) if !records.is_empty() => RowSource::batch(records.to_vec()),
        _ => RowSource::empty(1),
    }
}

fn into_render_error(stage: Stage, err: Error) -> Error {
    match err {
        err @ Error::Render { .. } => err,
        other => Error::Render {
            stage,
            reason: other.to_string(),
        },
    }
}
