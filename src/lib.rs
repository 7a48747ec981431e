//! # report_forge
//!
//! Paginated document composition: bind named JSON datasets to dynamically
//! resolved templates and fill a master document through a pluggable
//! rendering engine.
//!
//! ```text
//! CompositionRequest (ordered key → records)
//!     ↓
//! [ResourceResolver] (key → resource stream)
//!     ↓
//! [TemplateCompiler] (stream → CompiledTemplate, memoized per key)
//!     ↓
//! [JobRegistry] (one RenderJob per record, request order)
//!     ↓
//! [Composer] (master fill with subreport parameter lists)
//!     ↓
//! [DocumentStreamer] (export + response metadata)
//! ```
//!
//! # Key Design Principles
//!
//! 1. **The engine is a collaborator, not a dependency**: compilation,
//!    fill, and export semantics live behind the [`RenderEngine`] trait.
//!
//! 2. **Order is part of the contract**: datasets, records, subreport
//!    sources, and data sources stay in caller order end to end; the engine
//!    consumes subreport jobs positionally.
//!
//! 3. **Request-local state**: every artifact of a run is created for that
//!    run and dropped afterwards. The one exception, the cross-request
//!    [`SharedTemplateCache`], is explicit and injectable.
//!
//! 4. **Fail fast, fail whole**: the master template resolves first; any
//!    stage failure aborts the request with no partial document.
//!
//! ## Quick Start
//!
//! ```ignore
//! use report_forge::{ReportConfig, ReportService};
//! use serde_json::json;
//!
//! # fn main() -> report_forge::Result<()> {
//! let config = ReportConfig::load()?;
//! let service = ReportService::from_config(Box::new(MyEngine::new()), config);
//!
//! let body = json!({
//!     "master": [],
//!     "relative": [{"name": "R1"}, {"name": "R2"}],
//!     "title": "Family report"
//! });
//! let document = service.compose_document("anketa", &body)?;
//! // document.bytes() + document.metadata() go to the transport layer.
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

// Error handling
pub mod error;

// Data model
pub mod request;
pub mod value;

// External collaborators
pub mod engine;
pub mod resolver;

// Configuration
pub mod config;

// The composition pipeline
pub mod pipeline;

// Inbound operation
pub mod service;

pub use config::ReportConfig;
pub use engine::{
    CompiledTemplate, CompositionParameters, Page, PaginatedOutput, ParamValue, RenderEngine,
    RowSource, PARAM_SUBREPORT_DATA_SOURCES, PARAM_SUBREPORT_SOURCES,
};
pub use error::{Error, Result};
pub use pipeline::{
    CancelToken, Composer, DocumentStreamer, ResponseMetadata, SharedTemplateCache, Stage,
    TemplateCompiler,
};
pub use request::{CompositionRequest, TemplateKey, MASTER_KEY};
pub use resolver::{FileResolver, MemoryResolver, ResolvedResource, ResourceResolver};
pub use service::{RenderedDocument, ReportService};
pub use value::{FieldValue, Record};
