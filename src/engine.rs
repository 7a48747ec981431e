//! The rendering-engine seam.
//!
//! The layout/rendering engine is an external collaborator. This module
//! defines the trait it plugs in behind and the artifact types that cross
//! that boundary:
//!
//! ```text
//! template bytes
//!     ↓ compile
//! CompiledTemplate (opaque, shared per key)
//!     ↓ fill(parameters, row source)
//! PaginatedOutput (owned page sequence, appendable)
//!     ↓ export
//! sink bytes
//! ```
//!
//! Everything here is request-local; nothing in this module caches across
//! composition runs.

use std::any::Any;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::Result;
use crate::request::TemplateKey;
use crate::value::{FieldValue, Record};

/// Reserved parameter name: the ordered list of compiled subreport
/// templates, parallel to [`PARAM_SUBREPORT_DATA_SOURCES`].
pub const PARAM_SUBREPORT_SOURCES: &str = "SubreportSources";

/// Reserved parameter name: the ordered list of subreport row sources,
/// parallel to [`PARAM_SUBREPORT_SOURCES`].
pub const PARAM_SUBREPORT_DATA_SOURCES: &str = "SubreportDataSources";

/// An immutable compiled template artifact.
///
/// The payload is engine-defined and opaque to the pipeline; it is shared
/// by reference across every record bound to the same key, so cloning a
/// `CompiledTemplate` never recompiles anything.
#[derive(Clone)]
pub struct CompiledTemplate {
    key: TemplateKey,
    artifact: Arc<dyn Any + Send + Sync>,
}

impl CompiledTemplate {
    /// Wrap an engine-produced artifact for `key`.
    pub fn new<T: Send + Sync + 'static>(key: TemplateKey, artifact: T) -> Self {
        CompiledTemplate {
            key,
            artifact: Arc::new(artifact),
        }
    }

    /// The normalized key this template was compiled for.
    pub fn key(&self) -> &TemplateKey {
        &self.key
    }

    /// Downcast the opaque artifact back to the engine's concrete type.
    pub fn artifact<T: 'static>(&self) -> Option<&T> {
        self.artifact.downcast_ref::<T>()
    }

    /// Whether two handles share one underlying artifact.
    ///
    /// Memoized compilation guarantees this holds for all templates of one
    /// key within a single composition run.
    pub fn shares_artifact(&self, other: &CompiledTemplate) -> bool {
        Arc::ptr_eq(&self.artifact, &other.artifact)
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// An engine-facing adapter exposing records as successive rows.
///
/// The engine advances once per declared row; for the master fill the
/// declared row count must equal the subreport job count, since each
/// advance corresponds to one subreport slot.
#[derive(Debug, Clone, PartialEq)]
pub enum RowSource {
    /// A batch of concrete records, one row each.
    Records(Vec<Record>),
    /// A placeholder source declaring `rows` empty rows.
    Empty {
        /// Declared row count.
        rows: usize,
    },
}

impl RowSource {
    /// Wrap exactly one record (the standard one-job-per-record binding).
    pub fn single(record: Record) -> Self {
        RowSource::Records(vec![record])
    }

    /// Wrap a whole record list as one source (legacy whole-list binding).
    pub fn batch(records: Vec<Record>) -> Self {
        RowSource::Records(records)
    }

    /// A placeholder source with `rows` declared empty rows.
    pub fn empty(rows: usize) -> Self {
        RowSource::Empty { rows }
    }

    /// Number of rows the engine will advance through.
    pub fn row_count(&self) -> usize {
        match self {
            RowSource::Records(records) => records.len(),
            RowSource::Empty { rows } => *rows,
        }
    }

    /// The record backing row `index`, or `None` for placeholder rows.
    pub fn row(&self, index: usize) -> Option<&Record> {
        match self {
            RowSource::Records(records) => records.get(index),
            RowSource::Empty { .. } => None,
        }
    }

    /// Whether the source declares zero rows.
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }
}

/// A value passed to the master fill call.
#[derive(Debug, Clone)]
pub enum ParamValue {
    /// A plain data field, readable by template expressions.
    Field(FieldValue),
    /// An ordered list of compiled templates (subreport sources).
    Templates(Vec<CompiledTemplate>),
    /// An ordered list of row sources (subreport data sources).
    RowSources(Vec<RowSource>),
}

/// The parameter map supplied to a fill call.
///
/// For a master fill this always contains the two reserved entries
/// [`PARAM_SUBREPORT_SOURCES`] and [`PARAM_SUBREPORT_DATA_SOURCES`] as
/// parallel ordered lists, plus all top-level request fields.
#[derive(Debug, Clone, Default)]
pub struct CompositionParameters {
    entries: IndexMap<String, ParamValue>,
}

impl CompositionParameters {
    /// Create an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a parameter.
    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.entries.insert(name.into(), value);
    }

    /// Insert or replace a plain data field.
    pub fn set_field(&mut self, name: impl Into<String>, value: FieldValue) {
        self.insert(name, ParamValue::Field(value));
    }

    /// Look up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.get(name)
    }

    /// Look up a plain data field by name.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        match self.entries.get(name) {
            Some(ParamValue::Field(value)) => Some(value),
            _ => None,
        }
    }

    /// The ordered subreport template list (empty if not yet assembled).
    pub fn subreport_sources(&self) -> &[CompiledTemplate] {
        match self.entries.get(PARAM_SUBREPORT_SOURCES) {
            Some(ParamValue::Templates(templates)) => templates,
            _ => &[],
        }
    }

    /// The ordered subreport row-source list (empty if not yet assembled).
    pub fn subreport_data_sources(&self) -> &[RowSource] {
        match self.entries.get(PARAM_SUBREPORT_DATA_SOURCES) {
            Some(ParamValue::RowSources(sources)) => sources,
            _ => &[],
        }
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no parameters.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate parameters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// One page of rendered output. Content bytes are engine-defined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    content: Vec<u8>,
}

impl Page {
    /// Wrap rendered page content.
    pub fn new(content: Vec<u8>) -> Self {
        Page { content }
    }

    /// The rendered content bytes.
    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

/// The rendered result of a fill: an owned, ordered page sequence.
///
/// Owned and appendable so two-pass composition can concatenate a second
/// pass's pages onto the first without mutating shared state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginatedOutput {
    pages: Vec<Page>,
}

impl PaginatedOutput {
    /// An output with no pages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an output from rendered pages.
    pub fn from_pages(pages: Vec<Page>) -> Self {
        PaginatedOutput { pages }
    }

    /// Append one page.
    pub fn push_page(&mut self, page: Page) {
        self.pages.push(page);
    }

    /// Append all of `other`'s pages after this output's pages.
    pub fn append(&mut self, other: PaginatedOutput) {
        self.pages.extend(other.pages);
    }

    /// The pages in render order.
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Number of pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Whether the output holds no pages.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// The rendering/layout engine contract.
///
/// Implementations are black boxes to the pipeline: compilation and fill
/// semantics (layout, pagination, expression evaluation) are entirely
/// engine-defined. All three operations are blocking calls expected to
/// finish within one request's bound.
pub trait RenderEngine: Send + Sync {
    /// Compile raw template source into a reusable artifact.
    ///
    /// Fails with a diagnostic on malformed template source.
    fn compile(&self, key: &TemplateKey, source: &[u8]) -> Result<CompiledTemplate>;

    /// Bind a compiled template, parameters, and a row source into
    /// paginated output.
    ///
    /// Fails with a diagnostic on parameter/type mismatch or any
    /// engine-internal error.
    fn fill(
        &self,
        template: &CompiledTemplate,
        parameters: &CompositionParameters,
        rows: &RowSource,
    ) -> Result<PaginatedOutput>;

    /// Serialize paginated output into the target document format.
    ///
    /// The export call is not transactional: on failure the sink may have
    /// received a partial prefix.
    fn export(&self, output: &PaginatedOutput, sink: &mut dyn Write) -> Result<()>;

    /// MIME type of the exported document.
    fn media_type(&self) -> &'static str {
        "application/pdf"
    }

    /// Filename extension of the exported document.
    fn file_extension(&self) -> &'static str {
        "pdf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_artifact_identity() {
        let a = CompiledTemplate::new(TemplateKey::new("x"), 42u32);
        let b = a.clone();
        let c = CompiledTemplate::new(TemplateKey::new("x"), 42u32);

        assert!(a.shares_artifact(&b));
        assert!(!a.shares_artifact(&c));
        assert_eq!(a.artifact::<u32>(), Some(&42));
        assert_eq!(a.artifact::<String>(), None);
    }

    #[test]
    fn test_row_source_counts() {
        let record = Record::new();
        assert_eq!(RowSource::single(record.clone()).row_count(), 1);
        assert_eq!(RowSource::batch(vec![record.clone(), record]).row_count(), 2);
        assert_eq!(RowSource::empty(5).row_count(), 5);
        assert!(RowSource::empty(5).row(0).is_none());
        assert!(RowSource::empty(0).is_empty());
    }

    #[test]
    fn test_output_append_keeps_order() {
        let mut first = PaginatedOutput::from_pages(vec![
            Page::new(b"1".to_vec()),
            Page::new(b"2".to_vec()),
            Page::new(b"3".to_vec()),
        ]);
        let second =
            PaginatedOutput::from_pages(vec![Page::new(b"4".to_vec()), Page::new(b"5".to_vec())]);

        first.append(second);
        assert_eq!(first.page_count(), 5);
        let contents: Vec<&[u8]> = first.pages().iter().map(Page::content).collect();
        assert_eq!(contents, [b"1", b"2", b"3", b"4", b"5"].map(|p| p.as_slice()));
    }

    #[test]
    fn test_parameters_reserved_entries() {
        let mut parameters = CompositionParameters::new();
        assert!(parameters.subreport_sources().is_empty());

        parameters.insert(
            PARAM_SUBREPORT_SOURCES,
            ParamValue::Templates(vec![CompiledTemplate::new(TemplateKey::new("a"), ())]),
        );
        parameters.insert(
            PARAM_SUBREPORT_DATA_SOURCES,
            ParamValue::RowSources(vec![RowSource::empty(1)]),
        );
        parameters.set_field("title", FieldValue::from("Report"));

        assert_eq!(parameters.subreport_sources().len(), 1);
        assert_eq!(parameters.subreport_data_sources().len(), 1);
        assert_eq!(parameters.field("title").and_then(FieldValue::as_str), Some("Report"));
        assert!(parameters.field(PARAM_SUBREPORT_SOURCES).is_none());
    }
}
