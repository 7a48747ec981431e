//! The report service: the single inbound operation.
//!
//! `compose_document` takes a document identifier and a JSON request body,
//! validates the body's shape against configuration, runs the composition
//! pipeline, and returns the finished document bytes with the response
//! metadata a transport layer needs to answer the call. Translating errors
//! into wire-level responses is the transport's job ([`Error::is_client_fault`]
//! gives it the client/server split).
//!
//! [`Error::is_client_fault`]: crate::error::Error::is_client_fault

use crate::config::ReportConfig;
use crate::engine::RenderEngine;
use crate::error::{Error, Result};
use crate::pipeline::{
    CancelToken, Composer, DocumentStreamer, ResponseMetadata, SharedTemplateCache, Stage,
};
use crate::request::CompositionRequest;
use crate::resolver::ResourceResolver;

/// A finished document plus the metadata to serve it with.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    bytes: Vec<u8>,
    metadata: ResponseMetadata,
}

impl RenderedDocument {
    /// The exported document bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Response metadata (media type, attachment filename).
    pub fn metadata(&self) -> &ResponseMetadata {
        &self.metadata
    }

    /// Consume the document, yielding its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Composes documents on behalf of a transport layer.
///
/// One instance serves many requests; every composition run is
/// request-local apart from the optional shared template cache.
pub struct ReportService {
    engine: Box<dyn RenderEngine>,
    resolver: Box<dyn ResourceResolver>,
    config: ReportConfig,
    cache: Option<SharedTemplateCache>,
}

impl ReportService {
    /// A service over an engine, a resolver, and loaded configuration.
    pub fn new(
        engine: Box<dyn RenderEngine>,
        resolver: Box<dyn ResourceResolver>,
        config: ReportConfig,
    ) -> Self {
        ReportService {
            engine,
            resolver,
            config,
            cache: None,
        }
    }

    /// A service whose resolver is the file store named by `config`.
    pub fn from_config(engine: Box<dyn RenderEngine>, config: ReportConfig) -> Self {
        let resolver = Box::new(config.resolver());
        Self::new(engine, resolver, config)
    }

    /// Enable the process-wide compiled-template cache.
    ///
    /// The baseline recompiles every template on every request; this trades
    /// that simplicity for throughput under repeated requests.
    pub fn with_shared_cache(mut self) -> Self {
        self.cache = Some(SharedTemplateCache::new());
        self
    }

    /// Compose the document `identifier` from a JSON request body.
    pub fn compose_document(
        &self,
        identifier: &str,
        body: &serde_json::Value,
    ) -> Result<RenderedDocument> {
        self.compose_document_with_cancel(identifier, body, CancelToken::new())
    }

    /// [`compose_document`](Self::compose_document), abandoning work at the
    /// next stage boundary once `cancel` fires (caller disconnect/timeout).
    pub fn compose_document_with_cancel(
        &self,
        identifier: &str,
        body: &serde_json::Value,
        cancel: CancelToken,
    ) -> Result<RenderedDocument> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(Error::InvalidRequest(
                "document identifier must not be empty".to_string(),
            ));
        }

        let request = CompositionRequest::from_value(body)?;
        if request.is_empty() {
            return Err(Error::EmptyRequest);
        }
        self.config.validate_request(identifier, &request)?;
        log::info!(
            "composing document '{}' ({} dataset(s), {} record(s))",
            identifier,
            request.datasets().len(),
            request.record_count()
        );

        let output = self.composer(cancel.clone()).compose(&request)?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(Stage::Streaming));
        }
        self.finish(identifier, output)
    }

    /// Legacy two-pass flow: compose both bodies and stream the second
    /// pass's pages after the first.
    pub fn compose_merged_document(
        &self,
        identifier: &str,
        first: &serde_json::Value,
        second: &serde_json::Value,
    ) -> Result<RenderedDocument> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(Error::InvalidRequest(
                "document identifier must not be empty".to_string(),
            ));
        }

        let first = CompositionRequest::from_value(first)?;
        let second = CompositionRequest::from_value(second)?;
        self.config.validate_request(identifier, &first)?;

        let output = self
            .composer(CancelToken::new())
            .compose_merged(&first, &second)?;
        self.finish(identifier, output)
    }

    fn composer(&self, cancel: CancelToken) -> Composer<'_> {
        let mut composer =
            Composer::new(&*self.engine, &*self.resolver).with_cancel_token(cancel);
        if let Some(cache) = &self.cache {
            composer = composer.with_shared_cache(cache);
        }
        composer
    }

    fn finish(
        &self,
        identifier: &str,
        output: crate::engine::PaginatedOutput,
    ) -> Result<RenderedDocument> {
        let mut bytes = Vec::new();
        let metadata =
            DocumentStreamer::new(&*self.engine).stream(&output, identifier, &mut bytes)?;
        log::debug!("document '{}' reached stage: {}", identifier, Stage::Done);
        Ok(RenderedDocument { bytes, metadata })
    }
}
