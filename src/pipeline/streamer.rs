//! Output streaming.
//!
//! Writes finished paginated output to a caller-supplied sink together with
//! the response metadata (media type, attachment filename) the transport
//! layer needs. The underlying export call is not transactional: a failure
//! mid-export may leave a partial prefix in the sink. The streamer's
//! guarantee is narrower and strict: the error is always surfaced, and
//! nothing further is written after a failure.

use std::io::Write;

use crate::engine::{PaginatedOutput, RenderEngine};
use crate::error::{Error, Result};

/// Response metadata accompanying a streamed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMetadata {
    media_type: String,
    file_name: String,
    content_disposition: String,
}

impl ResponseMetadata {
    /// Metadata for a document of `identifier` exported by `engine`.
    pub fn for_document(engine: &dyn RenderEngine, identifier: &str) -> Self {
        let file_name = format!("{}.{}", identifier, engine.file_extension());
        let content_disposition = format!("attachment; filename=\"{}\"", file_name);
        ResponseMetadata {
            media_type: engine.media_type().to_string(),
            file_name,
            content_disposition,
        }
    }

    /// MIME type for the `Content-Type` header.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Filename of the attachment.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Value for the `Content-Disposition` header.
    pub fn content_disposition(&self) -> &str {
        &self.content_disposition
    }
}

/// Streams paginated output into a sink.
pub struct DocumentStreamer<'a> {
    engine: &'a dyn RenderEngine,
}

impl<'a> DocumentStreamer<'a> {
    /// A streamer exporting through `engine`.
    pub fn new(engine: &'a dyn RenderEngine) -> Self {
        DocumentStreamer { engine }
    }

    /// Export `output` into `sink`, flush it, and return the response
    /// metadata for `identifier`.
    pub fn stream(
        &self,
        output: &PaginatedOutput,
        identifier: &str,
        sink: &mut dyn Write,
    ) -> Result<ResponseMetadata> {
        let metadata = ResponseMetadata::for_document(self.engine, identifier);

        self.engine
            .export(output, sink)
            .map_err(|err| match err {
                err @ Error::Streaming(_) => err,
                other => Error::Streaming(other.to_string()),
            })?;
        sink.flush()
            .map_err(|err| Error::Streaming(format!("flush failed: {}", err)))?;

        log::info!(
            "streamed {} page(s) as {} ({})",
            output.page_count(),
            metadata.file_name,
            metadata.media_type
        );
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CompiledTemplate, CompositionParameters, Page, RowSource};
    use crate::request::TemplateKey;

    struct ExportEngine {
        fail: bool,
    }

    impl RenderEngine for ExportEngine {
        fn compile(&self, key: &TemplateKey, _source: &[u8]) -> Result<CompiledTemplate> {
            Ok(CompiledTemplate::new(key.clone(), ()))
        }

        fn fill(
            &self,
            _template: &CompiledTemplate,
            _parameters: &CompositionParameters,
            _rows: &RowSource,
        ) -> Result<PaginatedOutput> {
            Ok(PaginatedOutput::new())
        }

        fn export(&self, output: &PaginatedOutput, sink: &mut dyn Write) -> Result<()> {
            for page in output.pages() {
                sink.write_all(page.content())?;
            }
            if self.fail {
                return Err(Error::Streaming("sink closed".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_stream_writes_and_reports_metadata() {
        let engine = ExportEngine { fail: false };
        let output = PaginatedOutput::from_pages(vec![Page::new(b"p1".to_vec())]);
        let mut sink = Vec::new();

        let metadata = DocumentStreamer::new(&engine)
            .stream(&output, "anketa", &mut sink)
            .unwrap();

        assert_eq!(sink, b"p1");
        assert_eq!(metadata.media_type(), "application/pdf");
        assert_eq!(metadata.file_name(), "anketa.pdf");
        assert_eq!(
            metadata.content_disposition(),
            "attachment; filename=\"anketa.pdf\""
        );
    }

    #[test]
    fn test_export_failure_is_surfaced() {
        let engine = ExportEngine { fail: true };
        let output = PaginatedOutput::from_pages(vec![Page::new(b"p1".to_vec())]);
        let mut sink = Vec::new();

        let err = DocumentStreamer::new(&engine)
            .stream(&output, "anketa", &mut sink)
            .unwrap_err();
        assert!(matches!(err, Error::Streaming(_)));
        // Partial prefix may remain; that is the documented limitation.
        assert_eq!(sink, b"p1");
    }
}
