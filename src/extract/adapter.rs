//! Bridge between the pipeline and the extraction engine.

use oxigraph::model::NamedNode;

use crate::error::ExtractionResult;
use crate::extract::{ExtractionEngine, ExtractionReport, TripleAccumulator};

/// Media type of the transform chain's output.
pub const RDF_XML: &str = "application/rdf+xml";

/// Runs the engine over one document with a fresh [`TripleAccumulator`] as
/// the sink.
#[derive(Debug)]
pub struct ExtractionAdapter {
    engine: ExtractionEngine,
    media_type: String,
}

impl ExtractionAdapter {
    pub fn new(engine: ExtractionEngine, media_type: impl Into<String>) -> Self {
        Self {
            engine,
            media_type: media_type.into(),
        }
    }

    /// The adapter the pipeline uses by default: built-in extractors over
    /// RDF/XML.
    pub fn rdf_xml() -> Self {
        Self::new(ExtractionEngine::new(), RDF_XML)
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn engine(&self) -> &ExtractionEngine {
        &self.engine
    }

    /// Extract `bytes` with `base` as the resolution base for relative
    /// references.
    pub fn extract(
        &self,
        bytes: &[u8],
        base: &NamedNode,
    ) -> ExtractionResult<(TripleAccumulator, ExtractionReport)> {
        let mut accumulator = TripleAccumulator::new();
        let report = self
            .engine
            .extract(bytes, &self.media_type, base.as_str(), &mut accumulator)?;
        tracing::debug!(
            base = base.as_str(),
            triples = accumulator.graph().len(),
            dropped = accumulator.dropped(),
            issues = report.issues.len(),
            "extraction complete"
        );
        Ok((accumulator, report))
    }
}

impl Default for ExtractionAdapter {
    fn default() -> Self {
        Self::rdf_xml()
    }
}
