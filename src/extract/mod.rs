//! Pluggable triple extraction engine.
//!
//! The engine holds a registry of [`Extractor`] plugins. For a given input
//! media type it runs every extractor that accepts it, in registration order,
//! streaming statements into a [`TripleHandler`] and collecting each
//! extractor's issues into an [`ExtractionReport`].
//!
//! Only two things make a run fail: input the engine cannot parse at all, and
//! a sink that refuses a callback. Everything else is an issue.

pub mod adapter;
pub mod handler;
pub mod rdf;
pub mod report;

use oxigraph::model::NamedNode;

use crate::error::{ExtractionError, ExtractionResult};

pub use adapter::ExtractionAdapter;
pub use handler::{Resource, SinkResult, TripleAccumulator, TripleHandler, Value};
pub use rdf::RdfExtractor;
pub use report::{ExtractionReport, Issue, IssueCollector, IssueReport, Severity};

/// Default cap on issues recorded per extractor run.
pub const DEFAULT_MAX_ISSUES: usize = 100;

/// What an extractor knows about the run it is part of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionContext {
    /// Name of the extractor currently running.
    pub extractor: String,
    /// Document IRI; the base for relative references.
    pub document: NamedNode,
}

/// One pluggable unit of the engine.
pub trait Extractor: Send + Sync {
    /// Stable identifier, used as the key in issue reports.
    fn name(&self) -> &str;

    /// Whether this extractor handles the (normalized) media type.
    fn accepts(&self, media_type: &str) -> bool;

    /// Extract statements from `input` into `handler`.
    ///
    /// Recoverable problems go to `issues`. Return an error only when the
    /// input cannot be parsed at all or the handler refuses a callback.
    fn extract(
        &self,
        input: &[u8],
        context: &ExtractionContext,
        handler: &mut dyn TripleHandler,
        issues: &mut IssueCollector,
    ) -> ExtractionResult<()>;
}

/// Registry of extractors plus the run loop that drives them.
pub struct ExtractionEngine {
    extractors: Vec<Box<dyn Extractor>>,
    max_issues: usize,
    announce_content_length: bool,
}

impl ExtractionEngine {
    /// An engine with no extractors registered.
    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
            max_issues: DEFAULT_MAX_ISSUES,
            announce_content_length: false,
        }
    }

    /// An engine with the built-in RDF extractors registered.
    pub fn new() -> Self {
        Self::empty()
            .with_extractor(RdfExtractor::rdf_xml())
            .with_extractor(RdfExtractor::turtle())
            .with_extractor(RdfExtractor::n_triples())
            .with_extractor(RdfExtractor::n_quads())
    }

    /// Register another extractor after the existing ones.
    pub fn with_extractor(mut self, extractor: impl Extractor + 'static) -> Self {
        self.extractors.push(Box::new(extractor));
        self
    }

    /// Cap the number of issues each extractor may record (at least 1).
    pub fn with_max_issues(mut self, max_issues: usize) -> Self {
        self.max_issues = max_issues.max(1);
        self
    }

    /// Announce the input length to the handler before extraction starts.
    pub fn with_content_length_announcement(mut self, announce: bool) -> Self {
        self.announce_content_length = announce;
        self
    }

    /// Names of the extractors that accept `media_type`, in run order.
    pub fn extractors_for(&self, media_type: &str) -> Vec<&str> {
        let media_type = normalize_media_type(media_type);
        self.extractors
            .iter()
            .filter(|e| e.accepts(&media_type))
            .map(|e| e.name())
            .collect()
    }

    /// Run every matching extractor over `input`.
    pub fn extract(
        &self,
        input: &[u8],
        media_type: &str,
        document: &str,
        handler: &mut dyn TripleHandler,
    ) -> ExtractionResult<ExtractionReport> {
        let media_type = normalize_media_type(media_type);
        let document = NamedNode::new(document).map_err(|e| ExtractionError::InvalidBaseIri {
            iri: document.to_string(),
            message: e.to_string(),
        })?;

        let matching: Vec<&dyn Extractor> = self
            .extractors
            .iter()
            .filter(|e| e.accepts(&media_type))
            .map(|e| e.as_ref())
            .collect();
        if matching.is_empty() {
            return Err(ExtractionError::NoMatchingExtractor { media_type });
        }

        if self.announce_content_length {
            handler.set_content_length(input.len() as u64)?;
        }
        handler.start_document(&document)?;

        let mut report = ExtractionReport {
            media_type: media_type.clone(),
            extractors: Vec::with_capacity(matching.len()),
            issues: IssueReport::new(),
        };

        for extractor in matching {
            let context = ExtractionContext {
                extractor: extractor.name().to_string(),
                document: document.clone(),
            };
            let mut issues = IssueCollector::new(self.max_issues);

            handler.open_context(&context)?;
            extractor.extract(input, &context, handler, &mut issues)?;
            handler.close_context(&context)?;

            tracing::debug!(
                extractor = extractor.name(),
                issues = issues.len(),
                "extractor finished"
            );
            report.extractors.push(context.extractor);
            report.issues.extend(extractor.name(), issues.into_issues());
        }

        handler.end_document(&document)?;
        Ok(report)
    }
}

impl Default for ExtractionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExtractionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionEngine")
            .field(
                "extractors",
                &self.extractors.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .field("max_issues", &self.max_issues)
            .finish()
    }
}

/// Lowercase and strip parameters: `"Application/RDF+XML; charset=utf-8"`
/// becomes `"application/rdf+xml"`.
pub fn normalize_media_type(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reports a fixed set of issues and one statement.
    struct Noisy;

    impl Extractor for Noisy {
        fn name(&self) -> &str {
            "noisy"
        }

        fn accepts(&self, media_type: &str) -> bool {
            media_type == "text/x-noisy"
        }

        fn extract(
            &self,
            _input: &[u8],
            context: &ExtractionContext,
            handler: &mut dyn TripleHandler,
            issues: &mut IssueCollector,
        ) -> ExtractionResult<()> {
            handler.receive_triple(
                Resource::Iri(context.document.as_str()),
                "http://purl.org/dc/terms/title",
                Value::Literal("Noise"),
                None,
                context,
            )?;
            issues.report(Issue::warning("first").at(1, 2));
            issues.report(Issue::error("second").at(3, 4));
            Ok(())
        }
    }

    #[test]
    fn media_type_is_normalized() {
        assert_eq!(
            normalize_media_type("Application/RDF+XML; charset=UTF-8"),
            "application/rdf+xml"
        );
    }

    #[test]
    fn builtins_cover_rdf_xml() {
        let engine = ExtractionEngine::new();
        assert_eq!(engine.extractors_for("application/rdf+xml"), vec!["rdf-xml"]);
        assert!(engine.extractors_for("text/html").is_empty());
    }

    #[test]
    fn unknown_media_type_is_an_error() {
        let engine = ExtractionEngine::new();
        let mut acc = TripleAccumulator::new();
        let err = engine
            .extract(b"<html/>", "text/html", "http://example.org/d", &mut acc)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::NoMatchingExtractor { .. }));
    }

    #[test]
    fn relative_base_is_an_error() {
        let engine = ExtractionEngine::new();
        let mut acc = TripleAccumulator::new();
        let err = engine
            .extract(b"", "application/n-triples", "/relative", &mut acc)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidBaseIri { .. }));
    }

    #[test]
    fn custom_extractor_issues_are_reported_in_order() {
        let engine = ExtractionEngine::empty().with_extractor(Noisy);
        let mut acc = TripleAccumulator::new();
        let report = engine
            .extract(b"", "text/x-noisy", "http://example.org/d", &mut acc)
            .unwrap();

        assert_eq!(report.extractors, vec!["noisy"]);
        let messages: Vec<_> = report.issues.iter().map(|(_, i)| i.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert_eq!(acc.graph().len(), 1);
    }

    #[test]
    fn content_length_announcement_reaches_the_sink() {
        let engine = ExtractionEngine::empty()
            .with_extractor(Noisy)
            .with_content_length_announcement(true);
        let mut acc = TripleAccumulator::new();
        let err = engine
            .extract(b"", "text/x-noisy", "http://example.org/d", &mut acc)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Sink(_)));
    }
}
