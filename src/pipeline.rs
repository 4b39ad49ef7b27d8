//! The conversion pipeline: transform chain, extraction, problem aggregation
//! and dataset assembly behind one entry point.
//!
//! Data errors never escape [`Pipeline::convert`]. A failing stage yields a
//! dataset whose `"problems"` graph says what went wrong. The only `Err` is
//! [`UnsupportedOperation`], which means the extraction engine and the triple
//! sink disagree about their contract.

use oxigraph::model::NamedNode;

use crate::config::{IssuePolicy, PipelineConfig};
use crate::dataset::{Conversion, Dataset, DatasetBuilder};
use crate::error::{ExtractionError, TeiResult, UnsupportedOperation};
use crate::extract::{ExtractionAdapter, ExtractionEngine};
use crate::model::Graph;
use crate::problems::ProblemAggregator;
use crate::resolve::SubjectResolver;
use crate::source::DocumentSource;
use crate::transform::{CompiledTransform, TransformChain};

/// Result of a pipeline call: a conversion, or a sink contract violation.
pub type ConvertResult<T> = std::result::Result<T, UnsupportedOperation>;

/// Converts TEI documents into datasets. Shareable across threads.
#[derive(Debug)]
pub struct Pipeline {
    chain: TransformChain,
    adapter: ExtractionAdapter,
    builder: DatasetBuilder,
    issue_policy: IssuePolicy,
    fallback_subject: NamedNode,
    graph_base: String,
}

impl Pipeline {
    /// Compile the configured programs and set up the engines.
    pub fn new(config: &PipelineConfig) -> TeiResult<Self> {
        config.validate()?;

        let identify = match &config.identify_program {
            Some(path) => CompiledTransform::load(path)?,
            None => CompiledTransform::bundled_identify()?,
        };
        let encode = match &config.encode_program {
            Some(path) => CompiledTransform::load(path)?,
            None => CompiledTransform::bundled_encode()?,
        };
        let chain = TransformChain::new(identify, encode, config.pool_size)?;

        let engine = ExtractionEngine::new().with_max_issues(config.max_issues_per_extractor);
        let adapter = ExtractionAdapter::new(engine, config.media_type.as_str());

        if config.issue_policy == IssuePolicy::Replace {
            tracing::warn!(
                "issue_policy = \"replace\" is a legacy mode: any extraction issue discards \
                 the data graph"
            );
        }

        Ok(Self {
            chain,
            adapter,
            builder: DatasetBuilder::new(ProblemAggregator::new(config.problem_predicate()?)),
            issue_policy: config.issue_policy,
            fallback_subject: config.fallback_subject()?,
            graph_base: config.graph_base.clone(),
        })
    }

    /// A pipeline with the bundled programs and default settings.
    pub fn with_defaults() -> TeiResult<Self> {
        Self::new(&PipelineConfig::default())
    }

    /// Replace the extraction adapter.
    pub fn with_adapter(mut self, adapter: ExtractionAdapter) -> Self {
        self.adapter = adapter;
        self
    }

    pub fn chain(&self) -> &TransformChain {
        &self.chain
    }

    pub fn adapter(&self) -> &ExtractionAdapter {
        &self.adapter
    }

    pub fn graph_base(&self) -> &str {
        &self.graph_base
    }

    pub fn issue_policy(&self) -> IssuePolicy {
        self.issue_policy
    }

    /// Convert a TEI document describing `subject`.
    pub fn convert(&self, document: &[u8], subject: &NamedNode) -> ConvertResult<Dataset> {
        self.conversion(document, subject).map(Conversion::into_dataset)
    }

    /// Like [`convert`](Self::convert), keeping the outcome distinction.
    pub fn conversion(&self, document: &[u8], subject: &NamedNode) -> ConvertResult<Conversion> {
        let conversion = match self.chain.run(document) {
            Ok(output) => {
                tracing::debug!(
                    subject = subject.as_str(),
                    bytes = output.bytes.len(),
                    warnings = output.warnings.len(),
                    "transform chain finished"
                );
                self.extract(&output.bytes, subject)?
            }
            Err(e) => {
                tracing::warn!(subject = subject.as_str(), stage = %e.stage(), "transform failed: {e}");
                self.builder.fail(subject, [e])
            }
        };
        Ok(self.finish(subject, conversion))
    }

    /// Extract already-encoded stage 2 output, bypassing the transform chain.
    pub fn convert_rdf_xml(&self, rdf_xml: &[u8], subject: &NamedNode) -> ConvertResult<Conversion> {
        let conversion = self.extract(rdf_xml, subject)?;
        Ok(self.finish(subject, conversion))
    }

    /// Resolve `handle` to a subject, then convert.
    ///
    /// When resolution fails the document is still run through the chain so
    /// that every failure is reported; the problem triples then describe the
    /// configured fallback subject.
    pub fn convert_resolved(
        &self,
        resolver: &dyn SubjectResolver,
        handle: &str,
        document: &[u8],
    ) -> ConvertResult<Conversion> {
        let unresolved = match resolver.resolve(handle) {
            Ok(subject) => return self.conversion(document, &subject),
            Err(e) => {
                tracing::warn!(handle, "subject resolution failed: {e}");
                e
            }
        };

        let mut causes = vec![unresolved.to_string()];
        match self.chain.transform(document) {
            Ok(bytes) => match self.adapter.extract(&bytes, &self.fallback_subject) {
                Ok(_) => {}
                Err(ExtractionError::Sink(e)) => return Err(e),
                Err(e) => causes.push(e.to_string()),
            },
            Err(e) => causes.push(e.to_string()),
        }
        let conversion = self.builder.fail(&self.fallback_subject, causes);
        Ok(self.finish(&self.fallback_subject, conversion))
    }

    /// Read a document from `source`, resolve `handle`, and convert.
    pub fn convert_source(
        &self,
        source: &dyn DocumentSource,
        resolver: &dyn SubjectResolver,
        handle: &str,
    ) -> ConvertResult<Conversion> {
        match source.open_stream() {
            Ok(bytes) => self.convert_resolved(resolver, handle, &bytes),
            Err(read) => {
                tracing::warn!(origin = %source.origin(), "document source failed: {read}");
                let (subject, causes) = match resolver.resolve(handle) {
                    Ok(subject) => (subject, vec![read.to_string()]),
                    Err(e) => (
                        self.fallback_subject.clone(),
                        vec![e.to_string(), read.to_string()],
                    ),
                };
                let conversion = self.builder.fail(&subject, causes);
                Ok(self.finish(&subject, conversion))
            }
        }
    }

    fn extract(&self, bytes: &[u8], subject: &NamedNode) -> ConvertResult<Conversion> {
        match self.adapter.extract(bytes, subject) {
            Ok((accumulator, report)) => {
                let problems = self.builder.aggregator().aggregate(&report, subject);
                let data = match self.issue_policy {
                    IssuePolicy::Replace if !problems.is_empty() => Graph::new(),
                    _ => accumulator.into_graph(),
                };
                Ok(self.builder.conclude(data, problems))
            }
            Err(ExtractionError::Sink(e)) => {
                tracing::error!(subject = subject.as_str(), "sink contract violated: {e}");
                Err(e)
            }
            Err(e) => {
                tracing::warn!(subject = subject.as_str(), "extraction failed: {e}");
                Ok(self.builder.fail(subject, [e]))
            }
        }
    }

    fn finish(&self, subject: &NamedNode, conversion: Conversion) -> Conversion {
        tracing::info!(
            subject = subject.as_str(),
            outcome = conversion.outcome(),
            triples = conversion.data().map_or(0, Graph::len),
            problems = conversion.problems().map_or(0, Graph::len),
            "conversion finished"
        );
        conversion
    }
}
