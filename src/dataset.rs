//! Conversion results: datasets and the three-outcome [`Conversion`] type.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::Write;

use oxigraph::io::{RdfFormat, RdfSerializer};
use oxigraph::model::{GraphNameRef, NamedNode};

use crate::model::{Graph, PROBLEMS_GRAPH};
use crate::problems::ProblemAggregator;

/// Default base for named-graph IRIs when serializing.
pub const DEFAULT_GRAPH_BASE: &str = "info:tei-triples/graph/";

/// Problem recorded for a failure reported without any cause.
pub const UNSPECIFIED_FAILURE: &str = "conversion failed";

/// A default graph plus uniquely named graphs. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    default: Graph,
    named: BTreeMap<String, Graph>,
}

impl Dataset {
    pub fn default_graph(&self) -> &Graph {
        &self.default
    }

    pub fn named(&self, name: &str) -> Option<&Graph> {
        self.named.get(name)
    }

    /// The diagnostics graph, present only when something went wrong.
    pub fn problems(&self) -> Option<&Graph> {
        self.named(PROBLEMS_GRAPH)
    }

    pub fn graph_names(&self) -> impl Iterator<Item = &str> {
        self.named.keys().map(String::as_str)
    }

    /// Triples across all graphs.
    pub fn len(&self) -> usize {
        self.default.len() + self.named.values().map(Graph::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write every graph as quads. Named graphs get `graph_base` + name as
    /// their IRI. `format` must support datasets (N-Quads, TriG).
    pub fn serialize<W: Write>(
        &self,
        format: RdfFormat,
        graph_base: &str,
        writer: W,
    ) -> std::io::Result<W> {
        let mut serializer = RdfSerializer::from_format(format).for_writer(writer);
        for triple in self.default.iter() {
            serializer.serialize_quad(triple.in_graph(GraphNameRef::DefaultGraph))?;
        }
        for (name, graph) in &self.named {
            let iri = NamedNode::new(format!("{graph_base}{name}")).map_err(|e| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("graph name \"{name}\" does not form an IRI: {e}"),
                )
            })?;
            for triple in graph.iter() {
                serializer.serialize_quad(triple.in_graph(iri.as_ref()))?;
            }
        }
        serializer.finish()
    }
}

/// How a conversion ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conversion {
    /// Data only; nothing to report.
    Complete { data: Graph },
    /// Data plus the problems met while producing it.
    Degraded { data: Graph, problems: Graph },
    /// A stage failed; only the problems describing the failure remain.
    Failed { problems: Graph },
}

impl Conversion {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Short label for summaries and logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Complete { .. } => "complete",
            Self::Degraded { .. } => "degraded",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn data(&self) -> Option<&Graph> {
        match self {
            Self::Complete { data } | Self::Degraded { data, .. } => Some(data),
            Self::Failed { .. } => None,
        }
    }

    pub fn problems(&self) -> Option<&Graph> {
        match self {
            Self::Complete { .. } => None,
            Self::Degraded { problems, .. } | Self::Failed { problems } => Some(problems),
        }
    }

    pub fn into_dataset(self) -> Dataset {
        let (default, problems) = match self {
            Self::Complete { data } => (data, None),
            Self::Degraded { data, problems } => (data, Some(problems)),
            Self::Failed { problems } => (Graph::new(), Some(problems)),
        };
        let mut named = BTreeMap::new();
        if let Some(problems) = problems.filter(|p| !p.is_empty()) {
            named.insert(PROBLEMS_GRAPH.to_string(), problems);
        }
        Dataset { default, named }
    }
}

impl From<Conversion> for Dataset {
    fn from(conversion: Conversion) -> Self {
        conversion.into_dataset()
    }
}

/// Composes data and problem graphs into results.
#[derive(Debug, Clone, Default)]
pub struct DatasetBuilder {
    aggregator: ProblemAggregator,
}

impl DatasetBuilder {
    pub fn new(aggregator: ProblemAggregator) -> Self {
        Self { aggregator }
    }

    /// `Complete` when `problems` is empty, `Degraded` otherwise.
    pub fn conclude(&self, data: Graph, problems: Graph) -> Conversion {
        if problems.is_empty() {
            Conversion::Complete { data }
        } else {
            Conversion::Degraded { data, problems }
        }
    }

    /// One problem triple per cause, each carrying the cause's message.
    /// Without causes a single generic problem is recorded, so a failure
    /// never reads as an empty success.
    pub fn fail<C: Display>(
        &self,
        subject: &NamedNode,
        causes: impl IntoIterator<Item = C>,
    ) -> Conversion {
        let mut problems: Graph = causes
            .into_iter()
            .map(|cause| self.aggregator.problem(subject, &cause.to_string()))
            .collect();
        if problems.is_empty() {
            problems.insert(&self.aggregator.problem(subject, UNSPECIFIED_FAILURE));
        }
        Conversion::Failed { problems }
    }

    /// Default graph plus a `"problems"` graph if `problems` is non-empty.
    pub fn build(&self, data: Graph, problems: Graph) -> Dataset {
        self.conclude(data, problems).into_dataset()
    }

    /// Empty default graph plus a `"problems"` graph describing `causes`.
    pub fn build_failure<C: Display>(
        &self,
        subject: &NamedNode,
        causes: impl IntoIterator<Item = C>,
    ) -> Dataset {
        self.fail(subject, causes).into_dataset()
    }

    pub fn aggregator(&self) -> &ProblemAggregator {
        &self.aggregator
    }
}
