//! Problems as data.
//!
//! Every issue an extractor reports becomes one triple
//! `(subject, problem-predicate, "Extraction issue: (<column>,<row>): <message>")`
//! in a graph of its own, so diagnostics travel with the data instead of being
//! lost in a log.

use oxigraph::model::{Literal, NamedNode, Triple};

use crate::extract::{ExtractionReport, Issue};
use crate::model::{DEFAULT_PROBLEM_PREDICATE, Graph};

/// Render an issue the way it appears in the problems graph.
///
/// An unknown row or column renders as `-1`.
pub fn format_issue(issue: &Issue) -> String {
    let coordinate = |v: Option<u64>| v.map_or_else(|| "-1".to_string(), |v| v.to_string());
    format!(
        "Extraction issue: ({},{}): {}",
        coordinate(issue.column),
        coordinate(issue.row),
        issue.message
    )
}

/// Turns diagnostic reports and failure causes into problem triples.
#[derive(Debug, Clone)]
pub struct ProblemAggregator {
    predicate: NamedNode,
}

impl ProblemAggregator {
    pub fn new(predicate: NamedNode) -> Self {
        Self { predicate }
    }

    pub fn predicate(&self) -> &NamedNode {
        &self.predicate
    }

    /// One triple per `(extractor, issue)` pair. Empty when there are no
    /// issues.
    pub fn aggregate(&self, report: &ExtractionReport, subject: &NamedNode) -> Graph {
        report
            .issues
            .iter()
            .map(|(_, issue)| self.problem(subject, &format_issue(issue)))
            .collect()
    }

    /// A single problem triple carrying `message` verbatim.
    pub fn problem(&self, subject: &NamedNode, message: &str) -> Triple {
        Triple::new(
            subject.clone(),
            self.predicate.clone(),
            Literal::new_simple_literal(message),
        )
    }
}

impl Default for ProblemAggregator {
    fn default() -> Self {
        Self::new(NamedNode::new_unchecked(DEFAULT_PROBLEM_PREDICATE))
    }
}
