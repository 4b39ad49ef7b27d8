//! Triple sink contract and the accumulator that backs the pipeline.
//!
//! [`TripleHandler`] is the callback interface the extraction engine drives.
//! Most of it is lifecycle notification this crate has no use for. The
//! accumulator's real capability is narrow: [`TripleAccumulator::receive`] and
//! [`TripleAccumulator::reset`]. Everything else is either an explicit no-op
//! or an explicit, loud refusal.

use std::collections::HashMap;

use oxigraph::model::{NamedNode, Triple};

use crate::error::UnsupportedOperation;
use crate::extract::ExtractionContext;
use crate::model::{Graph, object_term, skolem_iri};

/// Result of a sink callback.
pub type SinkResult = std::result::Result<(), UnsupportedOperation>;

/// A statement subject as delivered by an extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource<'a> {
    Iri(&'a str),
    Blank(&'a str),
}

/// A statement object as delivered by an extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value<'a> {
    Iri(&'a str),
    Blank(&'a str),
    /// Lexical form only; datatype and language are not carried.
    Literal(&'a str),
}

impl Value<'_> {
    /// The raw string form of the value.
    pub fn string_value(&self) -> &str {
        match self {
            Self::Iri(s) | Self::Blank(s) | Self::Literal(s) => s,
        }
    }
}

/// Callback interface driven by the [`ExtractionEngine`](crate::extract::ExtractionEngine).
pub trait TripleHandler {
    /// A new document is about to be extracted.
    fn start_document(&mut self, document: &NamedNode) -> SinkResult;

    /// An extractor is about to run.
    fn open_context(&mut self, context: &ExtractionContext) -> SinkResult;

    /// One statement found by the extractor named in `context`.
    fn receive_triple(
        &mut self,
        subject: Resource<'_>,
        predicate: &str,
        object: Value<'_>,
        graph: Option<&str>,
        context: &ExtractionContext,
    ) -> SinkResult;

    /// A namespace prefix declared by the input.
    fn receive_namespace(
        &mut self,
        prefix: &str,
        iri: &str,
        context: &ExtractionContext,
    ) -> SinkResult;

    /// The extractor named in `context` has finished.
    fn close_context(&mut self, context: &ExtractionContext) -> SinkResult;

    /// The document has been fully extracted.
    fn end_document(&mut self, document: &NamedNode) -> SinkResult;

    /// The engine announces the expected amount of input.
    fn set_content_length(&mut self, length: u64) -> SinkResult;
}

/// Collects received statements into a [`Graph`].
///
/// Objects go through the identifier/literal policy of
/// [`object_term`]. Blank nodes are skolemized against the document IRI
/// and numbered in the order they are first seen, so the same input always
/// yields the same graph whatever labels the parser invents. An accumulator belongs to a single extraction run; [`reset`](Self::reset)
/// exists for sequential reuse only.
#[derive(Debug, Default)]
pub struct TripleAccumulator {
    graph: Graph,
    document: Option<NamedNode>,
    blank_ids: HashMap<String, usize>,
    dropped: usize,
}

impl TripleAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert one statement to the internal representation and keep it.
    ///
    /// Statements whose subject or predicate cannot be made into an absolute
    /// IRI are dropped and counted.
    pub fn receive(&mut self, subject: Resource<'_>, predicate: &str, object: Value<'_>) {
        let Some(subject) = self.subject_node(subject) else {
            self.drop_statement("subject is not an absolute IRI");
            return;
        };
        let Ok(predicate) = NamedNode::new(predicate) else {
            self.drop_statement("predicate is not an absolute IRI");
            return;
        };
        let object = match object {
            Value::Blank(label) => object_term(&self.skolemize(label)),
            other => object_term(other.string_value()),
        };

        let triple = Triple::new(subject, predicate, object);
        tracing::debug!(%triple, "added triple");
        self.graph.insert(&triple);
    }

    /// Clear everything accumulated so far. Idempotent.
    pub fn reset(&mut self) {
        self.graph.clear();
        self.document = None;
        self.blank_ids.clear();
        self.dropped = 0;
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }

    /// Number of statements that could not be stored.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn subject_node(&mut self, subject: Resource<'_>) -> Option<NamedNode> {
        match subject {
            Resource::Iri(iri) => NamedNode::new(iri).ok(),
            Resource::Blank(label) => NamedNode::new(self.skolemize(label)).ok(),
        }
    }

    fn skolemize(&mut self, label: &str) -> String {
        let next = self.blank_ids.len() + 1;
        let n = *self.blank_ids.entry(label.to_string()).or_insert(next);
        skolem_iri(self.document(), &n.to_string())
    }

    fn document(&self) -> &NamedNode {
        static UNSCOPED: std::sync::LazyLock<NamedNode> =
            std::sync::LazyLock::new(|| NamedNode::new_unchecked("urn:x-tei-triples:unscoped"));
        self.document.as_ref().unwrap_or(&UNSCOPED)
    }

    fn drop_statement(&mut self, reason: &str) {
        self.dropped += 1;
        tracing::warn!(reason, "dropped statement");
    }
}

impl TripleHandler for TripleAccumulator {
    fn start_document(&mut self, document: &NamedNode) -> SinkResult {
        self.document = Some(document.clone());
        self.blank_ids.clear();
        Ok(())
    }

    fn open_context(&mut self, _context: &ExtractionContext) -> SinkResult {
        Ok(())
    }

    fn receive_triple(
        &mut self,
        subject: Resource<'_>,
        predicate: &str,
        object: Value<'_>,
        _graph: Option<&str>,
        _context: &ExtractionContext,
    ) -> SinkResult {
        self.receive(subject, predicate, object);
        Ok(())
    }

    fn receive_namespace(
        &mut self,
        _prefix: &str,
        _iri: &str,
        _context: &ExtractionContext,
    ) -> SinkResult {
        Ok(())
    }

    fn close_context(&mut self, _context: &ExtractionContext) -> SinkResult {
        Ok(())
    }

    fn end_document(&mut self, _document: &NamedNode) -> SinkResult {
        Ok(())
    }

    /// Not supported: the accumulator has no use for a length hint, and
    /// accepting it silently would hide an engine/sink contract mismatch.
    fn set_content_length(&mut self, _length: u64) -> SinkResult {
        Err(UnsupportedOperation {
            operation: "set_content_length",
        })
    }
}

#[cfg(test)]
mod tests {
    use oxigraph::model::{Literal, Term};

    use super::*;

    const SUBJECT: &str = "info:fedora/uva-lib:1038847";
    const PREDICATE: &str = "http://fedora.lib.virginia.edu/relationships#testPredicate";

    fn triple(object: Term) -> Triple {
        Triple::new(
            NamedNode::new(SUBJECT).unwrap(),
            NamedNode::new(PREDICATE).unwrap(),
            object,
        )
    }

    #[test]
    fn iri_object_is_kept_as_identifier() {
        let mut acc = TripleAccumulator::new();
        acc.receive(Resource::Iri(SUBJECT), PREDICATE, Value::Iri("info:test/resource"));
        let expected = triple(NamedNode::new("info:test/resource").unwrap().into());
        assert!(acc.graph().contains(&expected));
    }

    #[test]
    fn relative_object_becomes_literal() {
        let mut acc = TripleAccumulator::new();
        acc.receive(Resource::Iri(SUBJECT), PREDICATE, Value::Literal("/relative/uri/"));
        let expected = triple(Literal::new_simple_literal("/relative/uri/").into());
        assert!(acc.graph().contains(&expected));
    }

    #[test]
    fn absolute_literal_becomes_identifier() {
        let mut acc = TripleAccumulator::new();
        acc.receive(Resource::Iri(SUBJECT), PREDICATE, Value::Literal("info:test/resource"));
        let expected = triple(NamedNode::new("info:test/resource").unwrap().into());
        assert!(acc.graph().contains(&expected));
    }

    #[test]
    fn blank_nodes_are_skolemized_against_document() {
        let mut acc = TripleAccumulator::new();
        acc.start_document(&NamedNode::new("http://example.org/doc").unwrap())
            .unwrap();
        acc.receive(Resource::Blank("f3a9"), PREDICATE, Value::Blank("07c1"));
        acc.receive(Resource::Blank("07c1"), PREDICATE, Value::Literal("x"));

        let expected = Triple::new(
            NamedNode::new("http://example.org/doc#genid-1").unwrap(),
            NamedNode::new(PREDICATE).unwrap(),
            NamedNode::new("http://example.org/doc#genid-2").unwrap(),
        );
        assert!(acc.graph().contains(&expected));
        let second = Triple::new(
            NamedNode::new("http://example.org/doc#genid-2").unwrap(),
            NamedNode::new(PREDICATE).unwrap(),
            Literal::new_simple_literal("x"),
        );
        assert!(acc.graph().contains(&second));
    }

    #[test]
    fn blank_numbering_restarts_per_document() {
        let doc = NamedNode::new("http://example.org/doc").unwrap();
        let mut acc = TripleAccumulator::new();
        acc.start_document(&doc).unwrap();
        acc.receive(Resource::Blank("a"), PREDICATE, Value::Literal("x"));
        let first = acc.graph().clone();

        acc.reset();
        acc.start_document(&doc).unwrap();
        acc.receive(Resource::Blank("z"), PREDICATE, Value::Literal("x"));
        assert_eq!(acc.graph(), &first);
    }

    #[test]
    fn invalid_predicate_is_dropped() {
        let mut acc = TripleAccumulator::new();
        acc.receive(Resource::Iri(SUBJECT), "not a predicate", Value::Literal("x"));
        assert!(acc.graph().is_empty());
        assert_eq!(acc.dropped(), 1);
    }

    #[test]
    fn set_content_length_fails_loudly() {
        let mut acc = TripleAccumulator::new();
        let err = acc.set_content_length(0).unwrap_err();
        assert_eq!(err.operation, "set_content_length");
    }

    #[test]
    fn reset_is_idempotent() {
        let mut acc = TripleAccumulator::new();
        acc.receive(Resource::Iri(SUBJECT), PREDICATE, Value::Literal("literal value"));
        acc.reset();
        acc.reset();
        assert!(acc.graph().is_empty());
        assert_eq!(acc.dropped(), 0);
    }
}
