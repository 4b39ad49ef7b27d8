//! Internal triple model.
//!
//! Triples are `oxigraph` triples whose subject and predicate are absolute
//! IRIs and whose object is either an absolute IRI or a simple literal. The
//! decision between the two is made by [`object_term`] from the object's
//! string value alone: a value is an identifier only if it parses as an
//! absolute IRI.

use oxigraph::model::{Graph as RdfGraph, Literal, NamedNode, Term, Triple, TripleRef};

/// Reserved name of the diagnostics graph inside a [`Dataset`](crate::dataset::Dataset).
pub const PROBLEMS_GRAPH: &str = "problems";

/// Predicate used for every problem triple unless configured otherwise.
pub const DEFAULT_PROBLEM_PREDICATE: &str = "info:fedora/fedora-system:def/model#hasProblem";

/// Apply the identifier/literal policy to an object value.
///
/// `"info:test/resource"` becomes an IRI; `"/relative/uri/"` and
/// `"literal value"` become literals.
pub fn object_term(value: &str) -> Term {
    match NamedNode::new(value) {
        Ok(iri) => iri.into(),
        Err(_) => Literal::new_simple_literal(value).into(),
    }
}

/// Mint a stable IRI for a blank node label, scoped to the document.
pub fn skolem_iri(document: &NamedNode, label: &str) -> String {
    let base = document.as_str().split('#').next().unwrap_or_default();
    format!("{base}#genid-{label}")
}

/// An unordered set of triples.
///
/// Equality is structural: two graphs are equal when they hold the same
/// triples, whatever order they were inserted in.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    inner: RdfGraph,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a triple. Returns `false` if it was already present.
    pub fn insert(&mut self, triple: &Triple) -> bool {
        self.inner.insert(triple)
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.inner.contains(triple)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = TripleRef<'_>> {
        self.inner.iter()
    }

    /// All objects of triples with the given subject and predicate.
    pub fn objects_for(&self, subject: &NamedNode, predicate: &NamedNode) -> Vec<Term> {
        self.iter()
            .filter(|t| {
                t.predicate == predicate.as_ref()
                    && t.subject.to_string() == subject.to_string()
            })
            .map(|t| t.object.into_owned())
            .collect()
    }
}

impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|t| other.inner.contains(t))
    }
}

impl Eq for Graph {}

impl FromIterator<Triple> for Graph {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        let mut graph = Self::new();
        for triple in iter {
            graph.insert(&triple);
        }
        graph
    }
}
