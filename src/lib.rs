// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # tei-triples
//!
//! Converts TEI-encoded XML documents into RDF triples, keeping whatever went
//! wrong along the way as queryable data.
//!
//! ## Architecture
//!
//! - **Transform chain** (`transform`): stage 1 adds stable element ids,
//!   stage 2 re-encodes the document as RDF/XML; engines are pooled per stage
//! - **Extraction** (`extract`): pluggable extractors (RDF/XML, Turtle,
//!   N-Triples, N-Quads via oxigraph) stream statements into a triple sink
//! - **Problems** (`problems`): every extractor issue becomes a triple in a
//!   `"problems"` graph about the document subject
//! - **Datasets** (`dataset`): default graph plus optional problems graph;
//!   failed conversions still produce one
//!
//! ## Library usage
//!
//! ```no_run
//! use oxigraph::model::NamedNode;
//! use tei_triples::pipeline::Pipeline;
//!
//! let pipeline = Pipeline::with_defaults().unwrap();
//! let subject = NamedNode::new("http://localhost/rest/objects/1").unwrap();
//! let dataset = pipeline.convert(b"<TEI/>", &subject).unwrap();
//! assert!(dataset.problems().is_none());
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod extract;
pub mod model;
pub mod pipeline;
pub mod problems;
pub mod resolve;
pub mod source;
pub mod transform;
pub mod xml;

pub use config::{IssuePolicy, PipelineConfig};
pub use dataset::{Conversion, Dataset};
pub use error::{TeiError, TeiResult, UnsupportedOperation};
pub use pipeline::Pipeline;
