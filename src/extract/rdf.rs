//! RDF syntax extractors backed by `oxigraph`'s streaming parsers.
//!
//! One [`RdfExtractor`] per serialization. XML-based formats are checked for
//! well-formedness up front so that "not XML at all" is reported as an
//! [`ExtractionError`] while RDF-level syntax errors become issues.
//!
//! The line-based formats and Turtle recover at the next statement, so their
//! extractors keep reading after a syntax error. The RDF/XML parser does not
//! recover: whatever it yields after an error is not in the document. Its
//! extractor records the first syntax error as fatal and stops there, keeping
//! the statements read before it.

use std::sync::LazyLock;

use oxigraph::io::{RdfFormat, RdfParseError, RdfParser};
use oxigraph::model::{GraphName, Term};
use regex::Regex;

use crate::error::{ExtractionError, ExtractionResult};
use crate::extract::handler::{Resource, TripleHandler, Value};
use crate::extract::report::{Issue, IssueCollector};
use crate::extract::{ExtractionContext, Extractor};
use crate::xml::{check_well_formed, find_attribute_value, line_column};

/// Value quoted by an RDF/XML IRI or language tag error.
static RE_QUOTED_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:IRI|language tag) '([^']*)'").unwrap());

/// Extractor for one RDF serialization.
#[derive(Debug, Clone)]
pub struct RdfExtractor {
    name: String,
    format: RdfFormat,
}

impl RdfExtractor {
    pub fn new(name: impl Into<String>, format: RdfFormat) -> Self {
        Self {
            name: name.into(),
            format,
        }
    }

    pub fn rdf_xml() -> Self {
        Self::new("rdf-xml", RdfFormat::RdfXml)
    }

    pub fn turtle() -> Self {
        Self::new("turtle", RdfFormat::Turtle)
    }

    pub fn n_triples() -> Self {
        Self::new("n-triples", RdfFormat::NTriples)
    }

    pub fn n_quads() -> Self {
        Self::new("n-quads", RdfFormat::NQuads)
    }

    pub fn format(&self) -> RdfFormat {
        self.format
    }

    /// Whether the parser can go on after a syntax error.
    fn recovers(&self) -> bool {
        self.format != RdfFormat::RdfXml
    }

    /// Best-effort position for an RDF/XML message without one: the
    /// attribute holding the value the message quotes.
    fn locate(&self, input: &[u8], message: &str) -> Option<(u64, u64)> {
        if self.format != RdfFormat::RdfXml {
            return None;
        }
        let value = RE_QUOTED_VALUE.captures(message)?.get(1)?.as_str();
        find_attribute_value(input, value).map(|offset| line_column(input, offset))
    }

    fn precheck(&self, input: &[u8]) -> ExtractionResult<()> {
        if self.format != RdfFormat::RdfXml {
            return Ok(());
        }
        check_well_formed(input).map_err(|fault| {
            let (row, column) = fault.position(input);
            ExtractionError::Malformed {
                media_type: self.format.media_type().to_string(),
                message: fault.message,
                row,
                column,
            }
        })
    }
}

impl Extractor for RdfExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepts(&self, media_type: &str) -> bool {
        RdfFormat::from_media_type(media_type) == Some(self.format)
    }

    fn extract(
        &self,
        input: &[u8],
        context: &ExtractionContext,
        handler: &mut dyn TripleHandler,
        issues: &mut IssueCollector,
    ) -> ExtractionResult<()> {
        self.precheck(input)?;

        let parser = RdfParser::from_format(self.format)
            .with_base_iri(context.document.as_str())
            .map_err(|e| ExtractionError::InvalidBaseIri {
                iri: context.document.as_str().to_string(),
                message: e.to_string(),
            })?;

        for item in parser.for_reader(input) {
            let quad = match item {
                Ok(quad) => quad,
                Err(RdfParseError::Syntax(e)) => {
                    let message = e.to_string();
                    let location = e
                        .location()
                        .map(|range| (range.start.line + 1, range.start.column + 1))
                        .or_else(|| self.locate(input, &message));
                    let mut issue = if self.recovers() {
                        Issue::error(message)
                    } else {
                        Issue::fatal(message)
                    };
                    if let Some((row, column)) = location {
                        issue = issue.at(row, column);
                    }
                    if issues.report(issue) && self.recovers() {
                        continue;
                    }
                    break;
                }
                Err(RdfParseError::Io(e)) => {
                    return Err(ExtractionError::Read {
                        extractor: self.name.clone(),
                        message: e.to_string(),
                    });
                }
            };

            let subject_term = Term::from(quad.subject);
            let subject = match &subject_term {
                Term::NamedNode(n) => Resource::Iri(n.as_str()),
                Term::BlankNode(b) => Resource::Blank(b.as_str()),
                _ => {
                    if issues.report(Issue::warning(format!(
                        "unsupported subject term {subject_term}"
                    ))) {
                        continue;
                    }
                    break;
                }
            };
            let object = match &quad.object {
                Term::NamedNode(n) => Value::Iri(n.as_str()),
                Term::BlankNode(b) => Value::Blank(b.as_str()),
                Term::Literal(l) => Value::Literal(l.value()),
                #[allow(unreachable_patterns)]
                other => {
                    if issues.report(Issue::warning(format!("unsupported object term {other}"))) {
                        continue;
                    }
                    break;
                }
            };
            let graph = match &quad.graph_name {
                GraphName::NamedNode(n) => Some(n.as_str()),
                _ => None,
            };

            handler.receive_triple(subject, quad.predicate.as_str(), object, graph, context)?;
        }

        Ok(())
    }
}
