//! Rich diagnostic error types for the TEI triple pipeline.
//!
//! Each stage defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. Errors raised while converting a
//! document never leave [`Pipeline::convert`](crate::pipeline::Pipeline::convert):
//! they are folded into a failure dataset instead. The one exception is
//! [`UnsupportedOperation`], which signals an integration mismatch between the
//! extraction engine and its triple sink.

use miette::Diagnostic;
use thiserror::Error;

use crate::transform::Stage;

/// Top-level error type for the crate.
///
/// Each variant wraps an area-specific error, preserving its diagnostic code
/// and help text through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum TeiError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Unsupported(#[from] UnsupportedOperation),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Program(#[from] ProgramError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Transform errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TransformError {
    #[error("{stage} transform could not read its input at {row}:{column}: {message}")]
    #[diagnostic(
        code(tei::transform::malformed_input),
        help(
            "The stage input is not well-formed XML. For stage 1 this is the submitted \
             TEI document; for stage 2 it is the output of stage 1."
        )
    )]
    MalformedInput {
        stage: Stage,
        message: String,
        row: u64,
        column: u64,
    },

    #[error("{stage} transform produced unusable output: {message}")]
    #[diagnostic(
        code(tei::transform::unusable_output),
        help("The transform ran but its output cannot be handed to the next step.")
    )]
    UnusableOutput { stage: Stage, message: String },
}

impl TransformError {
    /// The stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            Self::MalformedInput { stage, .. } | Self::UnusableOutput { stage, .. } => *stage,
        }
    }
}

pub type TransformResult<T> = std::result::Result<T, TransformError>;

// ---------------------------------------------------------------------------
// Extraction errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ExtractionError {
    #[error("malformed {media_type} input at {row}:{column}: {message}")]
    #[diagnostic(
        code(tei::extract::malformed),
        help(
            "The extraction engine could not parse the document at the syntactic level. \
             If the input came from the transform chain, check the stage 2 program output."
        )
    )]
    Malformed {
        media_type: String,
        message: String,
        row: u64,
        column: u64,
    },

    #[error("no extractor accepts media type \"{media_type}\"")]
    #[diagnostic(
        code(tei::extract::no_extractor),
        help(
            "Registered extractors handle application/rdf+xml, text/turtle, \
             application/n-triples and application/n-quads."
        )
    )]
    NoMatchingExtractor { media_type: String },

    #[error("invalid base IRI \"{iri}\": {message}")]
    #[diagnostic(
        code(tei::extract::base_iri),
        help("The document subject must be an absolute IRI.")
    )]
    InvalidBaseIri { iri: String, message: String },

    #[error("extractor \"{extractor}\" failed to read its input: {message}")]
    #[diagnostic(code(tei::extract::read), help("The input is probably not valid UTF-8."))]
    Read { extractor: String, message: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Sink(#[from] UnsupportedOperation),
}

pub type ExtractionResult<T> = std::result::Result<T, ExtractionError>;

// ---------------------------------------------------------------------------
// Sink contract violations
// ---------------------------------------------------------------------------

/// A triple sink was asked to do something it deliberately does not support.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("unsupported triple sink operation: {operation}")]
#[diagnostic(
    code(tei::sink::unsupported),
    help(
        "The extraction engine invoked a sink capability this integration does not \
         implement. This is a version or configuration mismatch, not a data problem."
    )
)]
pub struct UnsupportedOperation {
    pub operation: &'static str,
}

// ---------------------------------------------------------------------------
// Collaborator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ResolutionError {
    #[error("no subject for \"{handle}\": {message}")]
    #[diagnostic(
        code(tei::resolve::unresolvable),
        help("The subject resolver could not identify a resource for this handle.")
    )]
    Unresolvable { handle: String, message: String },

    #[error("subject \"{value}\" for \"{handle}\" is not an absolute IRI: {message}")]
    #[diagnostic(
        code(tei::resolve::invalid_subject),
        help("Subjects must be absolute IRIs, e.g. http://localhost/rest/objects/1.")
    )]
    InvalidSubject {
        handle: String,
        value: String,
        message: String,
    },
}

#[derive(Debug, Error, Diagnostic)]
pub enum SourceError {
    #[error("failed to read document from {origin}: {source}")]
    #[diagnostic(
        code(tei::source::read),
        help("Check that the document exists and is readable.")
    )]
    Read {
        origin: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Construction-time errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ProgramError {
    #[error("failed to read transform program: {path}")]
    #[diagnostic(code(tei::program::io), help("Ensure the file exists and is readable."))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse transform program \"{name}\": {message}")]
    #[diagnostic(
        code(tei::program::parse),
        help("Check the program TOML syntax against the bundled programs in data/transforms/.")
    )]
    Parse { name: String, message: String },

    #[error("invalid transform program \"{name}\": {message}")]
    #[diagnostic(
        code(tei::program::invalid),
        help("The program parsed but cannot be compiled. Fix the rule named in the message.")
    )]
    Invalid { name: String, message: String },

    #[error("program \"{name}\" is a {actual} program, expected {expected}")]
    #[diagnostic(
        code(tei::program::wrong_kind),
        help("Stage 1 takes an annotate-ids program; stage 2 takes an rdf-xml program.")
    )]
    WrongKind {
        name: String,
        expected: String,
        actual: String,
    },
}

pub type ProgramResult<T> = std::result::Result<T, ProgramError>;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read pipeline config: {path}")]
    #[diagnostic(code(tei::config::read), help("Ensure the config file exists and is valid TOML."))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse pipeline config: {path}: {message}")]
    #[diagnostic(code(tei::config::parse), help("Check the TOML syntax in the config file."))]
    Parse { path: String, message: String },

    #[error("config field `{field}` is not an absolute IRI: \"{value}\"")]
    #[diagnostic(
        code(tei::config::invalid_iri),
        help("Use an absolute IRI with a scheme, e.g. info:fedora/... or http://...")
    )]
    InvalidIri { field: &'static str, value: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Convenience alias for crate-level results.
pub type TeiResult<T> = std::result::Result<T, TeiError>;
