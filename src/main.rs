//! tei-triples CLI: convert TEI documents into RDF datasets.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use oxigraph::io::RdfFormat;
use rayon::prelude::*;
use serde::Serialize;

use tei_triples::config::PipelineConfig;
use tei_triples::dataset::Conversion;
use tei_triples::extract::{ExtractionEngine, TripleAccumulator};
use tei_triples::pipeline::Pipeline;
use tei_triples::resolve::{IdentityResolver, PrefixResolver, SubjectResolver};
use tei_triples::source::{DocumentSource, FileSource};
use tei_triples::transform::{CompiledTransform, ProgramKind};

#[derive(Parser)]
#[command(name = "tei-triples", version, about = "TEI to RDF triple generator")]
struct Cli {
    /// Pipeline config file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert TEI documents into an RDF dataset.
    Convert {
        /// TEI files to convert.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Subject IRI. Only valid with a single input file.
        #[arg(long, conflicts_with = "base")]
        subject: Option<String>,

        /// Base IRI; each file's subject is base + file stem.
        #[arg(long)]
        base: Option<String>,

        /// Output serialization.
        #[arg(long, value_enum, default_value = "nquads")]
        format: OutputFormat,

        /// Print a JSON summary per document to stderr.
        #[arg(long)]
        summary: bool,
    },

    /// Run the extraction engine directly over an RDF file.
    Extract {
        file: PathBuf,

        /// Document IRI used as the base for relative references.
        #[arg(long)]
        base: String,

        /// Media type of the input.
        #[arg(long, default_value = "application/rdf+xml")]
        media_type: String,
    },

    /// Compile a transform program and report what it contains.
    CheckProgram {
        file: PathBuf,
    },

    /// Print the effective pipeline configuration as TOML.
    ShowConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Nquads,
    Trig,
}

impl OutputFormat {
    fn rdf_format(self) -> RdfFormat {
        match self {
            Self::Nquads => RdfFormat::NQuads,
            Self::Trig => RdfFormat::TriG,
        }
    }
}

#[derive(Serialize)]
struct Summary<'a> {
    file: String,
    subject: &'a str,
    outcome: &'static str,
    triples: usize,
    problems: usize,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Convert {
            files,
            subject,
            base,
            format,
            summary,
        } => {
            if subject.is_some() && files.len() > 1 {
                miette::bail!("--subject names one resource; use --base for several files");
            }
            let pipeline = Pipeline::new(&config)?;
            let by_stem = base.is_some();
            let resolver: Box<dyn SubjectResolver> = match base {
                Some(base) => Box::new(PrefixResolver::new(base)),
                None => Box::new(IdentityResolver),
            };

            let results: Vec<(PathBuf, String, Conversion)> = files
                .par_iter()
                .map(|file| {
                    let handle = match &subject {
                        Some(subject) => subject.clone(),
                        None => handle_for(file, by_stem),
                    };
                    let source = FileSource::new(file);
                    pipeline
                        .convert_source(&source, resolver.as_ref(), &handle)
                        .map(|conversion| (file.clone(), handle, conversion))
                })
                .collect::<std::result::Result<_, _>>()?;

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            for (file, handle, conversion) in results {
                if summary {
                    let line = Summary {
                        file: file.display().to_string(),
                        subject: &handle,
                        outcome: conversion.outcome(),
                        triples: conversion.data().map_or(0, |g| g.len()),
                        problems: conversion.problems().map_or(0, |g| g.len()),
                    };
                    eprintln!("{}", serde_json::to_string(&line).into_diagnostic()?);
                }
                conversion
                    .into_dataset()
                    .serialize(format.rdf_format(), pipeline.graph_base(), &mut out)
                    .into_diagnostic()?;
            }
            out.flush().into_diagnostic()?;
        }

        Commands::Extract {
            file,
            base,
            media_type,
        } => {
            let bytes = FileSource::new(&file).open_stream()?;
            let engine = ExtractionEngine::new().with_max_issues(config.max_issues_per_extractor);
            let mut accumulator = TripleAccumulator::new();
            let report = engine.extract(&bytes, &media_type, &base, &mut accumulator)?;

            println!(
                "{} triples from {} (extractors: {})",
                accumulator.graph().len(),
                file.display(),
                report.extractors.join(", ")
            );
            for (extractor, issue) in report.issues.iter() {
                println!(
                    "  [{extractor}] {}",
                    tei_triples::problems::format_issue(issue)
                );
            }
        }

        Commands::CheckProgram { file } => {
            let program = CompiledTransform::load(&file)?;
            println!("{} {} ({})", program.name, program.version, program.kind());
            if !program.description.is_empty() {
                println!("  {}", program.description);
            }
            if program.kind() == ProgramKind::RdfXml {
                println!("  {} rules", program.rule_count());
            }
        }

        Commands::ShowConfig => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Default handle for a file: its stem when a base IRI is given, otherwise
/// its `file://` IRI.
fn handle_for(file: &Path, by_stem: bool) -> String {
    if by_stem {
        return file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    let absolute = std::path::absolute(file).unwrap_or_else(|_| file.to_path_buf());
    format!("file://{}", absolute.display())
}
