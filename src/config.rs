//! Pipeline configuration, persisted as TOML.
//!
//! Every field has a default, so an empty file (or no file) yields the
//! bundled transform programs and the standard problem predicate.

use std::path::{Path, PathBuf};

use oxigraph::model::NamedNode;
use serde::{Deserialize, Serialize};

use crate::dataset::DEFAULT_GRAPH_BASE;
use crate::error::{ConfigError, ConfigResult};
use crate::extract::DEFAULT_MAX_ISSUES;
use crate::extract::adapter::RDF_XML;
use crate::model::DEFAULT_PROBLEM_PREDICATE;

/// What issues do to the data graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssuePolicy {
    /// Keep the data and add a problems graph.
    #[default]
    Additive,
    /// Legacy: any issue empties the data graph.
    Replace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Stage 1 program file. Bundled `add-ids` when absent.
    #[serde(default)]
    pub identify_program: Option<PathBuf>,
    /// Stage 2 program file. Bundled `tei2rdf` when absent.
    #[serde(default)]
    pub encode_program: Option<PathBuf>,
    /// Idle engines kept per stage.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Media type the extraction engine reads the stage 2 output as.
    #[serde(default = "default_media_type")]
    pub media_type: String,
    #[serde(default = "default_max_issues")]
    pub max_issues_per_extractor: usize,
    #[serde(default = "default_problem_predicate")]
    pub problem_predicate: String,
    /// Prefix for named-graph IRIs in serialized output.
    #[serde(default = "default_graph_base")]
    pub graph_base: String,
    /// Subject for failure triples when the real subject cannot be resolved.
    #[serde(default = "default_fallback_subject")]
    pub fallback_subject: String,
    #[serde(default)]
    pub issue_policy: IssuePolicy,
}

fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
fn default_media_type() -> String {
    RDF_XML.into()
}
fn default_max_issues() -> usize {
    DEFAULT_MAX_ISSUES
}
fn default_problem_predicate() -> String {
    DEFAULT_PROBLEM_PREDICATE.into()
}
fn default_graph_base() -> String {
    DEFAULT_GRAPH_BASE.into()
}
fn default_fallback_subject() -> String {
    "info:tei-triples/unresolved".into()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            identify_program: None,
            encode_program: None,
            pool_size: default_pool_size(),
            media_type: default_media_type(),
            max_issues_per_extractor: default_max_issues(),
            problem_predicate: default_problem_predicate(),
            graph_base: default_graph_base(),
            fallback_subject: default_fallback_subject(),
            issue_policy: IssuePolicy::Additive,
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        // Program paths are relative to the config file.
        if let Some(dir) = path.parent() {
            for program in [&mut config.identify_program, &mut config.encode_program]
                .into_iter()
                .flatten()
            {
                if program.is_relative() {
                    *program = dir.join(&*program);
                }
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: "(in memory)".into(),
            message: e.to_string(),
        })
    }

    /// Check every IRI-valued field.
    pub fn validate(&self) -> ConfigResult<()> {
        self.problem_predicate()?;
        self.fallback_subject()?;
        NamedNode::new(format!("{}problems", self.graph_base)).map_err(|_| {
            ConfigError::InvalidIri {
                field: "graph_base",
                value: self.graph_base.clone(),
            }
        })?;
        Ok(())
    }

    pub fn problem_predicate(&self) -> ConfigResult<NamedNode> {
        iri("problem_predicate", &self.problem_predicate)
    }

    pub fn fallback_subject(&self) -> ConfigResult<NamedNode> {
        iri("fallback_subject", &self.fallback_subject)
    }
}

fn iri(field: &'static str, value: &str) -> ConfigResult<NamedNode> {
    NamedNode::new(value).map_err(|_| ConfigError::InvalidIri {
        field,
        value: value.to_string(),
    })
}
