//! Diagnostic report produced by an extraction run.
//!
//! Issues are successful-but-imperfect results: the extractor kept going and
//! recorded what it could not make sense of. They are never errors.

use serde::Serialize;

/// How bad an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    /// The extractor stopped after this issue.
    Fatal,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        })
    }
}

/// One diagnostic from one extractor for one input location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub severity: Severity,
    /// 1-based row, when the extractor knows it.
    pub row: Option<u64>,
    /// 1-based column, when the extractor knows it.
    pub column: Option<u64>,
    pub message: String,
}

impl Issue {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            row: None,
            column: None,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, message)
    }

    /// Attach a 1-based location.
    pub fn at(mut self, row: u64, column: u64) -> Self {
        self.row = Some(row);
        self.column = Some(column);
        self
    }
}

/// Collects issues for a single extractor run, enforcing a per-run limit.
#[derive(Debug)]
pub struct IssueCollector {
    issues: Vec<Issue>,
    limit: usize,
}

impl IssueCollector {
    pub fn new(limit: usize) -> Self {
        Self {
            issues: Vec::new(),
            limit,
        }
    }

    /// Record an issue. Returns `false` once the limit is reached; the
    /// extractor must stop reading when that happens.
    pub fn report(&mut self, issue: Issue) -> bool {
        if self.is_exhausted() {
            return false;
        }
        tracing::warn!(
            severity = %issue.severity,
            row = ?issue.row,
            column = ?issue.column,
            "extraction issue: {}",
            issue.message
        );
        self.issues.push(issue);
        if self.issues.len() >= self.limit {
            self.issues.push(Issue::fatal(format!(
                "too many issues ({}), extractor stopped",
                self.limit
            )));
            return false;
        }
        true
    }

    fn is_exhausted(&self) -> bool {
        self.issues
            .last()
            .is_some_and(|last| last.severity == Severity::Fatal)
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn into_issues(self) -> Vec<Issue> {
        self.issues
    }
}

/// Issues keyed by extractor, in the order the extractors ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueReport {
    entries: Vec<(String, Vec<Issue>)>,
}

impl IssueReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an issue for `extractor`, keeping per-extractor order.
    pub fn record(&mut self, extractor: &str, issue: Issue) {
        match self.entries.iter_mut().find(|(name, _)| name == extractor) {
            Some((_, issues)) => issues.push(issue),
            None => self.entries.push((extractor.to_string(), vec![issue])),
        }
    }

    /// Append all issues from one extractor run.
    pub fn extend(&mut self, extractor: &str, issues: impl IntoIterator<Item = Issue>) {
        for issue in issues {
            self.record(extractor, issue);
        }
    }

    /// Issues reported by one extractor.
    pub fn issues_for(&self, extractor: &str) -> &[Issue] {
        self.entries
            .iter()
            .find(|(name, _)| name == extractor)
            .map(|(_, issues)| issues.as_slice())
            .unwrap_or_default()
    }

    /// Every `(extractor, issue)` pair in report order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Issue)> {
        self.entries
            .iter()
            .flat_map(|(name, issues)| issues.iter().map(move |i| (name.as_str(), i)))
    }

    /// Names of extractors that reported at least one issue.
    pub fn extractors(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, issues)| issues.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the engine learned about one run besides the triples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionReport {
    /// Media type the input was extracted as.
    pub media_type: String,
    /// Extractors that accepted the media type, in run order.
    pub extractors: Vec<String>,
    pub issues: IssueReport,
}

impl ExtractionReport {
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }
}
