//! Subject resolution: turning a repository handle into the IRI of the
//! resource being described.

use oxigraph::model::NamedNode;

use crate::error::ResolutionError;

/// Maps a repository handle (path, PID, ...) to an absolute subject IRI.
pub trait SubjectResolver: Send + Sync {
    fn resolve(&self, handle: &str) -> Result<NamedNode, ResolutionError>;
}

/// Joins handles onto a base IRI: `http://localhost/rest/` + `objects/1`.
#[derive(Debug, Clone)]
pub struct PrefixResolver {
    base: String,
}

impl PrefixResolver {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &str {
        &self.base
    }
}

impl SubjectResolver for PrefixResolver {
    fn resolve(&self, handle: &str) -> Result<NamedNode, ResolutionError> {
        let handle = handle.trim();
        if handle.is_empty() {
            return Err(ResolutionError::Unresolvable {
                handle: handle.to_string(),
                message: "empty handle".into(),
            });
        }
        let value = match (self.base.ends_with('/'), handle.starts_with('/')) {
            (true, true) => format!("{}{}", self.base, &handle[1..]),
            (false, false) => format!("{}/{}", self.base, handle),
            _ => format!("{}{}", self.base, handle),
        };
        NamedNode::new(&value).map_err(|e| ResolutionError::InvalidSubject {
            handle: handle.to_string(),
            value,
            message: e.to_string(),
        })
    }
}

/// Handles that already are absolute IRIs.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityResolver;

impl SubjectResolver for IdentityResolver {
    fn resolve(&self, handle: &str) -> Result<NamedNode, ResolutionError> {
        NamedNode::new(handle).map_err(|e| ResolutionError::InvalidSubject {
            handle: handle.to_string(),
            value: handle.to_string(),
            message: e.to_string(),
        })
    }
}
