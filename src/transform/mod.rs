//! Two-stage transform chain.
//!
//! Stage 1 ([`Stage::Identify`]) gives every element a stable identifier.
//! Stage 2 ([`Stage::Encode`]) re-encodes the identified document as RDF/XML.
//! Stage 1 output feeds stage 2 directly; nothing is validated in between.

pub mod engine;
pub mod pool;
pub mod program;

use std::sync::Arc;

use serde::Serialize;

use crate::error::{ProgramResult, TransformResult};

pub use engine::{TransformEngine, TransformWarning};
pub use pool::{EnginePool, PoolStats, PooledEngine};
pub use program::{CompiledTransform, ProgramKind, ProgramSource};

/// A position in the transform chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Identify,
    Encode,
}

impl Stage {
    /// 1-based position in the chain.
    pub fn number(self) -> u8 {
        match self {
            Self::Identify => 1,
            Self::Encode => 2,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Identify => "identify",
            Self::Encode => "encode",
        };
        write!(f, "stage {} ({name})", self.number())
    }
}

/// Output of one pass through the chain.
#[derive(Debug, Clone)]
pub struct ChainOutput {
    /// RDF/XML produced by stage 2.
    pub bytes: Vec<u8>,
    /// Warnings from both stages, stage 1 first.
    pub warnings: Vec<TransformWarning>,
}

/// The two stages with their engine pools.
#[derive(Debug)]
pub struct TransformChain {
    identify: EnginePool,
    encode: EnginePool,
}

impl TransformChain {
    /// Build a chain from two compiled programs. The first must be an
    /// `annotate-ids` program, the second an `rdf-xml` program.
    pub fn new(
        identify: CompiledTransform,
        encode: CompiledTransform,
        pool_size: usize,
    ) -> ProgramResult<Self> {
        identify.expect_kind(ProgramKind::AnnotateIds)?;
        encode.expect_kind(ProgramKind::RdfXml)?;
        tracing::info!(
            identify = %identify.name,
            identify_version = %identify.version,
            encode = %encode.name,
            encode_version = %encode.version,
            rules = encode.rule_count(),
            "transform chain compiled"
        );
        Ok(Self {
            identify: EnginePool::new(Arc::new(identify), Stage::Identify, pool_size),
            encode: EnginePool::new(Arc::new(encode), Stage::Encode, pool_size),
        })
    }

    /// A chain running the bundled programs.
    pub fn bundled(pool_size: usize) -> ProgramResult<Self> {
        Self::new(
            CompiledTransform::bundled_identify()?,
            CompiledTransform::bundled_encode()?,
            pool_size,
        )
    }

    /// Run both stages over `input`.
    pub fn transform(&self, input: &[u8]) -> TransformResult<Vec<u8>> {
        self.run(input).map(|out| out.bytes)
    }

    /// Run both stages, keeping the warnings they recorded.
    pub fn run(&self, input: &[u8]) -> TransformResult<ChainOutput> {
        let (identified, mut warnings) = {
            let mut engine = self.identify.acquire();
            let out = engine.run(input)?;
            (out, engine.take_warnings())
        };
        let encoded = {
            let mut engine = self.encode.acquire();
            let out = engine.run(&identified)?;
            warnings.extend(engine.take_warnings());
            out
        };
        Ok(ChainOutput {
            bytes: encoded,
            warnings,
        })
    }

    pub fn pool(&self, stage: Stage) -> &EnginePool {
        match stage {
            Stage::Identify => &self.identify,
            Stage::Encode => &self.encode,
        }
    }
}
