//! Per-stage engine pools.
//!
//! Compiled programs are immutable and shared behind an `Arc`; engines are
//! not. A caller takes an engine with [`EnginePool::acquire`] and gets a
//! [`PooledEngine`] guard. Dropping the guard resets the engine and returns it,
//! whether the run succeeded, failed, or panicked. An empty pool builds a new
//! engine instead of waiting.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::transform::Stage;
use crate::transform::engine::TransformEngine;
use crate::transform::program::CompiledTransform;

/// Idle engines for one stage.
#[derive(Debug)]
pub struct EnginePool {
    program: Arc<CompiledTransform>,
    stage: Stage,
    idle: Mutex<Vec<TransformEngine>>,
    max_idle: usize,
    created: AtomicUsize,
}

/// Snapshot of a pool's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub created: usize,
}

impl EnginePool {
    /// A pool keeping at most `max_idle` idle engines (at least one).
    pub fn new(program: Arc<CompiledTransform>, stage: Stage, max_idle: usize) -> Self {
        Self {
            program,
            stage,
            idle: Mutex::new(Vec::new()),
            max_idle: max_idle.max(1),
            created: AtomicUsize::new(0),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn program(&self) -> &CompiledTransform {
        &self.program
    }

    /// Take an idle engine, or build one if none is idle. Never blocks on
    /// other callers' runs.
    pub fn acquire(&self) -> PooledEngine<'_> {
        let reused = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let engine = reused.unwrap_or_else(|| {
            let n = self.created.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::debug!(stage = %self.stage, created = n, "new transform engine");
            TransformEngine::new(Arc::clone(&self.program), self.stage)
        });
        PooledEngine {
            engine: Some(engine),
            pool: self,
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.lock().unwrap_or_else(PoisonError::into_inner).len(),
            created: self.created.load(Ordering::Relaxed),
        }
    }

    fn release(&self, mut engine: TransformEngine) {
        engine.reset();
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.max_idle {
            idle.push(engine);
        }
    }
}

/// Exclusive access to one engine; returns it to the pool on drop.
#[derive(Debug)]
pub struct PooledEngine<'a> {
    engine: Option<TransformEngine>,
    pool: &'a EnginePool,
}

impl Deref for PooledEngine<'_> {
    type Target = TransformEngine;

    fn deref(&self) -> &TransformEngine {
        // Only `Drop` takes the engine out.
        self.engine.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledEngine<'_> {
    fn deref_mut(&mut self) -> &mut TransformEngine {
        self.engine.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledEngine<'_> {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            self.pool.release(engine);
        }
    }
}
