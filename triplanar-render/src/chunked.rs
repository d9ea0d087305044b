//! Memory-bounded batched evaluation
//!
//! [`ChunkedEvaluator`] splits a batch along its leading axis, applies a
//! function to each piece in order and concatenates the results. Each
//! chunk's temporaries are dropped before the next chunk starts, and an
//! optional release hook runs between chunks so device allocators can
//! reclaim memory.

use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;
use triplanar_core::{DecoderOutput, Error, Result};

/// Default rows per chunk for field queries
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// How a batch is partitioned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkPolicy {
    /// At most `n` items per chunk; `0` means a single call
    Fixed(usize),
    /// As many items as fit in `budget_bytes`, at least one
    MemoryBudget {
        budget_bytes: usize,
        bytes_per_item: usize,
    },
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        ChunkPolicy::Fixed(DEFAULT_CHUNK_SIZE)
    }
}

impl ChunkPolicy {
    /// Items per chunk; `0` means unbounded
    pub fn chunk_len(&self) -> usize {
        match *self {
            ChunkPolicy::Fixed(n) => n,
            ChunkPolicy::MemoryBudget {
                budget_bytes,
                bytes_per_item,
            } => (budget_bytes / bytes_per_item.max(1)).max(1),
        }
    }
}

/// Input that can be split along its leading axis
pub trait Batched: Sized {
    /// Items along the leading axis
    fn batch_len(&self) -> usize;

    /// Sub-batch covering `range`
    fn slice_range(&self, range: Range<usize>) -> Self;
}

impl<'a, T> Batched for &'a [T] {
    fn batch_len(&self) -> usize {
        self.len()
    }

    fn slice_range(&self, range: Range<usize>) -> Self {
        let slice: &'a [T] = *self;
        &slice[range]
    }
}

impl<'a, A> Batched for ArrayView2<'a, A> {
    fn batch_len(&self) -> usize {
        self.nrows()
    }

    fn slice_range(&self, range: Range<usize>) -> Self {
        let view: ArrayView2<'a, A> = *self;
        view.slice_move(s![range, ..])
    }
}

/// Output that can be joined back together in chunk order
pub trait Concat: Sized {
    fn concat(parts: Vec<Self>) -> Result<Self>;
}

impl<T> Concat for Vec<T> {
    fn concat(parts: Vec<Self>) -> Result<Self> {
        Ok(parts.into_iter().flatten().collect())
    }
}

impl<A: Clone> Concat for Array1<A> {
    fn concat(parts: Vec<Self>) -> Result<Self> {
        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        Ok(ndarray::concatenate(Axis(0), &views)?)
    }
}

impl<A: Clone> Concat for Array2<A> {
    fn concat(parts: Vec<Self>) -> Result<Self> {
        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        Ok(ndarray::concatenate(Axis(0), &views)?)
    }
}

impl Concat for DecoderOutput {
    fn concat(parts: Vec<Self>) -> Result<Self> {
        DecoderOutput::concat(&parts)
    }
}

/// Callback run between chunks
pub type ReleaseHook = Arc<dyn Fn() + Send + Sync>;

/// Applies a function chunk by chunk and concatenates the results in order
#[derive(Clone, Default)]
pub struct ChunkedEvaluator {
    policy: ChunkPolicy,
    release_hook: Option<ReleaseHook>,
}

impl fmt::Debug for ChunkedEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedEvaluator")
            .field("policy", &self.policy)
            .field("release_hook", &self.release_hook.is_some())
            .finish()
    }
}

impl ChunkedEvaluator {
    /// Fixed-size chunks from a configured size; `0` disables chunking
    pub fn new(chunk_size: i64) -> Result<Self> {
        if chunk_size < 0 {
            return Err(Error::Config(format!(
                "chunk size must be non-negative, got {}",
                chunk_size
            )));
        }
        Ok(Self::fixed(chunk_size as usize))
    }

    pub fn fixed(chunk_size: usize) -> Self {
        Self {
            policy: ChunkPolicy::Fixed(chunk_size),
            release_hook: None,
        }
    }

    /// Chunks sized so each holds about `budget_bytes` of per-item temporaries
    pub fn with_memory_budget(budget_bytes: usize, bytes_per_item: usize) -> Result<Self> {
        if bytes_per_item == 0 {
            return Err(Error::Config(
                "bytes per item must be positive for a memory budget".to_string(),
            ));
        }
        Ok(Self {
            policy: ChunkPolicy::MemoryBudget {
                budget_bytes,
                bytes_per_item,
            },
            release_hook: None,
        })
    }

    /// Run `hook` after every chunk
    pub fn with_release_hook<H>(mut self, hook: H) -> Self
    where
        H: Fn() + Send + Sync + 'static,
    {
        self.release_hook = Some(Arc::new(hook));
        self
    }

    pub fn policy(&self) -> ChunkPolicy {
        self.policy
    }

    /// Evaluate `f` over `input` chunk by chunk.
    ///
    /// A chunk length of zero, or one at least the batch length, results in a
    /// single call on the whole input.
    pub fn evaluate<I, O, F>(&self, input: I, mut f: F) -> Result<O>
    where
        I: Batched,
        O: Concat,
        F: FnMut(I) -> Result<O>,
    {
        let total = input.batch_len();
        let chunk = self.policy.chunk_len();
        if chunk == 0 || chunk >= total {
            return f(input);
        }

        let mut parts = Vec::with_capacity(total.div_ceil(chunk));
        for start in (0..total).step_by(chunk) {
            let end = (start + chunk).min(total);
            debug!(start, end, total, "evaluating chunk");
            parts.push(f(input.slice_range(start..end))?);
            if let Some(hook) = &self.release_hook {
                hook();
            }
        }

        O::concat(parts)
    }
}
