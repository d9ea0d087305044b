//! Parallel processing utilities for rendering and extraction
//!
//! This module provides configurable thread pool management for the CPU
//! paths of the crate: per-point triplane sampling, per-ray integration and
//! per-cube marching cubes.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, OnceLock};
use triplanar_core::{Error, Result};

/// Global thread pool for CPU kernels; `None` means rayon's global pool
static GLOBAL_THREAD_POOL: OnceLock<Option<Arc<ThreadPool>>> = OnceLock::new();
static THREAD_POOL_CONFIG: Mutex<Option<ThreadPoolConfig>> = Mutex::new(None);

/// Thread pool configuration for parallel processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadPoolConfig {
    /// Number of threads to use (None = one per logical CPU)
    pub num_threads: Option<usize>,
    /// Thread stack size in bytes
    pub stack_size: Option<usize>,
    /// Thread name prefix
    pub thread_name_prefix: String,
    /// Enable parallel processing (can be disabled for debugging)
    pub enabled: bool,
    /// Inputs shorter than this are processed sequentially
    pub min_parallel_len: usize,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            stack_size: Some(8 * 1024 * 1024), // 8MB stack
            thread_name_prefix: "triplanar".to_string(),
            enabled: true,
            min_parallel_len: 64,
        }
    }
}

impl ThreadPoolConfig {
    /// Set number of threads
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Set stack size
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Enable or disable parallel processing
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the sequential cut-off
    pub fn with_min_parallel_len(mut self, len: usize) -> Self {
        self.min_parallel_len = len;
        self
    }

    fn build_pool(&self) -> std::result::Result<ThreadPool, rayon::ThreadPoolBuildError> {
        let mut builder =
            ThreadPoolBuilder::new().num_threads(self.num_threads.unwrap_or_else(num_cpus::get));

        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }

        if !self.thread_name_prefix.is_empty() {
            let prefix = self.thread_name_prefix.clone();
            builder = builder.thread_name(move |index| format!("{}-{}", prefix, index));
        }

        builder.build()
    }
}

/// Initialize the global thread pool with custom configuration
pub fn init_thread_pool(config: ThreadPoolConfig) -> Result<()> {
    if GLOBAL_THREAD_POOL.get().is_some() {
        return Ok(()); // Already initialized
    }

    let pool = config
        .build_pool()
        .map_err(|e| Error::Config(format!("Failed to create thread pool: {}", e)))?;

    if let Ok(mut global_config) = THREAD_POOL_CONFIG.lock() {
        *global_config = Some(config);
    }

    GLOBAL_THREAD_POOL
        .set(Some(Arc::new(pool)))
        .map_err(|_| Error::Config("Thread pool already initialized".to_string()))?;

    Ok(())
}

/// Get the global thread pool, initializing with defaults if needed
fn get_thread_pool() -> Option<Arc<ThreadPool>> {
    GLOBAL_THREAD_POOL
        .get_or_init(|| match get_config().build_pool() {
            Ok(pool) => Some(Arc::new(pool)),
            Err(e) => {
                tracing::warn!("falling back to the rayon global pool: {}", e);
                None
            }
        })
        .clone()
}

/// Get current thread pool configuration
pub fn get_config() -> ThreadPoolConfig {
    THREAD_POOL_CONFIG
        .lock()
        .ok()
        .and_then(|config| config.clone())
        .unwrap_or_default()
}

/// Execute a parallel operation with the global thread pool
pub fn execute_parallel<F, R>(op: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    match get_thread_pool() {
        Some(pool) => pool.install(op),
        None => op(),
    }
}

/// Parallel map preserving input order
pub fn parallel_map<T, U, F>(data: &[T], f: F) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> U + Sync + Send,
{
    let config = get_config();
    if !config.enabled || data.len() < config.min_parallel_len {
        return data.iter().map(f).collect();
    }

    execute_parallel(|| data.par_iter().map(f).collect())
}

/// Parallel map over `0..len` preserving order
pub fn parallel_map_range<U, F>(len: usize, f: F) -> Vec<U>
where
    U: Send,
    F: Fn(usize) -> U + Sync + Send,
{
    let config = get_config();
    if !config.enabled || len < config.min_parallel_len {
        return (0..len).map(f).collect();
    }

    execute_parallel(|| (0..len).into_par_iter().map(f).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_pool_config() {
        let config = ThreadPoolConfig::default()
            .with_threads(4)
            .with_stack_size(16 * 1024 * 1024)
            .with_enabled(true)
            .with_min_parallel_len(8);

        assert_eq!(config.num_threads, Some(4));
        assert_eq!(config.stack_size, Some(16 * 1024 * 1024));
        assert!(config.enabled);
        assert_eq!(config.min_parallel_len, 8);
    }

    #[test]
    fn test_parallel_map() {
        let data = vec![1, 2, 3, 4, 5];
        let result = parallel_map(&data, |x| x * 2);
        assert_eq!(result, vec![2, 4, 6, 8, 10]);
    }

    #[test]
    fn test_parallel_map_range_keeps_order() {
        let result = parallel_map_range(1000, |i| i * i);
        assert_eq!(result.len(), 1000);
        assert!(result.iter().enumerate().all(|(i, &v)| v == i * i));
    }
}
