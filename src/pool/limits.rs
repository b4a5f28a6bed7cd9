//! Adaptive concurrency limit derivation.
//!
//! When no explicit instance limit is configured, the pool derives one from
//! coarse host signals: a performance rating and available memory when a
//! [`HardwareHints`] provider is present, CPU count otherwise. The result is
//! clamped to a safe band so weak devices are not starved and strong ones
//! are not over-subscribed.

use std::thread;

// =============================================================================
// Configuration Constants
// =============================================================================

/// Lower clamp for the derived instance limit.
pub const INSTANCE_LIMIT_MIN: usize = 20;

/// Upper clamp for the derived instance limit.
pub const INSTANCE_LIMIT_MAX: usize = 50;

/// Multiplier for CPU count when no hints provider is available.
pub const CPU_MULTIPLIER: usize = 6;

/// Fallback CPU count when detection fails.
pub const FALLBACK_CPU_COUNT: usize = 4;

/// Memory size below which the limit is pinned to the minimum.
pub const LOW_MEMORY_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Additional units granted per point of performance rating.
pub const RATING_STEP: usize = 3;

/// Optional provider of coarse host capability signals.
///
/// The pool functions correctly with a safe default limit when this
/// collaborator is absent or returns no data.
pub trait HardwareHints: Send + Sync {
    /// Coarse performance rating, 0 (weakest) to 10 (strongest).
    fn performance_rating(&self) -> Option<u8>;

    /// Physical memory size in bytes.
    fn memory_bytes(&self) -> Option<u64>;
}

/// Computes the default instance limit from CPU count alone.
///
/// Formula: `clamp(num_cpus * CPU_MULTIPLIER, INSTANCE_LIMIT_MIN..=INSTANCE_LIMIT_MAX)`
/// - 2 cores:  20 concurrent units
/// - 4 cores:  24 concurrent units
/// - 8 cores:  48 concurrent units
/// - 16 cores: 50 concurrent units
pub fn default_instance_limit() -> usize {
    let cpus = thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(FALLBACK_CPU_COUNT);
    (cpus * CPU_MULTIPLIER).clamp(INSTANCE_LIMIT_MIN, INSTANCE_LIMIT_MAX)
}

/// Derives the instance limit from hardware hints.
///
/// A low-memory device is pinned to the minimum regardless of rating.
/// Otherwise each rating point above zero grants [`RATING_STEP`] units on
/// top of the minimum. Missing signals fall back to the CPU-count formula.
pub fn instance_limit(hints: Option<&dyn HardwareHints>) -> usize {
    let Some(hints) = hints else {
        return default_instance_limit();
    };

    if let Some(memory) = hints.memory_bytes() {
        if memory < LOW_MEMORY_BYTES {
            return INSTANCE_LIMIT_MIN;
        }
    }

    match hints.performance_rating() {
        Some(rating) => (INSTANCE_LIMIT_MIN + rating as usize * RATING_STEP)
            .clamp(INSTANCE_LIMIT_MIN, INSTANCE_LIMIT_MAX),
        None => default_instance_limit(),
    }
}
