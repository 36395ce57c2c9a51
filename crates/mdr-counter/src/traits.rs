//! The [`IdCounter`] trait defining per-namespace counter storage.

use mdr_types::Namespace;

use crate::error::CounterResult;

/// Storage for the last number issued in each namespace.
///
/// Implementations must be thread-safe (`Send + Sync`). `advance` is the
/// only mutation: it runs the caller's step function while holding the
/// counter's exclusive lock, and the value it returns is persisted before
/// `advance` returns.
pub trait IdCounter: Send + Sync {
    /// Last number issued in `namespace`, 0 if none.
    fn last_issued(&self, namespace: &Namespace) -> CounterResult<u32>;

    /// Atomically replace the last issued number with `step(current)`.
    ///
    /// Returns the new value. If `step` fails nothing is written. A value
    /// lower than the current one is rejected with
    /// [`CounterError::Regression`](crate::CounterError::Regression).
    fn advance(
        &self,
        namespace: &Namespace,
        step: &mut dyn FnMut(u32) -> CounterResult<u32>,
    ) -> CounterResult<u32>;

    /// Returns `true` if values survive a process restart on their own.
    fn is_durable(&self) -> bool;
}
