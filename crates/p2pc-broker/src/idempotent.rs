//! Read-compare-write helper for mutable ledger fields.
//!
//! Writing a value the ledger already holds costs a transaction and leaves a
//! spurious history entry. [`set_if_changed`] reads the current value first
//! and only submits when it differs.

use std::future::Future;

use crate::error::Result;
use crate::transaction::Receipt;

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The stored value already matched; nothing was submitted.
    Unchanged,
    /// A write was submitted and confirmed.
    Written(Receipt),
}

impl WriteOutcome {
    /// Whether a transaction was submitted.
    #[must_use]
    pub const fn was_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }
}

/// Read the current value and run `write` only if it differs from `desired`.
///
/// # Errors
///
/// Propagates errors from the read or the write. A failed read never
/// triggers the write.
pub async fn set_if_changed<T, R, W, F>(read: R, desired: &T, write: W) -> Result<WriteOutcome>
where
    T: PartialEq,
    R: Future<Output = Result<T>>,
    W: FnOnce() -> F,
    F: Future<Output = Result<Receipt>>,
{
    if read.await? == *desired {
        return Ok(WriteOutcome::Unchanged);
    }
    write().await.map(WriteOutcome::Written)
}
