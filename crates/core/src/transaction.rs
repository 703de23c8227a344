//! Transaction handles consumed by the catalog and the copy pipeline.
//!
//! The transaction manager proper (WAL, checkpointing) is an external
//! collaborator; this module carries just enough identity and cancellation
//! state for the catalog write version and for COPY abort handling.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TX_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one transaction for the lifetime of the process.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TxId(pub u64);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TxKind {
    ReadOnly,
    Write,
}

/// Cooperative cancellation flag polled at chunk boundaries.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// A live transaction handle.
#[derive(Clone, Debug)]
pub struct Transaction {
    id: TxId,
    kind: TxKind,
    cancel: CancellationToken,
}

impl Transaction {
    pub fn new(kind: TxKind) -> Transaction {
        Transaction {
            id: TxId(NEXT_TX_ID.fetch_add(1, Ordering::Relaxed)),
            kind,
            cancel: CancellationToken::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> TxId {
        self.id
    }

    #[inline]
    pub fn is_write(&self) -> bool {
        self.kind == TxKind::Write
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_ids_are_unique() {
        let a = Transaction::new(TxKind::Write);
        let b = Transaction::new(TxKind::ReadOnly);
        assert_ne!(a.id(), b.id());
        assert!(a.is_write());
        assert!(!b.is_write());
    }

    #[test]
    fn cancellation_is_visible_through_clones() {
        let token = CancellationToken::new();
        let seen = token.clone();
        assert!(!seen.is_cancelled());
        token.cancel();
        assert!(seen.is_cancelled());
    }
}
