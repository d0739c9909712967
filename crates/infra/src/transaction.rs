//! Transaction context and scoping policies.
//!
//! Every store call takes a [`RequestContext`], a cheap copyable token that
//! optionally carries the ambient transaction. A mutating operation either
//! opens its own transaction or joins one the caller already holds; the two
//! policies are expressed as the two wrapper functions below.
//!
//! ## Guarantees
//!
//! A transaction boundary makes all writes inside it visible together or not
//! at all: a failure at any step rolls back every write already issued in the
//! boundary. Read-only operations do not need a transaction but observe a
//! consistent view when an ambient one is supplied.

use std::sync::Arc;

use stockledger_core::{LedgerResult, TransactionId};

/// Ambient per-request context threaded through every store call.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestContext {
    transaction: Option<TransactionId>,
}

impl RequestContext {
    /// A context with no ambient transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context already inside `transaction`.
    pub fn in_transaction(transaction: TransactionId) -> Self {
        Self {
            transaction: Some(transaction),
        }
    }

    pub fn transaction(&self) -> Option<TransactionId> {
        self.transaction
    }

    /// The same context joined to `transaction`.
    pub fn join(self, transaction: TransactionId) -> Self {
        Self {
            transaction: Some(transaction),
        }
    }
}

/// Transaction scoping offered by a storage engine.
///
/// `commit` may fail with a `Conflict` when the engine detects a concurrent
/// update to a row touched inside the transaction; the transaction is dead at
/// that point and the caller retries in a fresh one.
pub trait TransactionScope: Send + Sync {
    fn begin(&self) -> LedgerResult<TransactionId>;
    fn commit(&self, transaction: TransactionId) -> LedgerResult<()>;
    fn rollback(&self, transaction: TransactionId) -> LedgerResult<()>;
}

impl<S> TransactionScope for Arc<S>
where
    S: TransactionScope + ?Sized,
{
    fn begin(&self) -> LedgerResult<TransactionId> {
        (**self).begin()
    }

    fn commit(&self, transaction: TransactionId) -> LedgerResult<()> {
        (**self).commit(transaction)
    }

    fn rollback(&self, transaction: TransactionId) -> LedgerResult<()> {
        (**self).rollback(transaction)
    }
}

/// Force policy: run `f` inside a transaction, opening one when the caller
/// did not supply any. Used at the coordinator's public mutating boundary.
///
/// When this function opens the transaction it also owns it: commit on
/// success, rollback on any error. When the context already carries one, `f`
/// simply runs inside it and the outer owner decides the outcome.
pub fn with_transaction<S, T, F>(scope: &S, ctx: RequestContext, f: F) -> LedgerResult<T>
where
    S: TransactionScope + ?Sized,
    F: FnOnce(RequestContext) -> LedgerResult<T>,
{
    if ctx.transaction().is_some() {
        return f(ctx);
    }

    let transaction = scope.begin()?;
    match f(ctx.join(transaction)) {
        Ok(value) => {
            scope.commit(transaction)?;
            Ok(value)
        }
        Err(err) => {
            // Rollback of a dead transaction cannot mask the original error.
            let _ = scope.rollback(transaction);
            Err(err)
        }
    }
}

/// Join-if-present policy: participate in the ambient transaction, opening
/// one only when none was supplied. Used by entity-scoped helpers that may be
/// nested inside a larger unit of work.
pub fn with_joined_transaction<S, T, F>(scope: &S, ctx: RequestContext, f: F) -> LedgerResult<T>
where
    S: TransactionScope + ?Sized,
    F: FnOnce(RequestContext) -> LedgerResult<T>,
{
    with_transaction(scope, ctx, f)
}
