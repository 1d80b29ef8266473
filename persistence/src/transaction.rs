//! Post-commit hook queue, the Rust stand-in for Django's
//! `transaction.on_commit` (SPEC_FULL.md §2). A request handler registers a
//! side effect -- handing a deployment off to the workflow tier -- that must
//! never fire unless the surrounding `sqlx::Transaction` actually commits.

use sqlx::{Sqlite, Transaction as SqlxTransaction};

use crate::error::PersistenceError;

pub struct Transaction<'c> {
    inner: SqlxTransaction<'c, Sqlite>,
    hooks: Vec<Box<dyn FnOnce() + Send + 'static>>,
}

impl<'c> Transaction<'c> {
    pub(crate) fn new(inner: SqlxTransaction<'c, Sqlite>) -> Self {
        Transaction {
            inner,
            hooks: Vec::new(),
        }
    }

    pub fn as_mut(&mut self) -> &mut SqlxTransaction<'c, Sqlite> {
        &mut self.inner
    }

    /// Registered hooks run in insertion order, only after `commit`
    /// succeeds. A hook that needs to hand off work should enqueue onto a
    /// channel, not block.
    pub fn on_commit(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub async fn commit(self) -> Result<(), PersistenceError> {
        self.inner.commit().await?;
        for hook in self.hooks {
            hook();
        }
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), PersistenceError> {
        self.inner.rollback().await?;
        Ok(())
    }
}
