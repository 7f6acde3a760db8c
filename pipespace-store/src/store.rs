//! Unit of Work
//!
//! One transaction scoped to one manager operation. Repository calls made
//! through [`UnitOfWork::conn`] are only visible to other sessions after
//! [`UnitOfWork::finish`] commits. Dropping the unit of work without
//! finishing it (early return, panic, or a cancelled future) rolls back.

use sqlx::{Any, AnyConnection, AnyPool, Transaction};

pub struct UnitOfWork {
    tx: Transaction<'static, Any>,
    operation: &'static str,
}

impl UnitOfWork {
    pub async fn begin(pool: &AnyPool, operation: &'static str) -> Result<Self, sqlx::Error> {
        let tx = pool.begin().await?;
        tracing::debug!("Began unit of work: {}", operation);

        Ok(Self { tx, operation })
    }

    /// Connection bound to the open transaction
    pub fn conn(&mut self) -> &mut AnyConnection {
        &mut *self.tx
    }

    /// Commit when `result` is a success, roll back otherwise.
    ///
    /// The operation's own error is returned unchanged; a failing commit is
    /// converted into the caller's error type.
    pub async fn finish<T, E>(self, result: Result<T, E>) -> Result<T, E>
    where
        E: From<sqlx::Error> + std::fmt::Display,
    {
        match result {
            Ok(value) => {
                self.tx.commit().await?;
                tracing::debug!("Committed unit of work: {}", self.operation);
                Ok(value)
            }
            Err(err) => {
                tracing::warn!("Rolling back {}: {}", self.operation, err);
                if let Err(rollback_err) = self.tx.rollback().await {
                    tracing::error!("Rollback of {} failed: {:?}", self.operation, rollback_err);
                }
                Err(err)
            }
        }
    }
}
