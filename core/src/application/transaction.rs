// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use tracing::{error, warn};

use crate::domain::repository::{DomainError, StoreSession};

/// Request-scoped ownership of a store session.
///
/// `commit` and `rollback` consume the guard and release the session
/// afterwards, whatever the outcome. If the guard is dropped without either
/// (request cancelled mid-flight, panic), `Drop` releases the session, which
/// discards uncommitted work. The session is taken out of the `Option`
/// before release, so it is released exactly once.
pub struct ScopedSession {
    inner: Option<Box<dyn StoreSession>>,
}

impl ScopedSession {
    pub fn new(session: Box<dyn StoreSession>) -> Self {
        Self {
            inner: Some(session),
        }
    }

    pub fn session(&mut self) -> Result<&mut (dyn StoreSession + 'static), DomainError> {
        self.inner.as_deref_mut().ok_or(DomainError::SessionClosed)
    }

    pub async fn commit(mut self) -> Result<(), DomainError> {
        let mut session = self.inner.take().ok_or(DomainError::SessionClosed)?;
        let result = session.commit().await;
        if let Err(e) = &result {
            error!("Commit failed, discarding transaction: {}", e);
        }
        session.release();
        result
    }

    pub async fn rollback(mut self) -> Result<(), DomainError> {
        let mut session = self.inner.take().ok_or(DomainError::SessionClosed)?;
        let result = session.rollback().await;
        if let Err(e) = &result {
            error!("Rollback failed: {}", e);
        }
        session.release();
        result
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if let Some(session) = self.inner.take() {
            warn!("Store session dropped without commit or rollback; releasing");
            session.release();
        }
    }
}
