//! Per-consumer access to the shared database.
//!
//! A [`SqliteGateway`] executes statements against the shared [`Database`].
//! In [`GatewayMode::QueueFailedWrites`] it keeps writes that could not be
//! executed (for example while no user is logged in) and replays them in
//! submission order before the next write.

use crate::cursor::Cursor;
use crate::database::Database;
use crate::error::StoreResult;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// How a gateway treats failed writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayMode {
    /// Failed writes are returned to the caller.
    #[default]
    Strict,
    /// Failed writes are queued and retried before the next write.
    QueueFailedWrites,
}

/// What happened to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The statement ran.
    Executed,
    /// The statement was queued for a later retry.
    Queued,
}

/// Executes statements and queries against the shared database.
pub struct SqliteGateway {
    database: Arc<Database>,
    mode: GatewayMode,
    fail_queue: Mutex<VecDeque<String>>,
}

impl SqliteGateway {
    /// Creates a strict gateway.
    pub fn new(database: Arc<Database>) -> Self {
        Self::with_mode(database, GatewayMode::Strict)
    }

    /// Creates a gateway with the given mode.
    pub fn with_mode(database: Arc<Database>, mode: GatewayMode) -> Self {
        Self {
            database,
            mode,
            fail_queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns the shared database.
    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    /// Returns the mode.
    pub fn mode(&self) -> GatewayMode {
        self.mode
    }

    /// Executes a write statement.
    ///
    /// In strict mode every failure is returned. In queueing mode pending
    /// writes are replayed first; if any of them still fails, `statement`
    /// is queued behind them without being attempted.
    pub fn exec_sql(&self, statement: impl Into<String>) -> StoreResult<ExecOutcome> {
        let statement = statement.into();

        if self.mode == GatewayMode::Strict {
            self.database.execute(&statement)?;
            return Ok(ExecOutcome::Executed);
        }

        // Held across replay and execution so writes keep submission order.
        let mut queue = self.fail_queue.lock();
        if !self.replay(&mut queue) {
            tracing::warn!(pending = queue.len() + 1, "queued write behind failed writes");
            queue.push_back(statement);
            return Ok(ExecOutcome::Queued);
        }

        match self.database.execute(&statement) {
            Ok(()) => Ok(ExecOutcome::Executed),
            Err(e) => {
                tracing::warn!(error = %e, "write failed, queued for retry");
                queue.push_back(statement);
                Ok(ExecOutcome::Queued)
            }
        }
    }

    /// Replays queued writes. Returns the number still pending.
    pub fn flush_pending(&self) -> usize {
        let mut queue = self.fail_queue.lock();
        self.replay(&mut queue);
        queue.len()
    }

    /// Returns the number of queued writes.
    pub fn pending_writes(&self) -> usize {
        self.fail_queue.lock().len()
    }

    fn replay(&self, queue: &mut VecDeque<String>) -> bool {
        while let Some(statement) = queue.front() {
            if let Err(e) = self.database.execute(statement) {
                tracing::debug!(error = %e, pending = queue.len(), "queued write still failing");
                return false;
            }
            queue.pop_front();
        }
        true
    }

    /// Runs a read-only query.
    pub fn raw_query(&self, sql: &str) -> StoreResult<Cursor> {
        let mut cursor = Cursor::new();
        self.database.query_into(&mut cursor, sql)?;
        Ok(cursor)
    }

    /// Runs a read-only query into a caller-held cursor, reusing its buffers.
    pub fn raw_query_into(&self, cursor: &mut Cursor, sql: &str) -> StoreResult<()> {
        self.database.query_into(cursor, sql)
    }
}

impl std::fmt::Debug for SqliteGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteGateway")
            .field("mode", &self.mode)
            .field("pending_writes", &self.pending_writes())
            .finish()
    }
}
