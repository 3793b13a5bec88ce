//! Reentrant, thread-affine transactions over one engine.
//!
//! A [`Session`] hands out a single logical transaction at a time. The
//! thread that opens it becomes the owner and may nest further
//! [`begin`](Session::begin) calls; only the outermost
//! [`end`](Session::end) talks to the engine. Any other thread calling
//! `begin` blocks until the owner unwinds to depth zero.
//!
//! Success is decided at the outermost level: a
//! [`set_successful`](Session::set_successful) call counts only while the
//! depth is one, so inner participants cannot force a commit.
//!
//! # Example
//!
//! ```
//! use rusqlite::Connection;
//! use sqlstencil_core::TransactionMode;
//! use sqlstencil_sqlite::{Session, TransactionOutcome};
//!
//! let session = Session::new(Connection::open_in_memory().unwrap());
//! session.execute_raw("CREATE TABLE t (a INTEGER)").unwrap();
//!
//! session.begin(TransactionMode::Immediate).unwrap();
//! session.begin(TransactionMode::Immediate).unwrap();
//! session.execute("INSERT INTO t VALUES (1)").unwrap();
//! session.set_successful().unwrap(); // depth 2: ignored
//! assert_eq!(session.end().unwrap(), TransactionOutcome::Nested);
//! session.set_successful().unwrap(); // depth 1: counts
//! assert_eq!(session.end().unwrap(), TransactionOutcome::Committed);
//! ```

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use rusqlite::Connection;
use sqlstencil_core::TransactionMode;
use tracing::{debug, warn};

use crate::engine::{Engine, RowSet};
use crate::error::{MapperError, Result};

const SQL_COMMIT: &str = "COMMIT";
const SQL_ROLLBACK: &str = "ROLLBACK";

/// How an [`end`](Session::end) call finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// An inner level closed; the transaction is still open.
    Nested,
    /// The outermost level closed and `COMMIT` succeeded.
    Committed,
    /// The outermost level closed and `ROLLBACK` ran.
    RolledBack,
}

/// Bookkeeping for the session's single logical transaction.
///
/// `depth == 0`, `owner == None` and `!successful` always hold together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionState {
    depth: usize,
    owner: Option<ThreadId>,
    successful: bool,
    waiters: usize,
}

impl TransactionState {
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.owner
    }

    pub fn successful(&self) -> bool {
        self.successful
    }

    /// Threads currently blocked in `begin`.
    pub fn waiters(&self) -> usize {
        self.waiters
    }

    fn reset(&mut self) {
        self.depth = 0;
        self.owner = None;
        self.successful = false;
    }
}

fn lock_with_recovery<'a, T>(mutex: &'a Mutex<T>, lock_name: &'static str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(lock = lock_name, "mutex poisoned; recovering inner state");
            poisoned.into_inner()
        }
    }
}

/// A connection with a reentrant transaction coordinator.
///
/// Lock order is state before engine. Statements outside a transaction
/// take only the engine lock.
pub struct Session<E: Engine = Connection> {
    engine: Mutex<E>,
    state: Mutex<TransactionState>,
    idle: Condvar,
    default_mode: TransactionMode,
}

impl<E: Engine> Session<E> {
    /// Wraps `engine`; automatic transactions use [`TransactionMode::Immediate`].
    pub fn new(engine: E) -> Self {
        Self {
            engine: Mutex::new(engine),
            state: Mutex::new(TransactionState::default()),
            idle: Condvar::new(),
            default_mode: TransactionMode::default(),
        }
    }

    /// Sets the mode used by [`begin_default`](Self::begin_default) and
    /// [`execute`](Self::execute).
    pub fn with_default_mode(mut self, mode: TransactionMode) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn default_mode(&self) -> TransactionMode {
        self.default_mode
    }

    /// Opens the transaction or nests into the one this thread owns.
    ///
    /// Blocks while another thread owns the transaction.
    ///
    /// # Errors
    ///
    /// Returns the engine error if `BEGIN` fails; the session stays idle.
    pub fn begin(&self, mode: TransactionMode) -> Result<()> {
        self.acquire(mode, None).map(|_| ())
    }

    /// [`begin`](Self::begin) with the session's default mode.
    pub fn begin_default(&self) -> Result<()> {
        self.begin(self.default_mode)
    }

    /// Like [`begin`](Self::begin) but gives up after `timeout`.
    ///
    /// Returns `Ok(false)` if another thread still owns the transaction
    /// when the deadline passes; nothing changes in that case.
    pub fn try_begin_for(&self, mode: TransactionMode, timeout: Duration) -> Result<bool> {
        self.acquire(mode, Some(Instant::now() + timeout))
    }

    fn acquire(&self, mode: TransactionMode, deadline: Option<Instant>) -> Result<bool> {
        let me = thread::current().id();
        let mut state = lock_with_recovery(&self.state, "transaction_state");

        loop {
            let owner = state.owner;
            match owner {
                None => break,
                Some(owner) if owner == me => {
                    state.depth += 1;
                    debug!(depth = state.depth, "Nested transaction");
                    return Ok(true);
                }
                Some(_) => {}
            }

            let remaining = match deadline {
                Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                    Some(remaining) if !remaining.is_zero() => Some(remaining),
                    _ => return Ok(false),
                },
                None => None,
            };

            state.waiters += 1;
            state = match remaining {
                None => self
                    .idle
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(remaining) => match self.idle.wait_timeout(state, remaining) {
                    Ok((next, _)) => next,
                    Err(poisoned) => poisoned.into_inner().0,
                },
            };
            state.waiters -= 1;
        }

        if let Err(e) = self.run_control(mode.begin_statement()) {
            self.idle.notify_all();
            return Err(e);
        }
        state.depth = 1;
        state.owner = Some(me);
        state.successful = false;
        debug!(mode = %mode, "Began transaction");
        Ok(true)
    }

    /// Marks the transaction for commit when called at depth one.
    ///
    /// # Errors
    ///
    /// [`MapperError::TransactionNotOpen`] when idle and
    /// [`MapperError::TransactionNotOwned`] from a non-owner thread.
    pub fn set_successful(&self) -> Result<()> {
        let mut state = lock_with_recovery(&self.state, "transaction_state");
        check_owner(&state)?;
        if state.depth == 1 {
            state.successful = true;
        }
        Ok(())
    }

    /// Closes one level; the outermost level commits or rolls back.
    ///
    /// A failed `COMMIT` is followed by a best-effort `ROLLBACK` and the
    /// commit error is returned. The session is idle afterwards either way.
    ///
    /// # Errors
    ///
    /// Same ownership errors as [`set_successful`](Self::set_successful),
    /// plus engine errors from `COMMIT` or `ROLLBACK`.
    pub fn end(&self) -> Result<TransactionOutcome> {
        let mut state = lock_with_recovery(&self.state, "transaction_state");
        check_owner(&state)?;

        state.depth -= 1;
        if state.depth > 0 {
            debug!(depth = state.depth, "Closed nested transaction");
            return Ok(TransactionOutcome::Nested);
        }

        let commit = state.successful;
        state.reset();
        let result = if commit {
            self.commit()
        } else {
            self.run_control(SQL_ROLLBACK)
                .map(|()| TransactionOutcome::RolledBack)
        };
        if let Ok(outcome) = &result {
            debug!(outcome = ?outcome, "Finished transaction");
        }
        self.idle.notify_all();
        result
    }

    fn commit(&self) -> Result<TransactionOutcome> {
        match self.run_control(SQL_COMMIT) {
            Ok(()) => Ok(TransactionOutcome::Committed),
            Err(e) => {
                warn!(error = %e, "Commit failed; rolling back");
                if let Err(rollback) = self.run_control(SQL_ROLLBACK) {
                    debug!(error = %rollback, "Rollback after failed commit also failed");
                }
                Err(e)
            }
        }
    }

    /// Runs `f` inside a transaction and ends it whatever `f` returns.
    ///
    /// Success is marked only when `f` returns `Ok`.
    pub fn transaction<T>(
        &self,
        mode: TransactionMode,
        f: impl FnOnce(&Self) -> Result<T>,
    ) -> Result<(T, TransactionOutcome)> {
        self.begin(mode)?;
        let result = f(self).and_then(|value| self.set_successful().map(|()| value));
        let outcome = self.end();
        let value = result?;
        Ok((value, outcome?))
    }

    /// Runs one write statement in an automatic transaction.
    ///
    /// Nests into a transaction this thread already owns.
    pub fn execute(&self, sql: &str) -> Result<usize> {
        let (changed, _) = self.transaction(self.default_mode, |session| {
            session.with_engine(|engine| engine.execute(sql))
        })?;
        Ok(changed)
    }

    /// Runs statements without any transaction handling (`VACUUM`, DDL).
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        self.with_engine(|engine| engine.execute_batch(sql))
    }

    /// Runs a read and collects every row.
    pub fn query(&self, sql: &str) -> Result<RowSet> {
        self.with_engine(|engine| engine.query(sql))
    }

    /// Reads `PRAGMA user_version`.
    pub fn user_version(&self) -> Result<i64> {
        let rows = self.query("PRAGMA user_version")?;
        let record = rows.record(0).ok_or(MapperError::ResultCount("one"))?;
        record.long(0)
    }

    /// Writes `PRAGMA user_version`.
    pub fn set_user_version(&self, version: i64) -> Result<()> {
        self.execute_raw(&format!("PRAGMA user_version = {version}"))
    }

    /// Runs `f` with exclusive access to the engine.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut E) -> Result<R>) -> Result<R> {
        let mut engine = lock_with_recovery(&self.engine, "engine");
        f(&mut engine)
    }

    /// Current nesting depth; zero when idle.
    pub fn depth(&self) -> usize {
        lock_with_recovery(&self.state, "transaction_state").depth
    }

    pub fn in_transaction(&self) -> bool {
        self.depth() > 0
    }

    /// Returns `true` if the calling thread owns the open transaction.
    pub fn is_owner(&self) -> bool {
        lock_with_recovery(&self.state, "transaction_state").owner == Some(thread::current().id())
    }

    /// A copy of the transaction bookkeeping.
    pub fn state(&self) -> TransactionState {
        lock_with_recovery(&self.state, "transaction_state").clone()
    }

    /// Rolls back any open transaction and releases the engine.
    pub fn close(self) -> Result<()> {
        self.force_rollback()
    }

    fn force_rollback(&self) -> Result<()> {
        let mut state = lock_with_recovery(&self.state, "transaction_state");
        if state.depth == 0 {
            return Ok(());
        }
        debug!(depth = state.depth, "Rolling back unterminated transaction");
        state.reset();
        let result = self.run_control(SQL_ROLLBACK);
        self.idle.notify_all();
        result
    }

    fn run_control(&self, sql: &str) -> Result<()> {
        self.with_engine(|engine| engine.execute_batch(sql))
    }
}

impl<E: Engine> Drop for Session<E> {
    fn drop(&mut self) {
        if let Err(e) = self.force_rollback() {
            warn!(error = %e, "Rollback on drop failed");
        }
    }
}

fn check_owner(state: &TransactionState) -> Result<()> {
    match state.owner {
        None => Err(MapperError::TransactionNotOpen),
        Some(owner) if owner != thread::current().id() => Err(MapperError::TransactionNotOwned),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Records control statements and can be told to fail one of them.
    #[derive(Default)]
    struct RecordingEngine {
        log: Arc<Mutex<Vec<String>>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingEngine {
        fn failing(fail_on: &'static str) -> Self {
            Self {
                fail_on: Some(fail_on),
                ..Self::default()
            }
        }

        fn record(&self, sql: &str) -> Result<()> {
            self.log.lock().unwrap().push(sql.to_string());
            if self.fail_on.is_some_and(|f| sql.starts_with(f)) {
                return Err(MapperError::DatabaseError(rusqlite::Error::InvalidQuery));
            }
            Ok(())
        }
    }

    impl Engine for RecordingEngine {
        fn execute_batch(&mut self, sql: &str) -> Result<()> {
            self.record(sql)
        }

        fn execute(&mut self, sql: &str) -> Result<usize> {
            self.record(sql).map(|()| 1)
        }

        fn query(&mut self, sql: &str) -> Result<RowSet> {
            self.record(sql).map(|()| RowSet::default())
        }
    }

    fn recording() -> (Session<RecordingEngine>, Arc<Mutex<Vec<String>>>) {
        let engine = RecordingEngine::default();
        let log = Arc::clone(&engine.log);
        (Session::new(engine), log)
    }

    fn count(log: &Arc<Mutex<Vec<String>>>, sql: &str) -> usize {
        log.lock().unwrap().iter().filter(|s| *s == sql).count()
    }

    #[test]
    fn test_depth_tracks_begin_and_end() {
        let (session, log) = recording();
        for depth in 1..=3 {
            session.begin(TransactionMode::Deferred).unwrap();
            assert_eq!(session.depth(), depth);
        }
        for depth in (0..3).rev() {
            session.end().unwrap();
            assert_eq!(session.depth(), depth);
        }
        assert_eq!(count(&log, "BEGIN DEFERRED"), 1);
        assert_eq!(count(&log, SQL_COMMIT) + count(&log, SQL_ROLLBACK), 1);
        assert!(!session.in_transaction());
    }

    #[test]
    fn test_inner_success_does_not_commit() {
        let (session, log) = recording();
        session.begin_default().unwrap();
        session.begin_default().unwrap();
        session.set_successful().unwrap();
        assert_eq!(session.end().unwrap(), TransactionOutcome::Nested);
        assert_eq!(session.end().unwrap(), TransactionOutcome::RolledBack);
        assert_eq!(count(&log, SQL_COMMIT), 0);
        assert_eq!(count(&log, "BEGIN IMMEDIATE"), 1);
    }

    #[test]
    fn test_outer_success_commits() {
        let (session, log) = recording();
        session.begin(TransactionMode::Exclusive).unwrap();
        session.set_successful().unwrap();
        assert_eq!(session.end().unwrap(), TransactionOutcome::Committed);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["BEGIN EXCLUSIVE".to_string(), SQL_COMMIT.to_string()]
        );
        assert!(!session.state().successful());
    }

    #[test]
    fn test_calls_without_transaction_fail() {
        let (session, _log) = recording();
        assert!(matches!(
            session.set_successful(),
            Err(MapperError::TransactionNotOpen)
        ));
        assert!(matches!(session.end(), Err(MapperError::TransactionNotOpen)));
    }

    #[test]
    fn test_non_owner_cannot_end() {
        let (session, _log) = recording();
        session.begin_default().unwrap();
        thread::scope(|s| {
            s.spawn(|| {
                assert!(!session.is_owner());
                assert!(matches!(
                    session.set_successful(),
                    Err(MapperError::TransactionNotOwned)
                ));
                assert!(matches!(session.end(), Err(MapperError::TransactionNotOwned)));
            });
        });
        assert!(session.is_owner());
        assert_eq!(session.depth(), 1);
        session.end().unwrap();
    }

    #[test]
    fn test_failed_begin_leaves_session_idle() {
        let session = Session::new(RecordingEngine::failing("BEGIN"));
        assert!(session.begin_default().is_err());
        assert_eq!(session.state(), TransactionState::default());
    }

    #[test]
    fn test_failed_commit_rolls_back() {
        let engine = RecordingEngine::failing(SQL_COMMIT);
        let log = Arc::clone(&engine.log);
        let session = Session::new(engine);
        session.begin_default().unwrap();
        session.set_successful().unwrap();
        assert!(session.end().is_err());
        assert_eq!(count(&log, SQL_ROLLBACK), 1);
        assert!(!session.in_transaction());
    }

    #[test]
    fn test_other_thread_waits_for_idle() {
        let (session, log) = recording();
        let entered = AtomicBool::new(false);
        session.begin_default().unwrap();

        thread::scope(|s| {
            let waiter = s.spawn(|| {
                session.begin_default().unwrap();
                entered.store(true, Ordering::SeqCst);
                session.set_successful().unwrap();
                session.end().unwrap();
            });

            thread::sleep(Duration::from_millis(100));
            assert!(!entered.load(Ordering::SeqCst));
            assert_eq!(session.depth(), 1);
            assert!(session.is_owner());

            session.end().unwrap();
            waiter.join().unwrap();
        });

        assert!(entered.load(Ordering::SeqCst));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["BEGIN IMMEDIATE", SQL_ROLLBACK, "BEGIN IMMEDIATE", SQL_COMMIT]
        );
    }

    #[test]
    fn test_try_begin_for_times_out_without_side_effects() {
        let (session, log) = recording();
        session.begin_default().unwrap();
        let before = session.state();

        thread::scope(|s| {
            s.spawn(|| {
                let acquired = session
                    .try_begin_for(TransactionMode::Immediate, Duration::from_millis(30))
                    .unwrap();
                assert!(!acquired);
            });
        });

        assert_eq!(session.state(), before);
        assert_eq!(count(&log, "BEGIN IMMEDIATE"), 1);
        session.end().unwrap();
    }

    #[test]
    fn test_try_begin_for_succeeds_when_idle() {
        let (session, _log) = recording();
        assert!(
            session
                .try_begin_for(TransactionMode::Deferred, Duration::from_millis(10))
                .unwrap()
        );
        assert!(session.is_owner());
        session.end().unwrap();
    }

    #[test]
    fn test_transaction_helper() {
        let (session, log) = recording();
        let (value, outcome) = session
            .transaction(TransactionMode::Immediate, |_| Ok(5))
            .unwrap();
        assert_eq!((value, outcome), (5, TransactionOutcome::Committed));

        let failed: Result<((), TransactionOutcome)> = session
            .transaction(TransactionMode::Immediate, |_| {
                Err(MapperError::ResultCount("one"))
            });
        assert!(matches!(failed, Err(MapperError::ResultCount(_))));
        assert_eq!(count(&log, SQL_ROLLBACK), 1);
        assert!(!session.in_transaction());
    }

    #[test]
    fn test_close_rolls_back_open_transaction() {
        let (session, log) = recording();
        session.begin_default().unwrap();
        session.begin_default().unwrap();
        session.close().unwrap();
        assert_eq!(count(&log, SQL_ROLLBACK), 1);
    }

    #[test]
    fn test_drop_rolls_back_open_transaction() {
        let (session, log) = recording();
        session.begin_default().unwrap();
        drop(session);
        assert_eq!(count(&log, SQL_ROLLBACK), 1);
    }

    #[test]
    fn test_execute_uses_auto_transaction() {
        let session = Session::new(Connection::open_in_memory().unwrap());
        session.execute_raw("CREATE TABLE t (a INTEGER)").unwrap();
        assert_eq!(session.execute("INSERT INTO t VALUES (1), (2)").unwrap(), 2);
        assert!(!session.in_transaction());

        let rows = session.query("SELECT COUNT(*) FROM t").unwrap();
        assert_eq!(rows.scalar(), Some(&sqlstencil_core::Value::Integer(2)));
    }

    #[test]
    fn test_rolled_back_write_is_discarded() {
        let session = Session::new(Connection::open_in_memory().unwrap());
        session.execute_raw("CREATE TABLE t (a INTEGER)").unwrap();
        session.begin_default().unwrap();
        session.execute("INSERT INTO t VALUES (1)").unwrap();
        session.end().unwrap();

        let rows = session.query("SELECT COUNT(*) FROM t").unwrap();
        assert_eq!(rows.scalar(), Some(&sqlstencil_core::Value::Integer(0)));
    }

    #[test]
    fn test_user_version_roundtrip() {
        let session = Session::new(Connection::open_in_memory().unwrap());
        assert_eq!(session.user_version().unwrap(), 0);
        session.set_user_version(7).unwrap();
        assert_eq!(session.user_version().unwrap(), 7);
    }
}
