#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pg_access::prelude::*;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// One statement as the fake connection received it.
#[derive(Debug, Clone, PartialEq)]
pub struct Logged {
    pub conn: usize,
    pub sql: String,
    pub args: Vec<RowValues>,
}

#[derive(Default)]
pub struct FakeState {
    next_id: AtomicUsize,
    pub borrowed: AtomicUsize,
    pub released: AtomicUsize,
    pub abandoned: AtomicUsize,
    fail_acquire: AtomicBool,
    log: Mutex<Vec<Logged>>,
    failures: Mutex<Vec<(String, String)>>,
    responses: Mutex<Vec<(String, ResultSet)>>,
}

impl FakeState {
    pub fn borrowed(&self) -> usize {
        self.borrowed.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<Logged> {
        self.log.lock().unwrap().clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.log().into_iter().map(|l| l.sql).collect()
    }

    /// Any statement containing `needle` fails with `AccessError::Execution(message)`.
    pub fn fail_when(&self, needle: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .push((needle.to_string(), message.to_string()));
    }

    pub fn fail_acquire(&self) {
        self.fail_acquire.store(true, Ordering::SeqCst);
    }

    /// Rows returned for a statement with exactly this (translated) text.
    pub fn respond(&self, sql: &str, rows: ResultSet) {
        self.responses.lock().unwrap().push((sql.to_string(), rows));
    }

    fn record(&self, conn: usize, sql: &str, args: &[RowValues]) -> Result<(), AccessError> {
        self.log.lock().unwrap().push(Logged {
            conn,
            sql: sql.to_string(),
            args: args.to_vec(),
        });
        let failures = self.failures.lock().unwrap();
        match failures.iter().find(|(needle, _)| sql.contains(needle.as_str())) {
            Some((_, message)) => Err(AccessError::Execution(message.clone())),
            None => Ok(()),
        }
    }

    fn response(&self, sql: &str) -> ResultSet {
        self.responses
            .lock()
            .unwrap()
            .iter()
            .find(|(text, _)| text == sql)
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }
}

/// In-memory driver bounded by a semaphore, counting every borrow and release.
pub struct FakeDriver {
    pub state: Arc<FakeState>,
    permits: Arc<Semaphore>,
}

impl FakeDriver {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::new(FakeState::default()),
            permits: Arc::new(Semaphore::new(capacity)),
        }
    }
}

#[async_trait]
impl Driver for FakeDriver {
    type Connection = FakeConnection;

    async fn acquire(&self) -> Result<FakeConnection, AccessError> {
        if self.state.fail_acquire.load(Ordering::SeqCst) {
            return Err(AccessError::Acquisition("server unreachable".into()));
        }
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| AccessError::Acquisition(e.to_string()))?;
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        self.state.borrowed.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConnection {
            id,
            state: Arc::clone(&self.state),
            _permit: permit,
        })
    }
}

pub struct FakeConnection {
    pub id: usize,
    state: Arc<FakeState>,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl DriverConnection for FakeConnection {
    async fn query(&mut self, sql: &str, args: &[RowValues]) -> Result<ResultSet, AccessError> {
        tokio::task::yield_now().await;
        self.state.record(self.id, sql, args)?;
        Ok(self.state.response(sql))
    }

    async fn execute(&mut self, sql: &str, args: &[RowValues]) -> Result<u64, AccessError> {
        tokio::task::yield_now().await;
        self.state.record(self.id, sql, args)?;
        Ok(1)
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), AccessError> {
        self.state.record(self.id, sql, &[])
    }

    fn abandon_transaction(self) {
        self.state.abandoned.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.state.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn people() -> ResultSet {
    let mut rs = ResultSet::new(vec!["id".into(), "name".into()]);
    rs.add_row_values(vec![RowValues::Int(7), RowValues::Text("alice".into())]);
    rs
}

/// Error type of an application callback: database failures plus its own validation.
#[derive(Debug)]
pub enum AppError {
    Db(AccessError),
    Validation(String),
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        AppError::Db(err)
    }
}
