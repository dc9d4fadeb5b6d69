//! Scripted in-memory driver for lifecycle tests
//!
//! Every call a [`ScriptedConnection`] receives is appended to a shared
//! [`EventLog`], so tests can assert on the exact open/execute/close sequence.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_data_access::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Open,
    Execute(String),
    Advance,
    CursorDropped,
    Close,
    CloseNow,
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

/// How a scripted connection behaves
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub rows: Vec<DbRow>,
    pub affected: i64,
    pub scalar: DbValue,
    pub fail_open: bool,
    pub fail_close: bool,
    /// Fail when advancing to this row index
    pub fail_at_row: Option<usize>,
    /// Never complete when advancing to this row index
    pub hang_at_row: Option<usize>,
}

impl Script {
    pub fn rows(rows: Vec<DbRow>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }
}

pub struct ScriptedConnection {
    script: Script,
    state: ConnectionState,
    log: EventLog,
}

impl ScriptedConnection {
    pub fn new(script: Script) -> (Self, EventLog) {
        let log = EventLog::default();
        (Self::with_log(script, Arc::clone(&log)), log)
    }

    pub fn with_log(script: Script, log: EventLog) -> Self {
        Self {
            script,
            state: ConnectionState::Closed,
            log,
        }
    }

    fn record(&self, event: Event) {
        self.log.lock().push(event);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == ConnectionState::Open {
            Ok(())
        } else {
            Err(DatabaseError::connection("Not connected to database"))
        }
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn open(&mut self) -> Result<()> {
        self.record(Event::Open);
        if self.script.fail_open {
            return Err(DatabaseError::connection("server unreachable"));
        }
        self.state = ConnectionState::Open;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.record(Event::Close);
        self.state = ConnectionState::Closed;
        if self.script.fail_close {
            return Err(DatabaseError::connection("close failed"));
        }
        Ok(())
    }

    fn close_now(&mut self) {
        self.record(Event::CloseNow);
        self.state = ConnectionState::Closed;
    }

    async fn execute_non_query(&mut self, command: &Command) -> Result<i64> {
        self.ensure_open()?;
        self.record(Event::Execute(command.text().to_string()));
        Ok(self.script.affected)
    }

    async fn execute_scalar(&mut self, command: &Command) -> Result<DbValue> {
        self.ensure_open()?;
        self.record(Event::Execute(command.text().to_string()));
        Ok(self.script.scalar.clone())
    }

    async fn execute_reader(&mut self, command: &Command) -> Result<Box<dyn RowCursor>> {
        self.ensure_open()?;
        self.record(Event::Execute(command.text().to_string()));
        Ok(Box::new(ScriptedCursor {
            rows: self.script.rows.clone(),
            next: 0,
            current: None,
            fail_at_row: self.script.fail_at_row,
            hang_at_row: self.script.hang_at_row,
            empty: DbRow::from_pairs(Vec::<(String, DbValue)>::new()),
            log: Arc::clone(&self.log),
        }))
    }
}

struct ScriptedCursor {
    rows: Vec<DbRow>,
    next: usize,
    current: Option<DbRow>,
    fail_at_row: Option<usize>,
    hang_at_row: Option<usize>,
    empty: DbRow,
    log: EventLog,
}

#[async_trait]
impl RowCursor for ScriptedCursor {
    async fn advance(&mut self) -> Result<bool> {
        self.log.lock().push(Event::Advance);
        if self.hang_at_row == Some(self.next) {
            futures::future::pending::<()>().await;
        }
        if self.fail_at_row == Some(self.next) {
            return Err(DatabaseError::query("connection reset while reading"));
        }
        match self.rows.get(self.next) {
            Some(row) => {
                self.current = Some(row.clone());
                self.next += 1;
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }

    fn row(&self) -> &dyn Row {
        match &self.current {
            Some(row) => row,
            None => &self.empty,
        }
    }
}

impl Drop for ScriptedCursor {
    fn drop(&mut self) {
        self.log.lock().push(Event::CursorDropped);
    }
}

/// Factory handing out scripted connections that share one log
pub struct ScriptedFactory {
    pub script: Script,
    pub log: EventLog,
}

impl ConnectionFactory for ScriptedFactory {
    type Connection = ScriptedConnection;

    fn create(&self) -> Result<ScriptedConnection> {
        Ok(ScriptedConnection::with_log(
            self.script.clone(),
            Arc::clone(&self.log),
        ))
    }
}

pub fn user_row(id: i32, name: &str) -> DbRow {
    DbRow::from_pairs([("id", DbValue::Int32(id)), ("name", DbValue::from(name))])
}

pub fn count(log: &EventLog, event: &Event) -> usize {
    log.lock().iter().filter(|e| *e == event).count()
}
