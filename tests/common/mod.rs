//! Recording in-memory driver shared by the integration tests.
//!
//! Every driver call is appended to an event log so tests can assert on the
//! exact connect/cursor/commit/rollback/close sequence. Statements whose SQL
//! contains `fail` return a driver error; statements containing `pg_sleep`
//! block for ten seconds. Commits can be made to fail with
//! [`MockDriver::set_fail_commit`].

#![allow(dead_code)]

use pgrecord::db::{Driver, DriverConnection, Fetch, Statement};
use pgrecord::{Client, Credentials, Row};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect(u32),
    OpenCursor(u32),
    Execute(String),
    CloseCursor(u32),
    Commit,
    Rollback,
    Close(u32),
    /// Connection dropped without a close
    Dropped(u32),
}

#[derive(Default)]
struct State {
    events: Vec<Event>,
    results: HashMap<String, Vec<Row>>,
    fail_connect: bool,
    fail_commit: bool,
    next_id: u32,
}

#[derive(Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<State>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the rows returned for a statement.
    pub fn with_rows(self, sql: &str, rows: Vec<JsonValue>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| match row {
                JsonValue::Object(map) => map,
                other => panic!("scripted row must be an object, got {other}"),
            })
            .collect();
        self.state
            .lock()
            .unwrap()
            .results
            .insert(sql.to_string(), rows);
        self
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state.lock().unwrap().fail_connect = fail;
    }

    /// Make every commit report an error after it is recorded.
    pub fn set_fail_commit(&self, fail: bool) {
        self.state.lock().unwrap().fail_commit = fail;
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.lock().unwrap().events.clear();
    }

    pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| matches(e)).count()
    }

    pub fn executed(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Execute(sql) => Some(sql),
                _ => None,
            })
            .collect()
    }

    /// Connect and disconnect events only, in order.
    pub fn lifecycle(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    Event::Connect(_) | Event::Close(_) | Event::Dropped(_)
                )
            })
            .collect()
    }

    fn record(&self, event: Event) {
        self.state.lock().unwrap().events.push(event);
    }
}

impl Driver for MockDriver {
    type Connection = MockConnection;

    async fn connect(&self, _credentials: &Credentials) -> Result<MockConnection, sqlx::Error> {
        let id = {
            let mut state = self.state.lock().unwrap();
            if state.fail_connect {
                return Err(sqlx::Error::Protocol("connection refused".to_string()));
            }
            state.next_id += 1;
            let id = state.next_id;
            state.events.push(Event::Connect(id));
            id
        };
        Ok(MockConnection {
            id,
            driver: self.clone(),
            next_cursor: 0,
            closed: false,
        })
    }
}

pub struct MockConnection {
    id: u32,
    driver: MockDriver,
    next_cursor: u32,
    closed: bool,
}

pub struct MockCursor(u32);

impl DriverConnection for MockConnection {
    type Cursor = MockCursor;

    fn cursor(&mut self) -> MockCursor {
        self.next_cursor += 1;
        self.driver.record(Event::OpenCursor(self.next_cursor));
        MockCursor(self.next_cursor)
    }

    fn close_cursor(&mut self, cursor: MockCursor) {
        self.driver.record(Event::CloseCursor(cursor.0));
    }

    async fn run(
        &mut self,
        _cursor: &mut MockCursor,
        statement: &Statement,
        fetch: Fetch,
    ) -> Result<Vec<Row>, sqlx::Error> {
        self.driver.record(Event::Execute(statement.sql.clone()));

        if statement.sql.contains("pg_sleep") {
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        if statement.sql.contains("fail") {
            return Err(sqlx::Error::Protocol(format!(
                "statement failed: {}",
                statement.sql
            )));
        }

        let rows = self
            .driver
            .state
            .lock()
            .unwrap()
            .results
            .get(&statement.sql)
            .cloned()
            .unwrap_or_default();
        Ok(match fetch {
            Fetch::None => Vec::new(),
            Fetch::AtMost(n) => rows.into_iter().take(n).collect(),
            Fetch::All => rows,
        })
    }

    async fn commit(&mut self) -> Result<(), sqlx::Error> {
        self.driver.record(Event::Commit);
        if self.driver.state.lock().unwrap().fail_commit {
            return Err(sqlx::Error::Protocol("commit failed".to_string()));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        self.driver.record(Event::Rollback);
        Ok(())
    }

    async fn close(mut self) -> Result<(), sqlx::Error> {
        self.closed = true;
        self.driver.record(Event::Close(self.id));
        Ok(())
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        if !self.closed {
            self.driver.record(Event::Dropped(self.id));
        }
    }
}

pub fn credentials() -> Credentials {
    Credentials::new("localhost", "tester", "secret").unwrap()
}

pub fn client(driver: &MockDriver) -> Client<MockDriver> {
    Client::with_driver(driver.clone(), credentials())
}

/// Assert that connects and disconnects strictly alternate and balance out.
pub fn assert_paired(driver: &MockDriver) {
    let lifecycle = driver.lifecycle();
    assert_eq!(lifecycle.len() % 2, 0, "unbalanced lifecycle: {lifecycle:?}");
    for pair in lifecycle.chunks(2) {
        match pair {
            [Event::Connect(a), Event::Close(b) | Event::Dropped(b)] => assert_eq!(a, b),
            other => panic!("connect/disconnect out of order: {other:?}"),
        }
    }
}
