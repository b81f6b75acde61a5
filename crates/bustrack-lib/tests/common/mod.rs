//! Shared fakes for the connector integration tests.
//!
//! `ScriptedConnector` replays a script of open/ping outcomes for the primary
//! and fails replicas by endpoint, either at open or at the first ping. `FlakyWriter` fails a configured number of
//! writes before succeeding and records every payload it was handed.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bustrack_lib::config::PoolLimits;
use bustrack_lib::db::{Connector, PoolHandle};
use bustrack_lib::error::{AttemptError, WriteError};
use bustrack_lib::events::{MessageWriter, OutboundMessage};

pub const PRIMARY: &str = "bus:secret@tcp(primary:3306)/bustrack";
pub const REPLICA_1: &str = "bus:secret@tcp(replica-1:3306)/bustrack";
pub const REPLICA_2: &str = "bus:secret@tcp(replica-2:3306)/bustrack";

/// Kind of failure a scripted step produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Connection refused; retried by the manager.
    Transient,
    /// Driver configuration error; ends the loop.
    Fatal,
}

impl Failure {
    pub fn error(self) -> AttemptError {
        match self {
            Failure::Transient => AttemptError::Driver(sqlx::Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
            Failure::Fatal => {
                AttemptError::Driver(sqlx::Error::Configuration("access denied".into()))
            }
        }
    }
}

/// Outcome of one primary connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Connect,
    OpenFails(Failure),
    PingFails(Failure),
}

/// In-memory pool that tracks pings and closure.
#[derive(Debug, Clone)]
pub struct FakePool {
    state: Arc<FakePoolState>,
}

#[derive(Debug)]
struct FakePoolState {
    endpoint: String,
    ping_failure: Option<Failure>,
    pings: AtomicU32,
    deadlines: Mutex<Vec<Duration>>,
    closed: AtomicBool,
}

impl FakePool {
    pub fn new(endpoint: &str, ping_failure: Option<Failure>) -> Self {
        Self {
            state: Arc::new(FakePoolState {
                endpoint: endpoint.to_string(),
                ping_failure,
                pings: AtomicU32::new(0),
                deadlines: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.state.endpoint
    }

    pub fn pings(&self) -> u32 {
        self.state.pings.load(Ordering::SeqCst)
    }

    /// Deadline passed to each ping, in call order.
    pub fn deadlines(&self) -> Vec<Duration> {
        self.state.deadlines.lock().expect("deadlines lock").clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PoolHandle for FakePool {
    async fn ping(&self, deadline: Duration) -> Result<(), AttemptError> {
        self.state.pings.fetch_add(1, Ordering::SeqCst);
        self.state
            .deadlines
            .lock()
            .expect("deadlines lock")
            .push(deadline);
        match self.state.ping_failure {
            Some(failure) => Err(failure.error()),
            None => Ok(()),
        }
    }

    async fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector whose primary follows a script and whose replicas can be failed.
///
/// Once the script runs out every further primary attempt uses `fallback`.
#[derive(Debug)]
pub struct ScriptedConnector {
    primary: String,
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    failing_replicas: HashSet<String>,
    unreachable_replicas: HashSet<String>,
    primary_attempts: AtomicU32,
    opened: Mutex<Vec<FakePool>>,
}

impl ScriptedConnector {
    pub fn new(primary: &str, script: impl IntoIterator<Item = Step>, fallback: Step) -> Self {
        Self {
            primary: primary.to_string(),
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            failing_replicas: HashSet::new(),
            unreachable_replicas: HashSet::new(),
            primary_attempts: AtomicU32::new(0),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Primary that connects on the first attempt.
    pub fn healthy(primary: &str) -> Self {
        Self::new(primary, [], Step::Connect)
    }

    /// Primary that always fails the same way.
    pub fn always(primary: &str, step: Step) -> Self {
        Self::new(primary, [], step)
    }

    /// Replica whose open call fails.
    pub fn fail_replica(mut self, endpoint: &str) -> Self {
        self.failing_replicas.insert(endpoint.to_string());
        self
    }

    /// Replica that opens lazily but never answers a ping.
    pub fn unreachable_replica(mut self, endpoint: &str) -> Self {
        self.unreachable_replicas.insert(endpoint.to_string());
        self
    }

    /// Primary attempts started so far.
    pub fn primary_attempts(&self) -> u32 {
        self.primary_attempts.load(Ordering::SeqCst)
    }

    /// Every pool handed out, including ones the manager closed again.
    pub fn opened(&self) -> Vec<FakePool> {
        self.opened.lock().expect("opened lock").clone()
    }

    fn next_step(&self) -> Step {
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or(self.fallback)
    }

    fn record(&self, pool: FakePool) -> FakePool {
        self.opened.lock().expect("opened lock").push(pool.clone());
        pool
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Pool = FakePool;

    async fn open(&self, endpoint: &str, _limits: &PoolLimits) -> Result<FakePool, AttemptError> {
        if endpoint != self.primary {
            if self.failing_replicas.contains(endpoint) {
                return Err(AttemptError::InvalidDsn {
                    reason: format!("unreachable replica {endpoint}"),
                });
            }
            let ping_failure = self
                .unreachable_replicas
                .contains(endpoint)
                .then_some(Failure::Transient);
            return Ok(self.record(FakePool::new(endpoint, ping_failure)));
        }

        self.primary_attempts.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Step::Connect => Ok(self.record(FakePool::new(endpoint, None))),
            Step::OpenFails(failure) => Err(failure.error()),
            Step::PingFails(failure) => Ok(self.record(FakePool::new(endpoint, Some(failure)))),
        }
    }
}

/// Writer that fails the first `failures` writes, then succeeds.
#[derive(Debug)]
pub struct FlakyWriter {
    failures: u32,
    writes: AtomicU32,
    payloads: Mutex<Vec<OutboundMessage>>,
    closed: AtomicBool,
}

impl FlakyWriter {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            writes: AtomicU32::new(0),
            payloads: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn reliable() -> Self {
        Self::new(0)
    }

    pub fn broken() -> Self {
        Self::new(u32::MAX)
    }

    /// Write attempts seen so far.
    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Messages that were accepted.
    pub fn delivered(&self) -> Vec<OutboundMessage> {
        self.payloads.lock().expect("payload lock").clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageWriter for FlakyWriter {
    async fn write(&self, message: &OutboundMessage) -> Result<(), WriteError> {
        let seen = self.writes.fetch_add(1, Ordering::SeqCst);
        if seen < self.failures {
            return Err(WriteError::Unavailable("broker not reachable".to_string()));
        }
        self.payloads
            .lock()
            .expect("payload lock")
            .push(message.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), WriteError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
