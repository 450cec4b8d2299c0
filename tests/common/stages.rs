#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::time::{Duration, sleep};

use delvegraph::message::Message;
use delvegraph::stage::{Stage, StageContext, StageError, StageUpdate};
use delvegraph::state::{Finding, StateSnapshot};

/// Appends one assistant message and nothing else.
#[derive(Debug, Clone)]
pub struct EchoStage {
    pub text: &'static str,
}

impl EchoStage {
    pub fn new(text: &'static str) -> Self {
        Self { text }
    }
}

#[async_trait]
impl Stage for EchoStage {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        Ok(StageUpdate::default().with_message(Message::assistant(self.text)))
    }
}

/// Overwrites the draft with a fixed string.
#[derive(Debug, Clone)]
pub struct DraftStage {
    pub text: &'static str,
}

#[async_trait]
impl Stage for DraftStage {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        Ok(StageUpdate::default().with_draft(self.text))
    }
}

/// Writes nothing; bumps a shared counter so tests can prove it ran.
#[derive(Debug, Clone, Default)]
pub struct CountingStage {
    pub runs: Arc<AtomicU32>,
}

#[async_trait]
impl Stage for CountingStage {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(StageUpdate::default())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SleepParams {
    pub label: String,
    pub seq: u32,
    #[serde(default)]
    pub delay_ms: u64,
}

/// Fan-out task stage: sleeps for the parameterized delay, then contributes
/// one finding and one query tagged with its label. The delay lets tests
/// finish tasks out of ordinal order on purpose.
#[derive(Debug, Clone)]
pub struct SleepingTask;

#[async_trait]
impl Stage for SleepingTask {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        let params: SleepParams = ctx.task_params()?;
        if params.delay_ms > 0 {
            sleep(Duration::from_millis(params.delay_ms)).await;
        }
        Ok(StageUpdate::default()
            .with_findings(vec![Finding::new(
                &params.label,
                params.seq,
                &format!("result for {}", params.label),
            )])
            .with_queries(vec![params.label.clone()]))
    }
}

/// Fan-out task stage that records how many findings its snapshot carried
/// before writing one of its own. Used to show tasks never observe each
/// other's writes.
#[derive(Debug, Clone, Default)]
pub struct SnapshotProbe {
    pub observed: Arc<Mutex<Vec<usize>>>,
}

#[async_trait]
impl Stage for SnapshotProbe {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        self.observed.lock().push(snapshot.findings.len());
        let seq = ctx.task_ordinal().unwrap_or(0);
        Ok(StageUpdate::default().with_findings(vec![Finding::new("probe", seq, "probed")]))
    }
}

/// Fan-out task stage measuring how many of its instances overlap. `peak`
/// ends up holding the highest concurrency the batch reached.
#[derive(Debug, Clone, Default)]
pub struct GaugeTask {
    pub active: Arc<AtomicU32>,
    pub peak: Arc<AtomicU32>,
}

#[async_trait]
impl Stage for GaugeTask {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        sleep(Duration::from_millis(20)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(StageUpdate::default())
    }
}

/// Sleeps a fixed interval before writing its message. Long enough for a
/// cancellation signal to land between stages.
#[derive(Debug, Clone)]
pub struct SlowStage {
    pub delay_ms: u64,
    pub text: &'static str,
}

#[async_trait]
impl Stage for SlowStage {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        sleep(Duration::from_millis(self.delay_ms)).await;
        Ok(StageUpdate::default().with_message(Message::assistant(self.text)))
    }
}

/// Always fails with a validation error.
#[derive(Debug, Clone)]
pub struct FailingStage;

#[async_trait]
impl Stage for FailingStage {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        Err(StageError::ValidationFailed("scripted stage failure".into()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlakyParams {
    pub label: String,
    #[serde(default)]
    pub fail: bool,
}

/// Fan-out task stage that fails when told to, with a recognizable message.
#[derive(Debug, Clone)]
pub struct FlakyTask;

#[async_trait]
impl Stage for FlakyTask {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        ctx: StageContext,
    ) -> Result<StageUpdate, StageError> {
        let params: FlakyParams = ctx.task_params()?;
        if params.fail {
            return Err(StageError::ValidationFailed(format!(
                "scripted failure in {}",
                params.label
            )));
        }
        Ok(StageUpdate::default().with_queries(vec![params.label.clone()]))
    }
}
