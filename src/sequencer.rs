// AutoFlow — Workflow sequencer (ordered, fail-fast step execution)
//
// Walks a list of steps one at a time: announce the step, wait the pacing
// delay, execute it, and stop at the first failure. Earlier steps are never
// rolled back. Progress is reported through a ProgressObserver, and the
// observer always receives the marker-clearing and finished signals, even
// when the run fails or is cancelled.

use crate::executor::{ExecutionError, StepExecutor};
use crate::workflow::{Step, Workflow};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(1000);

// ---------------------------------------------------------------------------
// State and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequencerState {
    #[default]
    Idle,
    Running(usize),
    Completed,
    Failed(usize),
    Cancelled(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Completed,
    Failed {
        index: usize,
        step_name: String,
        error: ExecutionError,
    },
    Cancelled {
        at: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub status: RunStatus,
    /// Steps whose executor call returned, successfully or not.
    pub steps_executed: usize,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        matches!(self.status, RunStatus::Completed)
    }
}

/// Reasons a run is refused before any step starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequencerError {
    #[error("workflow has no steps")]
    EmptyWorkflow,
    #[error("another workflow is already running")]
    AlreadyRunning,
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Receives progress for one run. Per run: `step_started` with strictly
/// increasing indices, at most one `step_failed`, then `clear_step_markers`
/// and exactly one `execution_finished`.
pub trait ProgressObserver: Send + Sync {
    fn step_started(&self, index: usize, step: &Step);
    fn step_failed(&self, index: usize, step_name: &str, error: &ExecutionError);
    /// Drop any "currently executing" highlighting.
    fn clear_step_markers(&self) {}
    fn execution_finished(&self, report: &RunReport);
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl ProgressObserver for NullObserver {
    fn step_started(&self, _index: usize, _step: &Step) {}
    fn step_failed(&self, _index: usize, _step_name: &str, _error: &ExecutionError) {}
    fn execution_finished(&self, _report: &RunReport) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    StepStarted { index: usize, name: String },
    StepFailed {
        index: usize,
        name: String,
        error: ExecutionError,
    },
    ClearMarkers,
    Finished(RunReport),
}

/// Observer that forwards every signal as a [`ProgressEvent`] on a channel.
#[derive(Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Progress receiver dropped");
        }
    }
}

impl ProgressObserver for ChannelObserver {
    fn step_started(&self, index: usize, step: &Step) {
        self.send(ProgressEvent::StepStarted {
            index,
            name: step.name.clone(),
        });
    }

    fn step_failed(&self, index: usize, step_name: &str, error: &ExecutionError) {
        self.send(ProgressEvent::StepFailed {
            index,
            name: step_name.to_string(),
            error: error.clone(),
        });
    }

    fn clear_step_markers(&self) {
        self.send(ProgressEvent::ClearMarkers);
    }

    fn execution_finished(&self, report: &RunReport) {
        self.send(ProgressEvent::Finished(report.clone()));
    }
}

// ---------------------------------------------------------------------------
// Delay capability
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Delay: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Real pacing via the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn wait(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

#[async_trait]
impl Delay for NoDelay {
    async fn wait(&self, _duration: Duration) {}
}

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

pub struct Sequencer {
    executor: Arc<dyn StepExecutor>,
    delay: Arc<dyn Delay>,
    step_delay: Duration,
    state: watch::Sender<SequencerState>,
}

impl Sequencer {
    pub fn new(executor: Arc<dyn StepExecutor>) -> Self {
        let (state, _) = watch::channel(SequencerState::Idle);
        Self {
            executor,
            delay: Arc::new(TokioDelay),
            step_delay: DEFAULT_STEP_DELAY,
            state,
        }
    }

    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_step_delay(mut self, step_delay: Duration) -> Self {
        self.step_delay = step_delay;
        self
    }

    pub fn step_delay(&self) -> Duration {
        self.step_delay
    }

    pub fn state(&self) -> SequencerState {
        *self.state.borrow()
    }

    /// Watch state transitions (e.g. to highlight the running step).
    pub fn subscribe(&self) -> watch::Receiver<SequencerState> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), SequencerState::Running(_))
    }

    pub async fn run_workflow(
        &self,
        workflow: &Workflow,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Result<RunReport, SequencerError> {
        tracing::info!(id = %workflow.id, name = %workflow.name, "Running workflow");
        self.run(&workflow.steps, observer, cancel).await
    }

    /// Execute `steps` in order, stopping at the first failure.
    ///
    /// Step failures and cancellation are reported in the returned
    /// [`RunReport`]; only an empty step list or a concurrent run is refused
    /// with an error, and a refused run emits no progress.
    pub async fn run(
        &self,
        steps: &[Step],
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Result<RunReport, SequencerError> {
        if steps.is_empty() {
            return Err(SequencerError::EmptyWorkflow);
        }

        let claimed = self.state.send_if_modified(|state| {
            if matches!(state, SequencerState::Running(_)) {
                false
            } else {
                *state = SequencerState::Running(0);
                true
            }
        });
        if !claimed {
            tracing::warn!("Refusing to start a second run");
            return Err(SequencerError::AlreadyRunning);
        }
        let _guard = RunGuard { state: &self.state };

        tracing::info!(steps = steps.len(), delay_ms = %self.step_delay.as_millis(), "Sequence started");
        let start = Instant::now();
        let mut executed = 0;

        let status = 'run: {
            for (index, step) in steps.iter().enumerate() {
                if cancel.is_cancelled() {
                    break 'run RunStatus::Cancelled { at: index };
                }

                self.state.send_replace(SequencerState::Running(index));
                observer.step_started(index, step);
                tracing::debug!(index, step = %step.name, "Step started");

                let cancelled = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => true,
                    _ = self.delay.wait(self.step_delay) => false,
                };
                if cancelled {
                    break 'run RunStatus::Cancelled { at: index };
                }

                let result = self.executor.execute(step).await;
                executed += 1;

                if let Err(error) = result {
                    tracing::error!(index, step = %step.name, error = %error, "Sequence halted");
                    observer.step_failed(index, &step.name, &error);
                    break 'run RunStatus::Failed {
                        index,
                        step_name: step.name.clone(),
                        error,
                    };
                }
            }
            RunStatus::Completed
        };

        let final_state = match &status {
            RunStatus::Completed => SequencerState::Completed,
            RunStatus::Failed { index, .. } => SequencerState::Failed(*index),
            RunStatus::Cancelled { at } => SequencerState::Cancelled(*at),
        };
        self.state.send_replace(final_state);

        let report = RunReport {
            status,
            steps_executed: executed,
            elapsed: start.elapsed(),
        };

        observer.clear_step_markers();
        observer.execution_finished(&report);

        tracing::info!(
            state = ?final_state,
            executed = report.steps_executed,
            elapsed_ms = %report.elapsed.as_millis(),
            "Sequence finished"
        );
        Ok(report)
    }
}

/// Releases the running slot if a run is dropped before it finishes.
struct RunGuard<'a> {
    state: &'a watch::Sender<SequencerState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.state.send_if_modified(|state| {
            if matches!(state, SequencerState::Running(_)) {
                *state = SequencerState::Idle;
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ActionExecutor;
    use crate::workflow::StepKind;
    use tokio::sync::{Mutex, Notify};

    /// Executes nothing; fails steps whose name is in `fail_on` and
    /// records the names it saw.
    #[derive(Default)]
    struct ScriptedExecutor {
        fail_on: Vec<String>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn failing_on(name: &str) -> Self {
            Self {
                fail_on: vec![name.to_string()],
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl StepExecutor for ScriptedExecutor {
        async fn execute(&self, step: &Step) -> Result<(), ExecutionError> {
            self.seen.lock().await.push(step.name.clone());
            if self.fail_on.contains(&step.name) {
                return Err(ExecutionError::Action(format!("{} exploded", step.name)));
            }
            Ok(())
        }
    }

    /// Blocks inside the first step until released.
    struct GateExecutor {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl StepExecutor for GateExecutor {
        async fn execute(&self, _step: &Step) -> Result<(), ExecutionError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    /// Cancels the token while executing the first step.
    struct CancellingExecutor {
        token: CancellationToken,
    }

    #[async_trait]
    impl StepExecutor for CancellingExecutor {
        async fn execute(&self, _step: &Step) -> Result<(), ExecutionError> {
            self.token.cancel();
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingDelay {
        waits: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Delay for RecordingDelay {
        async fn wait(&self, duration: Duration) {
            self.waits.lock().await.push(duration);
        }
    }

    fn steps(names: &[&str]) -> Vec<Step> {
        names
            .iter()
            .map(|n| Step::new(StepKind::ClickButton).with_name(*n))
            .collect()
    }

    fn sequencer(executor: Arc<dyn StepExecutor>) -> Sequencer {
        Sequencer::new(executor).with_delay(Arc::new(NoDelay))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn started(index: usize, name: &str) -> ProgressEvent {
        ProgressEvent::StepStarted {
            index,
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_success_path_signals() {
        let executor = Arc::new(ScriptedExecutor::default());
        let seq = sequencer(executor.clone());
        let (observer, mut rx) = ChannelObserver::new();

        let report = seq
            .run(&steps(&["A", "B", "C"]), &observer, &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.steps_executed, 3);
        assert_eq!(seq.state(), SequencerState::Completed);

        let events = drain(&mut rx);
        assert_eq!(
            &events[..4],
            &[
                started(0, "A"),
                started(1, "B"),
                started(2, "C"),
                ProgressEvent::ClearMarkers
            ]
        );
        assert!(matches!(events[4], ProgressEvent::Finished(ref r) if r.is_success()));
        assert_eq!(events.len(), 5);
    }

    #[tokio::test]
    async fn test_fail_fast() {
        let executor = Arc::new(ScriptedExecutor::failing_on("B"));
        let seq = sequencer(executor.clone());
        let (observer, mut rx) = ChannelObserver::new();

        let report = seq
            .run(&steps(&["A", "B", "C"]), &observer, &CancellationToken::new())
            .await
            .unwrap();

        let error = ExecutionError::Action("B exploded".into());
        assert_eq!(
            report.status,
            RunStatus::Failed {
                index: 1,
                step_name: "B".into(),
                error: error.clone(),
            }
        );
        assert_eq!(report.steps_executed, 2);
        assert_eq!(*executor.seen.lock().await, vec!["A", "B"]);
        assert_eq!(seq.state(), SequencerState::Failed(1));

        let events = drain(&mut rx);
        assert_eq!(
            &events[..4],
            &[
                started(0, "A"),
                started(1, "B"),
                ProgressEvent::StepFailed {
                    index: 1,
                    name: "B".into(),
                    error,
                },
                ProgressEvent::ClearMarkers,
            ]
        );
        assert!(matches!(events[4], ProgressEvent::Finished(_)));
        assert_eq!(events.len(), 5);
    }

    #[tokio::test]
    async fn test_unknown_step_type_does_not_halt() {
        let seq = sequencer(Arc::new(ActionExecutor::logging()));
        let steps = vec![
            Step::new(StepKind::Notify),
            Step::new(StepKind::parse("bogus")),
            Step::new(StepKind::ScheduleTask),
        ];

        let report = seq
            .run(&steps, &NullObserver, &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.steps_executed, 3);
    }

    #[tokio::test]
    async fn test_empty_run_is_refused_silently() {
        let seq = sequencer(Arc::new(ScriptedExecutor::default()));
        let (observer, mut rx) = ChannelObserver::new();

        let result = seq.run(&[], &observer, &CancellationToken::new()).await;

        assert_eq!(result, Err(SequencerError::EmptyWorkflow));
        assert!(drain(&mut rx).is_empty());
        assert_eq!(seq.state(), SequencerState::Idle);
    }

    #[tokio::test]
    async fn test_second_run_is_refused_while_active() {
        let gate = Arc::new(GateExecutor {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let seq = Arc::new(sequencer(gate.clone()));

        let first = {
            let seq = seq.clone();
            tokio::spawn(async move {
                seq.run(&steps(&["slow"]), &NullObserver, &CancellationToken::new())
                    .await
            })
        };

        gate.entered.notified().await;
        assert_eq!(seq.state(), SequencerState::Running(0));

        let (observer, mut rx) = ChannelObserver::new();
        let second = seq
            .run(&steps(&["other"]), &observer, &CancellationToken::new())
            .await;
        assert_eq!(second, Err(SequencerError::AlreadyRunning));
        assert!(drain(&mut rx).is_empty());

        gate.release.notify_one();
        let report = first.await.unwrap().unwrap();
        assert!(report.is_success());
        assert!(!seq.is_running());
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let executor = Arc::new(ScriptedExecutor::default());
        let seq = sequencer(executor.clone());
        let (observer, mut rx) = ChannelObserver::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = seq
            .run(&steps(&["A", "B"]), &observer, &cancel)
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Cancelled { at: 0 });
        assert!(executor.seen.lock().await.is_empty());
        assert_eq!(seq.state(), SequencerState::Cancelled(0));

        let events = drain(&mut rx);
        assert_eq!(events[0], ProgressEvent::ClearMarkers);
        assert!(matches!(events[1], ProgressEvent::Finished(_)));
    }

    #[tokio::test]
    async fn test_cancel_between_steps() {
        let cancel = CancellationToken::new();
        let seq = sequencer(Arc::new(CancellingExecutor {
            token: cancel.clone(),
        }));

        let report = seq
            .run(&steps(&["A", "B", "C"]), &NullObserver, &cancel)
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Cancelled { at: 1 });
        assert_eq!(report.steps_executed, 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_delay() {
        let cancel = CancellationToken::new();
        let executor = Arc::new(ScriptedExecutor::default());
        let seq = Sequencer::new(executor.clone()).with_step_delay(Duration::from_secs(3600));

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let report = seq.run(&steps(&["A"]), &NullObserver, &cancel).await.unwrap();

        assert_eq!(report.status, RunStatus::Cancelled { at: 0 });
        assert!(executor.seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_delay_precedes_every_step() {
        let delay = Arc::new(RecordingDelay::default());
        let seq = Sequencer::new(Arc::new(ScriptedExecutor::default()))
            .with_delay(delay.clone())
            .with_step_delay(Duration::from_millis(250));

        seq.run(&steps(&["A", "B", "C"]), &NullObserver, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            *delay.waits.lock().await,
            vec![Duration::from_millis(250); 3]
        );
    }

    #[tokio::test]
    async fn test_sequencer_reusable_after_failure() {
        let seq = sequencer(Arc::new(ScriptedExecutor::failing_on("bad")));

        let first = seq
            .run(&steps(&["bad"]), &NullObserver, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!first.is_success());

        let second = seq
            .run(&steps(&["good"]), &NullObserver, &CancellationToken::new())
            .await
            .unwrap();
        assert!(second.is_success());
    }
}
