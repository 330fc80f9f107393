//! Async shell around the engine core.
//!
//! One cooperative task owns the [`Engine`] and drives it bar by bar.
//! Suspension points are exactly: the replay-clock sleep between bars,
//! the idle backoff while paused or starved, and command-channel
//! drains. Feature computation, classification, arbitration, risk, and
//! portfolio mutation never suspend — they happen inside the
//! synchronous `Engine::step`.
//!
//! Readers never lock live state: the task publishes an immutable
//! [`EngineSnapshot`] on a `watch` channel after every pass.

use std::time::Duration;

use rgk_config::EngineMode;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{Engine, StepOutcome};
use crate::status::{Command, EngineSnapshot, LoopState};

/// Bound on queued control commands; submission backpressures past it.
const COMMAND_CHANNEL_DEPTH: usize = 32;

/// Grace period for the loop to drain after a stop request.
pub const STOP_GRACE: Duration = Duration::from_secs(10);

/// Handle held by the control surface.
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<EngineSnapshot>,
    join: JoinHandle<Engine>,
}

impl SchedulerHandle {
    /// Latest published snapshot (cheap clone; never blocks the loop).
    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshots.borrow().clone()
    }

    pub async fn send(&self, command: Command) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Request a stop and wait for the loop to drain; after the grace
    /// period the task is aborted (in-flight broker submissions resolve
    /// at the adapter layer; unresolved orders stay pending in the
    /// persisted checkpoint).
    pub async fn stop(self) -> Option<Engine> {
        let _ = self.commands.send(Command::Stop).await;
        match tokio::time::timeout(STOP_GRACE, self.join).await {
            Ok(Ok(engine)) => Some(engine),
            Ok(Err(e)) => {
                warn!(target: "rgk::scheduler", "loop task failed: {e}");
                None
            }
            Err(_) => {
                warn!(target: "rgk::scheduler", "loop did not drain within {STOP_GRACE:?}");
                None
            }
        }
    }

    /// Wait for the loop to finish on its own (end of replay data).
    pub async fn join(self) -> Option<Engine> {
        self.join.await.ok()
    }
}

/// Spawn the loop task. Fails if the engine cannot enter `Running`.
pub fn spawn(mut engine: Engine) -> Result<SchedulerHandle, String> {
    engine.start()?;

    let run_id = Uuid::new_v4();
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(COMMAND_CHANNEL_DEPTH);
    let (snap_tx, snap_rx) = watch::channel(engine.snapshot());

    let bar_period = Duration::from_secs(engine.config().timeframe_secs.max(1) as u64);
    let replay_sleep = bar_period.div_f64(engine.config().replay_speed_multiplier.max(1e-6));
    let mode = engine.config().mode;

    info!(target: "rgk::scheduler", %run_id, ?mode, "loop task spawning");

    let join = tokio::spawn(async move {
        loop {
            // Commands drain between pipeline stages.
            let mut stop_requested = false;
            while let Ok(command) = cmd_rx.try_recv() {
                match command {
                    Command::Stop => stop_requested = true,
                    Command::Pause => engine.pause(),
                    Command::Resume => engine.resume(),
                    Command::EngageKillSwitch => engine.engage_kill_switch(),
                    Command::DisengageKillSwitch => engine.disengage_kill_switch(),
                }
            }
            if stop_requested {
                engine.stop("stop command");
                let _ = snap_tx.send(engine.snapshot());
                break;
            }

            match engine.state() {
                LoopState::Paused => {
                    let _ = snap_tx.send(engine.snapshot());
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
                LoopState::Running => {}
                _ => {
                    let _ = snap_tx.send(engine.snapshot());
                    break;
                }
            }

            let outcome = engine.step();
            let _ = snap_tx.send(engine.snapshot());

            match outcome {
                StepOutcome::Processed { .. } => match mode {
                    // Replay clock: bar period compressed by the speed
                    // multiplier (0.1 s per 1-minute bar at 600×).
                    EngineMode::Offline => tokio::time::sleep(replay_sleep).await,
                    // Live pacing comes from the blocking feed itself.
                    EngineMode::Live => {}
                },
                StepOutcome::AllMissed => {
                    tokio::time::sleep(replay_sleep.min(Duration::from_millis(100))).await;
                }
                StepOutcome::EndOfData => {
                    engine.stop("end of data");
                    let _ = snap_tx.send(engine.snapshot());
                    break;
                }
                StepOutcome::Fatal => {
                    let _ = snap_tx.send(engine.snapshot());
                    break;
                }
            }
        }
        info!(target: "rgk::scheduler", %run_id, state = ?engine.state(), "loop task finished");
        engine
    });

    Ok(SchedulerHandle {
        commands: cmd_tx,
        snapshots: snap_rx,
        join,
    })
}
