//! Engine process supervision and readiness gating.
//!
//! [`EngineSupervisor`] owns the start-once lifecycle of the external
//! engine process: `NotStarted -> Starting -> Ready | Failed`, never
//! reset. The first `ensure_ready` caller launches the engine and polls
//! its liveness endpoint; concurrent and later callers observe the
//! cached terminal state without re-launching or re-polling.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use prism_core::error::JobError;

use crate::api::ComfyApi;

/// Default interval between liveness probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Default probe budget: 120 attempts at 1 s covers a cold model load.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 120;

/// Engine lifecycle state. Transitions only move forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    /// No caller has attempted a launch yet.
    NotStarted,
    /// A launch is in flight (only observable via [`EngineSupervisor::state`]
    /// from outside the winning caller).
    Starting,
    /// The engine answered a liveness probe; jobs may proceed.
    Ready,
    /// The launch failed or the probe budget ran out. Terminal.
    Failed(String),
}

/// Seam between the supervisor and the real engine process.
///
/// Production uses [`ProcessLauncher`]; tests substitute a counting
/// fake to prove launch-once semantics without spawning anything.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Spawn the engine process. Called at most once per supervisor.
    async fn launch(&self) -> std::io::Result<()>;

    /// One liveness probe; true when the engine is serving.
    async fn probe(&self) -> bool;
}

/// How to start and probe a real local engine.
#[derive(Debug, Clone)]
pub struct EngineCommand {
    /// Program to execute (e.g. `python`).
    pub program: String,
    /// Arguments (e.g. `main.py --listen 127.0.0.1 --port 8188
    /// --disable-auto-launch`).
    pub args: Vec<String>,
    /// Working directory the engine expects to run from.
    pub work_dir: String,
    /// HTTP base URL used for liveness probes.
    pub api_url: String,
}

/// [`Launcher`] that spawns the engine with [`tokio::process::Command`]
/// and probes it over HTTP.
pub struct ProcessLauncher {
    command: EngineCommand,
    api: ComfyApi,
    /// Keeps the child handle alive for the host process lifetime.
    child: Mutex<Option<tokio::process::Child>>,
}

impl ProcessLauncher {
    pub fn new(command: EngineCommand) -> Self {
        let api = ComfyApi::new(command.api_url.clone());
        Self {
            command,
            api,
            child: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self) -> std::io::Result<()> {
        let mut cmd = tokio::process::Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .current_dir(&self.command.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // No kill_on_drop: the engine outlives the supervisor handle and
        // is reused by every job in this process.
        let child = cmd.spawn()?;
        tracing::info!(
            program = %self.command.program,
            work_dir = %self.command.work_dir,
            pid = child.id(),
            "engine process spawned",
        );

        *self.child.lock().await = Some(child);
        Ok(())
    }

    async fn probe(&self) -> bool {
        self.api.is_alive().await
    }
}

/// Start-once supervisor for the external engine.
///
/// The only shared mutable state in the worker. The launch mutex is
/// held across the entire launch-and-poll sequence, so concurrent first
/// callers cannot double-launch: one winner does the work, the rest
/// block on the lock and then read the terminal state.
pub struct EngineSupervisor {
    launcher: Box<dyn Launcher>,
    poll_interval: Duration,
    poll_attempts: u32,
    state: Mutex<EngineState>,
}

impl EngineSupervisor {
    pub fn new(launcher: Box<dyn Launcher>) -> Self {
        Self::with_budget(launcher, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_ATTEMPTS)
    }

    /// Construct with an explicit probe budget (tests use tiny values).
    pub fn with_budget(
        launcher: Box<dyn Launcher>,
        poll_interval: Duration,
        poll_attempts: u32,
    ) -> Self {
        Self {
            launcher,
            poll_interval,
            poll_attempts,
            state: Mutex::new(EngineState::NotStarted),
        }
    }

    /// Current lifecycle state (snapshot).
    pub async fn state(&self) -> EngineState {
        self.state.lock().await.clone()
    }

    /// Idempotently bring the engine up.
    ///
    /// Exactly one caller launches; everyone gets the same terminal
    /// answer. `Failed` is sticky: once the probe budget is exhausted no
    /// later call re-launches or re-polls.
    pub async fn ensure_ready(&self) -> Result<(), JobError> {
        let mut state = self.state.lock().await;
        match &*state {
            EngineState::Ready => return Ok(()),
            EngineState::Failed(reason) => {
                return Err(JobError::EngineUnavailable(reason.clone()));
            }
            EngineState::NotStarted => {}
            // The lock is held for the whole launch, so Starting is
            // never observed here.
            EngineState::Starting => {}
        }

        *state = EngineState::Starting;

        if let Err(e) = self.launcher.launch().await {
            let reason = format!("failed to spawn engine process: {e}");
            tracing::error!(error = %e, "engine launch failed");
            *state = EngineState::Failed(reason.clone());
            return Err(JobError::EngineUnavailable(reason));
        }

        for attempt in 1..=self.poll_attempts {
            if self.launcher.probe().await {
                tracing::info!(attempt, "engine ready");
                *state = EngineState::Ready;
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        let reason = format!(
            "engine did not become ready after {} probe attempts",
            self.poll_attempts
        );
        tracing::error!(attempts = self.poll_attempts, "engine readiness budget exhausted");
        *state = EngineState::Failed(reason.clone());
        Err(JobError::EngineUnavailable(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Counting launcher whose probe answer is fixed.
    struct FakeLauncher {
        launches: AtomicU32,
        probes: AtomicU32,
        ready: bool,
    }

    impl FakeLauncher {
        fn new(ready: bool) -> Arc<Self> {
            Arc::new(Self {
                launches: AtomicU32::new(0),
                probes: AtomicU32::new(0),
                ready,
            })
        }
    }

    #[async_trait]
    impl Launcher for Arc<FakeLauncher> {
        async fn launch(&self) -> std::io::Result<()> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn probe(&self) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.ready
        }
    }

    #[tokio::test]
    async fn repeated_calls_launch_once() {
        let launcher = FakeLauncher::new(true);
        let supervisor = EngineSupervisor::with_budget(
            Box::new(Arc::clone(&launcher)),
            Duration::from_millis(1),
            3,
        );

        for _ in 0..5 {
            supervisor.ensure_ready().await.unwrap();
        }

        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
        // Ready state is cached: probing stops after the first success.
        assert_eq!(launcher.probes.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.state().await, EngineState::Ready);
    }

    #[tokio::test]
    async fn concurrent_first_callers_have_a_single_winner() {
        let launcher = FakeLauncher::new(true);
        let supervisor = Arc::new(EngineSupervisor::with_budget(
            Box::new(Arc::clone(&launcher)),
            Duration::from_millis(1),
            3,
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let supervisor = Arc::clone(&supervisor);
            handles.push(tokio::spawn(async move { supervisor.ensure_ready().await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_budget_is_sticky_failure() {
        let launcher = FakeLauncher::new(false);
        let supervisor = EngineSupervisor::with_budget(
            Box::new(Arc::clone(&launcher)),
            Duration::from_millis(1),
            2,
        );

        assert_matches!(
            supervisor.ensure_ready().await,
            Err(JobError::EngineUnavailable(_))
        );
        assert_eq!(launcher.probes.load(Ordering::SeqCst), 2);

        // Second caller sees the cached failure: no new launch, no new probes.
        assert_matches!(
            supervisor.ensure_ready().await,
            Err(JobError::EngineUnavailable(_))
        );
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
        assert_eq!(launcher.probes.load(Ordering::SeqCst), 2);
        assert_matches!(supervisor.state().await, EngineState::Failed(_));
    }

    #[tokio::test]
    async fn spawn_failure_is_sticky() {
        struct BrokenLauncher;

        #[async_trait]
        impl Launcher for BrokenLauncher {
            async fn launch(&self) -> std::io::Result<()> {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no python"))
            }
            async fn probe(&self) -> bool {
                panic!("probe must not run when the launch fails");
            }
        }

        let supervisor = EngineSupervisor::with_budget(
            Box::new(BrokenLauncher),
            Duration::from_millis(1),
            2,
        );

        assert_matches!(
            supervisor.ensure_ready().await,
            Err(JobError::EngineUnavailable(_))
        );
        assert_matches!(supervisor.state().await, EngineState::Failed(_));
    }
}
