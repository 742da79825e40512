// Exec Engine
// The step-graph execution engine behind the Engine abstraction

use crate::artifacts::{StreamDirection, StreamEnd};
use crate::engine::metadata::BuildToken;
use crate::engine::{Build, Engine, StoredBuild};
use crate::error::{EngineError, EngineResult};
use crate::execution::context::{BuildRuntime, SchedulerConfig, StepStatus};
use crate::execution::events::{BuildEvent, ProgressSender};
use crate::execution::scheduler::Scheduler;
use crate::plan::{Plan, PlanId, PlanValidator};
use crate::runners::StepRunner;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::Instrument;

/// Registry name of this engine. Persisted with every build it creates;
/// changing it orphans in-flight builds.
pub const EXEC_ENGINE_NAME: &str = "exec.v1";

/// Engine that executes plan graphs with the step scheduler, delegating leaf
/// kinds to the configured runner.
pub struct ExecEngine {
    runner: Arc<dyn StepRunner>,
    config: SchedulerConfig,
    events: Option<ProgressSender>,
    builds: Mutex<Vec<Weak<BuildRuntime>>>,
}

impl ExecEngine {
    pub fn new(runner: Arc<dyn StepRunner>) -> Self {
        Self {
            runner,
            config: SchedulerConfig::default(),
            events: None,
            builds: Mutex::new(Vec::new()),
        }
    }

    /// Set execution configuration
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set progress event sender shared by every build of this engine
    pub fn with_progress(mut self, events: ProgressSender) -> Self {
        self.events = Some(events);
        self
    }

    fn wrap(&self, runtime: Arc<BuildRuntime>) -> Arc<dyn Build> {
        let mut builds = match self.builds.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        builds.retain(|build| build.strong_count() > 0);
        builds.push(Arc::downgrade(&runtime));
        drop(builds);

        Arc::new(ExecBuild {
            runtime,
            scheduler: Scheduler::new(self.runner.clone()),
            resuming: AtomicBool::new(false),
        })
    }
}

impl Engine for ExecEngine {
    fn name(&self) -> &str {
        EXEC_ENGINE_NAME
    }

    fn create_build(&self, build_id: &str, plan: Plan) -> EngineResult<Arc<dyn Build>> {
        PlanValidator::validate(&plan)?;
        tracing::info!(build = build_id, "creating build");

        let runtime = Arc::new(BuildRuntime::new(
            build_id,
            plan,
            &self.config,
            self.events.clone(),
        ));
        Ok(self.wrap(runtime))
    }

    fn lookup_build(&self, stored: &StoredBuild) -> EngineResult<Arc<dyn Build>> {
        let token = BuildToken::decode(&stored.metadata, &stored.id)?;
        if token.engine != self.name() {
            return Err(EngineError::WrongEngine {
                build_id: stored.id.clone(),
                engine: token.engine,
            });
        }
        tracing::info!(build = %stored.id, "rehydrating build");

        let runtime = Arc::new(BuildRuntime::rehydrated(
            stored.id.clone(),
            token.plan,
            token.statuses,
            token.interrupted,
            token.outcome,
            &self.config,
            self.events.clone(),
        ));
        Ok(self.wrap(runtime))
    }

    fn release_all(&self) {
        let mut builds = match self.builds.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let released = builds.len();
        builds.clear();
        tracing::debug!(released, "released build tracking");
    }
}

/// A build bound to the exec engine's scheduler.
pub struct ExecBuild {
    runtime: Arc<BuildRuntime>,
    scheduler: Scheduler,
    resuming: AtomicBool,
}

#[async_trait::async_trait]
impl Build for ExecBuild {
    fn metadata(&self) -> String {
        BuildToken::snapshot(EXEC_ENGINE_NAME, &self.runtime).encode()
    }

    async fn resume(&self) -> StepStatus {
        let already = self.resuming.swap(true, Ordering::SeqCst);
        debug_assert!(!already, "a build must not be resumed concurrently");

        if let Some(status) = self.runtime.outcome() {
            self.resuming.store(false, Ordering::SeqCst);
            return status;
        }

        let span = tracing::info_span!("build", id = %self.runtime.build_id());
        let status = async {
            tracing::info!("resuming build");
            self.runtime
                .send_event(BuildEvent::build_started(self.runtime.build_id()));

            let status = self.scheduler.run(self.runtime.clone()).await;
            self.runtime.finish(status);

            self.runtime
                .send_event(BuildEvent::build_completed(self.runtime.build_id(), status));
            tracing::info!(status = %status, "build finished");
            status
        }
        .instrument(span)
        .await;

        self.resuming.store(false, Ordering::SeqCst);
        status
    }

    fn abort(&self) {
        tracing::info!(build = %self.runtime.build_id(), "aborting build");
        self.runtime.abort();
    }

    async fn receive_input(
        &self,
        id: &PlanId,
        mut input: Box<dyn AsyncRead + Send + Unpin>,
    ) -> EngineResult<()> {
        let mut stream =
            self.runtime
                .artifacts()
                .claim(id, StreamDirection::Input, StreamEnd::External)?;

        tokio::select! {
            copied = tokio::io::copy(&mut input, &mut stream) => match copied {
                Ok(_) => {
                    let _ = stream.shutdown().await;
                    Ok(())
                }
                // The step closed its end early; everything it wanted arrived.
                Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                Err(err) => Err(EngineError::Io(err)),
            },
            _ = self.runtime.finished() => Ok(()),
        }
    }

    async fn send_output(
        &self,
        id: &PlanId,
        mut output: Box<dyn AsyncWrite + Send + Unpin>,
    ) -> EngineResult<()> {
        let mut stream =
            self.runtime
                .artifacts()
                .claim(id, StreamDirection::Output, StreamEnd::External)?;

        tokio::select! {
            copied = tokio::io::copy(&mut stream, &mut output) => match copied {
                Ok(_) => {
                    let _ = output.flush().await;
                    Ok(())
                }
                Err(err) => Err(EngineError::Io(err)),
            },
            _ = self.runtime.finished() => Ok(()),
        }
    }
}
