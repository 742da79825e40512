// Step Scheduler
// Walks the plan tree against the build runtime and drives every step to a
// terminal status

use crate::execution::cancel::{cancel_scope, CancelSignal};
use crate::execution::context::{BuildRuntime, StepStatus};
use crate::execution::events::BuildEvent;
use crate::plan::{GetPlan, Plan, PlanId, PutPlan, Step, TaskPlan};
use crate::runners::{StepContext, StepOutcome, StepRunner};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

type StepFuture = Pin<Box<dyn Future<Output = StepStatus> + Send + 'static>>;

/// Which anchor outcome lets a follow-up step run.
#[derive(Debug, Clone, Copy)]
enum HookGuard {
    OnSuccess,
    OnFailure,
    Always,
}

/// Leaf step config moved out of the plan node for dispatch.
enum Leaf {
    Get(GetPlan),
    Put(PutPlan),
    Task(TaskPlan),
}

impl Leaf {
    fn kind(&self) -> &'static str {
        match self {
            Leaf::Get(_) => "get",
            Leaf::Put(_) => "put",
            Leaf::Task(_) => "task",
        }
    }
}

/// The plan-graph execution algorithm. Cheap to clone; clones share the
/// runner.
#[derive(Clone)]
pub struct Scheduler {
    runner: Arc<dyn StepRunner>,
}

impl Scheduler {
    pub fn new(runner: Arc<dyn StepRunner>) -> Self {
        Self { runner }
    }

    /// Drive the whole plan to a terminal status. An abort observed at any
    /// point makes the overall result `aborted` regardless of how individual
    /// steps resolved.
    pub async fn run(&self, runtime: Arc<BuildRuntime>) -> StepStatus {
        let root = runtime.plan().clone();
        let signal = runtime.abort_signal();
        let status = self.exec(root, runtime.clone(), signal).await;
        if runtime.aborted() {
            StepStatus::Aborted
        } else {
            status
        }
    }

    /// Execute one node. Nodes already terminal (from a previous run) are
    /// skipped; pending nodes visited after cancellation go straight to
    /// aborted without starting.
    fn exec(&self, plan: Plan, rt: Arc<BuildRuntime>, cancel: CancelSignal) -> StepFuture {
        let sched = self.clone();
        Box::pin(async move {
            let recorded = rt.status(&plan.id);
            if recorded.is_terminal() {
                rt.send_event(BuildEvent::step_skipped(
                    plan.id.clone(),
                    "completed in a previous run",
                ));
                return recorded;
            }
            if cancel.is_cancelled() {
                rt.set_status(&plan.id, StepStatus::Aborted);
                rt.send_event(BuildEvent::step_completed(plan.id.clone(), StepStatus::Aborted));
                return StepStatus::Aborted;
            }

            let Plan { id, step } = plan;
            match step {
                Step::Get(get) => sched.exec_leaf(id, Leaf::Get(get), rt, cancel).await,
                Step::Put(put) => sched.exec_leaf(id, Leaf::Put(put), rt, cancel).await,
                Step::Task(task) => sched.exec_leaf(id, Leaf::Task(task), rt, cancel).await,
                Step::Sequence(children) => {
                    sched.exec_in_order(id, "sequence", children, rt, cancel, true).await
                }
                Step::Do(children) => {
                    sched.exec_in_order(id, "do", children, rt, cancel, false).await
                }
                Step::Aggregate(children) => {
                    sched.exec_aggregate(id, children, rt, cancel).await
                }
                Step::Try(child) => sched.exec_try(id, *child, rt, cancel).await,
                Step::Retry { attempts, step } => {
                    sched.exec_retry(id, attempts, *step, rt, cancel).await
                }
                Step::Timeout { duration, step } => {
                    sched.exec_timeout(id, duration, *step, rt, cancel).await
                }
                Step::OnSuccess { step, on_success } => {
                    sched
                        .exec_hooked(id, "on_success", *step, *on_success, HookGuard::OnSuccess, rt, cancel)
                        .await
                }
                Step::OnFailure { step, on_failure } => {
                    sched
                        .exec_hooked(id, "on_failure", *step, *on_failure, HookGuard::OnFailure, rt, cancel)
                        .await
                }
                Step::Ensure { step, ensure } => {
                    sched
                        .exec_hooked(id, "ensure", *step, *ensure, HookGuard::Always, rt, cancel)
                        .await
                }
            }
        })
    }

    /// Ordered children. With `short_circuit` the first non-success stops
    /// the walk (sequence); without it every child runs and the worst
    /// outcome wins (do).
    async fn exec_in_order(
        &self,
        id: PlanId,
        kind: &'static str,
        children: Vec<Plan>,
        rt: Arc<BuildRuntime>,
        cancel: CancelSignal,
        short_circuit: bool,
    ) -> StepStatus {
        rt.set_status(&id, StepStatus::Running);
        rt.send_event(BuildEvent::step_started(id.clone(), kind));

        let mut status = StepStatus::Succeeded;
        for child in children {
            let child_status = self.exec(child, rt.clone(), cancel.clone()).await;
            status = status.worst(child_status);
            if short_circuit && child_status != StepStatus::Succeeded {
                break;
            }
        }

        rt.set_status(&id, status);
        rt.send_event(BuildEvent::step_completed(id, status));
        status
    }

    /// Concurrent children with a join barrier before the status is
    /// computed.
    async fn exec_aggregate(
        &self,
        id: PlanId,
        children: Vec<Plan>,
        rt: Arc<BuildRuntime>,
        cancel: CancelSignal,
    ) -> StepStatus {
        rt.set_status(&id, StepStatus::Running);
        rt.send_event(BuildEvent::step_started(id.clone(), "aggregate"));

        let mut branches = JoinSet::new();
        for child in children {
            branches.spawn(self.exec(child, rt.clone(), cancel.clone()));
        }

        let mut status = StepStatus::Succeeded;
        while let Some(joined) = branches.join_next().await {
            match joined {
                Ok(child_status) => status = status.worst(child_status),
                Err(err) => {
                    tracing::error!(build = %rt.build_id(), step = %id, error = %err, "aggregate branch panicked");
                    status = status.worst(StepStatus::Errored);
                }
            }
        }

        rt.set_status(&id, status);
        rt.send_event(BuildEvent::step_completed(id, status));
        status
    }

    /// Child failure and error are reported upward as success; the child's
    /// own recorded status is untouched. Abort is not suppressed.
    async fn exec_try(
        &self,
        id: PlanId,
        child: Plan,
        rt: Arc<BuildRuntime>,
        cancel: CancelSignal,
    ) -> StepStatus {
        rt.set_status(&id, StepStatus::Running);
        rt.send_event(BuildEvent::step_started(id.clone(), "try"));

        let child_status = self.exec(child, rt.clone(), cancel.clone()).await;
        let status = match child_status {
            StepStatus::Failed | StepStatus::Errored => StepStatus::Succeeded,
            other => other,
        };

        rt.set_status(&id, status);
        rt.send_event(BuildEvent::step_completed(id, status));
        status
    }

    /// Anchor step plus a follow-up gated on the anchor's outcome. A
    /// follow-up that runs combines as worst(anchor, follow-up); a skipped
    /// one leaves the anchor's status untouched.
    #[allow(clippy::too_many_arguments)]
    async fn exec_hooked(
        &self,
        id: PlanId,
        kind: &'static str,
        anchor: Plan,
        hook: Plan,
        guard: HookGuard,
        rt: Arc<BuildRuntime>,
        cancel: CancelSignal,
    ) -> StepStatus {
        rt.set_status(&id, StepStatus::Running);
        rt.send_event(BuildEvent::step_started(id.clone(), kind));

        let anchor_status = self.exec(anchor, rt.clone(), cancel.clone()).await;
        let hook_runs = match guard {
            HookGuard::OnSuccess => anchor_status == StepStatus::Succeeded,
            HookGuard::OnFailure => anchor_status == StepStatus::Failed,
            HookGuard::Always => true,
        };

        let status = if hook_runs {
            let hook_status = self.exec(hook, rt.clone(), cancel.clone()).await;
            anchor_status.worst(hook_status)
        } else {
            rt.send_event(BuildEvent::step_skipped(hook.id.clone(), "guard not matched"));
            anchor_status
        };

        rt.set_status(&id, status);
        rt.send_event(BuildEvent::step_completed(id, status));
        status
    }

    /// Re-run the child while it fails, up to `attempts` total attempts.
    /// The child subtree is re-armed between attempts; a child already
    /// terminal from a previous run counts as a spent attempt.
    async fn exec_retry(
        &self,
        id: PlanId,
        attempts: u32,
        child: Plan,
        rt: Arc<BuildRuntime>,
        cancel: CancelSignal,
    ) -> StepStatus {
        rt.set_status(&id, StepStatus::Running);
        rt.send_event(BuildEvent::step_started(id.clone(), "retry"));

        let mut status = StepStatus::Errored;
        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                status = StepStatus::Aborted;
                break;
            }
            if attempt > 1 {
                tracing::debug!(build = %rt.build_id(), step = %id, attempt, "retrying step");
                rt.clear_subtree(&child);
            }
            status = self.exec(child.clone(), rt.clone(), cancel.clone()).await;
            match status {
                StepStatus::Succeeded | StepStatus::Aborted => break,
                _ => {}
            }
        }

        rt.set_status(&id, status);
        rt.send_event(BuildEvent::step_completed(id, status));
        status
    }

    /// Race the child against a deadline. Expiry cancels the child's own
    /// scope, waits for it to unwind, and reports errored.
    async fn exec_timeout(
        &self,
        id: PlanId,
        duration: Duration,
        child: Plan,
        rt: Arc<BuildRuntime>,
        cancel: CancelSignal,
    ) -> StepStatus {
        rt.set_status(&id, StepStatus::Running);
        rt.send_event(BuildEvent::step_started(id.clone(), "timeout"));

        let (scope, child_signal) = cancel_scope();
        let mut child_fut = self.exec(child, rt.clone(), child_signal);

        let status = tokio::select! {
            child_status = &mut child_fut => child_status,
            _ = tokio::time::sleep(duration) => {
                scope.cancel();
                let _ = (&mut child_fut).await;
                tracing::warn!(build = %rt.build_id(), step = %id, deadline = ?duration, "step exceeded its deadline");
                rt.send_event(BuildEvent::error(
                    Some(id.clone()),
                    format!("timed out after {:?}", duration),
                ));
                StepStatus::Errored
            }
            _ = cancel.cancelled() => {
                scope.cancel();
                let _ = (&mut child_fut).await;
                StepStatus::Aborted
            }
        };

        rt.set_status(&id, status);
        rt.send_event(BuildEvent::step_completed(id, status));
        status
    }

    /// Dispatch a leaf to the step runner. `running` is recorded before the
    /// invocation so an interrupted process is observable on resume.
    async fn exec_leaf(
        &self,
        id: PlanId,
        leaf: Leaf,
        rt: Arc<BuildRuntime>,
        cancel: CancelSignal,
    ) -> StepStatus {
        let _slot = rt.acquire_slot().await;
        if cancel.is_cancelled() {
            rt.set_status(&id, StepStatus::Aborted);
            rt.send_event(BuildEvent::step_completed(id, StepStatus::Aborted));
            return StepStatus::Aborted;
        }

        rt.set_status(&id, StepStatus::Running);
        rt.send_event(BuildEvent::step_started(id.clone(), leaf.kind()));

        let ctx = StepContext::new(
            rt.build_id(),
            id.clone(),
            rt.artifacts().clone(),
            cancel.clone(),
            rt.was_interrupted(&id),
        );
        let result = match &leaf {
            Leaf::Get(get) => self.runner.get(get, ctx).await,
            Leaf::Put(put) => self.runner.put(put, ctx).await,
            Leaf::Task(task) => self.runner.task(task, ctx).await,
        };

        let status = match result {
            Ok(StepOutcome::Succeeded) => StepStatus::Succeeded,
            Ok(StepOutcome::Failed) => StepStatus::Failed,
            Err(_) if cancel.is_cancelled() => StepStatus::Aborted,
            Err(err) => {
                tracing::warn!(build = %rt.build_id(), step = %id, error = %err, "step errored");
                rt.send_event(BuildEvent::error(Some(id.clone()), err.to_string()));
                StepStatus::Errored
            }
        };

        rt.set_status(&id, status);
        rt.send_event(BuildEvent::step_completed(id, status));
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::context::SchedulerConfig;
    use crate::runners::StepError;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// What a scripted leaf does on one invocation.
    #[derive(Debug, Clone, Copy)]
    enum Script {
        Succeed,
        Fail,
        Error,
        /// Sleep, succeeding afterwards; unwinds early on cancellation.
        Sleep(u64),
        /// Never completes on its own; unwinds on cancellation.
        Hang,
    }

    struct ScriptedRunner {
        scripts: Mutex<HashMap<String, VecDeque<Script>>>,
        runs: Mutex<Vec<String>>,
        running: AtomicUsize,
        max_running: AtomicUsize,
    }

    impl ScriptedRunner {
        fn new() -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                runs: Mutex::new(Vec::new()),
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
            }
        }

        fn with(self, id: &str, script: Script) -> Self {
            self.with_sequence(id, vec![script])
        }

        fn with_sequence(self, id: &str, scripts: Vec<Script>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(id.to_string(), scripts.into());
            self
        }

        fn runs(&self) -> Vec<String> {
            self.runs.lock().unwrap().clone()
        }

        fn max_running(&self) -> usize {
            self.max_running.load(Ordering::SeqCst)
        }

        async fn run_step(&self, ctx: StepContext) -> Result<StepOutcome, StepError> {
            let id = ctx.plan_id().as_str().to_string();
            self.runs.lock().unwrap().push(id.clone());
            let current = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(current, Ordering::SeqCst);

            let script = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(&id)
                .and_then(|queue| queue.pop_front())
                .unwrap_or(Script::Succeed);

            let result = match script {
                Script::Succeed => Ok(StepOutcome::Succeeded),
                Script::Fail => Ok(StepOutcome::Failed),
                Script::Error => Err(StepError::message("scripted error")),
                Script::Sleep(millis) => {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(millis)) => Ok(StepOutcome::Succeeded),
                        _ = ctx.cancelled() => Err(StepError::message("interrupted")),
                    }
                }
                Script::Hang => {
                    ctx.cancelled().await;
                    Err(StepError::message("interrupted"))
                }
            };

            self.running.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    #[async_trait::async_trait]
    impl StepRunner for ScriptedRunner {
        async fn get(&self, _plan: &GetPlan, ctx: StepContext) -> Result<StepOutcome, StepError> {
            self.run_step(ctx).await
        }

        async fn put(&self, _plan: &PutPlan, ctx: StepContext) -> Result<StepOutcome, StepError> {
            self.run_step(ctx).await
        }

        async fn task(&self, _plan: &TaskPlan, ctx: StepContext) -> Result<StepOutcome, StepError> {
            self.run_step(ctx).await
        }
    }

    fn task(id: &str) -> Plan {
        Plan::new(
            id,
            Step::Task(TaskPlan {
                name: id.to_string(),
                config: serde_json::Value::Null,
            }),
        )
    }

    fn runtime(plan: Plan) -> Arc<BuildRuntime> {
        Arc::new(BuildRuntime::new(
            "b-1",
            plan,
            &SchedulerConfig::default(),
            None,
        ))
    }

    async fn run(runner: Arc<ScriptedRunner>, rt: Arc<BuildRuntime>) -> StepStatus {
        Scheduler::new(runner).run(rt).await
    }

    #[tokio::test]
    async fn test_sequence_short_circuits_on_failure() {
        let runner = Arc::new(ScriptedRunner::new().with("two", Script::Fail));
        let rt = runtime(Plan::new(
            "root",
            Step::Sequence(vec![task("one"), task("two"), task("three")]),
        ));

        let status = run(runner.clone(), rt.clone()).await;

        assert_eq!(status, StepStatus::Failed);
        assert_eq!(runner.runs(), vec!["one", "two"]);
        assert_eq!(rt.status(&PlanId::from("three")), StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_do_runs_every_child() {
        let runner = Arc::new(ScriptedRunner::new().with("one", Script::Fail));
        let rt = runtime(Plan::new(
            "root",
            Step::Do(vec![task("one"), task("two")]),
        ));

        let status = run(runner.clone(), rt.clone()).await;

        assert_eq!(status, StepStatus::Failed);
        assert_eq!(runner.runs(), vec!["one", "two"]);
        assert_eq!(rt.status(&PlanId::from("two")), StepStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_aggregate_reports_worst_and_leaves_no_stragglers() {
        let runner = Arc::new(ScriptedRunner::new().with("bad", Script::Fail));
        let rt = runtime(Plan::new(
            "root",
            Step::Aggregate(vec![task("good"), task("bad")]),
        ));

        let status = run(runner.clone(), rt.clone()).await;

        assert_eq!(status, StepStatus::Failed);
        assert_eq!(rt.status(&PlanId::from("good")), StepStatus::Succeeded);
        assert_eq!(rt.status(&PlanId::from("bad")), StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_aggregate_prefers_abort_over_error() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .with("erroring", Script::Error)
                .with("hanging", Script::Hang),
        );
        let rt = runtime(Plan::new(
            "root",
            Step::Aggregate(vec![task("erroring"), task("hanging")]),
        ));

        let handle = {
            let runner = runner.clone();
            let rt = rt.clone();
            tokio::spawn(async move { run(runner, rt).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        rt.abort();

        assert_eq!(handle.await.unwrap(), StepStatus::Aborted);
    }

    #[tokio::test]
    async fn test_try_suppresses_failure_but_records_it() {
        let runner = Arc::new(ScriptedRunner::new().with("risky", Script::Fail));
        let rt = runtime(Plan::new("root", Step::Try(Box::new(task("risky")))));

        let status = run(runner, rt.clone()).await;

        assert_eq!(status, StepStatus::Succeeded);
        assert_eq!(rt.status(&PlanId::from("risky")), StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_on_success_hook_runs_after_success() {
        let runner = Arc::new(ScriptedRunner::new());
        let rt = runtime(Plan::new(
            "root",
            Step::OnSuccess {
                step: Box::new(task("anchor")),
                on_success: Box::new(task("followup")),
            },
        ));

        let status = run(runner.clone(), rt).await;

        assert_eq!(status, StepStatus::Succeeded);
        assert_eq!(runner.runs(), vec!["anchor", "followup"]);
    }

    #[tokio::test]
    async fn test_on_success_hook_skipped_after_failure() {
        let runner = Arc::new(ScriptedRunner::new().with("anchor", Script::Fail));
        let rt = runtime(Plan::new(
            "root",
            Step::OnSuccess {
                step: Box::new(task("anchor")),
                on_success: Box::new(task("followup")),
            },
        ));

        let status = run(runner.clone(), rt.clone()).await;

        assert_eq!(status, StepStatus::Failed);
        assert_eq!(runner.runs(), vec!["anchor"]);
        assert_eq!(rt.status(&PlanId::from("followup")), StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_on_failure_hook_preserves_the_failure() {
        let runner = Arc::new(ScriptedRunner::new().with("anchor", Script::Fail));
        let rt = runtime(Plan::new(
            "root",
            Step::OnFailure {
                step: Box::new(task("anchor")),
                on_failure: Box::new(task("cleanup")),
            },
        ));

        let status = run(runner.clone(), rt).await;

        assert_eq!(status, StepStatus::Failed);
        assert_eq!(runner.runs(), vec!["anchor", "cleanup"]);
    }

    #[tokio::test]
    async fn test_ensure_runs_whatever_the_outcome() {
        let runner = Arc::new(ScriptedRunner::new().with("anchor", Script::Fail));
        let rt = runtime(Plan::new(
            "root",
            Step::Ensure {
                step: Box::new(task("anchor")),
                ensure: Box::new(task("always")),
            },
        ));

        let status = run(runner.clone(), rt).await;

        // The follow-up ran, but the anchor's failure is preserved.
        assert_eq!(status, StepStatus::Failed);
        assert_eq!(runner.runs(), vec!["anchor", "always"]);
    }

    #[tokio::test]
    async fn test_retry_succeeds_on_third_attempt() {
        let runner = Arc::new(ScriptedRunner::new().with_sequence(
            "flaky",
            vec![Script::Fail, Script::Fail, Script::Succeed],
        ));
        let rt = runtime(Plan::new(
            "root",
            Step::Retry {
                attempts: 3,
                step: Box::new(task("flaky")),
            },
        ));

        let status = run(runner.clone(), rt).await;

        assert_eq!(status, StepStatus::Succeeded);
        assert_eq!(runner.runs().len(), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts_and_keeps_last_failure() {
        let runner = Arc::new(ScriptedRunner::new().with_sequence(
            "flaky",
            vec![Script::Fail, Script::Error],
        ));
        let rt = runtime(Plan::new(
            "root",
            Step::Retry {
                attempts: 2,
                step: Box::new(task("flaky")),
            },
        ));

        let status = run(runner.clone(), rt).await;

        assert_eq!(status, StepStatus::Errored);
        assert_eq!(runner.runs().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_the_child_and_errors() {
        let runner = Arc::new(ScriptedRunner::new().with("slow", Script::Hang));
        let rt = runtime(Plan::new(
            "root",
            Step::Timeout {
                duration: Duration::from_secs(5),
                step: Box::new(task("slow")),
            },
        ));

        let status = run(runner.clone(), rt.clone()).await;

        assert_eq!(status, StepStatus::Errored);
        // The leaf unwound through its cancellation signal.
        assert_eq!(rt.status(&PlanId::from("slow")), StepStatus::Aborted);
        assert_eq!(runner.runs(), vec!["slow"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_expiry_spares_aggregate_siblings() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .with("slow", Script::Hang)
                .with("steady", Script::Sleep(8_000)),
        );
        let rt = runtime(Plan::new(
            "root",
            Step::Aggregate(vec![
                Plan::new(
                    "limited",
                    Step::Timeout {
                        duration: Duration::from_secs(5),
                        step: Box::new(task("slow")),
                    },
                ),
                task("steady"),
            ]),
        ));

        let status = run(runner, rt.clone()).await;

        assert_eq!(status, StepStatus::Errored);
        assert_eq!(rt.status(&PlanId::from("steady")), StepStatus::Succeeded);
        assert_eq!(rt.status(&PlanId::from("limited")), StepStatus::Errored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_mid_run_stops_new_steps() {
        let runner = Arc::new(ScriptedRunner::new().with("one", Script::Sleep(60_000)));
        let rt = runtime(Plan::new(
            "root",
            Step::Sequence(vec![task("one"), task("two")]),
        ));

        let handle = {
            let runner = runner.clone();
            let rt = rt.clone();
            tokio::spawn(async move { run(runner, rt).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        rt.abort();

        assert_eq!(handle.await.unwrap(), StepStatus::Aborted);
        assert_eq!(runner.runs(), vec!["one"]);
        assert_eq!(rt.status(&PlanId::from("two")), StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_abort_before_run_invokes_nothing() {
        let runner = Arc::new(ScriptedRunner::new());
        let rt = runtime(Plan::new(
            "root",
            Step::Sequence(vec![task("one"), task("two")]),
        ));

        rt.abort();
        let status = run(runner.clone(), rt).await;

        assert_eq!(status, StepStatus::Aborted);
        assert!(runner.runs().is_empty());
    }

    #[tokio::test]
    async fn test_recorded_terminal_steps_are_not_rerun() {
        let plan = Plan::new("root", Step::Sequence(vec![task("one"), task("two")]));
        let runner = Arc::new(ScriptedRunner::new());
        let rt = Arc::new(BuildRuntime::rehydrated(
            "b-1",
            plan,
            vec![(PlanId::from("one"), StepStatus::Succeeded)],
            Vec::new(),
            None,
            &SchedulerConfig::default(),
            None,
        ));

        let status = run(runner.clone(), rt).await;

        assert_eq!(status, StepStatus::Succeeded);
        assert_eq!(runner.runs(), vec!["two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_in_flight_serializes_leaves() {
        let plan = Plan::new(
            "root",
            Step::Aggregate(vec![task("one"), task("two")]),
        );
        let runner = Arc::new(
            ScriptedRunner::new()
                .with("one", Script::Sleep(50))
                .with("two", Script::Sleep(50)),
        );
        let rt = Arc::new(BuildRuntime::new(
            "b-1",
            plan,
            &SchedulerConfig { max_in_flight: 1 },
            None,
        ));

        let status = run(runner.clone(), rt).await;

        assert_eq!(status, StepStatus::Succeeded);
        assert_eq!(runner.max_running(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_aggregate_overlaps_leaves() {
        let plan = Plan::new(
            "root",
            Step::Aggregate(vec![task("one"), task("two")]),
        );
        let runner = Arc::new(
            ScriptedRunner::new()
                .with("one", Script::Sleep(50))
                .with("two", Script::Sleep(50)),
        );
        let rt = runtime(plan);

        let status = run(runner.clone(), rt).await;

        assert_eq!(status, StepStatus::Succeeded);
        assert_eq!(runner.max_running(), 2);
    }
}
