//! Sequential workflow engine with static branch points.
//!
//! A [`Workflow`] is a fixed list of [`Step`]s. Unit steps always run; a
//! [`Branch`] evaluates its predicate once on entry and runs exactly one of
//! its two sub-sequences to completion. Stages share a per-run
//! [`WorkflowState`] and can also read the previous stage's output through
//! [`StageContext::previous`]. The first failing stage aborts the run.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use quill_core::QuillError;
use tracing::Instrument;

type Artifact = Box<dyn Any + Send + Sync>;

/// Typed name of a [`WorkflowState`] entry.
///
/// Names must be unique across a workflow; the type parameter fixes what
/// the entry holds.
///
/// # Examples
///
/// ```
/// use quill_review::workflow::{StateKey, WorkflowState};
///
/// const COUNT: StateKey<u32> = StateKey::new("count");
///
/// let mut state = WorkflowState::new();
/// state.insert(&COUNT, 3);
/// assert_eq!(state.get(&COUNT), Some(&3));
/// ```
pub struct StateKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StateKey<T> {
    /// Declare a key.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// The key's name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for StateKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StateKey<T> {}

impl<T> fmt::Debug for StateKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateKey({})", self.name)
    }
}

/// Artifact store owned by a single run.
#[derive(Default)]
pub struct WorkflowState {
    artifacts: HashMap<&'static str, Artifact>,
}

impl WorkflowState {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `value` under `key`, returning the previous value if any.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: &StateKey<T>, value: T) -> Option<T> {
        self.artifacts
            .insert(key.name, Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Read the value under `key`.
    pub fn get<T: Any + Send + Sync>(&self, key: &StateKey<T>) -> Option<&T> {
        self.artifacts.get(key.name)?.downcast_ref::<T>()
    }

    /// Read the value under `key`, failing if no stage wrote it.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::MissingArtifact`] naming the key.
    pub fn require<T: Any + Send + Sync>(&self, key: &StateKey<T>) -> Result<&T, QuillError> {
        self.get(key).ok_or(QuillError::MissingArtifact(key.name))
    }

    /// Returns `true` if a value of the right type is stored under `key`.
    pub fn contains<T: Any + Send + Sync>(&self, key: &StateKey<T>) -> bool {
        self.get(key).is_some()
    }

    /// Take the value under `key` out of the store.
    pub fn remove<T: Any + Send + Sync>(&mut self, key: &StateKey<T>) -> Option<T> {
        if !self.contains(key) {
            return None;
        }
        self.artifacts
            .remove(key.name)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    /// Stored key names, sorted.
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys: Vec<_> = self.artifacts.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Number of stored artifacts.
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl fmt::Debug for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowState")
            .field("keys", &self.keys())
            .finish()
    }
}

/// The value a stage hands to its successor.
#[derive(Default)]
pub struct StageOutput {
    value: Option<Artifact>,
}

impl StageOutput {
    /// Output carrying nothing, as returned by no-op stages.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Output carrying `value`.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Some(Box::new(value)),
        }
    }

    /// Returns `true` if the output carries nothing.
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    /// The carried value, if it is a `T`.
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.value.as_ref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for StageOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("StageOutput(empty)")
        } else {
            f.write_str("StageOutput(..)")
        }
    }
}

/// What a running stage can see: the shared store and its predecessor's output.
pub struct StageContext<'a> {
    state: &'a mut WorkflowState,
    previous: &'a StageOutput,
}

impl<'a> StageContext<'a> {
    /// Build a context by hand, e.g. to exercise a single stage in tests.
    pub fn new(state: &'a mut WorkflowState, previous: &'a StageOutput) -> Self {
        Self { state, previous }
    }

    /// The shared store.
    pub fn state(&self) -> &WorkflowState {
        self.state
    }

    /// Named lookup in the shared store.
    pub fn get<T: Any + Send + Sync>(&self, key: &StateKey<T>) -> Option<&T> {
        self.state.get(key)
    }

    /// Named lookup that fails if the artifact is missing.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::MissingArtifact`] naming the key.
    pub fn require<T: Any + Send + Sync>(&self, key: &StateKey<T>) -> Result<&T, QuillError> {
        self.state.require(key)
    }

    /// Write an artifact to the shared store.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: &StateKey<T>, value: T) {
        self.state.insert(key, value);
    }

    /// The immediately preceding stage's output, if it is a `T`.
    pub fn previous<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.previous.downcast_ref::<T>()
    }

    /// The previous output if it is a `T`, otherwise the store entry under `key`.
    pub fn find<T: Any + Send + Sync>(&self, key: &StateKey<T>) -> Option<&T> {
        self.previous::<T>().or_else(|| self.get(key))
    }
}

/// A unit of work in a workflow.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stable stage name, used in traces and errors.
    fn name(&self) -> &str;

    /// Do the work.
    async fn run(&self, ctx: &mut StageContext<'_>) -> Result<StageOutput, QuillError>;
}

/// Stage that does nothing; stands in for a disabled branch arm.
///
/// # Examples
///
/// ```
/// use quill_review::workflow::{NoopStage, Stage};
///
/// let stage = NoopStage::new("skip-review");
/// assert_eq!(stage.name(), "skip-review");
/// ```
#[derive(Debug, Clone)]
pub struct NoopStage {
    name: String,
}

impl NoopStage {
    /// Create a no-op stage called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for NoopStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _ctx: &mut StageContext<'_>) -> Result<StageOutput, QuillError> {
        Ok(StageOutput::empty())
    }
}

type Predicate = Box<dyn Fn(&WorkflowState) -> bool + Send + Sync>;

/// A choice between two named sub-sequences.
pub struct Branch {
    name: String,
    predicate: Predicate,
    on_true: Vec<Step>,
    on_false: Vec<Step>,
}

impl Branch {
    /// Branch on a predicate evaluated once, on entry, against the current state.
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&WorkflowState) -> bool + Send + Sync + 'static,
        on_true: Vec<Step>,
        on_false: Vec<Step>,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
            on_true,
            on_false,
        }
    }

    /// Branch on a value already decided, e.g. from static configuration.
    pub fn fixed(
        name: impl Into<String>,
        decision: bool,
        on_true: Vec<Step>,
        on_false: Vec<Step>,
    ) -> Self {
        Self::new(name, move |_| decision, on_true, on_false)
    }

    /// The branch name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One entry in a workflow's step list.
pub enum Step {
    /// Always runs.
    Unit(Box<dyn Stage>),
    /// Runs one of two sub-sequences.
    Branch(Branch),
}

impl Step {
    /// Wrap a stage.
    pub fn unit(stage: impl Stage + 'static) -> Self {
        Step::Unit(Box::new(stage))
    }

    fn collect_names(&self, depth: usize, out: &mut Vec<String>) {
        let indent = "  ".repeat(depth);
        match self {
            Step::Unit(stage) => out.push(format!("{indent}{}", stage.name())),
            Step::Branch(branch) => {
                out.push(format!("{indent}{}?", branch.name));
                for step in &branch.on_true {
                    step.collect_names(depth + 1, out);
                }
                out.push(format!("{indent}else"));
                for step in &branch.on_false {
                    step.collect_names(depth + 1, out);
                }
            }
        }
    }
}

impl From<Branch> for Step {
    fn from(branch: Branch) -> Self {
        Step::Branch(branch)
    }
}

/// Run-level status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunStatus {
    /// Not yet started.
    #[default]
    NotStarted,
    /// Executing stages.
    Running,
    /// All stages finished.
    Completed,
    /// A stage failed; the run stopped there.
    Failed,
}

/// Stage-level status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StageStatus {
    /// Recorded but not started.
    #[default]
    Pending,
    /// Executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Returned an error.
    Failed,
}

/// Execution record for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    /// Stage name.
    pub name: String,
    /// Final (or current) status.
    pub status: StageStatus,
    /// Wall-clock time spent in the stage.
    pub elapsed: Duration,
    /// Whether the stage returned a non-empty output.
    pub produced: bool,
}

/// A branch decision, captured at branch entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchDecision {
    /// Branch name.
    pub name: String,
    /// Predicate result.
    pub taken: bool,
}

/// Ordered trace entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A stage execution.
    Stage(StageRecord),
    /// A branch decision.
    Branch(BranchDecision),
}

/// Everything that happened during a run, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    /// Run status.
    pub status: RunStatus,
    /// Events in execution order.
    pub events: Vec<TraceEvent>,
}

impl Trace {
    /// Stage records in execution order.
    pub fn stages(&self) -> impl Iterator<Item = &StageRecord> {
        self.events.iter().filter_map(|e| match e {
            TraceEvent::Stage(record) => Some(record),
            TraceEvent::Branch(_) => None,
        })
    }

    /// Names of executed stages in order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages().map(|s| s.name.as_str()).collect()
    }

    /// The recorded decision for branch `name`, if it was reached.
    pub fn decision(&self, name: &str) -> Option<bool> {
        self.events.iter().find_map(|e| match e {
            TraceEvent::Branch(d) if d.name == name => Some(d.taken),
            _ => None,
        })
    }

    fn begin_stage(&mut self, name: &str) -> usize {
        self.events.push(TraceEvent::Stage(StageRecord {
            name: name.to_string(),
            status: StageStatus::Pending,
            elapsed: Duration::ZERO,
            produced: false,
        }));
        let index = self.events.len() - 1;
        self.update_stage(index, |r| r.status = StageStatus::Running);
        index
    }

    fn update_stage(&mut self, index: usize, f: impl FnOnce(&mut StageRecord)) {
        if let Some(TraceEvent::Stage(record)) = self.events.get_mut(index) {
            f(record);
        }
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for event in &self.events {
            match event {
                TraceEvent::Branch(d) => writeln!(
                    f,
                    "  branch {:<20} -> {}",
                    d.name,
                    if d.taken { "enabled" } else { "disabled" }
                )?,
                TraceEvent::Stage(s) => writeln!(
                    f,
                    "  stage  {:<20} {:?} ({} ms)",
                    s.name,
                    s.status,
                    s.elapsed.as_millis()
                )?,
            }
        }
        write!(f, "  run: {:?}", self.status)
    }
}

/// Outcome of a completed run.
#[derive(Debug)]
pub struct RunReport {
    /// Execution trace.
    pub trace: Trace,
    /// Final artifact store.
    pub state: WorkflowState,
}

/// A run aborted by a failing stage.
#[derive(Debug, thiserror::Error)]
#[error("stage `{stage}` failed: {error}")]
pub struct RunFailure {
    /// Name of the failing stage.
    pub stage: String,
    /// What the stage returned.
    #[source]
    pub error: QuillError,
    /// Trace up to and including the failure.
    pub trace: Trace,
    /// Artifacts written before the failure.
    pub state: WorkflowState,
}

impl From<RunFailure> for QuillError {
    fn from(failure: RunFailure) -> Self {
        QuillError::Stage {
            stage: failure.stage,
            source: Box::new(failure.error),
        }
    }
}

/// A named, statically declared sequence of steps.
///
/// # Examples
///
/// ```
/// use quill_review::workflow::{Branch, NoopStage, Step, Workflow, WorkflowState};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let workflow = Workflow::new("demo")
///     .then(NoopStage::new("first"))
///     .branch(Branch::fixed(
///         "extra",
///         false,
///         vec![Step::unit(NoopStage::new("do-extra"))],
///         vec![Step::unit(NoopStage::new("skip-extra"))],
///     ));
///
/// let report = workflow.run(WorkflowState::new()).await.unwrap();
/// assert_eq!(report.trace.stage_names(), vec!["first", "skip-extra"]);
/// assert_eq!(report.trace.decision("extra"), Some(false));
/// # });
/// ```
pub struct Workflow {
    name: String,
    steps: Vec<Step>,
}

impl Workflow {
    /// Empty workflow called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a unit stage.
    pub fn then(mut self, stage: impl Stage + 'static) -> Self {
        self.steps.push(Step::unit(stage));
        self
    }

    /// Append a branch.
    pub fn branch(mut self, branch: Branch) -> Self {
        self.steps.push(Step::Branch(branch));
        self
    }

    /// The workflow name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Indented outline of every step, both branch arms included.
    pub fn outline(&self) -> Vec<String> {
        let mut out = Vec::new();
        for step in &self.steps {
            step.collect_names(0, &mut out);
        }
        out
    }

    /// Execute the workflow against `state`, one stage at a time.
    ///
    /// # Errors
    ///
    /// Returns [`RunFailure`] identifying the first stage that failed. Work
    /// done by earlier stages (including external side effects) stands.
    pub async fn run(&self, state: WorkflowState) -> Result<RunReport, RunFailure> {
        let span = tracing::info_span!("workflow", name = %self.name);
        self.execute(state).instrument(span).await
    }

    async fn execute(&self, mut state: WorkflowState) -> Result<RunReport, RunFailure> {
        let mut trace = Trace {
            status: RunStatus::Running,
            events: Vec::new(),
        };
        let mut previous = StageOutput::empty();
        let mut stack: Vec<std::slice::Iter<'_, Step>> = vec![self.steps.iter()];
        tracing::info!("run started");

        while let Some(cursor) = stack.last_mut() {
            let Some(step) = cursor.next() else {
                stack.pop();
                continue;
            };

            match step {
                Step::Branch(branch) => {
                    let taken = (branch.predicate)(&state);
                    tracing::info!(branch = %branch.name, taken, "branch decided");
                    trace.events.push(TraceEvent::Branch(BranchDecision {
                        name: branch.name.clone(),
                        taken,
                    }));
                    let arm = if taken {
                        &branch.on_true
                    } else {
                        &branch.on_false
                    };
                    stack.push(arm.iter());
                }
                Step::Unit(stage) => {
                    let name = stage.name().to_string();
                    let index = trace.begin_stage(&name);
                    tracing::debug!(stage = %name, "stage started");
                    let started = Instant::now();

                    let result = {
                        let mut ctx = StageContext::new(&mut state, &previous);
                        stage.run(&mut ctx).await
                    };
                    let elapsed = started.elapsed();

                    match result {
                        Ok(output) => {
                            let produced = !output.is_empty();
                            trace.update_stage(index, |r| {
                                r.status = StageStatus::Completed;
                                r.elapsed = elapsed;
                                r.produced = produced;
                            });
                            tracing::info!(
                                stage = %name,
                                elapsed_ms = elapsed.as_millis() as u64,
                                produced,
                                "stage completed"
                            );
                            previous = output;
                        }
                        Err(error) => {
                            trace.update_stage(index, |r| {
                                r.status = StageStatus::Failed;
                                r.elapsed = elapsed;
                            });
                            trace.status = RunStatus::Failed;
                            tracing::error!(stage = %name, error = %error, "stage failed, aborting run");
                            return Err(RunFailure {
                                stage: name,
                                error,
                                trace,
                                state,
                            });
                        }
                    }
                }
            }
        }

        trace.status = RunStatus::Completed;
        tracing::info!(stages = trace.stages().count(), "run completed");
        Ok(RunReport { trace, state })
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("steps", &self.outline())
            .finish()
    }
}
