//! The task chain: compile/link tasks, the shared context, and the layered
//! middleware engine that wraps task execution.
//!
//! Middlewares compose into an onion. Each layer receives the task, the
//! shared context and a `next` continuation; it may call `next` to proceed
//! inward or short-circuit by returning a result directly. The middleware
//! attached **last** is invoked **first** (outermost). The innermost layer
//! is the task's own execution.
//!
//! Execution is strictly sequential; the context map is the only shared
//! mutable structure and is race-free under that schedule.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::compiler;
use crate::config::BuildConfig;
use crate::graph::DependencyGraph;
use crate::logging::Logger;

/// Context key under which the dependency graph is stored.
pub const KEY_DEPENDENCY_GRAPH: &str = "dependency_graph";
/// Context key under which the build configuration is stored.
pub const KEY_BUILD_CONFIG: &str = "build.config";

/// Outcome of one task execution (or middleware short-circuit).
#[derive(Clone, Debug)]
pub struct TaskResult {
    pub success: bool,
    pub error: Option<String>,
}

impl TaskResult {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

/// Payload of a compile task.
#[derive(Debug)]
pub struct CompileTask {
    pub source_path: PathBuf,
    pub is_header: bool,
    pub config: Arc<BuildConfig>,
}

/// Payload of the link task.
#[derive(Debug)]
pub struct LinkTask {
    pub object_paths: Vec<PathBuf>,
    pub config: Arc<BuildConfig>,
}

#[derive(Debug)]
pub enum TaskPayload {
    Compile(CompileTask),
    Link(LinkTask),
}

/// One unit of work in the chain.
///
/// The post-execution fields (`cache_hit`, `elapsed`, `object_path`,
/// `succeeded`) are written by the task itself, by middlewares, and by the
/// chain executor; the orchestrator reads them afterwards.
#[derive(Debug)]
pub struct Task {
    name: String,
    payload: TaskPayload,
    pub cache_hit: bool,
    pub elapsed: Duration,
    pub object_path: Option<PathBuf>,
    pub succeeded: bool,
}

impl Task {
    /// A compile task named `Compile:<path>`.
    pub fn compile(source_path: PathBuf, is_header: bool, config: Arc<BuildConfig>) -> Self {
        Self {
            name: format!("Compile:{}", source_path.display()),
            payload: TaskPayload::Compile(CompileTask {
                source_path,
                is_header,
                config,
            }),
            cache_hit: false,
            elapsed: Duration::ZERO,
            object_path: None,
            succeeded: false,
        }
    }

    /// The link task, named `Link:FinalBinary`.
    pub fn link(object_paths: Vec<PathBuf>, config: Arc<BuildConfig>) -> Self {
        Self {
            name: "Link:FinalBinary".to_string(),
            payload: TaskPayload::Link(LinkTask {
                object_paths,
                config,
            }),
            cache_hit: false,
            elapsed: Duration::ZERO,
            object_path: None,
            succeeded: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &TaskPayload {
        &self.payload
    }

    /// The compile payload, if this is a compile task. Middlewares use this
    /// to distinguish task kinds.
    pub fn compile_payload(&self) -> Option<&CompileTask> {
        match &self.payload {
            TaskPayload::Compile(task) => Some(task),
            TaskPayload::Link(_) => None,
        }
    }

    /// The task's own execution: the innermost layer of the onion.
    fn run(&mut self, context: &mut EventContext, logger: &Logger) -> TaskResult {
        match &self.payload {
            TaskPayload::Compile(task) => {
                // Headers never compile; they succeed as trivial cache hits
                // even when no cache middleware is attached.
                if task.is_header {
                    self.cache_hit = true;
                    return TaskResult::success();
                }

                match compiler::compile(&task.source_path, &task.config, logger) {
                    Ok(outcome) => {
                        self.elapsed = outcome.elapsed;
                        self.object_path = Some(outcome.artifact.clone());
                        context.set_object(&task.source_path, outcome.artifact);
                        if outcome.success {
                            TaskResult::success()
                        } else {
                            TaskResult::failure(format!(
                                "Compilation failed: {}",
                                summarize(&outcome.output)
                            ))
                        }
                    }
                    Err(err) => TaskResult::failure(format!("Compilation failed: {err}")),
                }
            }
            TaskPayload::Link(task) => {
                if task.object_paths.is_empty() {
                    return TaskResult::failure("No object files to link");
                }
                match compiler::link(&task.object_paths, &task.config, logger) {
                    Ok(outcome) => {
                        self.elapsed = outcome.elapsed;
                        self.object_path = Some(outcome.artifact);
                        if outcome.success {
                            TaskResult::success()
                        } else {
                            TaskResult::failure(format!(
                                "Linking failed: {}",
                                summarize(&outcome.output)
                            ))
                        }
                    }
                    Err(err) => TaskResult::failure(format!("Linking failed: {err}")),
                }
            }
        }
    }
}

fn summarize(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        "no compiler output".to_string()
    } else {
        trimmed.to_string()
    }
}

/// An opaque value stored in the [`EventContext`].
#[derive(Clone, Debug)]
pub enum ContextValue {
    Path(PathBuf),
    Graph(Arc<DependencyGraph>),
    Config(Arc<BuildConfig>),
}

/// String-keyed state shared across all tasks of one execution.
///
/// Recognized keys: `object:<source_path>` mapping to the produced object
/// file, [`KEY_DEPENDENCY_GRAPH`] and [`KEY_BUILD_CONFIG`].
#[derive(Debug, Default)]
pub struct EventContext {
    values: HashMap<String, ContextValue>,
}

impl EventContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: ContextValue) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    pub fn set_graph(&mut self, graph: Arc<DependencyGraph>) {
        self.set(KEY_DEPENDENCY_GRAPH, ContextValue::Graph(graph));
    }

    pub fn graph(&self) -> Option<&Arc<DependencyGraph>> {
        match self.get(KEY_DEPENDENCY_GRAPH)? {
            ContextValue::Graph(graph) => Some(graph),
            _ => None,
        }
    }

    pub fn set_config(&mut self, config: Arc<BuildConfig>) {
        self.set(KEY_BUILD_CONFIG, ContextValue::Config(config));
    }

    pub fn config(&self) -> Option<&Arc<BuildConfig>> {
        match self.get(KEY_BUILD_CONFIG)? {
            ContextValue::Config(config) => Some(config),
            _ => None,
        }
    }

    pub fn set_object(&mut self, source: &Path, object: PathBuf) {
        self.set(
            format!("object:{}", source.display()),
            ContextValue::Path(object),
        );
    }

    pub fn object(&self, source: &Path) -> Option<&Path> {
        match self.get(&format!("object:{}", source.display()))? {
            ContextValue::Path(path) => Some(path),
            _ => None,
        }
    }
}

/// The `next` continuation handed to each middleware layer.
pub type Next<'a> = dyn FnMut(&mut Task, &mut EventContext) -> TaskResult + 'a;

/// An interceptor wrapping task execution.
pub trait Middleware {
    fn name(&self) -> &'static str;

    /// Handles one task. Call `next` to proceed inward, or return a result
    /// directly to short-circuit.
    fn handle(
        &mut self,
        task: &mut Task,
        context: &mut EventContext,
        next: &mut Next<'_>,
    ) -> TaskResult;
}

/// Behavior of the chain when a task fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FaultTolerance {
    /// Stop at the first failure and report it.
    #[default]
    Strict,
    /// Run every task, collecting all failures.
    ContinueOnFailure,
}

/// A failed task, by name, with its error message.
#[derive(Clone, Debug)]
pub struct TaskFailure {
    pub task: String,
    pub message: String,
}

/// Result of one `execute()` run.
#[derive(Clone, Debug, Default)]
pub struct ChainReport {
    pub success: bool,
    pub failures: Vec<TaskFailure>,
}

/// An ordered task list, an ordered middleware stack, and the shared
/// context, executed sequentially.
pub struct TaskChain {
    tasks: Vec<Task>,
    middlewares: Vec<Box<dyn Middleware>>,
    context: EventContext,
    policy: FaultTolerance,
    logger: Logger,
    cursor: usize,
}

impl TaskChain {
    pub fn new(context: EventContext, policy: FaultTolerance, logger: Logger) -> Self {
        Self {
            tasks: Vec::new(),
            middlewares: Vec::new(),
            context,
            policy,
            logger,
            cursor: 0,
        }
    }

    pub fn add_task(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Attaches a middleware. The middleware attached last is invoked first
    /// at runtime (it becomes the outermost layer).
    pub fn use_middleware(&mut self, middleware: Box<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn context(&self) -> &EventContext {
        &self.context
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Runs every not-yet-executed task through the middleware onion.
    ///
    /// Under [`FaultTolerance::Strict`] the run stops at the first failing
    /// task; tasks appended later can be run by calling `execute()` again,
    /// which is how the link task reuses the same middleware stack after the
    /// compile tasks finish.
    pub fn execute(&mut self) -> ChainReport {
        let mut failures = Vec::new();
        let logger = self.logger;

        while self.cursor < self.tasks.len() {
            let task = &mut self.tasks[self.cursor];
            self.cursor += 1;

            let result = dispatch(&mut self.middlewares, task, &mut self.context, logger);
            task.succeeded = result.success;

            if !result.success {
                failures.push(TaskFailure {
                    task: task.name().to_string(),
                    message: result
                        .error
                        .unwrap_or_else(|| "unknown error".to_string()),
                });
                if self.policy == FaultTolerance::Strict {
                    break;
                }
            }
        }

        ChainReport {
            success: failures.is_empty(),
            failures,
        }
    }
}

/// Recursively peels the middleware stack from the outside in; the empty
/// stack bottoms out at the task's own execution.
fn dispatch(
    middlewares: &mut [Box<dyn Middleware>],
    task: &mut Task,
    context: &mut EventContext,
    logger: Logger,
) -> TaskResult {
    match middlewares.split_last_mut() {
        Some((outermost, rest)) => {
            let mut next = |task: &mut Task, context: &mut EventContext| {
                dispatch(&mut *rest, task, context, logger)
            };
            outermost.handle(task, context, &mut next)
        }
        None => task.run(context, &logger),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    /// A middleware that records when it runs, relative to its peers.
    struct Recorder {
        label: &'static str,
        log: Rc<RefCell<Vec<String>>>,
        short_circuit: bool,
    }

    impl Middleware for Recorder {
        fn name(&self) -> &'static str {
            self.label
        }

        fn handle(
            &mut self,
            task: &mut Task,
            context: &mut EventContext,
            next: &mut Next<'_>,
        ) -> TaskResult {
            self.log.borrow_mut().push(format!("{}:enter", self.label));
            let result = if self.short_circuit {
                TaskResult::success()
            } else {
                next(task, context)
            };
            self.log.borrow_mut().push(format!("{}:exit", self.label));
            result
        }
    }

    fn quiet_logger() -> Logger {
        Logger::new(0, true)
    }

    /// A header compile task: executes without touching the compiler.
    fn header_task() -> Task {
        let config = Arc::new(BuildConfig::builder().build());
        Task::compile(PathBuf::from("/proj/defs.h"), true, config)
    }

    #[test]
    fn test_middlewares_attached_last_run_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut chain = TaskChain::new(EventContext::new(), FaultTolerance::Strict, quiet_logger());
        for label in ["M1", "M2", "M3"] {
            chain.use_middleware(Box::new(Recorder {
                label,
                log: log.clone(),
                short_circuit: false,
            }));
        }
        chain.add_task(header_task());

        let report = chain.execute();
        assert!(report.success);
        assert_eq!(
            *log.borrow(),
            vec![
                "M3:enter", "M2:enter", "M1:enter", "M1:exit", "M2:exit", "M3:exit",
            ]
        );
    }

    #[test]
    fn test_short_circuit_skips_inner_layers() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut chain = TaskChain::new(EventContext::new(), FaultTolerance::Strict, quiet_logger());
        chain.use_middleware(Box::new(Recorder {
            label: "inner",
            log: log.clone(),
            short_circuit: false,
        }));
        chain.use_middleware(Box::new(Recorder {
            label: "outer",
            log: log.clone(),
            short_circuit: true,
        }));
        chain.add_task(header_task());

        let report = chain.execute();
        assert!(report.success);
        assert_eq!(*log.borrow(), vec!["outer:enter", "outer:exit"]);
    }

    /// A middleware that fails every task without calling next.
    struct AlwaysFail;

    impl Middleware for AlwaysFail {
        fn name(&self) -> &'static str {
            "AlwaysFail"
        }

        fn handle(
            &mut self,
            _task: &mut Task,
            _context: &mut EventContext,
            _next: &mut Next<'_>,
        ) -> TaskResult {
            TaskResult::failure("induced failure")
        }
    }

    #[test]
    fn test_strict_policy_stops_at_first_failure() {
        let mut chain = TaskChain::new(EventContext::new(), FaultTolerance::Strict, quiet_logger());
        chain.use_middleware(Box::new(AlwaysFail));
        chain.add_task(header_task());
        chain.add_task(header_task());
        chain.add_task(header_task());

        let report = chain.execute();
        assert!(!report.success);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].message, "induced failure");
        // Only the first task ran.
        assert!(!chain.tasks()[0].succeeded);
        assert!(!chain.tasks()[1].succeeded);
    }

    #[test]
    fn test_continue_on_failure_collects_everything() {
        let mut chain = TaskChain::new(
            EventContext::new(),
            FaultTolerance::ContinueOnFailure,
            quiet_logger(),
        );
        chain.use_middleware(Box::new(AlwaysFail));
        chain.add_task(header_task());
        chain.add_task(header_task());

        let report = chain.execute();
        assert!(!report.success);
        assert_eq!(report.failures.len(), 2);
    }

    #[test]
    fn test_execute_resumes_after_appending_tasks() {
        let mut chain = TaskChain::new(EventContext::new(), FaultTolerance::Strict, quiet_logger());
        chain.add_task(header_task());
        assert!(chain.execute().success);

        chain.add_task(header_task());
        let report = chain.execute();
        assert!(report.success);
        assert!(chain.tasks().iter().all(|t| t.succeeded));
    }

    #[test]
    fn test_header_tasks_succeed_as_cache_hits() {
        let mut chain = TaskChain::new(EventContext::new(), FaultTolerance::Strict, quiet_logger());
        chain.add_task(header_task());
        let report = chain.execute();

        assert!(report.success);
        assert!(chain.tasks()[0].cache_hit);
        assert_eq!(chain.tasks()[0].elapsed, Duration::ZERO);
    }

    #[test]
    fn test_context_object_keys() {
        let mut context = EventContext::new();
        let source = Path::new("/proj/src/main.c");
        context.set_object(source, PathBuf::from("/proj/build/main.o"));

        assert_eq!(
            context.object(source),
            Some(Path::new("/proj/build/main.o"))
        );
        assert!(context.object(Path::new("/proj/src/other.c")).is_none());
        assert!(context.get("object:/proj/src/main.c").is_some());
    }

    #[test]
    fn test_link_task_with_no_objects_fails() {
        let config = Arc::new(BuildConfig::builder().build());
        let mut chain = TaskChain::new(EventContext::new(), FaultTolerance::Strict, quiet_logger());
        chain.add_task(Task::link(Vec::new(), config));

        let report = chain.execute();
        assert!(!report.success);
        assert_eq!(report.failures[0].task, "Link:FinalBinary");
    }
}
