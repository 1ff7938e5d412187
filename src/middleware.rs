//! The middleware stack: timing, persistent cache, logging, statistics.
//!
//! Attachment order in the orchestrator is timing, cache, logging,
//! statistics, which makes the runtime onion (outermost first):
//! statistics -> logging -> cache -> timing -> task. Statistics and logging
//! sit outside the cache layer so that a cache short-circuit is still
//! observed, logged as `[CACHED]`, and counted; timing sits inside it so
//! that measured time is actual compiler time.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::cache::BuildCache;
use crate::chain::{EventContext, Middleware, Next, Task, TaskResult};
use crate::config;
use crate::fsutil::is_regular_file;
use crate::logging::Logger;

/// Shared build counters, filled in by [`StatisticsMiddleware`] and read by
/// the orchestrator's final report.
#[derive(Clone, Debug, Default)]
pub struct BuildStatistics {
    pub total_files: usize,
    pub compiled_files: usize,
    pub cached_files: usize,
    pub failed_files: usize,
    pub total_time: Duration,
    pub compilation_time: Duration,
    pub link_time: Duration,
}

/// Measures wall time around the inner layers and records it on compile
/// tasks. Verbose mode prints start/finish lines.
pub struct TimingMiddleware {
    logger: Logger,
}

impl TimingMiddleware {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl Middleware for TimingMiddleware {
    fn name(&self) -> &'static str {
        "TimingMiddleware"
    }

    fn handle(
        &mut self,
        task: &mut Task,
        context: &mut EventContext,
        next: &mut Next<'_>,
    ) -> TaskResult {
        self.logger
            .verbose(1, format!("  [TIMING]  starting {}", task.name()));

        let start = Instant::now();
        let result = next(task, context);
        let elapsed = start.elapsed();

        self.logger.verbose(
            1,
            format!(
                "  [TIMING]  completed {} ({:.3}s)",
                task.name(),
                elapsed.as_secs_f64()
            ),
        );

        if task.compile_payload().is_some() {
            task.elapsed = elapsed;
        }
        result
    }
}

/// Prints one line per task: a start line for compile tasks, then cached /
/// success / failure. Failures are printed even in quiet mode, together
/// with the captured compiler output.
pub struct LoggingMiddleware {
    logger: Logger,
}

impl LoggingMiddleware {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "LoggingMiddleware"
    }

    fn handle(
        &mut self,
        task: &mut Task,
        context: &mut EventContext,
        next: &mut Next<'_>,
    ) -> TaskResult {
        let compile_source = task
            .compile_payload()
            .map(|c| c.source_path.display().to_string());

        if let Some(source) = &compile_source {
            self.logger.info(format!("  [COMPILE] {source}"));
        }

        let result = next(task, context);

        if result.success {
            if task.cache_hit
                && let Some(source) = &compile_source
            {
                self.logger.info(format!("  [CACHED]  {source}"));
            } else {
                self.logger.info(format!("  [SUCCESS] {}", task.name()));
            }
        } else {
            self.logger.error(format!("  [FAILED]  {}", task.name()));
            if let Some(message) = &result.error {
                self.logger.error(format!("            {message}"));
            }
        }

        result
    }
}

/// Accumulates per-task counters into the shared [`BuildStatistics`].
pub struct StatisticsMiddleware {
    stats: Rc<RefCell<BuildStatistics>>,
}

impl StatisticsMiddleware {
    pub fn new(stats: Rc<RefCell<BuildStatistics>>) -> Self {
        Self { stats }
    }
}

impl Middleware for StatisticsMiddleware {
    fn name(&self) -> &'static str {
        "StatisticsMiddleware"
    }

    fn handle(
        &mut self,
        task: &mut Task,
        context: &mut EventContext,
        next: &mut Next<'_>,
    ) -> TaskResult {
        let is_compile = task.compile_payload().is_some();

        let start = Instant::now();
        let result = next(task, context);
        let elapsed = start.elapsed();

        if is_compile {
            let mut stats = self.stats.borrow_mut();
            if result.success {
                if task.cache_hit {
                    stats.cached_files += 1;
                } else {
                    stats.compiled_files += 1;
                    stats.compilation_time += elapsed;
                }
            } else {
                stats.failed_files += 1;
            }
        }

        result
    }
}

/// The central caching decision.
///
/// For compile tasks it consults the persistent cache and, when both the
/// content decision and the on-disk object file agree, skips the compiler
/// entirely. Non-compile tasks pass straight through. After a successful
/// compile the cache entry is refreshed from the context's dependency
/// graph.
pub struct CacheMiddleware {
    cache: Rc<RefCell<BuildCache>>,
    logger: Logger,
}

impl CacheMiddleware {
    pub fn new(cache: Rc<RefCell<BuildCache>>, logger: Logger) -> Self {
        Self { cache, logger }
    }
}

impl Middleware for CacheMiddleware {
    fn name(&self) -> &'static str {
        "CacheMiddleware"
    }

    fn handle(
        &mut self,
        task: &mut Task,
        context: &mut EventContext,
        next: &mut Next<'_>,
    ) -> TaskResult {
        let Some(compile) = task.compile_payload() else {
            return next(task, context);
        };

        // Headers never reach the compiler.
        if compile.is_header {
            task.cache_hit = true;
            task.elapsed = Duration::ZERO;
            return TaskResult::success();
        }

        let source_path = compile.source_path.clone();
        let object_path = config::object_path_for(&source_path, &compile.config.output_dir);

        if !self.cache.borrow_mut().needs_recompilation(&source_path) {
            if is_regular_file(&object_path) {
                // Content unchanged and the artifact survived: skip.
                task.cache_hit = true;
                task.elapsed = Duration::ZERO;
                task.object_path = Some(object_path.clone());
                context.set_object(&source_path, object_path);
                return TaskResult::success();
            }
            // Metadata survived but the object file did not (deleted build
            // directory). Recompile; not a cache hit.
            task.cache_hit = false;
        }

        let result = next(task, context);

        if result.success {
            let object = task.object_path.clone().unwrap_or(object_path);
            if let Some(graph) = context.graph() {
                self.cache
                    .borrow_mut()
                    .update(&source_path, &object, graph, &self.logger);
            }
        }

        result
    }
}

/// The produced object path of a successfully compiled, non-header task.
pub fn successful_object(task: &Task) -> Option<PathBuf> {
    let compile = task.compile_payload()?;
    if compile.is_header || !task.succeeded {
        return None;
    }
    task.object_path.clone()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::chain::{FaultTolerance, TaskChain};
    use crate::config::BuildConfig;
    use crate::graph::DependencyGraph;

    fn quiet_logger() -> Logger {
        Logger::new(0, true)
    }

    /// Builds a chain with the full production middleware stack and one
    /// compile task for `source`, with the cache and stats handles shared.
    fn chain_for(
        source: PathBuf,
        config: Arc<BuildConfig>,
        graph: Arc<DependencyGraph>,
        cache: Rc<RefCell<BuildCache>>,
        stats: Rc<RefCell<BuildStatistics>>,
    ) -> TaskChain {
        let logger = quiet_logger();
        let mut context = EventContext::new();
        context.set_graph(graph);
        context.set_config(config.clone());

        let mut chain = TaskChain::new(context, FaultTolerance::Strict, logger);
        chain.use_middleware(Box::new(TimingMiddleware::new(logger)));
        chain.use_middleware(Box::new(CacheMiddleware::new(cache, logger)));
        chain.use_middleware(Box::new(LoggingMiddleware::new(logger)));
        chain.use_middleware(Box::new(StatisticsMiddleware::new(stats)));
        chain.add_task(Task::compile(source, false, config));
        chain
    }

    #[test]
    fn test_cache_hit_short_circuits_but_is_still_counted() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let source = crate::fsutil::normalize_path(root.join("main.c"));
        fs::write(&source, "int main(void) { return 0; }\n").unwrap();

        let build_dir = root.join("build");
        fs::create_dir(&build_dir).unwrap();
        let object = config::object_path_for(&source, &build_dir);
        fs::write(&object, b"fake object").unwrap();

        let mut graph = DependencyGraph::new();
        graph.add_file(&source).unwrap();
        let graph = Arc::new(graph);

        let logger = quiet_logger();
        let cache = Rc::new(RefCell::new(BuildCache::open(root, &logger).unwrap()));
        cache
            .borrow_mut()
            .update(&source, &object, &graph, &logger);

        let config = Arc::new(
            BuildConfig::builder()
                .compiler_path("/nonexistent/never-invoked")
                .output_dir(&build_dir)
                .build(),
        );
        let stats = Rc::new(RefCell::new(BuildStatistics::default()));
        let mut chain = chain_for(
            source.clone(),
            config,
            graph,
            cache.clone(),
            stats.clone(),
        );

        // The compiler path is bogus: success proves the short-circuit.
        let report = chain.execute();
        assert!(report.success);
        assert!(chain.tasks()[0].cache_hit);
        assert_eq!(chain.tasks()[0].elapsed, Duration::ZERO);
        assert_eq!(stats.borrow().cached_files, 1);
        assert_eq!(stats.borrow().compiled_files, 0);
        assert_eq!(cache.borrow().hits(), 1);
        assert_eq!(
            chain.context().object(&source),
            Some(object.as_path()),
            "hit still registers the object in the context"
        );
    }

    #[test]
    fn test_missing_object_forces_recompilation_attempt() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let source = crate::fsutil::normalize_path(root.join("main.c"));
        fs::write(&source, "int main(void) { return 0; }\n").unwrap();

        let build_dir = root.join("build");
        fs::create_dir(&build_dir).unwrap();

        let mut graph = DependencyGraph::new();
        graph.add_file(&source).unwrap();
        let graph = Arc::new(graph);

        let logger = quiet_logger();
        let cache = Rc::new(RefCell::new(BuildCache::open(root, &logger).unwrap()));
        // Entry exists and content matches, but no object file on disk.
        cache.borrow_mut().update(
            &source,
            &config::object_path_for(&source, &build_dir),
            &graph,
            &logger,
        );

        let config = Arc::new(
            BuildConfig::builder()
                .compiler_path("/nonexistent/never-works")
                .output_dir(&build_dir)
                .build(),
        );
        let stats = Rc::new(RefCell::new(BuildStatistics::default()));
        let mut chain = chain_for(
            source.clone(),
            config,
            graph,
            cache.clone(),
            stats.clone(),
        );

        // The middleware must call through to the (failing) compiler.
        let report = chain.execute();
        assert!(!report.success);
        assert!(!chain.tasks()[0].cache_hit);
        assert_eq!(stats.borrow().failed_files, 1);
        assert_eq!(stats.borrow().cached_files, 0);
        // The content check itself was a hit; only the artifact was gone.
        assert_eq!(cache.borrow().hits(), 1);
    }

    #[test]
    fn test_header_task_short_circuits_before_the_cache_decision() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let header = crate::fsutil::normalize_path(root.join("defs.h"));
        fs::write(&header, "int defs(void);\n").unwrap();

        let graph = Arc::new(DependencyGraph::new());
        let logger = quiet_logger();
        let cache = Rc::new(RefCell::new(BuildCache::open(root, &logger).unwrap()));
        let config = Arc::new(BuildConfig::builder().build());
        let stats = Rc::new(RefCell::new(BuildStatistics::default()));

        let mut context = EventContext::new();
        context.set_graph(graph);
        let mut chain = TaskChain::new(context, FaultTolerance::Strict, logger);
        chain.use_middleware(Box::new(CacheMiddleware::new(cache.clone(), logger)));
        chain.use_middleware(Box::new(StatisticsMiddleware::new(stats.clone())));
        chain.add_task(Task::compile(header, true, config));

        let report = chain.execute();
        assert!(report.success);
        assert!(chain.tasks()[0].cache_hit);
        assert_eq!(stats.borrow().cached_files, 1);
        // No decision was made against the persistent cache.
        assert_eq!(cache.borrow().hits() + cache.borrow().misses(), 0);
    }

    #[test]
    fn test_statistics_counts_failures() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let source = crate::fsutil::normalize_path(root.join("broken.c"));
        fs::write(&source, "int main(void) { return 0; }\n").unwrap();

        let config = Arc::new(
            BuildConfig::builder()
                .compiler_path("/nonexistent/never-works")
                .output_dir(root.join("build"))
                .build(),
        );
        let stats = Rc::new(RefCell::new(BuildStatistics::default()));

        let logger = quiet_logger();
        let mut chain = TaskChain::new(EventContext::new(), FaultTolerance::Strict, logger);
        chain.use_middleware(Box::new(StatisticsMiddleware::new(stats.clone())));
        chain.add_task(Task::compile(source, false, config));

        let report = chain.execute();
        assert!(!report.success);
        assert_eq!(stats.borrow().failed_files, 1);
        assert_eq!(stats.borrow().compiled_files, 0);
    }

    #[test]
    fn test_successful_object_filters_headers_and_failures() {
        let config = Arc::new(BuildConfig::builder().build());

        let mut header = Task::compile(PathBuf::from("/p/a.h"), true, config.clone());
        header.succeeded = true;
        header.object_path = Some(PathBuf::from("/p/build/a.o"));
        assert!(successful_object(&header).is_none());

        let mut failed = Task::compile(PathBuf::from("/p/m.c"), false, config.clone());
        failed.succeeded = false;
        failed.object_path = Some(PathBuf::from("/p/build/m.o"));
        assert!(successful_object(&failed).is_none());

        let mut good = Task::compile(PathBuf::from("/p/m.c"), false, config);
        good.succeeded = true;
        good.object_path = Some(PathBuf::from("/p/build/m.o"));
        assert_eq!(
            successful_object(&good),
            Some(PathBuf::from("/p/build/m.o"))
        );
    }
}
