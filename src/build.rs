//! The build orchestrator: wires the dependency graph into a task chain,
//! attaches the middleware stack, executes, links, and reports.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::BuildCache;
use crate::chain::{EventContext, FaultTolerance, Task, TaskChain};
use crate::config::{self, BuildConfig};
use crate::error::{BuildError, Result};
use crate::graph::DependencyGraph;
use crate::logging::Logger;
use crate::middleware::{
    BuildStatistics, CacheMiddleware, LoggingMiddleware, StatisticsMiddleware, TimingMiddleware,
    successful_object,
};

/// What a completed build looked like, for callers and tests.
#[derive(Clone, Debug)]
pub struct BuildReport {
    pub stats: BuildStatistics,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub binary_path: PathBuf,
}

/// The project directory is the parent of the (absolute) output directory,
/// or the output directory itself when it has no parent. The cache lives
/// here, outside the build directory, so `--clean` cannot take it along.
fn derive_project_dir(output_dir: &Path) -> PathBuf {
    match output_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => output_dir.to_path_buf(),
    }
}

/// Builds the whole project: compile every translation unit in dependency
/// order through the middleware chain, then link.
///
/// Phases:
/// 0. open the persistent cache in the project directory (failure is a
///    warning, not fatal — the build simply runs uncached);
/// 1. topological sort, one compile task per translation unit in order;
/// 2. attach middlewares (timing, cache, logging, statistics — so the
///    runtime onion is statistics, logging, cache, timing around the task);
/// 3. execute sequentially, stopping at the first failure;
/// 4. link the collected object files through the same chain;
/// 5. save the cache and report statistics.
pub fn build_project(
    graph: DependencyGraph,
    mut config: BuildConfig,
    logger: Logger,
) -> Result<BuildReport> {
    let total_start = Instant::now();

    // Phase 0: persistent cache, outside the build directory.
    let project_dir = derive_project_dir(&config.output_dir);
    let cache = match BuildCache::open(&project_dir, &logger) {
        Ok(cache) => {
            logger.verbose(
                1,
                format!(
                    "Cache directory: {} ({} entries loaded)",
                    cache.cache_dir().display(),
                    cache.len()
                ),
            );
            Some(Rc::new(RefCell::new(cache)))
        }
        Err(err) => {
            logger.warn(format!("failed to open cache, building uncached: {err}"));
            None
        }
    };

    // Phase 1: translate the topological order into compile tasks.
    let order = graph.topological_sort()?;
    let graph = Arc::new(graph);

    let total_files = graph.len();
    let translation_units: Vec<PathBuf> = order
        .iter()
        .map(|&index| graph.node(index))
        .filter(|node| !node.is_header())
        .map(|node| node.path().to_path_buf())
        .collect();
    if translation_units.is_empty() {
        return Err(BuildError::NoSources(project_dir));
    }

    config.ensure_compiler()?;
    logger.verbose(
        1,
        format!("Using compiler: {}", config.compiler_program().display()),
    );

    fs::create_dir_all(&config.output_dir).map_err(|source| BuildError::Io {
        path: config.output_dir.clone(),
        source,
    })?;

    let config = Arc::new(config);
    let mut context = EventContext::new();
    context.set_graph(graph.clone());
    context.set_config(config.clone());

    let mut chain = TaskChain::new(context, FaultTolerance::Strict, logger);
    for source in translation_units {
        chain.add_task(Task::compile(source, false, config.clone()));
    }
    logger.info(format!("Building {} translation unit(s)", chain.task_count()));

    // Phase 2: middleware stack. Attached last runs first, so statistics
    // and logging observe cache short-circuits while timing measures only
    // real compiler work.
    let stats = Rc::new(RefCell::new(BuildStatistics {
        total_files,
        ..BuildStatistics::default()
    }));
    chain.use_middleware(Box::new(TimingMiddleware::new(logger)));
    if let Some(cache) = &cache {
        chain.use_middleware(Box::new(CacheMiddleware::new(cache.clone(), logger)));
    }
    chain.use_middleware(Box::new(LoggingMiddleware::new(logger)));
    chain.use_middleware(Box::new(StatisticsMiddleware::new(stats.clone())));

    // Phase 3: compile.
    let report = chain.execute();
    if !report.success {
        save_cache(cache.as_deref(), logger);
        stats.borrow_mut().total_time = total_start.elapsed();
        return Err(BuildError::CompilationFailed {
            failed: report.failures.len(),
        });
    }

    // Phase 4: link everything that produced an object file.
    let objects: Vec<PathBuf> = chain.tasks().iter().filter_map(successful_object).collect();
    chain.add_task(Task::link(objects, config.clone()));
    let link_report = chain.execute();

    if let Some(link_task) = chain.tasks().last() {
        stats.borrow_mut().link_time = link_task.elapsed;
    }

    if !link_report.success {
        save_cache(cache.as_deref(), logger);
        let message = link_report
            .failures
            .first()
            .map(|f| f.message.clone())
            .unwrap_or_else(|| "unknown link error".to_string());
        return Err(BuildError::LinkFailed { message });
    }

    // Phase 5: persist and report.
    save_cache(cache.as_deref(), logger);
    stats.borrow_mut().total_time = total_start.elapsed();

    let binary_path = config::binary_path(&config);
    let stats = stats.borrow().clone();
    print_build_statistics(&stats, &binary_path, logger);

    let (cache_hits, cache_misses) = cache
        .as_ref()
        .map(|c| {
            let cache = c.borrow();
            cache.log_stats(&logger);
            (cache.hits(), cache.misses())
        })
        .unwrap_or((0, 0));

    Ok(BuildReport {
        stats,
        cache_hits,
        cache_misses,
        binary_path,
    })
}

fn save_cache(cache: Option<&RefCell<BuildCache>>, logger: Logger) {
    if let Some(cache) = cache
        && let Err(err) = cache.borrow().save()
    {
        logger.warn(format!("failed to save cache: {err}"));
    }
}

fn print_build_statistics(stats: &BuildStatistics, binary_path: &Path, logger: Logger) {
    logger.info("Build complete:");
    logger.info(format!("  Total files:  {}", stats.total_files));
    logger.info(format!("  Compiled:     {}", stats.compiled_files));
    logger.info(format!("  Cached:       {}", stats.cached_files));
    if stats.failed_files > 0 {
        logger.info(format!("  Failed:       {}", stats.failed_files));
    }
    logger.info(format!(
        "  Compile time: {:.3}s",
        stats.compilation_time.as_secs_f64()
    ));
    logger.info(format!(
        "  Link time:    {:.3}s",
        stats.link_time.as_secs_f64()
    ));
    logger.info(format!(
        "  Total time:   {:.3}s",
        stats.total_time.as_secs_f64()
    ));
    logger.info(format!("  Output:       {}", binary_path.display()));
}
