use crate::engine::context::TrackingContext;
use crate::engine::error::FredError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::state::TrackingReport;
use crate::engine::tally::Tally;
use crate::engine::tracking::{Primary, run_chunk};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Number of hardware threads the host offers.
pub fn available_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Fixed-size set of tracking workers.
#[derive(Debug)]
pub struct WorkerPool {
    threads: usize,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self, FredError> {
        if threads == 0 {
            return Err(FredError::InvalidArgument(
                "thread count must be at least 1".to_string(),
            ));
        }
        #[cfg(feature = "parallel")]
        let pool = if threads > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("fred-worker-{i}"))
                    .build()
                    .map_err(|e| {
                        FredError::Internal(format!("failed to build worker pool: {e}"))
                    })?,
            )
        } else {
            None
        };
        debug!(threads, "Worker pool ready.");
        Ok(Self {
            threads,
            #[cfg(feature = "parallel")]
            pool,
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    fn run_chunks(
        &self,
        ctx: &TrackingContext<'_>,
        chunks: &[&[Primary]],
        reporter: &ProgressReporter,
    ) -> Vec<(Tally, TrackingReport)> {
        #[cfg(feature = "parallel")]
        if let Some(pool) = &self.pool {
            return pool.install(|| {
                chunks
                    .par_iter()
                    .map(|chunk| run_chunk(ctx, chunk, reporter))
                    .collect()
            });
        }
        chunks
            .iter()
            .map(|chunk| run_chunk(ctx, chunk, reporter))
            .collect()
    }
}

/// Result of one tracking invocation.
#[derive(Debug, Clone)]
pub struct TrackOutcome {
    pub tally: Tally,
    pub report: TrackingReport,
}

/// Splits `primaries` into one contiguous chunk per worker, transports them
/// and merges the partial tallies in chunk order.
#[instrument(skip_all, name = "tracking_workflow")]
pub fn run(
    ctx: &TrackingContext<'_>,
    primaries: &[Primary],
    workers: &WorkerPool,
    reporter: &ProgressReporter,
) -> TrackOutcome {
    let started = Instant::now();
    reporter.report(Progress::PhaseStart { name: "Tracking" });
    info!(
        primaries = primaries.len(),
        threads = workers.threads(),
        "Starting tracking invocation."
    );

    let chunk_len = primaries.len().div_ceil(workers.threads()).max(1);
    let chunks: Vec<&[Primary]> = primaries.chunks(chunk_len).collect();

    reporter.report(Progress::TaskStart {
        total_steps: primaries.len() as u64,
    });
    let partials = workers.run_chunks(ctx, &chunks, reporter);
    reporter.report(Progress::TaskFinish);

    let mut tally = Tally::new(&ctx.slots);
    let mut report = TrackingReport::default();
    for (partial, partial_report) in &partials {
        tally.merge(partial);
        report.merge(partial_report);
    }
    report.elapsed = started.elapsed();

    info!(%report, "Tracking invocation finished.");
    reporter.report(Progress::PhaseFinish);
    TrackOutcome { tally, report }
}
