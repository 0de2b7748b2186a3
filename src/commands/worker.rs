//! Implementation of the `patchstorm worker` command.
//!
//! The loop claims one job at a time and runs it through the execution
//! workflow. A failed job is moved to the dead-letter state and the loop
//! continues; only queue errors stop the worker.

use crate::cli::WorkerArgs;
use crate::error::{PatchstormError, Result};
use crate::process::SystemRunner;
use crate::queue::{FsQueue, JobQueue};
use crate::settings::Settings;
use crate::workflow::{RunReport, Workflow};
use std::time::Duration;
use tracing::{debug, error, info};

/// Outcome of one processed job.
#[derive(Debug)]
pub enum JobResult {
    Completed(Box<RunReport>),
    Failed(PatchstormError),
}

/// Execute the `patchstorm worker` command.
pub fn cmd_worker(settings: &Settings, args: WorkerArgs) -> Result<()> {
    settings.require_for_worker()?;
    let queue = FsQueue::open(settings.queue_path())?;
    let runner = SystemRunner;
    let workflow = Workflow::new(settings, &runner);
    let poll = Duration::from_secs(args.poll_interval_secs.max(1));

    info!(queue = %queue.root().display(), "worker started");

    loop {
        match process_next(&queue, &workflow)? {
            Some(JobResult::Completed(report)) => {
                if args.once {
                    println!("{}: {}", report.repo, report.outcome);
                    return Ok(());
                }
            }
            Some(JobResult::Failed(err)) => {
                if args.once {
                    return Err(err);
                }
            }
            None => {
                if args.once {
                    info!("queue is empty");
                    return Ok(());
                }
                debug!(secs = poll.as_secs(), "queue is empty, waiting");
                std::thread::sleep(poll);
            }
        }
    }
}

/// Claim and run the next job. `Ok(None)` means the queue was empty.
///
/// Job failures are recorded on the queue and returned as
/// [`JobResult::Failed`]; only queue errors are `Err`.
pub fn process_next(queue: &dyn JobQueue, workflow: &Workflow<'_>) -> Result<Option<JobResult>> {
    let Some(job) = queue.claim_next()? else {
        return Ok(None);
    };

    info!(
        job = %job.id(),
        delivery = job.envelope.delivery_count,
        "claimed job"
    );

    let result = job.envelope.config().and_then(|config| workflow.execute(&config));

    match result {
        Ok(report) => {
            queue.complete(&job)?;
            Ok(Some(JobResult::Completed(Box::new(report))))
        }
        Err(err) => {
            error!(job = %job.id(), error = %err, "job failed");
            queue.fail(&job, &err.to_string())?;
            Ok(Some(JobResult::Failed(err)))
        }
    }
}
