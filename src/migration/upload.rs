//! Script upload worker pool
//!
//! Script uploads are the only work done off the scan thread. Each job
//! carries the step count of its script so the workers can credit uploaded
//! or failed steps directly to the run's counters.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

use crate::remote::Workspace;

use super::context::MigrationCounters;

/// One script upload
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub test_id: String,
    pub body: String,
    pub steps: usize,
}

/// Fixed set of upload threads fed through a channel
pub struct UploadPool {
    sender: Option<Sender<UploadJob>>,
    workers: Vec<JoinHandle<()>>,
    ws: Arc<dyn Workspace>,
    counters: Arc<MigrationCounters>,
}

impl UploadPool {
    /// Spawn `workers` upload threads (at least one)
    ///
    /// Threads that fail to spawn are logged and skipped; with none at all,
    /// scripts are uploaded on the submitting thread.
    pub fn start(ws: Arc<dyn Workspace>, counters: Arc<MigrationCounters>, workers: usize) -> Self {
        let (sender, receiver) = unbounded::<UploadJob>();

        let mut handles = Vec::with_capacity(workers.max(1));
        for n in 0..workers.max(1) {
            let receiver = receiver.clone();
            let thread_ws = Arc::clone(&ws);
            let thread_counters = Arc::clone(&counters);
            let spawned = thread::Builder::new()
                .name(format!("stm-upload-{}", n))
                .spawn(move || {
                    upload_thread_main(&receiver, thread_ws.as_ref(), &thread_counters)
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!(error = %e, "failed to spawn upload thread"),
            }
        }
        debug!(workers = handles.len(), "upload pool started");

        Self {
            sender: (!handles.is_empty()).then_some(sender),
            workers: handles,
            ws,
            counters,
        }
    }

    /// Queue a script; never blocks on the upload itself
    pub fn submit(&self, job: UploadJob) {
        match &self.sender {
            Some(sender) => {
                if let Err(e) = sender.send(job) {
                    let job = e.into_inner();
                    error!(test_id = %job.test_id, "upload queue closed, uploading inline");
                    upload_one(self.ws.as_ref(), &self.counters, &job);
                }
            }
            None => upload_one(self.ws.as_ref(), &self.counters, &job),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Close the queue and wait for every queued upload to finish
    pub fn drain(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender lets the workers' recv loop end
        drop(self.sender.take());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("upload worker panicked");
            }
        }
    }
}

impl Drop for UploadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn upload_thread_main(
    receiver: &Receiver<UploadJob>,
    ws: &dyn Workspace,
    counters: &MigrationCounters,
) {
    while let Ok(job) = receiver.recv() {
        upload_one(ws, counters, &job);
    }
}

fn upload_one(ws: &dyn Workspace, counters: &MigrationCounters, job: &UploadJob) {
    match ws.put_script(&job.test_id, &job.body) {
        Ok(()) => {
            debug!(test_id = %job.test_id, steps = job.steps, "uploaded script");
            counters.add_uploaded_steps(job.steps);
        }
        Err(e) => {
            error!(
                test_id = %job.test_id,
                steps = job.steps,
                error = %e,
                "failed to upload script"
            );
            counters.add_failed_steps(job.steps);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryWorkspace;

    fn job(test_id: &str, steps: usize) -> UploadJob {
        UploadJob {
            test_id: test_id.to_string(),
            body: format!("{{\"script\":\"{}\"}}", test_id),
            steps,
        }
    }

    #[test]
    fn test_drain_accounts_every_job() {
        let ws = Arc::new(MemoryWorkspace::new());
        ws.fail_script_for("t3");
        let counters = Arc::new(MigrationCounters::new());

        let pool = UploadPool::start(ws.clone(), Arc::clone(&counters), 3);
        assert_eq!(pool.worker_count(), 3);
        for (i, steps) in [2usize, 4, 1, 3].iter().enumerate() {
            pool.submit(job(&format!("t{}", i + 1), *steps));
        }
        pool.drain();

        assert_eq!(counters.uploaded_steps(), 2 + 4 + 3);
        assert_eq!(counters.failed_steps(), 1);
        assert_eq!(ws.scripted_tests().len(), 3);
    }

    #[test]
    fn test_zero_workers_still_uploads() {
        let ws = Arc::new(MemoryWorkspace::new());
        let counters = Arc::new(MigrationCounters::new());

        let pool = UploadPool::start(ws.clone(), Arc::clone(&counters), 0);
        pool.submit(job("t1", 5));
        drop(pool);

        assert_eq!(counters.uploaded_steps(), 5);
    }
}
