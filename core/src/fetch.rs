use std::collections::VecDeque;
use std::fs;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::debug::DebugLog;
use crate::error::{DownloadError, DownloadResult};
use crate::net::{FetchRequest, NetClient};
use crate::progress::{Phase, ProgressReporter};
use crate::segment::{FetchJob, JobState};

pub const MAX_RETRIES: u32 = 3;
pub const BACKOFF_BASE: Duration = Duration::from_millis(200);

pub(crate) const STOP_NONE: u8 = 0;
pub(crate) const STOP_FAILED: u8 = 1;
pub(crate) const STOP_CANCELLED: u8 = 2;

/// Cooperative cancellation for an in-flight invocation. Cancelling behaves
/// like a fatal job failure: the pool drains, temp files are removed, and
/// the invocation surfaces `Cancelled`.
#[derive(Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicU8>,
}

impl CancelHandle {
    pub(crate) fn new(flag: Arc<AtomicU8>) -> Self {
        Self { flag }
    }

    pub fn cancel(&self) {
        let _ = self.flag.compare_exchange(
            STOP_NONE,
            STOP_CANCELLED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

enum JobEvent {
    Started { index: usize },
    Done { index: usize, bytes: u64 },
    Failed { index: usize, uri: String, cause: String },
}

/// Full-jitter exponential backoff: uniform over (0, base * 2^failures].
fn backoff_delay(failures: u32) -> Duration {
    let cap = BACKOFF_BASE.saturating_mul(1u32.checked_shl(failures).unwrap_or(u32::MAX));
    let cap_ms = cap.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(1..=cap_ms))
}

/// One segment, with retries. `Ok(None)` means the stop flag aborted the
/// job before it finished; no event should be reported for it.
fn fetch_segment(
    net: &dyn NetClient,
    job: &FetchJob,
    stop: &AtomicU8,
    debug: &DebugLog,
) -> Result<Option<u64>, String> {
    let req = FetchRequest::new(job.uri.clone());
    let mut last_cause = String::new();

    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            thread::sleep(backoff_delay(attempt - 1));
        }
        if stop.load(Ordering::SeqCst) != STOP_NONE {
            return Ok(None);
        }

        match net.get(&req) {
            Ok(resp) if resp.is_success() => {
                if stop.load(Ordering::SeqCst) != STOP_NONE {
                    return Ok(None);
                }
                return match fs::write(&job.temp_path, &resp.body) {
                    Ok(()) => {
                        debug.record(
                            "download",
                            "segment-done",
                            &format!("segment {} -> {}", job.index, job.temp_path.display()),
                        );
                        Ok(Some(resp.body.len() as u64))
                    }
                    // Local write failures are not retried.
                    Err(err) => Err(format!("write {}: {err}", job.temp_path.display())),
                };
            }
            Ok(resp) => last_cause = format!("status {}", resp.status_code),
            Err(err) => last_cause = err.to_string(),
        }
        debug.record(
            "download",
            "segment-retry",
            &format!(
                "segment {} attempt {} failed: {last_cause}",
                job.index,
                attempt + 1
            ),
        );
    }

    Err(last_cause)
}

/// Downloads all jobs with a pool of `min(max_threads, jobs.len())` worker
/// threads draining a shared queue. Completion events flow over a channel to
/// this (single) thread, which updates job states and the Download bar. The
/// first fatal failure stops the pool and removes every temp file before the
/// error propagates.
pub fn run_fetch_pool(
    net: Arc<dyn NetClient>,
    jobs: &mut [FetchJob],
    max_threads: usize,
    stop_flag: Arc<AtomicU8>,
    debug: Arc<DebugLog>,
    reporter: &mut ProgressReporter,
) -> DownloadResult<()> {
    let total = jobs.len();
    reporter.start_phase(Phase::Download, total);
    if total == 0 {
        reporter.finish_phase();
        return Ok(());
    }

    let queue: Arc<Mutex<VecDeque<FetchJob>>> =
        Arc::new(Mutex::new(jobs.iter().cloned().collect()));
    let (tx, rx) = mpsc::channel();

    let workers = max_threads.min(total);
    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let net = Arc::clone(&net);
        let queue = Arc::clone(&queue);
        let stop_flag = Arc::clone(&stop_flag);
        let debug = Arc::clone(&debug);
        let tx = tx.clone();
        handles.push(thread::spawn(move || loop {
            if stop_flag.load(Ordering::SeqCst) != STOP_NONE {
                break;
            }
            let job = queue.lock().ok().and_then(|mut queue| queue.pop_front());
            let Some(job) = job else {
                break;
            };
            let _ = tx.send(JobEvent::Started { index: job.index });
            match fetch_segment(net.as_ref(), &job, &stop_flag, &debug) {
                Ok(Some(bytes)) => {
                    let _ = tx.send(JobEvent::Done {
                        index: job.index,
                        bytes,
                    });
                }
                Ok(None) => break,
                Err(cause) => {
                    let _ = tx.send(JobEvent::Failed {
                        index: job.index,
                        uri: job.uri.clone(),
                        cause,
                    });
                    break;
                }
            }
        }));
    }
    drop(tx);

    let mut first_error: Option<DownloadError> = None;
    for event in rx.iter() {
        match event {
            JobEvent::Started { index } => {
                if let Some(job) = jobs.get_mut(index) {
                    job.state = JobState::Running;
                }
            }
            JobEvent::Done { index, bytes } => {
                if let Some(job) = jobs.get_mut(index) {
                    job.state = JobState::Done;
                    job.bytes = bytes;
                }
                reporter.tick();
            }
            JobEvent::Failed { index, uri, cause } => {
                if let Some(job) = jobs.get_mut(index) {
                    job.state = JobState::Failed;
                }
                if first_error.is_none() {
                    let _ = stop_flag.compare_exchange(
                        STOP_NONE,
                        STOP_FAILED,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    );
                    first_error = Some(DownloadError::SegmentFetchFailed { index, uri, cause });
                }
            }
        }
    }
    for handle in handles {
        let _ = handle.join();
    }

    if stop_flag.load(Ordering::SeqCst) == STOP_CANCELLED {
        remove_temp_files(jobs, &debug);
        return Err(DownloadError::Cancelled);
    }
    if let Some(err) = first_error {
        remove_temp_files(jobs, &debug);
        return Err(err);
    }

    reporter.finish_phase();
    Ok(())
}

/// Best-effort sweep of every job's temp file. Removal failures go to the
/// debug sink only; they never mask the error that triggered the sweep.
pub fn remove_temp_files(jobs: &[FetchJob], debug: &DebugLog) {
    for job in jobs {
        match fs::remove_file(&job.temp_path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => debug.record(
                "cleanup",
                "temp-remove-failed",
                &format!("{}: {err}", job.temp_path.display()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_bounded_by_exponential_cap() {
        for _ in 0..32 {
            assert!(backoff_delay(0) <= Duration::from_millis(200));
            assert!(backoff_delay(1) <= Duration::from_millis(400));
            assert!(backoff_delay(2) <= Duration::from_millis(800));
        }
    }

    #[test]
    fn backoff_is_never_zero() {
        for failures in 0..3 {
            assert!(backoff_delay(failures) > Duration::ZERO);
        }
    }

    #[test]
    fn cancel_handle_sets_the_flag_once() {
        let flag = Arc::new(AtomicU8::new(STOP_NONE));
        let handle = CancelHandle::new(Arc::clone(&flag));
        handle.cancel();
        assert_eq!(flag.load(Ordering::SeqCst), STOP_CANCELLED);

        // A failure already in progress is not overwritten.
        let flag = Arc::new(AtomicU8::new(STOP_FAILED));
        CancelHandle::new(Arc::clone(&flag)).cancel();
        assert_eq!(flag.load(Ordering::SeqCst), STOP_FAILED);
    }
}
