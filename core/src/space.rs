use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use log::warn;
use sysinfo::Disks;

use crate::debug::DebugLog;
use crate::error::{DownloadError, DownloadResult};
use crate::net::{FetchRequest, NetClient};
use crate::progress::{Phase, ProgressReporter};
use crate::segment::SegmentPlan;

pub const SAFETY_MARGIN_PERCENT: u64 = 5;

/// Free-space oracle for an output location.
pub trait SpaceProbe: Send + Sync {
    /// Free bytes on the filesystem holding `path`, or `None` when the probe
    /// cannot tell.
    fn available_bytes(&self, path: &Path) -> Option<u64>;
}

/// Probes mounted disks and picks the longest mount-point prefix of `path`.
pub struct DiskSpaceProbe;

impl SpaceProbe for DiskSpaceProbe {
    fn available_bytes(&self, path: &Path) -> Option<u64> {
        let target = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let disks = Disks::new_with_refreshed_list();
        disks
            .iter()
            .filter(|disk| target.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

/// Estimates the plan's total byte size by probing every segment for a
/// Content-Length, concurrently up to `max_threads`. The Verify bar tracks
/// probe completions. Segments without a length are extrapolated from the
/// average of the probed ones.
pub fn estimate_plan_size(
    net: Arc<dyn NetClient>,
    plan: &SegmentPlan,
    max_threads: usize,
    reporter: &mut ProgressReporter,
) -> u64 {
    let uris: Vec<String> = plan
        .segments()
        .iter()
        .map(|segment| segment.uri.clone())
        .collect();
    let total = uris.len();
    reporter.start_phase(Phase::Verify, total);
    if total == 0 {
        reporter.finish_phase();
        return 0;
    }

    let uris = Arc::new(uris);
    let cursor = Arc::new(AtomicUsize::new(0));
    let lengths = Arc::new(Mutex::new(vec![None; total]));
    let (tx, rx) = mpsc::channel();

    let workers = max_threads.min(total);
    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let net = Arc::clone(&net);
        let uris = Arc::clone(&uris);
        let cursor = Arc::clone(&cursor);
        let lengths = Arc::clone(&lengths);
        let tx = tx.clone();
        handles.push(thread::spawn(move || loop {
            let i = cursor.fetch_add(1, Ordering::SeqCst);
            if i >= uris.len() {
                break;
            }
            let length = probe_length(net.as_ref(), &uris[i]);
            if let Ok(mut lengths) = lengths.lock() {
                lengths[i] = length;
            }
            let _ = tx.send(());
        }));
    }
    drop(tx);

    for _ in rx.iter() {
        reporter.tick();
    }
    for handle in handles {
        let _ = handle.join();
    }
    reporter.finish_phase();

    let lengths = lengths.lock().map(|l| l.clone()).unwrap_or_default();
    extrapolate_total(&lengths)
}

fn probe_length(net: &dyn NetClient, uri: &str) -> Option<u64> {
    let info = net.head(&FetchRequest::new(uri)).ok()?;
    if !(200..300).contains(&info.status_code) {
        return None;
    }
    info.content_length
}

/// Sum of known lengths plus `avg * unknown_count` for the rest. All-unknown
/// collapses to zero, which the guard treats as "nothing to check".
fn extrapolate_total(lengths: &[Option<u64>]) -> u64 {
    let known: Vec<u64> = lengths.iter().flatten().copied().collect();
    if known.is_empty() {
        return 0;
    }
    let sum: u64 = known.iter().sum();
    let avg = sum / known.len() as u64;
    sum + avg * (lengths.len() - known.len()) as u64
}

pub fn with_safety_margin(required: u64) -> u64 {
    required + required * SAFETY_MARGIN_PERCENT / 100
}

/// Compares the padded estimate against free space at the output directory.
/// An inconclusive probe passes with a warning rather than blocking the
/// download on exotic filesystems.
pub fn ensure_space(
    probe: &dyn SpaceProbe,
    dir: &Path,
    required: u64,
    debug: &DebugLog,
) -> DownloadResult<()> {
    let padded = with_safety_margin(required);
    match probe.available_bytes(dir) {
        Some(available) if padded > available => Err(DownloadError::InsufficientSpace {
            required: padded,
            available,
        }),
        Some(available) => {
            debug.record(
                "verify",
                "space-ok",
                &format!("required {padded} bytes, available {available} bytes"),
            );
            Ok(())
        }
        None => {
            warn!("free-space probe failed for {}; continuing", dir.display());
            debug.record(
                "verify",
                "space-unknown",
                &format!("no probe result for {}", dir.display()),
            );
            Ok(())
        }
    }
}
