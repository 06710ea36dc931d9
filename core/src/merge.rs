use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

use crate::debug::DebugLog;
use crate::error::{DownloadError, DownloadResult};
use crate::progress::{Phase, ProgressReporter};
use crate::segment::{retained_path, FetchJob};

/// Build phase for merge=true: opens the final output once
/// (truncating any previous file), streams each temp into it in strict
/// index order, and deletes the temp after its bytes are appended. Any
/// failure removes the partial output before surfacing `BuildFailed`.
pub fn concatenate(
    jobs: &[FetchJob],
    final_path: &Path,
    reporter: &mut ProgressReporter,
    debug: &DebugLog,
) -> DownloadResult<()> {
    reporter.start_phase(Phase::Build, jobs.len());

    if let Err(err) = append_all(jobs, final_path, reporter, debug) {
        match fs::remove_file(final_path) {
            Ok(()) => {}
            Err(remove_err) if remove_err.kind() == io::ErrorKind::NotFound => {}
            Err(remove_err) => debug.record(
                "cleanup",
                "output-remove-failed",
                &format!("{}: {remove_err}", final_path.display()),
            ),
        }
        return Err(err);
    }

    reporter.finish_phase();
    Ok(())
}

fn append_all(
    jobs: &[FetchJob],
    final_path: &Path,
    reporter: &mut ProgressReporter,
    debug: &DebugLog,
) -> DownloadResult<()> {
    let mut output = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(final_path)
        .map_err(|err| {
            DownloadError::BuildFailed(format!("open {}: {err}", final_path.display()))
        })?;

    for job in jobs {
        let mut input = File::open(&job.temp_path).map_err(|err| {
            DownloadError::BuildFailed(format!("open {}: {err}", job.temp_path.display()))
        })?;
        io::copy(&mut input, &mut output).map_err(|err| {
            DownloadError::BuildFailed(format!("append segment {}: {err}", job.index))
        })?;
        fs::remove_file(&job.temp_path).map_err(|err| {
            DownloadError::BuildFailed(format!("remove {}: {err}", job.temp_path.display()))
        })?;
        debug.record(
            "build",
            "segment-merged",
            &format!("segment {} -> {}", job.index, final_path.display()),
        );
        reporter.tick();
    }

    Ok(())
}

/// Build phase for merge=false: renames each temp to its stable
/// `<base>.<index>.ts` name and keeps it.
pub fn retain_segments(
    jobs: &[FetchJob],
    dir: &Path,
    base: &str,
    reporter: &mut ProgressReporter,
    debug: &DebugLog,
) -> DownloadResult<()> {
    reporter.start_phase(Phase::Build, jobs.len());

    for job in jobs {
        let target = retained_path(dir, base, job.index);
        fs::rename(&job.temp_path, &target).map_err(|err| {
            DownloadError::BuildFailed(format!(
                "rename {} -> {}: {err}",
                job.temp_path.display(),
                target.display()
            ))
        })?;
        debug.record(
            "build",
            "segment-retained",
            &format!("segment {} -> {}", job.index, target.display()),
        );
        reporter.tick();
    }

    reporter.finish_phase();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressReporter;
    use crate::segment::{part_path, JobState};
    use std::io::sink;

    fn quiet_reporter() -> ProgressReporter {
        ProgressReporter::with_sink(Box::new(sink()), false)
    }

    fn job_with_body(dir: &Path, base: &str, index: usize, body: &[u8]) -> FetchJob {
        let temp_path = part_path(dir, base, index);
        fs::write(&temp_path, body).unwrap();
        FetchJob {
            index,
            uri: String::new(),
            temp_path,
            state: JobState::Done,
            bytes: body.len() as u64,
        }
    }

    #[test]
    fn concatenates_in_index_order_and_removes_temps() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = vec![
            job_with_body(dir.path(), "out", 0, b"AAA"),
            job_with_body(dir.path(), "out", 1, b"BBB"),
            job_with_body(dir.path(), "out", 2, b"CC"),
        ];
        let final_path = dir.path().join("out.ts");

        concatenate(&jobs, &final_path, &mut quiet_reporter(), &DebugLog::disabled()).unwrap();

        assert_eq!(fs::read(&final_path).unwrap(), b"AAABBBCC");
        assert_eq!(fs::metadata(&final_path).unwrap().len(), 8);
        for job in &jobs {
            assert!(!job.temp_path.exists());
        }
    }

    #[test]
    fn build_overwrites_a_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("out.ts");
        fs::write(&final_path, b"stale content from an earlier run").unwrap();
        let jobs = vec![job_with_body(dir.path(), "out", 0, b"AAA")];

        concatenate(&jobs, &final_path, &mut quiet_reporter(), &DebugLog::disabled()).unwrap();

        assert_eq!(fs::read(&final_path).unwrap(), b"AAA");
    }

    #[test]
    fn missing_temp_fails_the_build_and_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = vec![
            job_with_body(dir.path(), "out", 0, b"AAA"),
            job_with_body(dir.path(), "out", 1, b"BBB"),
        ];
        fs::remove_file(&jobs[1].temp_path).unwrap();
        let final_path = dir.path().join("out.ts");

        let err = concatenate(&jobs, &final_path, &mut quiet_reporter(), &DebugLog::disabled())
            .unwrap_err();

        assert!(matches!(err, DownloadError::BuildFailed(_)));
        assert!(!final_path.exists());
    }

    #[test]
    fn retain_renames_temps_to_stable_names() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = vec![
            job_with_body(dir.path(), "out", 0, b"AAA"),
            job_with_body(dir.path(), "out", 1, b"BBB"),
        ];

        retain_segments(
            &jobs,
            dir.path(),
            "out",
            &mut quiet_reporter(),
            &DebugLog::disabled(),
        )
        .unwrap();

        assert_eq!(fs::read(dir.path().join("out.0.ts")).unwrap(), b"AAA");
        assert_eq!(fs::read(dir.path().join("out.1.ts")).unwrap(), b"BBB");
        for job in &jobs {
            assert!(!job.temp_path.exists());
        }
    }
}
