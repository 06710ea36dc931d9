use std::fmt;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use log::warn;

use crate::config::DownloaderConfig;
use crate::debug::DebugLog;
use crate::error::{DownloadError, DownloadResult};
use crate::fetch::{remove_temp_files, run_fetch_pool, CancelHandle, STOP_NONE};
use crate::merge::{concatenate, retain_segments};
use crate::net::{NetClient, ReqwestNetClient, DEFAULT_USER_AGENT};
use crate::playlist::{load_playlist, PlaylistDocument, PlaylistKind};
use crate::progress::ProgressReporter;
use crate::segment::{FetchJob, SegmentPlan};
use crate::space::{ensure_space, estimate_plan_size, DiskSpaceProbe, SpaceProbe};
use crate::variant::{extract_variants, select_variant, VariantQuery};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Idle,
    Verifying,
    Planning,
    Guarding,
    Downloading,
    Building,
    Done,
    Failed,
}

impl DownloadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadState::Idle => "idle",
            DownloadState::Verifying => "verifying",
            DownloadState::Planning => "planning",
            DownloadState::Guarding => "guarding",
            DownloadState::Downloading => "downloading",
            DownloadState::Building => "building",
            DownloadState::Done => "done",
            DownloadState::Failed => "failed",
        }
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the Build phase writes. `final_path` gets a `.ts` extension when
/// the configured output has none; `<base>.<index>` names derive from it.
struct OutputLayout {
    dir: PathBuf,
    base: String,
    final_path: PathBuf,
}

impl OutputLayout {
    fn resolve(output: &str) -> DownloadResult<Self> {
        let mut final_path = PathBuf::from(output);
        if final_path.extension().is_none() {
            final_path.set_extension("ts");
        }
        let dir = match final_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let base = final_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                DownloadError::InvalidConfig(format!("output path \"{output}\" has no file name"))
            })?;
        Ok(Self {
            dir,
            base,
            final_path,
        })
    }
}

/// Downloader facade. One instance per request; both download operations
/// take `&mut self`, so two invocations can never run concurrently against
/// the same context.
pub struct M3u8Downloader {
    config: DownloaderConfig,
    net: Arc<dyn NetClient>,
    probe: Arc<dyn SpaceProbe>,
    reporter: ProgressReporter,
    debug: DebugLog,
    stop_flag: Arc<AtomicU8>,
    state: DownloadState,
    download_complete: bool,
}

impl M3u8Downloader {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> DownloadResult<Self> {
        Self::with_config(DownloaderConfig::new(input, output))
    }

    pub fn with_config(config: DownloaderConfig) -> DownloadResult<Self> {
        config.validate()?;
        let net = ReqwestNetClient::new(DEFAULT_USER_AGENT)
            .map_err(|err| DownloadError::InvalidConfig(format!("http client: {err}")))?;
        let debug = Self::debug_log(&config);
        debug.record("setup", "input-path", &config.input);
        debug.record("setup", "output-path", &config.output);
        Ok(Self {
            config,
            net: Arc::new(net),
            probe: Arc::new(DiskSpaceProbe),
            reporter: ProgressReporter::stdout(),
            debug,
            stop_flag: Arc::new(AtomicU8::new(STOP_NONE)),
            state: DownloadState::Idle,
            download_complete: false,
        })
    }

    pub fn with_net_client(mut self, net: Box<dyn NetClient>) -> Self {
        self.net = Arc::from(net);
        self
    }

    pub fn with_space_probe(mut self, probe: Box<dyn SpaceProbe>) -> Self {
        self.probe = Arc::from(probe);
        self
    }

    pub fn with_progress_sink(mut self, sink: Box<dyn Write + Send>, interactive: bool) -> Self {
        self.reporter = ProgressReporter::with_sink(sink, interactive);
        self
    }

    fn debug_log(config: &DownloaderConfig) -> DebugLog {
        if config.debug {
            DebugLog::to_path(&config.debug_path)
        } else {
            DebugLog::disabled()
        }
    }

    pub fn input(&self) -> &str {
        &self.config.input
    }

    pub fn set_input(&mut self, value: impl Into<String>) -> DownloadResult<()> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DownloadError::InvalidConfig(
                "input path must not be empty".to_string(),
            ));
        }
        self.config.input = value;
        self.debug.record("setup", "input-path", &self.config.input);
        Ok(())
    }

    pub fn output(&self) -> &str {
        &self.config.output
    }

    pub fn set_output(&mut self, value: impl Into<String>) -> DownloadResult<()> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DownloadError::InvalidConfig(
                "output path must not be empty".to_string(),
            ));
        }
        self.config.output = value;
        self.debug.record("setup", "output-path", &self.config.output);
        Ok(())
    }

    pub fn skip_space_check(&self) -> bool {
        self.config.skip_space_check
    }

    pub fn set_skip_space_check(&mut self, value: bool) {
        self.config.skip_space_check = value;
        self.debug
            .record("setup", "skip-space-check", &value.to_string());
    }

    pub fn debug_enabled(&self) -> bool {
        self.config.debug
    }

    pub fn set_debug(&mut self, value: bool) {
        self.config.debug = value;
        self.debug = Self::debug_log(&self.config);
    }

    pub fn debug_path(&self) -> &str {
        &self.config.debug_path
    }

    pub fn set_debug_path(&mut self, value: impl Into<String>) -> DownloadResult<()> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DownloadError::InvalidConfig(
                "debug path must not be empty".to_string(),
            ));
        }
        self.config.debug_path = value;
        self.debug = Self::debug_log(&self.config);
        Ok(())
    }

    pub fn max_threads(&self) -> usize {
        self.config.max_threads
    }

    pub fn set_max_threads(&mut self, value: usize) -> DownloadResult<()> {
        if value == 0 {
            return Err(DownloadError::InvalidConfig(
                "max_threads must be at least 1".to_string(),
            ));
        }
        self.config.max_threads = value;
        self.debug
            .record("setup", "max-threads", &value.to_string());
        Ok(())
    }

    pub fn is_download_complete(&self) -> bool {
        self.download_complete
    }

    pub fn state(&self) -> DownloadState {
        self.state
    }

    /// Handle for cancelling an in-flight invocation from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(Arc::clone(&self.stop_flag))
    }

    /// Downloads a media playlist. Master input is rejected with
    /// `WrongMethodMaster`; unclassifiable input with `NotAPlaylist`.
    pub fn download_playlist(&mut self, merge: bool) -> DownloadResult<()> {
        self.begin();
        let result = self.run_media(merge);
        self.end(result)
    }

    /// Downloads one variant of a master playlist. Media input is rejected
    /// with `WrongMethodMedia`; the selected variant must itself classify as
    /// a media playlist.
    pub fn download_master_playlist(
        &mut self,
        name: Option<&str>,
        bandwidth: Option<&str>,
        resolution: Option<&str>,
        merge: bool,
    ) -> DownloadResult<()> {
        self.begin();
        let query = VariantQuery::new(name, bandwidth, resolution);
        let result = self.run_master(&query, merge);
        self.end(result)
    }

    fn begin(&mut self) {
        self.download_complete = false;
        self.stop_flag.store(STOP_NONE, Ordering::SeqCst);
        self.state = DownloadState::Verifying;
    }

    fn end(&mut self, result: DownloadResult<()>) -> DownloadResult<()> {
        match result {
            Ok(()) => {
                self.state = DownloadState::Done;
                self.download_complete = true;
                self.debug
                    .record("done", "download-complete", &self.config.output);
                Ok(())
            }
            Err(err) => {
                self.state = DownloadState::Failed;
                self.debug.record("failed", err.kind(), &err.to_string());
                Err(err)
            }
        }
    }

    fn run_media(&mut self, merge: bool) -> DownloadResult<()> {
        let doc = self.load_input()?;
        match doc.kind {
            PlaylistKind::Master => {
                return Err(DownloadError::WrongMethodMaster(self.config.input.clone()))
            }
            PlaylistKind::Unknown => {
                return Err(DownloadError::NotAPlaylist(self.config.input.clone()))
            }
            PlaylistKind::Media => {}
        }
        self.run_pipeline(&doc, merge)
    }

    fn run_master(&mut self, query: &VariantQuery, merge: bool) -> DownloadResult<()> {
        let doc = self.load_input()?;
        match doc.kind {
            PlaylistKind::Media => {
                return Err(DownloadError::WrongMethodMedia(self.config.input.clone()))
            }
            PlaylistKind::Unknown => {
                return Err(DownloadError::NotAPlaylist(self.config.input.clone()))
            }
            PlaylistKind::Master => {}
        }

        let variants = extract_variants(&doc)?;
        let selected = select_variant(&variants, query)?;
        self.debug.record(
            "verify",
            "variant-selected",
            &format!("{} -> {}", selected.describe(), selected.uri),
        );

        let media_doc = load_playlist(self.net.as_ref(), &selected.uri)?;
        self.note_header(&media_doc);
        if media_doc.kind != PlaylistKind::Media {
            return Err(DownloadError::MalformedMaster(selected.uri));
        }
        self.run_pipeline(&media_doc, merge)
    }

    fn load_input(&self) -> DownloadResult<PlaylistDocument> {
        self.debug.record("verify", "loading-input", &self.config.input);
        let doc = load_playlist(self.net.as_ref(), &self.config.input)?;
        self.note_header(&doc);
        self.debug.record(
            "verify",
            "classified",
            &format!("{} is {}", doc.source, doc.kind),
        );
        Ok(doc)
    }

    fn note_header(&self, doc: &PlaylistDocument) {
        if !doc.has_header() {
            warn!("{} does not start with #EXTM3U", doc.source);
            self.debug.record("verify", "missing-header", &doc.source);
        }
    }

    fn run_pipeline(&mut self, doc: &PlaylistDocument, merge: bool) -> DownloadResult<()> {
        self.state = DownloadState::Planning;
        let plan = SegmentPlan::from_document(doc)?;
        self.debug
            .record("plan", "segments-planned", &format!("{} segments", plan.len()));

        let layout = OutputLayout::resolve(&self.config.output)?;
        fs::create_dir_all(&layout.dir).map_err(|err| {
            DownloadError::BuildFailed(format!(
                "create output directory {}: {err}",
                layout.dir.display()
            ))
        })?;

        self.state = DownloadState::Guarding;
        if self.config.skip_space_check {
            self.debug
                .record("verify", "space-check-skipped", "skip_space_check is set");
        } else {
            let estimate = estimate_plan_size(
                Arc::clone(&self.net),
                &plan,
                self.config.max_threads,
                &mut self.reporter,
            );
            self.debug.record(
                "verify",
                "space-estimated",
                &format!("{estimate} bytes for {} segments", plan.len()),
            );
            ensure_space(self.probe.as_ref(), &layout.dir, estimate, &self.debug)?;
        }

        self.state = DownloadState::Downloading;
        let mut jobs: Vec<FetchJob> = plan
            .segments()
            .iter()
            .map(|segment| FetchJob::new(segment, &layout.dir, &layout.base))
            .collect();
        run_fetch_pool(
            Arc::clone(&self.net),
            &mut jobs,
            self.config.max_threads,
            Arc::clone(&self.stop_flag),
            Arc::new(self.debug.clone()),
            &mut self.reporter,
        )?;

        self.state = DownloadState::Building;
        let build_result = if merge {
            concatenate(&jobs, &layout.final_path, &mut self.reporter, &self.debug)
        } else {
            retain_segments(
                &jobs,
                &layout.dir,
                &layout.base,
                &mut self.reporter,
                &self.debug,
            )
        };
        if let Err(err) = build_result {
            remove_temp_files(&jobs, &self.debug);
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn output_without_extension_gains_ts() {
        let layout = OutputLayout::resolve("/downloads/out").unwrap();
        assert_eq!(layout.final_path, Path::new("/downloads/out.ts"));
        assert_eq!(layout.base, "out");
        assert_eq!(layout.dir, Path::new("/downloads"));
    }

    #[test]
    fn output_with_extension_is_kept() {
        let layout = OutputLayout::resolve("/downloads/out.mp4").unwrap();
        assert_eq!(layout.final_path, Path::new("/downloads/out.mp4"));
        assert_eq!(layout.base, "out");
    }

    #[test]
    fn bare_file_name_lands_in_current_dir() {
        let layout = OutputLayout::resolve("out").unwrap();
        assert_eq!(layout.dir, Path::new("."));
        assert_eq!(layout.final_path, Path::new("out.ts"));
    }

    #[test]
    fn setters_validate_and_update() {
        let mut downloader = M3u8Downloader::new("https://host/a.m3u8", "out").unwrap();
        assert_eq!(downloader.max_threads(), 10);
        assert!(downloader.set_max_threads(0).is_err());
        assert_eq!(downloader.max_threads(), 10);
        downloader.set_max_threads(4).unwrap();
        assert_eq!(downloader.max_threads(), 4);

        assert!(downloader.set_input("").is_err());
        downloader.set_input("https://host/b.m3u8").unwrap();
        assert_eq!(downloader.input(), "https://host/b.m3u8");

        assert!(downloader.set_output("  ").is_err());
        downloader.set_output("elsewhere").unwrap();
        assert_eq!(downloader.output(), "elsewhere");

        assert!(!downloader.skip_space_check());
        downloader.set_skip_space_check(true);
        assert!(downloader.skip_space_check());

        assert_eq!(downloader.debug_path(), "debug.log");
        assert!(downloader.set_debug_path("").is_err());
        downloader.set_debug_path("elsewhere.log").unwrap();
        assert_eq!(downloader.debug_path(), "elsewhere.log");

        assert_eq!(downloader.state(), DownloadState::Idle);
        assert!(!downloader.is_download_complete());
    }

    #[test]
    fn constructor_rejects_invalid_config() {
        assert!(matches!(
            M3u8Downloader::new("", "out"),
            Err(DownloadError::InvalidConfig(_))
        ));
        let mut config = DownloaderConfig::new("in.m3u8", "out");
        config.max_threads = 0;
        assert!(M3u8Downloader::with_config(config).is_err());
    }
}
