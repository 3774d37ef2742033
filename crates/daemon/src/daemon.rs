//! Daemon startup and main loop
//!
//! Provides the daemon entry point, startup sequence, and the poll loop that
//! runs one scan pass per interval until shutdown is requested.

use crate::config::Config;
use crate::pipeline::{PassSummary, Pipeline, PipelineError};
use crate::startup::{run_startup_checks, StartupError};
use crate::tool::{SystemRunner, ToolRunner};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{error, info};

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// Pipeline setup or a pass failed
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// A blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(#[from] JoinError),

    /// The pipeline was lost to an earlier task failure
    #[error("Pipeline is no longer available")]
    PipelineLost,
}

/// Totals over the lifetime of a [`Daemon::run`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Passes that completed.
    pub passes: usize,
    /// Passes that ended in an error and were retried next interval.
    pub failed_passes: usize,
    pub files_processed: usize,
    pub files_failed: usize,
}

impl RunSummary {
    fn record(&mut self, pass: &PassSummary) {
        self.passes += 1;
        self.files_processed += pass.new_files;
        self.files_failed += pass.failed_files;
    }
}

/// Daemon state containing the configuration and the pipeline it drives.
pub struct Daemon<R = SystemRunner> {
    /// Configuration loaded from file and environment
    pub config: Config,
    /// Held outside the struct while a pass runs on the blocking pool
    pipeline: Option<Pipeline<R>>,
}

impl Daemon<SystemRunner> {
    /// Initialize the daemon with real tools
    ///
    /// This performs the full startup sequence:
    /// 1. Verify `ffprobe -version` and `ffmpeg -version` run
    /// 2. Load the processed and failed lists
    pub async fn new(config: Config) -> Result<Self, DaemonError> {
        let tools = config.tools.clone();
        tokio::task::spawn_blocking(move || run_startup_checks(&SystemRunner, &tools)).await??;

        Self::new_without_checks(config)
    }

    /// Initialize the daemon without running startup checks
    ///
    /// Useful when the tools are known to exist or are not needed yet.
    pub fn new_without_checks(config: Config) -> Result<Self, DaemonError> {
        Self::with_runner(config, SystemRunner)
    }
}

impl<R: ToolRunner + Send + 'static> Daemon<R> {
    /// Initialize the daemon with a custom tool runner. No startup checks are run.
    pub fn with_runner(config: Config, runner: R) -> Result<Self, DaemonError> {
        let pipeline = Pipeline::new(&config, runner)?;
        Ok(Self {
            config,
            pipeline: Some(pipeline),
        })
    }

    pub fn pipeline(&self) -> Option<&Pipeline<R>> {
        self.pipeline.as_ref()
    }

    /// Runs a single scan pass on the blocking pool.
    pub async fn run_once(&mut self) -> Result<PassSummary, DaemonError> {
        let mut pipeline = self.pipeline.take().ok_or(DaemonError::PipelineLost)?;

        let (pipeline, result) = tokio::task::spawn_blocking(move || {
            let result = pipeline.run_pass();
            (pipeline, result)
        })
        .await?;

        self.pipeline = Some(pipeline);
        Ok(result?)
    }

    /// Run the daemon main loop
    ///
    /// Runs a pass, sleeps the poll interval and repeats until `shutdown`
    /// carries `true` or its sender is dropped. A pass in flight always
    /// completes; the signal is only observed between passes. Pass errors
    /// (such as an unreadable root) are logged and retried next interval.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<RunSummary, DaemonError> {
        let interval = self.config.watch.poll_interval();
        let mut summary = RunSummary::default();

        info!(
            "Watching {} every {}s",
            self.config.watch.root.display(),
            interval.as_secs()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_once().await {
                Ok(pass) => summary.record(&pass),
                Err(DaemonError::Pipeline(e)) => {
                    error!("Scan pass failed: {}", e);
                    summary.failed_passes += 1;
                }
                Err(e) => return Err(e),
            }

            if wait_for_next_pass(interval, &mut shutdown).await {
                break;
            }
        }

        info!(
            "Stopped after {} passes ({} files processed, {} with failures)",
            summary.passes, summary.files_processed, summary.files_failed
        );
        Ok(summary)
    }
}

/// Sleeps the full poll interval. Returns true if shutdown was requested first.
///
/// Updates that leave the flag at `false` do not cut the sleep short.
async fn wait_for_next_pass(interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(interval);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::testing::{FakeRunner, Reply};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const NO_SUBS: &[u8] = br#"{ "streams": [ { "index": 0, "codec_type": "video" } ] }"#;

    fn create_test_config(temp: &TempDir) -> (Config, PathBuf) {
        let root = temp.path().join("rss");
        fs::create_dir_all(&root).unwrap();

        let mut config = Config::default();
        config.watch.root = root.clone();
        config.watch.poll_interval_secs = 3600;
        config.state.processed_list = temp.path().join("processed_files.txt");
        config.state.failed_list = temp.path().join("failed_files.txt");
        config.workspace.output_video_dir = temp.path().join("output_videos");
        config.workspace.temp_subtitle_dir = temp.path().join("temp_subtitles");
        (config, root)
    }

    fn fake_tools() -> FakeRunner {
        FakeRunner::new(|inv| match inv.description() {
            "Subtitle probe" => Reply::Stdout(NO_SUBS.to_vec()),
            _ => Reply::WriteOutput(b"compressed".to_vec()),
        })
    }

    #[tokio::test]
    async fn test_run_once_processes_new_files() {
        let temp = TempDir::new().unwrap();
        let (config, root) = create_test_config(&temp);
        fs::write(root.join("a.mp4"), b"original").unwrap();

        let runner = fake_tools();
        let mut daemon = Daemon::with_runner(config, runner.clone()).unwrap();

        let first = daemon.run_once().await.unwrap();
        assert_eq!(first.new_files, 1);
        assert_eq!(fs::read(root.join("a.mp4")).unwrap(), b"compressed");

        runner.clear();
        let second = daemon.run_once().await.unwrap();
        assert_eq!(second.new_files, 0);
        assert!(runner.calls().is_empty());
        assert_eq!(daemon.pipeline().unwrap().processed().len(), 1);
    }

    #[tokio::test]
    async fn test_run_once_reports_missing_root() {
        let temp = TempDir::new().unwrap();
        let (config, root) = create_test_config(&temp);
        fs::remove_dir_all(&root).unwrap();

        let mut daemon = Daemon::with_runner(config, fake_tools()).unwrap();
        let result = daemon.run_once().await;
        assert!(matches!(result, Err(DaemonError::Pipeline(PipelineError::Scan(_)))));
        // The pipeline survives for the next attempt
        assert!(daemon.pipeline().is_some());
    }

    #[tokio::test]
    async fn test_run_stops_immediately_when_already_signalled() {
        let temp = TempDir::new().unwrap();
        let (config, _root) = create_test_config(&temp);
        let runner = fake_tools();
        let daemon = Daemon::with_runner(config, runner.clone()).unwrap();

        let (_tx, rx) = watch::channel(true);
        let summary = daemon.run(rx).await.unwrap();

        assert_eq!(summary, RunSummary::default());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_run_finishes_pass_then_stops_on_signal() {
        let temp = TempDir::new().unwrap();
        let (config, root) = create_test_config(&temp);
        fs::write(root.join("a.mp4"), b"a").unwrap();
        fs::write(root.join("b.mkv"), b"b").unwrap();

        let runner = fake_tools();
        let daemon = Daemon::with_runner(config, runner.clone()).unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(daemon.run(rx));

        // Signal as soon as the first pass has started
        while runner.calls().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send(true).unwrap();

        let summary = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("daemon should stop well before the poll interval")
            .unwrap()
            .unwrap();

        assert_eq!(summary.passes, 1);
        assert_eq!(summary.files_processed, 2);
        assert_eq!(summary.files_failed, 0);
    }

    #[tokio::test]
    async fn test_run_survives_failed_pass() {
        let temp = TempDir::new().unwrap();
        let (config, root) = create_test_config(&temp);
        fs::remove_dir_all(&root).unwrap();

        let daemon = Daemon::with_runner(config, fake_tools()).unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(daemon.run(rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(tx);

        let summary = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("dropping the sender should stop the loop")
            .unwrap()
            .unwrap();

        assert_eq!(summary.passes, 0);
        assert_eq!(summary.failed_passes, 1);
    }

    #[tokio::test]
    async fn test_unchanged_flag_does_not_cut_the_interval_short() {
        let temp = TempDir::new().unwrap();
        let (config, root) = create_test_config(&temp);
        let processed_list = config.state.processed_list.clone();
        fs::write(root.join("a.mp4"), b"a").unwrap();

        let daemon = Daemon::with_runner(config, fake_tools()).unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(daemon.run(rx));

        // First pass is done once the processed list is on disk
        while !processed_list.exists() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A wakeup that leaves the flag at false must not start another pass
        tx.send(false).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        let summary = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("daemon should stop on the signal")
            .unwrap()
            .unwrap();

        assert_eq!(summary.passes, 1);
    }
}
