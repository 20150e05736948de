//! Runs the imaging and compression commands under a polling monitor
//!
//! Each step is one child process watched on a fixed interval for
//! cancellation, exit, timeout and (imaging only) stalled output growth.
//! Every branch except cancellation notifies before returning; the
//! orchestrator owns the single "stopped" message.

use crate::clock::{CancelToken, Clock};
use crate::messages;
use crate::notifier::Notifier;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use pibackup_common::{BackupTask, CommandLine, ProcessError, RunOutcome, Step};
use std::io::Read;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{Child, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

/// Longest uninterrupted sleep, so a signal is noticed before the next poll
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// How long a terminated child gets to exit before SIGKILL
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// What to watch while a step runs
struct Watch<'a> {
    step: Step,
    command: &'a CommandLine,
    timeout: Duration,
    poll_interval: Duration,
    /// File whose growth proves progress; `None` disables stall detection
    stall_path: Option<&'a Path>,
}

pub struct ProcessRunner {
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
}

impl ProcessRunner {
    pub fn new(notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>, cancel: CancelToken) -> Self {
        Self {
            notifier,
            clock,
            cancel,
        }
    }

    /// Image the device into `task.image_path()`
    pub fn run_imaging(&self, task: &BackupTask) -> RunOutcome {
        let image = task.image_path();
        self.run_step(Watch {
            step: Step::Imaging,
            command: &task.imaging,
            timeout: task.timeout,
            poll_interval: task.poll_interval,
            stall_path: task.stall_detection.then_some(image.as_path()),
        })
    }

    /// Compress the image; throughput is not monitored
    pub fn run_compression(&self, task: &BackupTask, timeout: Duration) -> RunOutcome {
        self.run_step(Watch {
            step: Step::Compression,
            command: &task.compression,
            timeout,
            poll_interval: task.poll_interval,
            stall_path: None,
        })
    }

    fn run_step(&self, watch: Watch<'_>) -> RunOutcome {
        let step = watch.step;
        let label = step.label();

        self.notifier.notify(&messages::step_started(step));
        log::info!("Running command: '{}'...", watch.command);

        let mut command = watch.command.to_command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            // Own process group: terminal signals reach us, not the child,
            // and termination covers helpers such as `sudo`
            .process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => ChildGuard::new(child),
            Err(source) => {
                let err = ProcessError::Spawn {
                    program: watch.command.program.clone(),
                    source,
                };
                log::error!("{label} process could not be started: {err}");
                self.notifier
                    .notify(&messages::step_not_started(step, &err.to_string()));
                return failed(step, err.to_string());
            }
        };
        log::debug!("{label} process started with pid {}", child.id());

        let stderr = collect_stderr(&mut child.child);
        let started = self.clock.now();
        let mut last_size: Option<u64> = None;

        loop {
            if self.cancel.is_cancelled() {
                log::warn!("{label} process {}.", ProcessError::Interrupted);
                child.terminate();
                return RunOutcome::Interrupted { step };
            }

            match child.try_wait() {
                Ok(Some(status)) => return self.finish(step, status, stderr),
                Ok(None) => {}
                Err(err) => {
                    log::error!("Failed to poll {label} process: {err}");
                    child.terminate();
                    return RunOutcome::UnexpectedError {
                        step,
                        message: format!("failed to poll {label} process: {err}"),
                    };
                }
            }

            let elapsed = self.clock.now().saturating_duration_since(started);
            if elapsed > watch.timeout {
                log::error!(
                    "{label} process timed out ({}).",
                    ProcessError::Timeout(watch.timeout)
                );
                self.notifier.notify(&messages::step_timed_out(step));
                child.terminate();
                return RunOutcome::TimedOut { step };
            }

            self.pause(watch.poll_interval);

            let Some(path) = watch.stall_path else {
                continue;
            };
            // Exit and cancellation take precedence over a stall verdict
            if self.cancel.is_cancelled() || matches!(child.try_wait(), Ok(Some(_))) {
                continue;
            }
            // No file yet means dd has not opened it; nothing to compare
            let Ok(metadata) = std::fs::metadata(path) else {
                continue;
            };
            let size = metadata.len();
            if last_size == Some(size) {
                log::error!(
                    "{label} process stalled ({}).",
                    ProcessError::Stall(watch.poll_interval)
                );
                self.notifier.notify(&messages::step_stalled(step));
                child.terminate();
                return RunOutcome::Stalled;
            }
            log::debug!("{label} output at {size} bytes");
            last_size = Some(size);
        }
    }

    fn finish(&self, step: Step, status: ExitStatus, stderr: Receiver<String>) -> RunOutcome {
        let label = step.label();

        if status.success() {
            log::info!("{label} process completed.");
            self.notifier.notify(&messages::step_completed(step));
            return RunOutcome::Success;
        }

        let stderr = stderr
            .recv_timeout(Duration::from_millis(500))
            .unwrap_or_default();
        let reason = ProcessError::Exit(describe_exit(status, &stderr)).to_string();
        log::error!("{label} process failed: {reason}");
        self.notifier.notify(&messages::step_failed(step, &reason));
        failed(step, reason)
    }

    /// Sleep one poll interval in short slices, waking early on cancellation
    fn pause(&self, total: Duration) {
        let mut remaining = total;
        while !remaining.is_zero() && !self.cancel.is_cancelled() {
            let slice = remaining.min(CANCEL_CHECK_INTERVAL);
            self.clock.sleep(slice);
            remaining -= slice;
        }
    }
}

/// Owns a running step; a child that was neither reaped nor terminated is
/// killed on drop, so unwinding out of the poll loop never orphans `dd`
struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        Self {
            child,
            reaped: false,
        }
    }

    fn id(&self) -> u32 {
        self.child.id()
    }

    fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        let status = self.child.try_wait();
        if matches!(status, Ok(Some(_))) {
            self.reaped = true;
        }
        status
    }

    fn terminate(&mut self) {
        terminate(&mut self.child);
        self.reaped = true;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.reaped {
            log::warn!("Stopping abandoned child {}", self.child.id());
            self.terminate();
        }
    }
}

fn failed(step: Step, reason: String) -> RunOutcome {
    match step {
        Step::Imaging => RunOutcome::ImagingFailed { reason },
        Step::Compression => RunOutcome::CompressionFailed { reason },
    }
}

/// Drain stderr on a helper thread so a chatty child never blocks on a full pipe
fn collect_stderr(child: &mut Child) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = child.stderr.take() {
        std::thread::spawn(move || {
            let mut output = String::new();
            let _ = pipe.read_to_string(&mut output);
            let _ = tx.send(output);
        });
    }
    rx
}

fn describe_exit(status: ExitStatus, stderr: &str) -> String {
    let mut reason = match (status.code(), status.signal()) {
        (Some(code), _) => format!("exit code {code}"),
        (None, Some(signal)) => format!("terminated by signal {signal}"),
        (None, None) => "unknown exit status".to_string(),
    };

    if let Some(line) = stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()) {
        reason.push_str(": ");
        reason.push_str(line);
    }

    reason
}

/// SIGTERM the child's process group, escalating to SIGKILL, then reap it
fn terminate(child: &mut Child) {
    let pgid = Pid::from_raw(child.id() as i32);

    if let Err(err) = killpg(pgid, Signal::SIGTERM) {
        log::debug!("SIGTERM to process group {pgid} failed: {err}");
        let _ = child.kill();
    }

    let deadline = std::time::Instant::now() + TERMINATE_GRACE;
    while std::time::Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) => std::thread::sleep(Duration::from_millis(50)),
            Err(_) => break,
        }
    }

    log::warn!("Child {} ignored SIGTERM, killing it", child.id());
    if killpg(pgid, Signal::SIGKILL).is_err() {
        let _ = child.kill();
    }
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ManualClock, RecordingNotifier};
    use std::time::Instant;

    fn runner(
        notifier: &Arc<RecordingNotifier>,
        clock: Arc<dyn Clock>,
        cancel: CancelToken,
    ) -> ProcessRunner {
        ProcessRunner::new(notifier.clone(), clock, cancel)
    }

    fn task(dest: &Path, imaging: CommandLine) -> BackupTask {
        BackupTask::builder(dest)
            .timeout(Duration::from_secs(3600))
            .poll_interval(Duration::from_secs(5))
            .imaging_command(imaging)
            .build()
    }

    #[test]
    fn test_imaging_success() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let task = task(dir.path(), CommandLine::new("true"));

        let outcome = runner(&notifier, Arc::new(ManualClock::new()), CancelToken::new())
            .run_imaging(&task);

        assert_eq!(outcome, RunOutcome::Success);
        assert_eq!(
            notifier.messages(),
            vec!["*Backup process started.*", "*Backup process completed.*"]
        );
    }

    #[test]
    fn test_nonzero_exit_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let task = task(
            dir.path(),
            CommandLine::new("sh").args(["-c", "echo 'dd: no space left' >&2; exit 3"]),
        );

        let outcome = runner(&notifier, Arc::new(ManualClock::new()), CancelToken::new())
            .run_imaging(&task);

        let RunOutcome::ImagingFailed { reason } = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert_eq!(reason, "exit code 3: dd: no space left");
        assert_eq!(notifier.count_containing("*ERROR*: Backup process failed"), 1);
    }

    #[test]
    fn test_dd_error_naming_image_is_escaped() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let task = task(
            dir.path(),
            CommandLine::new("sh").args([
                "-c",
                "echo \"dd: error writing '/mnt/backup/2024-03-09_device1-backup.img': \
                 No space left on device\" >&2; exit 1",
            ]),
        );

        runner(&notifier, Arc::new(ManualClock::new()), CancelToken::new()).run_imaging(&task);

        let messages = notifier.messages();
        let failure = messages
            .iter()
            .find(|m| m.starts_with("*ERROR*"))
            .unwrap();
        assert!(failure.contains("2024-03-09\\_device1-backup.img"));
        assert!(!failure.contains("09_device1"));
    }

    #[test]
    fn test_dropped_guard_stops_running_child() {
        let child = std::process::Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();
        let pid = Pid::from_raw(child.id() as i32);

        let real = Instant::now();
        drop(ChildGuard::new(child));

        assert!(real.elapsed() < Duration::from_secs(10));
        // Reaped, so not even a zombie is left behind
        assert_eq!(
            nix::sys::signal::kill(pid, None),
            Err(nix::errno::Errno::ESRCH)
        );
    }

    #[test]
    fn test_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let task = task(dir.path(), CommandLine::new("/nonexistent/pibackup-dd"));

        let outcome = runner(&notifier, Arc::new(ManualClock::new()), CancelToken::new())
            .run_imaging(&task);

        assert!(matches!(outcome, RunOutcome::ImagingFailed { .. }));
        assert_eq!(notifier.count_containing("could not be started"), 1);
    }

    #[test]
    fn test_timeout_within_one_poll_interval() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new());
        let task = BackupTask::builder(dir.path())
            .timeout(Duration::from_secs(10))
            .poll_interval(Duration::from_secs(5))
            .stall_detection(false)
            .imaging_command(CommandLine::new("sleep").arg("30"))
            .build();

        let real = Instant::now();
        let outcome = runner(&notifier, clock.clone(), CancelToken::new()).run_imaging(&task);

        assert_eq!(outcome, RunOutcome::TimedOut { step: Step::Imaging });
        assert!(clock.elapsed() > Duration::from_secs(10));
        assert!(clock.elapsed() <= Duration::from_secs(15));
        // The child was terminated, not waited out
        assert!(real.elapsed() < Duration::from_secs(20));
        assert_eq!(
            notifier.count_containing("*ERROR*: Backup process timed out."),
            1
        );
    }

    #[test]
    fn test_stall_detected_when_output_stops_growing() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let task = BackupTask::builder(dir.path())
            .timeout(Duration::from_secs(3600))
            .imaging_command(CommandLine::new("sleep").arg("30"))
            .build();
        std::fs::write(task.image_path(), b"partial").unwrap();

        let outcome = runner(&notifier, Arc::new(ManualClock::new()), CancelToken::new())
            .run_imaging(&task);

        assert_eq!(outcome, RunOutcome::Stalled);
        assert_eq!(notifier.count_containing("process stalled"), 1);
    }

    #[test]
    fn test_compression_ignores_stall() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new());
        let task = BackupTask::builder(dir.path())
            .poll_interval(Duration::from_secs(5))
            .compression_command(CommandLine::new("sleep").arg("30"))
            .build();
        std::fs::write(task.image_path(), b"complete").unwrap();

        let outcome = runner(&notifier, clock, CancelToken::new())
            .run_compression(&task, Duration::from_secs(20));

        assert_eq!(outcome, RunOutcome::TimedOut { step: Step::Compression });
    }

    #[test]
    fn test_cancellation_stops_child_without_notifying() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let cancel = CancelToken::new();
        let task = BackupTask::builder(dir.path())
            .timeout(Duration::from_secs(60))
            .poll_interval(Duration::from_millis(100))
            .imaging_command(CommandLine::new("sleep").arg("30"))
            .build();

        let trigger = cancel.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            trigger.cancel();
        });

        let real = Instant::now();
        let outcome = runner(&notifier, Arc::new(crate::clock::SystemClock), cancel)
            .run_imaging(&task);
        handle.join().unwrap();

        assert_eq!(outcome, RunOutcome::Interrupted { step: Step::Imaging });
        assert!(real.elapsed() < Duration::from_secs(10));
        assert_eq!(notifier.messages(), vec!["*Backup process started.*"]);
    }

    #[test]
    fn test_describe_exit_uses_last_stderr_line() {
        let status = ExitStatus::from_raw(2 << 8);
        assert_eq!(describe_exit(status, "warn\nfatal error\n\n"), "exit code 2: fatal error");
        let killed = ExitStatus::from_raw(9);
        assert_eq!(describe_exit(killed, ""), "terminated by signal 9");
    }
}
