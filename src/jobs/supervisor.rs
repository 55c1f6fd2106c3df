// Subprocess supervision for ffmpeg transcodes
//
// A reader thread turns `-progress pipe:1` output into ProgressEvents and
// feeds them through a bounded channel. The supervising loop polls that
// channel and kills a child that never reports progress within the stall
// window. Once progress has been seen, silence is tolerated until EOF.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::constants::{
    PROGRESS_CHANNEL_CAPACITY, PROGRESS_POLL_INTERVAL_MS, STDERR_TAIL_LINES, TRANSCODE_STALL_SECONDS,
};
use crate::error::{LibraryError, Result};

use super::progress::{parse_progress_line, JobProgress, ProgressEvent};

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// How long a child may run without any progress before it is killed
    pub stall_window: Duration,
    pub poll_interval: Duration,
    pub channel_capacity: usize,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            stall_window: Duration::from_secs(TRANSCODE_STALL_SECONDS),
            poll_interval: Duration::from_millis(PROGRESS_POLL_INTERVAL_MS),
            channel_capacity: PROGRESS_CHANNEL_CAPACITY,
        }
    }
}

/// Outcome of a child that exited successfully
#[derive(Debug, Clone)]
pub struct SupervisedRun {
    pub last_progress: Option<JobProgress>,
    /// ffmpeg reported `progress=end`
    pub saw_end: bool,
    /// A stop was requested while the child ran; it was allowed to finish
    pub stop_requested: bool,
    pub elapsed: Duration,
}

fn spawn_progress_reader(
    stdout: std::process::ChildStdout,
    tx: mpsc::SyncSender<ProgressEvent>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let reader = BufReader::new(stdout);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if let Some(event) = parse_progress_line(&line) {
                if tx.send(event).is_err() {
                    break;
                }
            }
        }
    })
}

fn spawn_stderr_tail(stderr: std::process::ChildStderr) -> JoinHandle<Vec<String>> {
    thread::spawn(move || {
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let reader = BufReader::new(stderr);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        tail.into_iter().collect()
    })
}

fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::warn!("Failed to kill stalled process {}: {}", child.id(), e);
    }
    let _ = child.wait();
}

/// Run `cmd` to completion under supervision.
///
/// `duration_secs` is the source duration used for percent reporting.
/// `stop_check` is polled every iteration; a requested stop never kills the
/// child, it is only reported back in the result.
pub fn supervise(
    mut cmd: Command,
    job_id: &str,
    duration_secs: i64,
    options: &SupervisorOptions,
    stop_check: &dyn Fn() -> bool,
) -> Result<SupervisedRun> {
    let started = Instant::now();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| LibraryError::TranscodeProcessFailed(format!("failed to start: {}", e)))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| LibraryError::TranscodeProcessFailed("no stdout handle".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| LibraryError::TranscodeProcessFailed("no stderr handle".to_string()))?;

    let (tx, rx) = mpsc::sync_channel(options.channel_capacity.max(1));
    let reader = spawn_progress_reader(stdout, tx);
    let stderr_tail = spawn_stderr_tail(stderr);

    let mut run = SupervisedRun {
        last_progress: None,
        saw_end: false,
        stop_requested: false,
        elapsed: Duration::ZERO,
    };
    let mut seen_progress = false;

    loop {
        match rx.recv_timeout(options.poll_interval) {
            Ok(event) => {
                seen_progress = true;
                match event {
                    ProgressEvent::OutTime(us) => {
                        let progress = JobProgress::from_out_time(job_id, us, duration_secs);
                        log::debug!("Job {}: {:.1}%", job_id, progress.percent);
                        run.last_progress = Some(progress);
                    }
                    ProgressEvent::End => run.saw_end = true,
                    ProgressEvent::Continue | ProgressEvent::Field { .. } => {}
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !seen_progress && started.elapsed() >= options.stall_window {
                    log::warn!(
                        "Job {}: no progress after {:?}, killing process {}",
                        job_id,
                        options.stall_window,
                        child.id()
                    );
                    // Reader threads are left to finish on their own; a
                    // grandchild may still hold the pipes open.
                    kill_and_reap(&mut child);
                    return Err(LibraryError::TranscodeStalled(options.stall_window.as_secs()));
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if !run.stop_requested && stop_check() {
            log::info!("Job {}: stop requested, letting the current transcode finish", job_id);
            run.stop_requested = true;
        }
    }

    let status = child.wait()?;
    let _ = reader.join();
    let tail = stderr_tail.join().unwrap_or_default();
    run.elapsed = started.elapsed();

    if !status.success() {
        let mut message = format!("ffmpeg exited with {}", status);
        if !tail.is_empty() {
            message.push_str(": ");
            message.push_str(&tail.join("\n"));
        }
        return Err(LibraryError::TranscodeProcessFailed(message));
    }

    Ok(run)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn shell(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    fn quick(stall_ms: u64) -> SupervisorOptions {
        SupervisorOptions {
            stall_window: Duration::from_millis(stall_ms),
            poll_interval: Duration::from_millis(50),
            channel_capacity: 4,
        }
    }

    #[test]
    fn test_progress_to_end() {
        let cmd = shell(
            "echo out_time_us=1000000; echo progress=continue; \
             echo out_time_us=2000000; echo progress=end",
        );
        let run = supervise(cmd, "job-1", 4, &quick(5000), &|| false).unwrap();
        assert!(run.saw_end);
        assert!(!run.stop_requested);
        let progress = run.last_progress.unwrap();
        assert_eq!(progress.current, 2);
        assert_eq!(progress.total, 4);
        assert!((progress.percent - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stalled_child_is_killed() {
        let cmd = shell("exec sleep 30");
        let begun = Instant::now();
        let err = supervise(cmd, "job-2", 10, &quick(1000), &|| false).unwrap_err();
        assert!(matches!(err, LibraryError::TranscodeStalled(1)));
        assert!(begun.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_nonzero_exit_carries_stderr() {
        let cmd = shell("echo 'Invalid data found' >&2; exit 3");
        let err = supervise(cmd, "job-3", 10, &quick(5000), &|| false).unwrap_err();
        match err {
            LibraryError::TranscodeProcessFailed(msg) => assert!(msg.contains("Invalid data found")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_silence_tolerated_after_progress() {
        let cmd = shell("echo out_time_us=500000; echo progress=continue; sleep 1; echo progress=end");
        let run = supervise(cmd, "job-4", 1, &quick(300), &|| false).unwrap();
        assert!(run.saw_end);
    }

    #[test]
    fn test_stop_does_not_kill() {
        let polls = Cell::new(0);
        let stop = || {
            polls.set(polls.get() + 1);
            true
        };
        let cmd = shell("echo out_time_us=1; sleep 1; echo progress=end");
        let run = supervise(cmd, "job-5", 1, &quick(5000), &stop).unwrap();
        assert!(run.stop_requested);
        assert!(run.saw_end);
        assert!(polls.get() >= 1);
    }

    #[test]
    fn test_spawn_failure() {
        let cmd = Command::new("/definitely/not/a/binary");
        let err = supervise(cmd, "job-6", 1, &quick(1000), &|| false).unwrap_err();
        assert!(matches!(err, LibraryError::TranscodeProcessFailed(_)));
    }
}
