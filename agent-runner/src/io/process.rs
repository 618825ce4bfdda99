//! Child process execution with stderr tee.
//!
//! Agent CLIs are interactive and long-running, so stdin and stdout are
//! inherited untouched. Stderr is piped through a reader thread that forwards
//! every chunk to our own stderr as it arrives and keeps a bounded tail for
//! post-hoc classification. No timeout is applied.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};

/// Exit status plus the captured stderr tail.
#[derive(Debug)]
pub struct TeeOutput {
    pub status: ExitStatus,
    pub stderr: Vec<u8>,
    /// Bytes dropped from the front of `stderr` to respect the capture limit.
    pub stderr_dropped: usize,
}

/// Run `cmd` with inherited stdin/stdout, forwarding stderr to `sink` while
/// keeping at most `capture_limit_bytes` of its most recent output.
#[instrument(skip_all, fields(capture_limit_bytes))]
pub fn run_with_stderr_tee<W>(
    mut cmd: Command,
    capture_limit_bytes: usize,
    sink: W,
) -> Result<TeeOutput>
where
    W: Write + Send + 'static,
{
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let reader = thread::spawn(move || tee_tail(stderr, sink, capture_limit_bytes));

    let status = child.wait().context("wait for command")?;
    let (stderr, stderr_dropped) = match reader.join() {
        Ok(result) => result.context("read stderr")?,
        Err(_) => return Err(anyhow!("stderr reader thread panicked")),
    };

    if stderr_dropped > 0 {
        warn!(stderr_dropped, "stderr capture truncated to most recent output");
    }
    debug!(exit_code = ?status.code(), "command finished");
    Ok(TeeOutput {
        status,
        stderr,
        stderr_dropped,
    })
}

/// Copy `reader` into `sink` chunk by chunk, retaining the last `limit` bytes.
fn tee_tail<R: Read, W: Write>(
    mut reader: R,
    mut sink: W,
    limit: usize,
) -> io::Result<(Vec<u8>, usize)> {
    let mut tail: VecDeque<u8> = VecDeque::new();
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];
    let mut sink_ok = true;

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        // Keep draining the pipe even if forwarding fails, or the child blocks.
        if sink_ok && (sink.write_all(&chunk[..n]).is_err() || sink.flush().is_err()) {
            sink_ok = false;
        }

        tail.extend(&chunk[..n]);
        if tail.len() > limit {
            let excess = tail.len() - limit;
            tail.drain(..excess);
            dropped += excess;
        }
    }

    Ok((tail.into_iter().collect(), dropped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn tee_forwards_everything_and_keeps_tail() {
        let input = b"0123456789".repeat(3);
        let mut forwarded = Vec::new();
        let (tail, dropped) = tee_tail(&input[..], &mut forwarded, 8).expect("tee");

        assert_eq!(forwarded, input);
        assert_eq!(tail, b"23456789");
        assert_eq!(dropped, 22);
    }

    #[test]
    fn tee_under_limit_keeps_all() {
        let mut forwarded = Vec::new();
        let (tail, dropped) = tee_tail(&b"short"[..], &mut forwarded, 100).expect("tee");
        assert_eq!(tail, b"short");
        assert_eq!(dropped, 0);
    }

    #[test]
    fn captures_stderr_and_exit_code_from_child() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo 'Too Many Requests' >&2; exit 3");
        let sink = SharedSink::default();

        let output = run_with_stderr_tee(cmd, 1024, sink.clone()).expect("run");

        assert_eq!(output.status.code(), Some(3));
        assert_eq!(String::from_utf8_lossy(&output.stderr), "Too Many Requests\n");
        assert_eq!(
            String::from_utf8_lossy(&sink.0.lock().expect("lock")),
            "Too Many Requests\n"
        );
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let cmd = Command::new("/definitely/not/a/binary");
        let err = run_with_stderr_tee(cmd, 1024, io::sink()).unwrap_err();
        assert!(err.to_string().contains("spawn command"));
    }
}
