//! Line input that can be abandoned.
//!
//! Lines are produced by a single reader for the whole session and handed
//! over a channel, so a read that times out simply stops waiting on the
//! channel; the next read picks up where the reader left off.
//!
//! Stdin is read on a dedicated, detached OS thread rather than Tokio's
//! blocking pool. A blocking-pool read would keep the runtime from shutting
//! down while it waits for a line that may never come; a detached thread is
//! torn down with the process.

use std::io::BufRead;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Lines buffered ahead of the reader.
const LINE_BUFFER: usize = 16;

/// Outcome of one read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Line(String),
    TimedOut,
    Closed,
}

pub struct InputReader {
    lines: mpsc::Receiver<std::io::Result<String>>,
}

impl InputReader {
    /// Read the process's stdin.
    pub fn stdin() -> Self {
        Self::from_blocking(std::io::BufReader::new(std::io::stdin()))
    }

    /// Read lines from a blocking source on a detached thread.
    ///
    /// The thread exits once the source ends or the reader is dropped and
    /// another line arrives; nothing ever joins it.
    pub fn from_blocking(source: impl BufRead + Send + 'static) -> Self {
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        let spawned = std::thread::Builder::new()
            .name("quiz-input".to_string())
            .spawn(move || {
                for line in source.lines() {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
            });
        if let Err(e) = spawned {
            // The sender was dropped with the closure, so reads see Closed.
            warn!(error = %e, "Failed to start input thread");
        }
        Self { lines: rx }
    }

    /// Read lines from an async source on a Tokio task.
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                let next = match lines.next_line().await {
                    Ok(Some(line)) => Ok(line),
                    Ok(None) => break,
                    Err(e) => Err(e),
                };
                let failed = next.is_err();
                if tx.send(next).await.is_err() || failed {
                    break;
                }
            }
        });
        Self { lines: rx }
    }

    /// Read one trimmed line, giving up after `timeout` if one is set.
    pub async fn read_line(&mut self, timeout: Option<Duration>) -> Input {
        let next = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.lines.recv()).await {
                Ok(next) => next,
                Err(_) => {
                    debug!(?limit, "Input timed out");
                    return Input::TimedOut;
                }
            },
            None => self.lines.recv().await,
        };

        match next {
            Some(Ok(line)) => Input::Line(line.trim().to_string()),
            Some(Err(e)) => {
                warn!(error = %e, "Failed to read input");
                Input::Closed
            }
            None => Input::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_trimmed_lines_then_closes() {
        let mut reader = InputReader::from_reader(&b" 2 \nd\n"[..]);
        assert_eq!(reader.read_line(None).await, Input::Line("2".into()));
        assert_eq!(reader.read_line(None).await, Input::Line("d".into()));
        assert_eq!(reader.read_line(None).await, Input::Closed);
    }

    #[tokio::test]
    async fn test_timeout_does_not_lose_later_input() {
        let (client, server) = tokio::io::duplex(64);
        let mut reader = InputReader::from_reader(server);

        let first = reader.read_line(Some(Duration::from_millis(20))).await;
        assert_eq!(first, Input::TimedOut);

        let mut client = client;
        tokio::io::AsyncWriteExt::write_all(&mut client, b"3\n")
            .await
            .unwrap();
        let second = reader.read_line(Some(Duration::from_secs(5))).await;
        assert_eq!(second, Input::Line("3".into()));
    }

    #[tokio::test]
    async fn test_blocking_source_is_read_on_its_own_thread() {
        let source = std::io::Cursor::new(b"1\n\n  x  \n".to_vec());
        let mut reader = InputReader::from_blocking(source);
        assert_eq!(reader.read_line(None).await, Input::Line("1".into()));
        assert_eq!(reader.read_line(None).await, Input::Line(String::new()));
        assert_eq!(reader.read_line(None).await, Input::Line("x".into()));
        assert_eq!(reader.read_line(None).await, Input::Closed);
    }

    #[cfg(unix)]
    #[test]
    fn test_blocked_source_does_not_hold_up_runtime_shutdown() {
        // A pipe whose write end stays open never yields a line or EOF.
        let (read_end, _write_end) = std::os::unix::net::UnixStream::pair().unwrap();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let started = std::time::Instant::now();
        let input = runtime.block_on(async {
            let mut reader = InputReader::from_blocking(std::io::BufReader::new(read_end));
            reader.read_line(Some(Duration::from_millis(20))).await
        });
        drop(runtime);

        assert_eq!(input, Input::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
