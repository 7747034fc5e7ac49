use tokio::sync::Mutex;

const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Append-only capture of one output stream, capped at `max_bytes`.
///
/// Bytes past the cap are dropped rather than rotated, so every read is a
/// prefix of every later read.
pub(crate) struct LogBuffer {
    max_bytes: usize,
    inner: Mutex<LogInner>,
}

#[derive(Default)]
struct LogInner {
    bytes: Vec<u8>,
    truncated: bool,
}

impl LogBuffer {
    pub(crate) fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            inner: Mutex::new(LogInner::default()),
        }
    }

    pub(crate) async fn append(&self, chunk: &[u8]) {
        let mut inner = self.inner.lock().await;
        if inner.bytes.len() < self.max_bytes {
            let remaining = self.max_bytes - inner.bytes.len();
            let to_copy = remaining.min(chunk.len());
            inner.bytes.extend_from_slice(&chunk[..to_copy]);
            if to_copy < chunk.len() {
                inner.truncated = true;
            }
        } else if !chunk.is_empty() {
            inner.truncated = true;
        }
    }

    pub(crate) async fn read(&self) -> (Vec<u8>, bool) {
        let inner = self.inner.lock().await;
        (inner.bytes.clone(), inner.truncated)
    }
}

/// Output captured from a job so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedLogs {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
}

impl CapturedLogs {
    pub(crate) async fn collect(stdout: &LogBuffer, stderr: &LogBuffer) -> Self {
        let (stdout, stdout_truncated) = stdout.read().await;
        let (stderr, stderr_truncated) = stderr.read().await;
        Self {
            stdout,
            stderr,
            stdout_truncated,
            stderr_truncated,
        }
    }

    pub fn stdout_text(&self) -> String {
        format_output(&self.stdout, self.stdout_truncated)
    }

    pub fn stderr_text(&self) -> String {
        format_output(&self.stderr, self.stderr_truncated)
    }
}

fn format_output(bytes: &[u8], truncated: bool) -> String {
    let mut out = String::from_utf8_lossy(bytes).to_string();
    if truncated {
        out.push_str(TRUNCATION_MARKER);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_stops_at_cap_and_marks_truncation() {
        let buffer = LogBuffer::new(8);
        buffer.append(b"hello").await;
        buffer.append(b" world").await;
        let (bytes, truncated) = buffer.read().await;
        assert_eq!(bytes, b"hello wo");
        assert!(truncated);

        buffer.append(b"more").await;
        let (after, _) = buffer.read().await;
        assert_eq!(after, bytes);
    }

    #[tokio::test]
    async fn text_views_mark_truncation() {
        let stdout = LogBuffer::new(4);
        let stderr = LogBuffer::new(64);
        stdout.append(b"abcdef").await;
        stderr.append(b"warn").await;
        let logs = CapturedLogs::collect(&stdout, &stderr).await;
        assert_eq!(logs.stdout_text(), "abcd\n[output truncated]");
        assert_eq!(logs.stderr_text(), "warn");
    }
}
