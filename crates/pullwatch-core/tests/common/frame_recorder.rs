//! Output sink that records every flushed frame for assertions.
//!
//! The renderer writes one buffer and flushes once per frame, so each flush
//! closes a frame. Writes can be made to fail to exercise error handling.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Recorded {
    pending: Vec<u8>,
    frames: Vec<String>,
    fail_writes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FrameRecorder {
    inner: Arc<Mutex<Recorded>>,
}

impl FrameRecorder {
    /// Recorder whose first `n` writes fail with `BrokenPipe`.
    pub fn failing_first(n: usize) -> Self {
        let rec = Self::default();
        rec.inner.lock().unwrap().fail_writes = n;
        rec
    }

    pub fn frames(&self) -> Vec<String> {
        self.inner.lock().unwrap().frames.clone()
    }

    pub fn frame_count(&self) -> usize {
        self.inner.lock().unwrap().frames.len()
    }
}

impl Write for FrameRecorder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_writes > 0 {
            inner.fail_writes -= 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "terminal went away"));
        }
        inner.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.pending.is_empty() {
            let frame = String::from_utf8_lossy(&inner.pending).into_owned();
            inner.pending.clear();
            inner.frames.push(frame);
        }
        Ok(())
    }
}

/// Frame text without the leading cursor-up/erase sequence.
pub fn strip_erase(frame: &str) -> &str {
    match frame.find("\x1b[J") {
        Some(i) => &frame[i + 3..],
        None => frame,
    }
}

/// `(name, status)` for each job row of a frame, in display order.
pub fn row_states(frame: &str) -> Vec<(String, String)> {
    strip_erase(frame)
        .lines()
        .skip(1)
        .filter(|l| !l.starts_with("elapsed:"))
        .filter_map(|l| {
            let mut parts = l.split_whitespace();
            Some((parts.next()?.to_string(), parts.next()?.to_string()))
        })
        .collect()
}

/// Status of the row named `name`, if the frame has one.
pub fn status_of(frame: &str, name: &str) -> Option<String> {
    row_states(frame)
        .into_iter()
        .find(|(n, _)| n == name)
        .map(|(_, s)| s)
}
