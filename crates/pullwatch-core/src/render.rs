//! In-place progress table.
//!
//! Each frame is a header line (reference and resolve state), one line per
//! job in discovery order, and an optional totals footer. Before drawing,
//! the renderer moves the cursor back over the previous frame and clears to
//! the end of the screen so the table updates in place.

use std::io::{self, Write};
use std::time::Duration;

use console::{pad_str, truncate_str, Alignment};
use human_bytes::human_bytes;
use tokio::time::Instant;

use crate::config::ProgressConfig;
use crate::sampler::{DisplayRow, JobState};

const STATUS_WIDTH: usize = 11;
const PROGRESS_WIDTH: usize = 30;
const ELAPSED_WIDTH: usize = 7;
/// Columns a row needs besides the name: three gaps, status, progress, elapsed.
const FIXED_COLUMNS: usize = 2 + STATUS_WIDTH + 2 + PROGRESS_WIDTH + 2 + ELAPSED_WIDTH;
const MIN_NAME_WIDTH: usize = 8;
/// Line width used when the output is not a terminal.
pub const FALLBACK_LINE_WIDTH: usize = 80;

/// Cursor to the start of the line `lines` rows up, then clear to end of screen.
pub fn erase_sequence(lines: usize) -> String {
    if lines == 0 {
        String::new()
    } else {
        format!("\x1b[{lines}F\x1b[J")
    }
}

/// Columns of the terminal on stdout, or [`FALLBACK_LINE_WIDTH`] when
/// stdout is not a tty.
pub fn terminal_width() -> usize {
    console::Term::stdout()
        .size_checked()
        .map(|(_rows, cols)| usize::from(cols))
        .filter(|&cols| cols > 0)
        .unwrap_or(FALLBACK_LINE_WIDTH)
}

/// What the header line shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub reference: String,
    pub resolved: bool,
}

fn format_secs(d: Duration) -> String {
    format!("{:.1}s", d.as_secs_f64())
}

fn progress_column(state: &JobState) -> String {
    match *state {
        JobState::Waiting => String::new(),
        JobState::Downloading { done, total } => {
            let pct = state.fraction().unwrap_or(0.0) * 100.0;
            format!(
                "{} / {} ({:.0}%)",
                human_bytes(done as f64),
                human_bytes(total as f64),
                pct
            )
        }
        JobState::Done { size } | JobState::Exists { size } => human_bytes(size as f64),
    }
}

/// Lay out one frame as text lines (no trailing newlines, no escapes).
///
/// No line is wider than `line_width` columns, so every line occupies exactly
/// one terminal row and the erase sequence covers the whole frame. The name
/// column gives up space first; anything still too wide is cut with `…`.
pub fn format_frame(
    header: &FrameHeader,
    rows: &[DisplayRow],
    elapsed: Duration,
    name_width: usize,
    show_totals: bool,
    line_width: usize,
) -> Vec<String> {
    let line_width = line_width.max(1);
    let name_width = name_width
        .min(line_width.saturating_sub(FIXED_COLUMNS))
        .max(MIN_NAME_WIDTH);
    let mut lines = Vec::with_capacity(rows.len() + 2);
    let resolve = if header.resolved { "resolved" } else { "resolving" };
    lines.push(
        format!(
            "{}  {:<sw$}",
            pad_str(&header.reference, name_width, Alignment::Left, Some("…")),
            resolve,
            sw = STATUS_WIDTH
        )
        .trim_end()
        .to_string(),
    );

    for row in rows {
        let line = format!(
            "{}  {:<sw$}  {:<pw$}  {:>ew$}",
            pad_str(&row.name, name_width, Alignment::Left, Some("…")),
            row.state.token(),
            progress_column(&row.state),
            format_secs(row.elapsed),
            sw = STATUS_WIDTH,
            pw = PROGRESS_WIDTH,
            ew = ELAPSED_WIDTH
        );
        lines.push(line.trim_end().to_string());
    }

    if show_totals {
        let total: u64 = rows.iter().map(|r| r.state.bytes()).sum();
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 { total as f64 / secs } else { 0.0 };
        lines.push(format!(
            "elapsed: {}  total: {} ({}/s)",
            format_secs(elapsed),
            human_bytes(total as f64),
            human_bytes(rate)
        ));
    }
    lines
        .into_iter()
        .map(|line| truncate_str(&line, line_width, "…").trim_end().to_string())
        .collect()
}

/// Redraws frames in place on `out`.
pub struct ProgressRenderer<W: Write> {
    out: W,
    name_width: usize,
    show_totals: bool,
    line_width: usize,
    lines_drawn: usize,
    frames: usize,
}

impl<W: Write> ProgressRenderer<W> {
    pub fn new(out: W, name_width: usize, show_totals: bool) -> Self {
        Self {
            out,
            name_width: name_width.max(MIN_NAME_WIDTH),
            show_totals,
            line_width: FALLBACK_LINE_WIDTH,
            lines_drawn: 0,
            frames: 0,
        }
    }

    /// Renderer for `cfg`. A `max_line_width` of 0 means the width of the
    /// terminal on stdout.
    pub fn from_config(out: W, cfg: &ProgressConfig) -> Self {
        let width = match cfg.max_line_width {
            0 => terminal_width(),
            w => w,
        };
        Self::new(out, cfg.name_width, cfg.show_totals).with_line_width(width)
    }

    pub fn with_line_width(mut self, width: usize) -> Self {
        self.line_width = width.max(1);
        self
    }

    /// Frames successfully written so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Lines occupied by the last successfully written frame.
    pub fn lines_drawn(&self) -> usize {
        self.lines_drawn
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Erase the previous frame and draw a new one. The frame goes out in a
    /// single write followed by a flush. On error the previous line count is
    /// kept and the caller decides whether to continue.
    ///
    /// Best effort on partial writes: if `write_all` fails midway, part of the
    /// new frame may already be on screen while the line count still describes
    /// the previous frame, so the next erase can be off by those lines.
    pub fn render(&mut self, header: &FrameHeader, rows: &[DisplayRow], since: Instant) -> io::Result<()> {
        let lines = format_frame(
            header,
            rows,
            Instant::now().saturating_duration_since(since),
            self.name_width,
            self.show_totals,
            self.line_width,
        );
        let mut buf = erase_sequence(self.lines_drawn);
        for line in &lines {
            buf.push_str(line);
            buf.push('\n');
        }
        self.out.write_all(buf.as_bytes())?;
        self.out.flush()?;
        self.lines_drawn = lines.len();
        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, state: JobState) -> DisplayRow {
        DisplayRow {
            name: name.to_string(),
            state,
            elapsed: Duration::from_millis(1500),
        }
    }

    fn header() -> FrameHeader {
        FrameHeader {
            reference: "docker.io/library/alpine:3.20".to_string(),
            resolved: true,
        }
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn erase_sequence_is_empty_for_nothing_drawn() {
        assert_eq!(erase_sequence(0), "");
        assert_eq!(erase_sequence(3), "\x1b[3F\x1b[J");
    }

    #[test]
    fn frame_lists_rows_in_order_with_tokens() {
        let rows = vec![
            row("layer-a", JobState::Done { size: 2048 }),
            row("layer-b", JobState::Downloading { done: 512, total: 1024 }),
            row("layer-c", JobState::Waiting),
        ];
        let lines = format_frame(&header(), &rows, Duration::from_secs(2), 32, true, 120);
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("docker.io/library/alpine:3.20"));
        assert!(lines[0].ends_with("resolved"));
        let tokens: Vec<(&str, &str)> = lines[1..4]
            .iter()
            .map(|l| {
                let mut parts = l.split_whitespace();
                (parts.next().unwrap(), parts.next().unwrap())
            })
            .collect();
        assert_eq!(
            tokens,
            vec![
                ("layer-a", "done"),
                ("layer-b", "downloading"),
                ("layer-c", "waiting")
            ]
        );
        assert!(lines[2].contains("(50%)"));
        assert!(lines[1].ends_with("1.5s"));
        assert!(lines[4].starts_with("elapsed: 2.0s"));
    }

    #[test]
    fn long_names_are_elided_to_width() {
        let long = "layer-sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";
        let lines = format_frame(
            &header(),
            &[row(long, JobState::Waiting)],
            Duration::ZERO,
            24,
            false,
            120,
        );
        assert_eq!(lines.len(), 2);
        let name = lines[1].split_whitespace().next().unwrap();
        assert!(name.ends_with('…'));
        assert_eq!(console::measure_text_width(name), 24);
    }

    #[test]
    fn unresolved_header_says_resolving() {
        let h = FrameHeader {
            reference: "img".to_string(),
            resolved: false,
        };
        let lines = format_frame(&h, &[], Duration::ZERO, 10, false, 80);
        assert_eq!(lines, vec!["img         resolving".to_string()]);
    }

    #[test]
    fn default_layout_fits_an_80_column_terminal() {
        let cfg = ProgressConfig::default();
        let rows = vec![
            row(
                "layer-sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
                JobState::Downloading {
                    done: 1_468_006,
                    total: 4_194_304,
                },
            ),
            row("config-sha256:ab", JobState::Waiting),
            row("manifest-sha256:cd", JobState::Exists { size: 1024 }),
        ];
        let lines = format_frame(
            &header(),
            &rows,
            Duration::from_secs(12),
            cfg.name_width,
            true,
            FALLBACK_LINE_WIDTH,
        );
        assert_eq!(lines.len(), 5);
        for line in &lines {
            assert!(
                console::measure_text_width(line) <= FALLBACK_LINE_WIDTH,
                "{} columns: {line}",
                console::measure_text_width(line)
            );
        }
        // The name column shrinks before the elapsed column is cut.
        assert!(lines[1].ends_with("1.5s"));
        assert!(lines[1].contains("(35%)"));
    }

    #[test]
    fn very_narrow_width_cuts_every_line() {
        let rows = vec![row("layer-a", JobState::Done { size: 2048 })];
        let lines = format_frame(&header(), &rows, Duration::from_secs(1), 40, true, 30);
        for line in &lines {
            assert!(console::measure_text_width(line) <= 30, "{line}");
        }
        assert!(lines[1].starts_with("layer-a"));
        assert!(lines[1].ends_with('…'));
    }

    #[tokio::test]
    async fn renderer_keeps_lines_within_its_width() {
        let mut r = ProgressRenderer::new(Vec::new(), 40, true).with_line_width(60);
        let long = "layer-sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";
        r.render(&header(), &[row(long, JobState::Waiting)], Instant::now())
            .unwrap();
        let out = String::from_utf8(r.into_inner()).unwrap();
        assert_eq!(out.lines().count(), 3);
        for line in out.lines() {
            assert!(console::measure_text_width(line) <= 60, "{line}");
        }
    }

    #[tokio::test]
    async fn first_frame_does_not_erase_and_next_erases_previous_lines() {
        let mut r = ProgressRenderer::new(Vec::new(), 16, true);
        let start = Instant::now();
        r.render(&header(), &[row("a", JobState::Waiting)], start).unwrap();
        assert_eq!(r.lines_drawn(), 3);
        let first_len = r.out.len();
        assert!(!r.out.starts_with(b"\x1b["));

        r.render(
            &header(),
            &[row("a", JobState::Waiting), row("b", JobState::Waiting)],
            start,
        )
        .unwrap();
        assert_eq!(r.frames(), 2);
        assert_eq!(r.lines_drawn(), 4);
        let out = r.into_inner();
        assert!(out[first_len..].starts_with(b"\x1b[3F\x1b[J"));
    }

    #[tokio::test]
    async fn write_failure_is_reported_and_not_counted() {
        let mut r = ProgressRenderer::new(FailingWriter, 16, false);
        let err = r
            .render(&header(), &[row("a", JobState::Waiting)], Instant::now())
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(r.frames(), 0);
        assert_eq!(r.lines_drawn(), 0);
    }
}
