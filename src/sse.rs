//! Event-stream frame parsing.
//!
//! Groups physical lines of a `text/event-stream` body into [`SseFrame`]s.
//! A blank line terminates the current frame. Inside a frame only the
//! `event: `, `data: ` and `id: ` prefixes are recognised (exactly one space
//! after the colon); every other line, including `:` comments, is ignored.
//!
//! Multiple `data: ` lines accumulate, joined by `\n`:
//!
//! ```
//! use streamable_http_transport::sse::parse_frames;
//!
//! let frames = parse_frames(["event: message", "data: line one", "data: line two", ""]);
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].data, "line one\nline two");
//! ```

const EVENT_PREFIX: &str = "event: ";
const DATA_PREFIX: &str = "data: ";
const ID_PREFIX: &str = "id: ";

/// Event type carrying protocol payloads.
pub const MESSAGE_EVENT: &str = "message";

/// One blank-line-delimited event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `id: ` line, if the frame had one.
    pub id: Option<String>,
    /// Value of the `event: ` line. Empty when absent.
    pub event: String,
    /// Accumulated `data: ` lines joined by `\n`.
    pub data: String,
}

impl SseFrame {
    /// Returns `true` if this frame carries a protocol payload.
    pub fn is_message(&self) -> bool {
        self.event == MESSAGE_EVENT
    }

    /// The frame id, if present and non-empty.
    pub fn resumption_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Incremental frame parser, fed one physical line at a time.
#[derive(Debug, Default)]
pub struct FrameParser {
    id: Option<String>,
    event: String,
    data: String,
    has_content: bool,
}

impl FrameParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its terminator).
    ///
    /// Returns the completed frame when `line` is the blank line closing it.
    pub fn push_line(&mut self, line: &str) -> Option<SseFrame> {
        let line = line.trim();
        if line.is_empty() {
            return self.take_frame();
        }

        if let Some(event) = line.strip_prefix(EVENT_PREFIX) {
            self.event = event.trim().to_string();
        } else if let Some(data) = line.strip_prefix(DATA_PREFIX) {
            self.data.push_str(data);
            self.data.push('\n');
        } else if let Some(id) = line.strip_prefix(ID_PREFIX) {
            self.id = Some(id.trim().to_string());
        } else {
            tracing::trace!(line, "ignoring unrecognised event-stream line");
            return None;
        }
        self.has_content = true;
        None
    }

    /// Flush a frame left open when the body ended without a trailing blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        self.take_frame()
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        if !std::mem::take(&mut self.has_content) {
            return None;
        }
        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }
        Some(SseFrame {
            id: self.id.take(),
            event: std::mem::take(&mut self.event),
            data,
        })
    }
}

/// Parse a complete line sequence into frames.
pub fn parse_frames<I, S>(lines: I) -> Vec<SseFrame>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parser = FrameParser::new();
    let mut frames: Vec<SseFrame> = lines
        .into_iter()
        .filter_map(|line| parser.push_line(line.as_ref()))
        .collect();
    frames.extend(parser.finish());
    frames
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn single_frame_with_all_fields() {
        let frames = parse_frames(["event: message", r#"data: {"a":1}"#, "id: 7", ""]);
        assert_eq!(
            frames,
            vec![SseFrame {
                id: Some("7".into()),
                event: "message".into(),
                data: r#"{"a":1}"#.into(),
            }]
        );
    }

    #[test]
    fn multi_line_data_accumulates() {
        let frames = parse_frames(["event: message", "data: [", "data: 1,", "data: 2]", ""]);
        assert_eq!(frames[0].data, "[\n1,\n2]");
    }

    #[test]
    fn blank_lines_separate_frames() {
        let frames = parse_frames([
            "event: message",
            "data: one",
            "",
            "event: message",
            "data: two",
            "",
        ]);
        let data: Vec<_> = frames.iter().map(|f| f.data.as_str()).collect();
        assert_eq!(data, vec!["one", "two"]);
    }

    #[test]
    fn id_does_not_leak_into_next_frame() {
        let frames = parse_frames(["id: 1", "data: a", "", "data: b", ""]);
        assert_eq!(frames[0].id.as_deref(), Some("1"));
        assert_eq!(frames[1].id, None);
    }

    #[test]
    fn frame_without_event_has_empty_type() {
        let frames = parse_frames(["data: keepalive", ""]);
        assert_eq!(frames[0].event, "");
        assert!(!frames[0].is_message());
    }

    #[test]
    fn unknown_lines_and_comments_are_ignored() {
        let frames = parse_frames([": ping", "retry: 1000", "event: message", "data: x", ""]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn comment_only_block_produces_no_frame() {
        assert!(parse_frames([": keep-alive", "", "", ""]).is_empty());
    }

    #[test]
    fn prefix_requires_exactly_one_space() {
        let frames = parse_frames(["event:message", "data:x", "event: message", "data: y", ""]);
        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, "y");
    }

    #[test]
    fn lines_are_trimmed_before_matching() {
        let frames = parse_frames(["  event: message  ", "\tdata: padded ", "id:  9 ", ""]);
        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, "padded");
        // "id:  9" after trimming still starts with "id: ", the value is trimmed.
        assert_eq!(frames[0].id.as_deref(), Some("9"));
    }

    #[test]
    fn trailing_frame_is_flushed_at_end() {
        let frames = parse_frames(["event: message", "data: tail"]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "tail");
    }

    #[test]
    fn empty_data_line_is_dropped_by_trimming() {
        // "data: " trims to "data:", which no longer carries the prefix.
        let frames = parse_frames(["event: message", "data: a", "data: ", ""]);
        assert_eq!(frames[0].data, "a");
    }

    #[test]
    fn empty_id_is_not_a_resumption_id() {
        let frames = parse_frames(["event: message", "id: ", "data: x", ""]);
        // "id: " trims to "id:" and is ignored entirely.
        assert_eq!(frames[0].resumption_id(), None);
        let frame = SseFrame {
            id: Some(String::new()),
            ..SseFrame::default()
        };
        assert_eq!(frame.resumption_id(), None);
    }

    #[test]
    fn incremental_parser_matches_batch_parser() {
        let lines = ["event: message", "data: a", "id: 3", "", "event: ping", ""];
        let mut parser = FrameParser::new();
        let incremental: Vec<_> = lines.iter().filter_map(|l| parser.push_line(l)).collect();
        assert_eq!(incremental, parse_frames(lines));
    }
}
