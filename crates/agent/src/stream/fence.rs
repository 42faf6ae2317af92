//! Two-state fence detector: classifies stable text into Prose and Code
//! segments.
//!
//! The detector works on whole lines. A fence line is a line whose trimmed
//! content starts with at least three backticks; the opener may carry an
//! info string whose first word becomes the language tag. Text fed in may
//! stop mid-line. A trailing line that could still grow into a fence line is
//! held until its newline arrives (or until [`FenceDetector::finish`]).

use loomterm_core::segment::Segment;

/// Detector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceState {
    Prose,
    Code,
}

/// A parsed fence line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fence<'a> {
    ticks: usize,
    tag: Option<&'a str>,
}

impl Fence<'_> {
    fn is_bare(&self) -> bool {
        self.tag.is_none()
    }
}

/// Parse a line (without its newline) as a fence line.
fn parse_fence(line: &str) -> Option<Fence<'_>> {
    let trimmed = line.trim();
    let ticks = trimmed.chars().take_while(|&c| c == '`').count();
    if ticks < 3 {
        return None;
    }
    let info = trimmed[ticks..].trim();
    if info.contains('`') {
        return None;
    }
    Some(Fence {
        ticks,
        tag: info.split_whitespace().next(),
    })
}

/// Whether an incomplete line at a line start might still become a fence
/// line (or a blank line) once more text arrives.
pub fn could_become_fence(partial_line: &str) -> bool {
    let trimmed = partial_line.trim_start();
    trimmed.is_empty() || trimmed.chars().all(|c| c == '`') || trimmed.starts_with("```")
}

/// Whether the line starting with `line` is a fence line.
pub fn is_fence_line(line: &str) -> bool {
    parse_fence(line.strip_suffix('\n').unwrap_or(line)).is_some()
}

/// Incremental Prose/Code classifier.
#[derive(Debug)]
pub struct FenceDetector {
    state: FenceState,
    current: String,
    language: Option<String>,
    open_ticks: usize,
    nested: usize,
    partial: String,
    at_line_start: bool,
    paragraph_splits: bool,
    markers: Vec<String>,
}

impl Default for FenceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl FenceDetector {
    pub fn new() -> Self {
        Self {
            state: FenceState::Prose,
            current: String::new(),
            language: None,
            open_ticks: 0,
            nested: 0,
            partial: String::new(),
            at_line_start: true,
            paragraph_splits: false,
            markers: Vec::new(),
        }
    }

    /// End the current Prose segment at every blank line.
    pub fn with_paragraph_splits(mut self, enabled: bool) -> Self {
        self.paragraph_splits = enabled;
        self
    }

    pub fn state(&self) -> FenceState {
        self.state
    }

    /// Whether the next byte fed starts a new line.
    pub fn at_line_start(&self) -> bool {
        self.at_line_start
    }

    /// An incomplete line held back because it might be a fence line.
    pub fn partial_line(&self) -> &str {
        &self.partial
    }

    /// Fence marker text stripped so far, openers and closers alternating.
    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// How many trailing characters of `pending` a buffer must hold back so
    /// that a fence line is never classified before it is complete.
    ///
    /// `pending` is text not yet fed to this detector.
    pub fn reserve_tail(&self, pending: &str) -> usize {
        let (tail, at_start) = match pending.rfind('\n') {
            Some(idx) => (&pending[idx + 1..], true),
            None => (pending, self.at_line_start),
        };
        if at_start && could_become_fence(tail) {
            tail.chars().count()
        } else {
            0
        }
    }

    /// Consume stable text and return any segments it completes.
    pub fn feed(&mut self, text: &str) -> Vec<Segment> {
        let mut out = Vec::new();
        if text.is_empty() {
            return out;
        }

        let mut input = std::mem::take(&mut self.partial);
        input.push_str(text);

        let mut rest = input.as_str();
        while !rest.is_empty() {
            let (line, complete) = match rest.find('\n') {
                Some(idx) => (&rest[..=idx], true),
                None => (rest, false),
            };
            rest = &rest[line.len()..];

            if !complete && self.at_line_start && could_become_fence(line) {
                self.partial = line.to_string();
                break;
            }
            self.consume_line(line, complete, &mut out);
        }
        out
    }

    /// Append text verbatim without looking for fences.
    pub fn push_literal(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let held = std::mem::take(&mut self.partial);
        self.current.push_str(&held);
        self.current.push_str(text);
        self.at_line_start = text.ends_with('\n');
    }

    /// End the current Prose segment early.
    ///
    /// A held partial line is taken as literal text: the caller knows the
    /// line continues with something that is not fence syntax.
    pub fn cut(&mut self) -> Option<Segment> {
        if !self.partial.is_empty() {
            let held = std::mem::take(&mut self.partial);
            self.current.push_str(&held);
            self.at_line_start = false;
        }
        if self.state == FenceState::Prose && !self.current.is_empty() {
            Some(Segment::prose(std::mem::take(&mut self.current)))
        } else {
            None
        }
    }

    /// Mark that the current line continues past an element the detector
    /// never saw (a stripped tool block).
    pub fn continue_line(&mut self) {
        self.at_line_start = false;
    }

    /// Flush at end of stream.
    ///
    /// A held partial line is treated as a complete line. An unclosed Code
    /// block is closed implicitly. Afterwards the detector is back in its
    /// initial state.
    pub fn finish(&mut self) -> Vec<Segment> {
        let mut out = Vec::new();
        let held = std::mem::take(&mut self.partial);
        if !held.is_empty() {
            self.consume_line(&held, false, &mut out);
        }

        match self.state {
            FenceState::Code => {
                out.push(Segment::code(
                    std::mem::take(&mut self.current),
                    self.language.take(),
                ));
            }
            FenceState::Prose if !self.current.is_empty() => {
                out.push(Segment::prose(std::mem::take(&mut self.current)));
            }
            FenceState::Prose => {}
        }

        self.state = FenceState::Prose;
        self.open_ticks = 0;
        self.nested = 0;
        self.at_line_start = true;
        out
    }

    fn consume_line(&mut self, line: &str, complete: bool, out: &mut Vec<Segment>) {
        if !self.at_line_start {
            self.current.push_str(line);
            self.at_line_start = complete;
            return;
        }

        let content = line.strip_suffix('\n').unwrap_or(line);
        let fence = parse_fence(content);

        match (self.state, fence) {
            (FenceState::Prose, Some(fence)) => {
                out.push(Segment::prose(std::mem::take(&mut self.current)));
                self.state = FenceState::Code;
                self.language = fence.tag.map(str::to_string);
                self.open_ticks = fence.ticks;
                self.nested = 0;
                self.markers.push(line.to_string());
            }
            (FenceState::Prose, None) => {
                self.current.push_str(line);
                if self.paragraph_splits && complete && content.trim().is_empty() {
                    out.push(Segment::prose(std::mem::take(&mut self.current)));
                }
            }
            (FenceState::Code, Some(fence)) if fence.ticks >= self.open_ticks => {
                if !fence.is_bare() {
                    self.nested += 1;
                    self.current.push_str(line);
                } else if self.nested > 0 {
                    self.nested -= 1;
                    self.current.push_str(line);
                } else {
                    out.push(Segment::code(
                        std::mem::take(&mut self.current),
                        self.language.take(),
                    ));
                    self.state = FenceState::Prose;
                    self.markers.push(content.to_string());
                    if complete {
                        self.current.push('\n');
                    }
                }
            }
            (FenceState::Code, _) => {
                self.current.push_str(line);
            }
        }

        self.at_line_start = complete;
    }
}
