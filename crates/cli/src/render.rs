//! Plain-text rendering of agent stream events.

use loomterm_agent::AgentStreamEvent;
use loomterm_core::segment::SegmentKind;
use loomterm_core::tool::ToolStatus;

/// Turns stream events into terminal text.
///
/// Prose is printed as it arrives. Code blocks get a language header and
/// a four-space indent. Tool transitions become one-line status rows.
#[derive(Debug)]
pub struct Renderer {
    at_line_start: bool,
}

impl Default for Renderer {
    fn default() -> Self {
        Self { at_line_start: true }
    }
}

impl Renderer {
    pub fn render(&mut self, event: &AgentStreamEvent) -> String {
        let mut out = String::new();
        match event {
            AgentStreamEvent::Segment {
                kind: SegmentKind::Prose,
                text,
                ..
            } => out.push_str(text),
            AgentStreamEvent::Segment {
                kind: SegmentKind::Code,
                text,
                language,
            } => {
                self.break_line(&mut out);
                out.push_str(&format!("  [{}]\n", language.as_deref().unwrap_or("code")));
                for line in text.lines() {
                    out.push_str("    ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
            AgentStreamEvent::ToolCall {
                name,
                status,
                input,
                output,
                error,
                ..
            } => {
                self.break_line(&mut out);
                let row = match status {
                    ToolStatus::Pending => format!("  > {name} {input}"),
                    ToolStatus::Running => format!("  ... {name} running"),
                    ToolStatus::Succeeded => format!(
                        "  ok {name} ({} chars)",
                        output.as_deref().map_or(0, |o| o.chars().count())
                    ),
                    ToolStatus::Failed => {
                        format!("  failed {name}: {}", error.as_deref().unwrap_or("unknown error"))
                    }
                };
                out.push_str(&row);
                out.push('\n');
            }
        }

        if let Some(last) = out.chars().last() {
            self.at_line_start = last == '\n';
        }
        out
    }

    /// Text that ends the current line if something is still open on it.
    pub fn finish(&mut self) -> &'static str {
        if self.at_line_start {
            ""
        } else {
            self.at_line_start = true;
            "\n"
        }
    }

    fn break_line(&self, out: &mut String) {
        if !self.at_line_start {
            out.push('\n');
        }
    }
}
