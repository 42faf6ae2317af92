//! Segments — classified spans of streamed response text.

use serde::{Deserialize, Serialize};

/// Whether a segment is ordinary prose or the body of a fenced code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Prose,
    Code,
}

/// An ordered, immutable span of a model response.
///
/// Code segments never include their fence markers; the opening fence's
/// language tag is kept in `language`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub kind: SegmentKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Segment {
    pub fn prose(text: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::Prose,
            text: text.into(),
            language: None,
        }
    }

    pub fn code(text: impl Into<String>, language: Option<String>) -> Self {
        Self {
            kind: SegmentKind::Code,
            text: text.into(),
            language,
        }
    }

    pub fn is_code(&self) -> bool {
        self.kind == SegmentKind::Code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_segment_serializes_language() {
        let seg = Segment::code("print(1)\n", Some("py".into()));
        let json = serde_json::to_string(&seg).unwrap();
        assert!(json.contains(r#""kind":"code""#));
        assert!(json.contains(r#""language":"py""#));
    }

    #[test]
    fn prose_segment_omits_language() {
        let json = serde_json::to_string(&Segment::prose("hi")).unwrap();
        assert!(!json.contains("language"));
    }
}
