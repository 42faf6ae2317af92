//! System prompt assembly: base instructions plus the tool catalogue and
//! the tool-call grammar.

use loomterm_core::tool::ToolRegistry;

use crate::stream::{TOOL_CLOSE, TOOL_OPEN};

/// Used when the configuration does not override it.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are loomterm, an assistant running in the user's terminal. \
Answer concisely. Put code in fenced blocks with a language tag. \
Use the available tools to inspect or change the user's files instead of guessing.";

/// Render the tool catalogue and calling convention.
///
/// Returns an empty string when no tools are registered.
pub fn tool_section(registry: &ToolRegistry) -> String {
    if registry.is_empty() {
        return String::new();
    }

    let catalogue = registry
        .defs()
        .map(|def| {
            let entry = serde_json::json!({
                "name": def.name,
                "description": def.description,
                "parameters": def.input_schema.to_json_schema(),
            });
            format!("<tool>{entry}</tool>")
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "\n\n# Tools\n\
         You may call one or more tools to help with the request.\n\
         Available tools, in JSON Schema format:\n\n\
         <tools>\n{catalogue}\n</tools>\n\n\
         To call tools, write a block like this outside any code fence:\n\n\
         {TOOL_OPEN}\n\
         <invoke name=\"tool-name\">\n\
         <parameter name=\"param-key\">param-value</parameter>\n\
         </invoke>\n\
         {TOOL_CLOSE}\n\n\
         One block may hold several invokes. Results come back in a message of \
         <tool_result> entries, one per call, in the same order."
    )
}

/// Full system prompt: `base` (or the default) followed by the tool section.
pub fn system_prompt(base: Option<&str>, registry: &ToolRegistry) -> String {
    let mut prompt = base.unwrap_or(DEFAULT_SYSTEM_PROMPT).to_string();
    prompt.push_str(&tool_section(registry));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use loomterm_core::error::ToolError;
    use loomterm_core::schema::{FieldType, InputSchema};
    use loomterm_core::tool::Tool;
    use serde_json::{Map, Value};
    use std::sync::Arc;

    struct Fetch;

    #[async_trait]
    impl Tool for Fetch {
        fn name(&self) -> &str { "web_fetch" }
        fn description(&self) -> &str { "Fetch a URL" }
        fn input_schema(&self) -> InputSchema {
            InputSchema::new().required("url", FieldType::String, "URL")
        }
        async fn invoke(&self, _input: &Map<String, Value>) -> Result<String, ToolError> {
            Ok(String::new())
        }
    }

    #[test]
    fn no_tools_means_no_section() {
        assert_eq!(system_prompt(Some("base"), &ToolRegistry::new()), "base");
    }

    #[test]
    fn lists_tools_and_grammar() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Fetch)).unwrap();
        let prompt = system_prompt(None, &registry);
        assert!(prompt.starts_with(DEFAULT_SYSTEM_PROMPT));
        assert!(prompt.contains(r#""name":"web_fetch""#));
        assert!(prompt.contains(r#""required":["url"]"#));
        assert!(prompt.contains("<tool_call>\n<invoke name=\"tool-name\">"));
    }
}
