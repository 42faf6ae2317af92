//! `loomterm tools` — list the tools the agent can call.

use std::path::Path;

use loomterm_core::tool::ToolRegistry;

use super::load_config;

pub fn run(explicit: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(explicit)?;
    let registry = loomterm_tools::default_registry(&config.tools)?;
    print!("{}", describe(&registry));
    Ok(())
}

fn describe(registry: &ToolRegistry) -> String {
    if registry.is_empty() {
        return "No tools enabled.\n".into();
    }
    let mut out = String::new();
    for def in registry.defs() {
        let marker = if def.mutating { " (mutating)" } else { "" };
        out.push_str(&format!("{}{marker}\n    {}\n", def.name, def.description));
        for field in def.input_schema.fields() {
            let required = if field.required { "required" } else { "optional" };
            out.push_str(&format!(
                "    - {}: {}, {required}. {}\n",
                field.name, field.kind, field.description
            ));
        }
        out.push('\n');
    }
    out
}
