use autoapply_tools::ToolRegistry;

pub fn run() -> anyhow::Result<()> {
    let registry = ToolRegistry::with_defaults();
    for name in registry.tool_names() {
        if let Some(tool) = registry.get(&name) {
            let schema = tool.schema();
            let summary = schema
                .description
                .split_once(". ")
                .map(|(first, _)| first)
                .unwrap_or(schema.description);
            println!("{:<16} {}", schema.name, summary);
        }
    }
    Ok(())
}
