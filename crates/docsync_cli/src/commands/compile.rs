//! Query compilation command.

use docsync_query::QueryCompiler;
use serde_json::Value;

/// Compiles `query` and prints the native descriptor.
pub fn run(query: &str, identity_field: &str) -> Result<(), Box<dyn std::error::Error>> {
    let native = compile(query, identity_field)?;
    println!("{}", serde_json::to_string_pretty(&native)?);
    Ok(())
}

fn compile(query: &str, identity_field: &str) -> Result<Value, Box<dyn std::error::Error>> {
    let compiler = QueryCompiler::new().with_identity_field(identity_field);
    Ok(compiler.compile(query)?.to_json())
}
