//! Config command - print the resolved configuration.

use anyhow::Result;
use console::{Style, style};

use super::Context;

/// Print the merged configuration and where it came from.
pub fn run(ctx: &Context) -> Result<()> {
    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&ctx.config)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{}", style("Configuration").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    if ctx.sources.is_empty() {
        println!("{}", dim.apply_to("No config files found, using defaults"));
    }
    for source in &ctx.sources {
        println!("{}", dim.apply_to(format!("loaded: {}", source.display())));
    }
    println!();

    let mut resolved = ctx.config.clone();
    resolved.session = Some(resolved.session());
    print!("{}", resolved.to_toml()?);
    Ok(())
}
