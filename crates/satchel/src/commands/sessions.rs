//! Session commands - inspect and edit stored sessions.

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use serde::Serialize;
use serde_json::Value;
use satchel_session::Session;

use super::Context;

/// A session identity.
#[derive(Args, Debug)]
pub struct IdArgs {
    /// Session identity
    pub id: String,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Session identity
    pub id: String,

    /// Key to set
    pub key: String,

    /// Value, as JSON (`42`, `"text"`, `{"a": 1}`) or a bare string
    pub value: String,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Session identity
    pub id: String,

    /// Key to delete
    pub key: String,
}

#[derive(Serialize)]
struct ListOutput<'a> {
    sessions: &'a [String],
    count: usize,
}

fn load(ctx: &Context, id: &str) -> Result<Session> {
    let (module, _) = ctx.session_module()?;
    let session = module.load(Some(id))?;
    if session.id().is_none() {
        bail!("no session with id {id}");
    }
    Ok(session)
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Print a session's contents.
pub fn show(args: IdArgs, ctx: &Context) -> Result<()> {
    let mut session = load(ctx, &args.id)?;
    let data = session.snapshot()?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{} {}", style("Session").bold(), dim.apply_to(&args.id));
    println!("{}", dim.apply_to("─".repeat(50)));
    if data.is_empty() {
        println!("{}", dim.apply_to("(empty)"));
    }
    for (key, value) in &data {
        println!("{} = {}", style(key).cyan(), value);
    }
    Ok(())
}

/// Print a session's keys.
pub fn keys(args: IdArgs, ctx: &Context) -> Result<()> {
    let mut session = load(ctx, &args.id)?;
    let keys = session.keys()?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&keys)?);
    } else {
        for key in keys {
            println!("{key}");
        }
    }
    Ok(())
}

/// Set one key and commit.
pub fn set(args: SetArgs, ctx: &Context) -> Result<()> {
    let mut session = load(ctx, &args.id)?;
    let value = parse_value(&args.value);
    if ctx.verbose {
        let dim = Style::new().dim();
        eprintln!("{}", dim.apply_to(format!("Parsed value: {value}")));
    }
    session.set(args.key.as_str(), value)?;
    session.store()?;

    if !ctx.json_output {
        let green = Style::new().green();
        println!("{} Set {} on {}", green.apply_to("✓"), args.key, args.id);
    }
    Ok(())
}

/// Delete one key and commit.
pub fn delete(args: DeleteArgs, ctx: &Context) -> Result<()> {
    let mut session = load(ctx, &args.id)?;
    if !session.contains(&args.key)? {
        bail!("session {} has no key {}", args.id, args.key);
    }
    session.delete(&args.key)?;
    session.store()?;

    if !ctx.json_output {
        let green = Style::new().green();
        println!("{} Deleted {} from {}", green.apply_to("✓"), args.key, args.id);
    }
    Ok(())
}

/// List stored session identities.
pub fn list(ctx: &Context) -> Result<()> {
    let (_, store) = ctx.session_module()?;
    let ids = store.list_ids()?;

    if ctx.json_output {
        let output = ListOutput {
            sessions: &ids,
            count: ids.len(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{}", style("Sessions").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    if ids.is_empty() {
        println!("{}", dim.apply_to("No sessions stored"));
    }
    for id in &ids {
        println!("{id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("{\"a\": [1]}"), json!({"a": [1]}));
        assert_eq!(parse_value("\"quoted\""), json!("quoted"));
        assert_eq!(parse_value("plain text"), json!("plain text"));
    }
}
