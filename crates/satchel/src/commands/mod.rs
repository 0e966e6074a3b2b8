//! CLI command handlers.

pub mod config;
pub mod sessions;

use std::path::PathBuf;

use anyhow::{Result, bail};
use satchel_config::SatchelConfig;
use satchel_session::{SessionModule, SqlStore};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// The merged configuration.
    pub config: SatchelConfig,
    /// Config files that were loaded, lowest precedence first.
    pub sources: Vec<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Session module over the configured relational store.
    ///
    /// Units of work are always unmanaged here so every edit commits.
    pub fn session_module(&self) -> Result<(SessionModule, SqlStore)> {
        let mut session = self.config.session();
        let Some(section) = session.sql.as_mut() else {
            bail!("no [session.sql] section configured; the CLI only works on relational stores");
        };
        section.managed = false;

        let store = SqlStore::from_section(section)?;
        let module = SessionModule::new(session, None, Some(store.clone()))?;
        Ok((module, store))
    }
}
