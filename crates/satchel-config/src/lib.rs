//! Configuration system for satchel.
//!
//! Provides TOML-based configuration with:
//! - A `[session]` section selecting the storage backend (`[session.cache]` or
//!   `[session.sql]`)
//! - Cookie issuance settings (`[session.cookie]`)
//! - Config file layering (XDG user config + project-local overrides)
//! - Human-friendly time intervals (`"30s"`, `"1h"`, `"30d"`)

pub mod discovery;
pub mod error;
pub mod interval;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, save_config,
    xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use interval::{Interval, parse_interval};
pub use types::*;
