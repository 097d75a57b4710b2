//! Configuration loading and persistence for teletrim.
//!
//! Config is discovered from `./teletrim.{toml,yaml,yml,json}` or
//! `~/.config/teletrim/`, with `${ENV_VAR}` substitution applied to the raw
//! file contents before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        clear_config_dir, config_dir, discover_and_load, find_or_default_config_path, load_config,
        save_config, set_config_dir, update_config,
    },
    schema::{ClientConfig, Preferences, StorageConfig, TeletrimConfig, sessions_dir},
};
