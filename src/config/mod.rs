//! Layered configuration
//!
//! Three layers, later layers win:
//! 1. Built-in defaults
//! 2. Config file (`--config`, or `$RESOURCE_CACHE_CONFIG`)
//! 3. CLI flags

mod defaults;
mod effective;
mod merge;

pub use defaults::BuiltinDefaults;
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers};
