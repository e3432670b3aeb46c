//! # hookgate-settings
//!
//! Configuration management with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`HookgateSettings::default()`]
//! 2. **User file**: `~/.hookgate/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `HOOKGATE_*` overrides (highest priority)
//!
//! Settings are loaded once at startup and passed by reference to the
//! components that need them; there is no global settings singleton.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
