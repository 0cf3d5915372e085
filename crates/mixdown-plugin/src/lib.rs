//! Mixdown Plugin - the plugin contract, plugin chains and built-in effects.

pub mod chain;
pub mod error;
pub mod plugin;
pub mod utility;

pub use chain::PluginChain;
pub use error::PluginError;
pub use plugin::{Plugin, PluginDescriptor, PluginKind};
pub use utility::{Utility, UtilityParams};
