//! Configuration management module
//!
//! Process settings from the environment, the JSON config file with providers
//! and routes, and the on-disk store used by the management API.

pub mod file;
pub mod settings;
pub mod store;

pub use file::{
    parse_route, AppConfig, CustomTransformerConfig, ProviderConfig, ProviderTransformerConfig,
    RouterConfig, TransformerEntry,
};
pub use settings::Settings;
pub use store::{ConfigStore, ConfigStoreError};
