pub mod manager;

pub use manager::{
    AgentConfig, Config, ConfigError, ConfigManager, ProviderConfig, ServerConfig, DEFAULT_MODEL,
};
