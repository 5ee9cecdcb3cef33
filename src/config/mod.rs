// Configuration management module
// Every tunable of the index build and of answering lives here, persisted as TOML

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    CONFIG_FILE_NAME, Config, ConfigError, DatasetConfig, GenerationConfig, IndexConfig,
    OllamaConfig, RetrievalConfig,
};
