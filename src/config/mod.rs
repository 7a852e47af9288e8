pub mod credentials;
pub mod loader;
pub mod schema;

pub use loader::{get_config_path, load_config, save_config};
pub use schema::{
    Config, DedupConfig, DisplayConfig, FilterConfig, OverflowPolicy, PathsConfig, PollingConfig,
    QueueConfig, ResolvedPaths, ResponsesConfig, ShutdownPolicy, StatusConfig, TwilioConfig,
};
