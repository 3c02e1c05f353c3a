pub mod settings;

pub use settings::{LoggingConfig, RelayConfig, ServerConfig, Settings, UpstreamConfig};
