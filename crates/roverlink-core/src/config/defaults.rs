/// Default base station host
pub const DEFAULT_HOST: &str = "localhost";

/// Default base station port
pub const DEFAULT_PORT: u16 = 11571;

/// Endpoint path drivers connect to
pub const DEFAULT_DRIVER_PATH: &str = "/driver";

/// Delay between reconnect attempts (milliseconds)
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;

/// Shortest reconnect delay accepted from configuration (milliseconds)
pub const MIN_RECONNECT_DELAY_MS: u64 = 100;

/// Number of console lines kept in memory
pub const DEFAULT_CONSOLE_CAPACITY: usize = 500;

/// Default tracing filter directive
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Config file name under the user config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Application directory name under the user config directory
pub const APP_DIR_NAME: &str = "roverlink";
