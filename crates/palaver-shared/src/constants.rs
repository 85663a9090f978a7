/// Application name
pub const APP_NAME: &str = "Palaver";

/// Default TCP port the relay listens on
pub const DEFAULT_PORT: u16 = 12345;

/// Default cap on concurrently connected clients
pub const DEFAULT_MAX_CLIENTS: usize = 50;

/// Wire field delimiter
pub const FIELD_SEPARATOR: char = '|';

/// chrono format string for the wire timestamp field (24-hour wall clock)
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S";

/// Upper bound on a display name's length in characters
pub const MAX_NAME_LEN: usize = 32;

/// Sender label carried by server-originated records
pub const SERVER_SENDER: &str = "SERVER";
