use std::time::Duration;

/// Per-connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Close the connection when nothing is received for this long.
    pub keepalive: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_millis(5000),
        }
    }
}

/// Supervision settings for [`DeviceManager`](crate::DeviceManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Delay before reconnecting after a live connection closed.
    pub reconnect_delay: Duration,
    /// Delay before retrying after a failed connection attempt.
    pub retry_delay: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(1),
            retry_delay: Duration::from_secs(2),
        }
    }
}
