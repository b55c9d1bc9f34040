//! Relay configuration.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use relay_protocol::MAX_FRAME_LENGTH;

/// Default address the relay listens on.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:1025";

/// Environment variable that overrides [`DEFAULT_BIND_ADDR`].
pub const BIND_ADDR_ENV: &str = "RELAY_ADDR";

/// Default time allowed for delivering one frame to a client.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Backlog size at which a mailbox is reported as growing.
pub const DEFAULT_BACKLOG_WARN_THRESHOLD: usize = 1000;

/// How often mailbox backlogs are checked.
pub const DEFAULT_BACKLOG_REPORT_INTERVAL: Duration = Duration::from_secs(30);

/// What happens when a second connection claims a name that is already
/// bound to a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateNamePolicy {
    /// The newest connection wins; the previous holder is disconnected.
    #[default]
    Evict,
    /// The newest connection is refused and closed.
    Reject,
}

impl fmt::Display for DuplicateNamePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evict => f.write_str("evict"),
            Self::Reject => f.write_str("reject"),
        }
    }
}

impl FromStr for DuplicateNamePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "evict" => Ok(Self::Evict),
            "reject" => Ok(Self::Reject),
            other => Err(format!(
                "unknown duplicate-name policy '{other}' (expected 'evict' or 'reject')"
            )),
        }
    }
}

/// Settings the registry actor needs.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub duplicate_names: DuplicateNamePolicy,
    pub backlog_warn_threshold: usize,
    pub backlog_report_interval: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            duplicate_names: DuplicateNamePolicy::default(),
            backlog_warn_threshold: DEFAULT_BACKLOG_WARN_THRESHOLD,
            backlog_report_interval: DEFAULT_BACKLOG_REPORT_INTERVAL,
        }
    }
}

/// Settings each connection handler needs.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Close a connection whose peer sends nothing for this long.
    /// `None` waits forever.
    pub idle_timeout: Option<Duration>,
    pub write_timeout: Duration,
    pub max_frame_length: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_frame_length: MAX_FRAME_LENGTH,
        }
    }
}

/// Configuration for the relay server.
///
/// # Example
///
/// ```rust
/// use relayd::config::{DuplicateNamePolicy, RelayConfig};
/// use std::time::Duration;
///
/// let config = RelayConfig {
///     bind_addr: "127.0.0.1:0".parse().unwrap(),
///     idle_timeout: Some(Duration::from_secs(600)),
///     duplicate_names: DuplicateNamePolicy::Reject,
///     ..Default::default()
/// };
/// assert_eq!(config.connection_settings().idle_timeout, Some(Duration::from_secs(600)));
/// ```
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    pub idle_timeout: Option<Duration>,
    pub write_timeout: Duration,
    pub max_frame_length: usize,
    pub duplicate_names: DuplicateNamePolicy,
    pub backlog_warn_threshold: usize,
    pub backlog_report_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 1025)),
            idle_timeout: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_frame_length: MAX_FRAME_LENGTH,
            duplicate_names: DuplicateNamePolicy::default(),
            backlog_warn_threshold: DEFAULT_BACKLOG_WARN_THRESHOLD,
            backlog_report_interval: DEFAULT_BACKLOG_REPORT_INTERVAL,
        }
    }
}

impl RelayConfig {
    /// Creates a config listening on `bind_addr` with defaults elsewhere.
    pub fn with_bind_addr(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            idle_timeout: self.idle_timeout,
            write_timeout: self.write_timeout,
            max_frame_length: self.max_frame_length,
        }
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            duplicate_names: self.duplicate_names,
            backlog_warn_threshold: self.backlog_warn_threshold,
            backlog_report_interval: self.backlog_report_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bind_addr() {
        let config = RelayConfig::default();
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert!(config.idle_timeout.is_none());
        assert_eq!(config.duplicate_names, DuplicateNamePolicy::Evict);
    }

    #[test]
    fn test_policy_parses_case_insensitively() {
        assert_eq!("Reject".parse(), Ok(DuplicateNamePolicy::Reject));
        assert_eq!("evict".parse(), Ok(DuplicateNamePolicy::Evict));
        assert!("ignore".parse::<DuplicateNamePolicy>().is_err());
    }
}
