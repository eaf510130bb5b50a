use crate::connection::DEFAULT_OUTBOUND_FRAMES;
use crate::error::ConfigError;
use crate::telemetry::LogOutput;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Reactor shard count. `0` means one per CPU.
    pub event_loops: usize,
    pub queue_capacity: usize,
    pub backlog: i32,
    pub tcp_keepalive_secs: Option<u64>,
    pub tcp_nodelay: bool,
    pub max_frame_len: usize,
    pub read_buffer: usize,
    /// Reply frames queued per connection before a non-reading peer is dropped.
    pub outbound_frames: usize,
    pub max_connections: Option<usize>,
    /// `1` keeps the single ordered dispatch path. More lanes partition dispatch by
    /// connection and give up global ordering.
    pub dispatch_lanes: usize,
    pub log_output: Option<LogOutput>,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            event_loops: 0,
            queue_capacity: 128,
            backlog: 1024,
            tcp_keepalive_secs: None,
            tcp_nodelay: true,
            max_frame_len: 1 << 20,
            read_buffer: 4096,
            outbound_frames: DEFAULT_OUTBOUND_FRAMES,
            max_connections: None,
            dispatch_lanes: 1,
            log_output: None,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("queue_capacity", self.queue_capacity),
            ("dispatch_lanes", self.dispatch_lanes),
            ("read_buffer", self.read_buffer),
            ("max_frame_len", self.max_frame_len),
            ("outbound_frames", self.outbound_frames),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if self.max_connections == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max_connections",
                reason: "must be at least 1 when set".to_string(),
            });
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Shard count with the CPU-parallelism default applied.
    pub fn resolved_event_loops(&self) -> usize {
        if self.event_loops == 0 {
            num_cpus::get()
        } else {
            self.event_loops
        }
    }

    pub fn tcp_keepalive(&self) -> Option<Duration> {
        self.tcp_keepalive_secs.map(Duration::from_secs)
    }
}
