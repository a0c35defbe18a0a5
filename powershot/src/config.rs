use std::time::Duration;

/// Endpoint addresses of the camera's single interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub bulk_in: u8,
    pub bulk_out: u8,
    pub interrupt_in: u8,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            bulk_in: 0x81,
            bulk_out: 0x02,
            interrupt_in: 0x83,
        }
    }
}

/// Timings and limits for [`Transport`](crate::usb::transport::Transport).
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub endpoints: Endpoints,
    /// Timeout for control and bulk transfers outside of any override.
    pub timeout: Duration,
    /// Timeout used for the status reads of the wake handshake.
    pub init_timeout: Duration,
    /// How long to wait for the wake interrupt after the wake message.
    pub wake_interrupt_timeout: Duration,
    pub identify_attempts: usize,
    pub poller: PollerConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            timeout: Duration::from_millis(500),
            init_timeout: Duration::from_secs(5),
            wake_interrupt_timeout: Duration::from_secs(5),
            identify_attempts: 4,
            poller: PollerConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Size of a single interrupt read.
    pub chunk: usize,
    pub read_timeout: Duration,
    /// Pause between two reads.
    pub interval: Duration,
    /// Consecutive non-timeout errors tolerated before the poller gives up.
    pub error_budget: usize,
    /// How often waiters look at the accumulated byte count.
    pub wait_tick: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            chunk: 0x10,
            read_timeout: Duration::from_millis(150),
            interval: Duration::from_millis(100),
            error_budget: 10,
            wait_tick: Duration::from_millis(200),
        }
    }
}

/// Timings for [`RemoteControl`](crate::remote::RemoteControl).
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub init_timeout: Duration,
    pub exit_timeout: Duration,
    /// Stale interrupt reads attempted before `RC_INIT`.
    pub drain_attempts: usize,
    pub drain_interval: Duration,
    /// Ceiling for capture completion detection.
    pub capture_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            init_timeout: Duration::from_secs(10),
            exit_timeout: Duration::from_secs(1),
            drain_attempts: 3,
            drain_interval: Duration::from_millis(300),
            capture_timeout: Duration::from_secs(10),
        }
    }
}
