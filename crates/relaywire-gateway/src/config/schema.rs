use serde::Deserialize;
use relaywire_core::error::{RelayError, Result};
use relaywire_core::protocol::ipc::{DEFAULT_COMMAND_CHANNEL, DEFAULT_RESPONSE_CHANNEL};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub subscriptions: SubscriptionSection,

    #[serde(default)]
    pub ipc: IpcSection,

    #[serde(default)]
    pub broker: BrokerSection,

    #[serde(default)]
    pub worker: WorkerSection,

    #[serde(default)]
    pub shutdown: ShutdownSection,
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(RelayError::BadRequest(format!(
                "unsupported config version: {}",
                self.version
            )));
        }

        self.gateway.validate()?;
        self.subscriptions.validate()?;
        self.ipc.validate()?;
        self.broker.validate()?;
        self.shutdown.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Per-connection outbound queue depth. Pushes beyond it are dropped.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if !(5000..=120000).contains(&self.ping_interval_ms) {
            return Err(RelayError::BadRequest(
                "gateway.ping_interval_ms must be between 5000 and 120000".into(),
            ));
        }
        if !(10000..=600000).contains(&self.idle_timeout_ms) {
            return Err(RelayError::BadRequest(
                "gateway.idle_timeout_ms must be between 10000 and 600000".into(),
            ));
        }
        if self.idle_timeout_ms <= self.ping_interval_ms {
            return Err(RelayError::BadRequest(
                "gateway.idle_timeout_ms must be greater than ping_interval_ms".into(),
            ));
        }
        if !(16..=65536).contains(&self.outbound_queue) {
            return Err(RelayError::BadRequest(
                "gateway.outbound_queue must be between 16 and 65536".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_ping_interval_ms() -> u64 {
    20000
}
fn default_idle_timeout_ms() -> u64 {
    60000
}
fn default_outbound_queue() -> usize {
    1024
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionSection {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

impl Default for SubscriptionSection {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl SubscriptionSection {
    pub fn validate(&self) -> Result<()> {
        if self.max_page_size == 0 || self.max_page_size > 10000 {
            return Err(RelayError::BadRequest(
                "subscriptions.max_page_size must be between 1 and 10000".into(),
            ));
        }
        if self.page_size == 0 || self.page_size > self.max_page_size {
            return Err(RelayError::BadRequest(
                "subscriptions.page_size must be between 1 and max_page_size".into(),
            ));
        }
        Ok(())
    }
}

fn default_page_size() -> usize {
    50
}
fn default_max_page_size() -> usize {
    500
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IpcSection {
    #[serde(default = "default_command_channel")]
    pub command_channel: String,
    #[serde(default = "default_response_channel")]
    pub response_channel: String,
    /// Default reply budget for commands.
    #[serde(default = "default_ipc_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for IpcSection {
    fn default() -> Self {
        Self {
            command_channel: default_command_channel(),
            response_channel: default_response_channel(),
            timeout_ms: default_ipc_timeout_ms(),
        }
    }
}

impl IpcSection {
    pub fn validate(&self) -> Result<()> {
        if self.command_channel.is_empty() || self.response_channel.is_empty() {
            return Err(RelayError::BadRequest("ipc channels must not be empty".into()));
        }
        if self.command_channel == self.response_channel {
            return Err(RelayError::BadRequest(
                "ipc.command_channel and ipc.response_channel must differ".into(),
            ));
        }
        if !(100..=120000).contains(&self.timeout_ms) {
            return Err(RelayError::BadRequest(
                "ipc.timeout_ms must be between 100 and 120000".into(),
            ));
        }
        Ok(())
    }
}

fn default_command_channel() -> String {
    DEFAULT_COMMAND_CHANNEL.into()
}
fn default_response_channel() -> String {
    DEFAULT_RESPONSE_CHANNEL.into()
}
fn default_ipc_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerSection {
    #[serde(default)]
    pub kind: BrokerKind,
    #[serde(default)]
    pub url: Option<String>,
}

impl BrokerSection {
    pub fn validate(&self) -> Result<()> {
        if self.kind == BrokerKind::Redis && self.url.as_deref().map_or(true, str::is_empty) {
            return Err(RelayError::BadRequest("broker.url is required for redis".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerSection {
    /// Run the command worker inside this process.
    #[serde(default = "default_worker_enabled")]
    pub enabled: bool,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            enabled: default_worker_enabled(),
        }
    }
}

fn default_worker_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShutdownSection {
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
}

impl Default for ShutdownSection {
    fn default() -> Self {
        Self {
            grace_ms: default_grace_ms(),
        }
    }
}

impl ShutdownSection {
    pub fn validate(&self) -> Result<()> {
        if self.grace_ms > 300000 {
            return Err(RelayError::BadRequest(
                "shutdown.grace_ms must be at most 300000".into(),
            ));
        }
        Ok(())
    }
}

fn default_grace_ms() -> u64 {
    10000
}
