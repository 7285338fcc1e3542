//! Per-peer configuration recognized by the protocol engine.

#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryMode {
    #[default]
    Unconfigured,
    Disabled,
    Bytes,
    Time,
}

#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferBloatMode {
    #[default]
    Off,
    Normal,
    Aggressive,
}

#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeySize {
    #[default]
    None,
    Aes128,
    Aes256,
}

#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub address: std::net::SocketAddr,
    pub gre_dst_port: u16,
    pub recovery_mode: RecoveryMode,
    pub recovery_maxbitrate: u32,
    pub recovery_maxbitrate_return: u32,
    pub recovery_length_min: u32,
    pub recovery_length_max: u32,
    pub recovery_reorder_buffer: u32,
    pub recovery_rtt_min: u32,
    pub recovery_rtt_max: u32,
    pub weight: u32,
    pub buffer_bloat_mode: BufferBloatMode,
    pub buffer_bloat_limit: u32,
    pub buffer_bloat_hard_limit: u32,
    pub key_size: KeySize,
    pub secret: String,
    pub session_timeout_ms: u64,
    pub keepalive_timeout_ms: u64,
    pub max_retries: u8,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            address: std::net::SocketAddr::from(([0, 0, 0, 0], 0)),
            gre_dst_port: 5000,
            recovery_mode: RecoveryMode::Time,
            recovery_maxbitrate: 100_000_000,
            recovery_maxbitrate_return: 1_000_000,
            recovery_length_min: 50,
            recovery_length_max: 1000,
            recovery_reorder_buffer: 25,
            recovery_rtt_min: 10,
            recovery_rtt_max: 500,
            weight: 0,
            buffer_bloat_mode: BufferBloatMode::Off,
            buffer_bloat_limit: 6,
            buffer_bloat_hard_limit: 20,
            key_size: KeySize::None,
            secret: String::new(),
            session_timeout_ms: 60_000,
            keepalive_timeout_ms: 1_000,
            max_retries: 8,
        }
    }
}

impl PeerConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.recovery_length_min > self.recovery_length_max {
            return Err(crate::Error::InvalidConfig(
                "recovery_length_min must be <= recovery_length_max",
            ));
        }

        if self.recovery_rtt_min > self.recovery_rtt_max {
            return Err(crate::Error::InvalidConfig(
                "recovery_rtt_min must be <= recovery_rtt_max",
            ));
        }

        match self.key_size {
            KeySize::None if !self.secret.is_empty() => Err(crate::Error::InvalidConfig(
                "secret set but key_size is None",
            )),
            KeySize::Aes128 | KeySize::Aes256 if self.secret.is_empty() => Err(
                crate::Error::InvalidConfig("key_size set but secret is empty"),
            ),
            _ if self.secret.len() > 128 => {
                Err(crate::Error::InvalidConfig("secret exceeds 128 bytes"))
            }
            _ => Ok(()),
        }
    }
}
