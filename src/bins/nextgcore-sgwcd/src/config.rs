//! SGWC Configuration
//!
//! YAML configuration for the serving gateway control plane.
//!
//! ```yaml
//! sgwc:
//!   gtpc:
//!     s11: 127.0.0.3:2123
//!     s5c: 127.0.0.3:2124
//!   gtpu:
//!     s1u: 127.0.0.6
//!   pgw: 127.0.0.4:2123
//!   user_plane: collocated
//!   timer:
//!     t3_response_ms: 1000
//!     n3_requests: 3
//!   restart_counter: 1
//! ```

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use ogs_gtp::v2::{XactConfig, GTPV2C_N3_REQUESTS, GTPV2C_T3_RESPONSE_MS};
use ogs_gtp::GTPV2_C_UDP_PORT;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where the S1-U endpoint handed to the MME comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserPlanePolicy {
    /// SGW and PGW user planes are one node; the PGW S5/S8-U F-TEID doubles as S1-U
    #[default]
    Collocated,
    /// SGW allocates its own S1-U TEID on the configured S1-U address
    Split,
}

/// GTP-C listen addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GtpcConfig {
    pub s11: SocketAddr,
    pub s5c: SocketAddr,
}

impl Default for GtpcConfig {
    fn default() -> Self {
        Self {
            s11: SocketAddr::new(Ipv4Addr::new(127, 0, 0, 3).into(), GTPV2_C_UDP_PORT),
            s5c: SocketAddr::new(Ipv4Addr::new(127, 0, 0, 3).into(), GTPV2_C_UDP_PORT + 1),
        }
    }
}

/// GTP-U addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GtpuConfig {
    pub s1u: Ipv4Addr,
}

impl Default for GtpuConfig {
    fn default() -> Self {
        Self {
            s1u: Ipv4Addr::new(127, 0, 0, 6),
        }
    }
}

/// GTPv2-C retransmission timers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub t3_response_ms: u64,
    pub n3_requests: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            t3_response_ms: GTPV2C_T3_RESPONSE_MS,
            n3_requests: GTPV2C_N3_REQUESTS,
        }
    }
}

/// SGWC configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SgwcConfig {
    pub gtpc: GtpcConfig,
    pub gtpu: GtpuConfig,
    /// PGW used when a Create Session Request names none
    pub pgw: SocketAddr,
    pub user_plane: UserPlanePolicy,
    pub timer: TimerConfig,
    /// Recovery IE value
    pub restart_counter: u8,
    /// First sequence number handed out on each interface
    pub initial_sqn: u32,
}

impl Default for SgwcConfig {
    fn default() -> Self {
        Self {
            gtpc: GtpcConfig::default(),
            gtpu: GtpuConfig::default(),
            pgw: SocketAddr::new(Ipv4Addr::new(127, 0, 0, 4).into(), GTPV2_C_UDP_PORT),
            user_plane: UserPlanePolicy::default(),
            timer: TimerConfig::default(),
            restart_counter: 1,
            initial_sqn: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SgwcConfigFile {
    #[serde(default)]
    sgwc: SgwcConfig,
}

impl SgwcConfig {
    /// Parse the `sgwc:` section of a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let file: SgwcConfigFile = serde_yaml::from_str(yaml)?;
        file.sgwc.validate()?;
        Ok(file.sgwc)
    }

    /// Load and parse a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.timer.t3_response_ms == 0 {
            return Err(ConfigError::Invalid("timer.t3_response_ms must be positive".into()));
        }
        if self.gtpc.s11 == self.gtpc.s5c {
            return Err(ConfigError::Invalid(format!(
                "S11 and S5-C share the address {}",
                self.gtpc.s11
            )));
        }
        Ok(())
    }

    /// S11 address as carried in F-TEIDs
    pub fn s11_ipv4(&self) -> Ipv4Addr {
        ipv4_of(&self.gtpc.s11)
    }

    /// S5-C address as carried in F-TEIDs
    pub fn s5c_ipv4(&self) -> Ipv4Addr {
        ipv4_of(&self.gtpc.s5c)
    }

    /// Transaction engine settings for either interface
    pub fn xact_config(&self) -> XactConfig {
        XactConfig {
            t3_response: Duration::from_millis(self.timer.t3_response_ms),
            n3_requests: self.timer.n3_requests,
            initial_sqn: self.initial_sqn,
        }
    }
}

fn ipv4_of(addr: &SocketAddr) -> Ipv4Addr {
    match addr {
        SocketAddr::V4(v4) => *v4.ip(),
        SocketAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
    }
}
