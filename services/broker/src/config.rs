//! # Broker Configuration
//!
//! Loaded from TOML; every section and field is optional and falls back to
//! the defaults below.
//!
//! ```toml
//! [server]
//! address = "127.0.0.1"
//! port = 5672
//!
//! [codec]
//! max_frame_size = 131072      # larger frames are framing errors
//!
//! [exchanges]
//! declare_defaults = true      # "", amq.direct, amq.topic, amq.fanout, amq.match
//!
//! [[exchanges.declare]]
//! name = "market.ticks"
//! kind = "topic"
//! ```

use crate::{BrokerError, BrokerResult};
use codec::DEFAULT_MAX_FRAME_SIZE;
use exchange::{ExchangeKind, ExchangeRegistry};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Smallest frame a broker may be configured to accept: the envelope plus a
/// method header and a short argument list
pub const MIN_FRAME_SIZE: usize = 4096;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub server: ServerSettings,
    pub codec: CodecSettings,
    pub exchanges: ExchangeSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub address: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 5672,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecSettings {
    /// Upper bound on a whole frame, envelope included
    pub max_frame_size: usize,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeSettings {
    pub declare_defaults: bool,
    pub declare: Vec<ExchangeDeclaration>,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            declare_defaults: true,
            declare: Vec::new(),
        }
    }
}

/// Exchange created at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeDeclaration {
    pub name: String,
    pub kind: ExchangeKind,
}

impl BrokerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> BrokerResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BrokerError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> BrokerResult<Self> {
        toml::from_str(contents)
            .map_err(|e| BrokerError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn validate(&self) -> BrokerResult<()> {
        if self.server.port == 0 {
            return Err(BrokerError::Config("server.port must be > 0".to_string()));
        }

        if self.codec.max_frame_size < MIN_FRAME_SIZE {
            return Err(BrokerError::Config(format!(
                "codec.max_frame_size must be >= {}",
                MIN_FRAME_SIZE
            )));
        }

        if let Some(decl) = self.exchanges.declare.iter().find(|d| d.name.is_empty()) {
            return Err(BrokerError::Config(format!(
                "exchanges.declare entries need a name (kind {})",
                decl.kind
            )));
        }

        Ok(())
    }

    /// `address:port` for the TCP listener
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.address, self.server.port)
    }

    /// Registry holding every exchange this configuration declares
    pub fn build_exchanges(&self) -> BrokerResult<ExchangeRegistry> {
        let registry = ExchangeRegistry::new();
        if self.exchanges.declare_defaults {
            registry.declare_defaults();
        }
        for decl in &self.exchanges.declare {
            registry.declare_exchange(&decl.name, decl.kind)?;
        }
        info!("Exchanges ready: {:?}", registry.names());
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = BrokerConfig::from_toml_str("").unwrap();
        assert_eq!(config, BrokerConfig::default());
        assert_eq!(config.listen_address(), "127.0.0.1:5672");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_document() {
        let config = BrokerConfig::from_toml_str(
            r#"
            [server]
            address = "0.0.0.0"
            port = 5673

            [codec]
            max_frame_size = 65536

            [exchanges]
            declare_defaults = false

            [[exchanges.declare]]
            name = "market.ticks"
            kind = "topic"

            [[exchanges.declare]]
            name = "audit"
            kind = "fanout"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 5673);
        assert_eq!(config.codec.max_frame_size, 65536);
        assert_eq!(config.exchanges.declare.len(), 2);
        assert_eq!(config.exchanges.declare[0].kind, ExchangeKind::Topic);

        let registry = config.build_exchanges().unwrap();
        assert_eq!(registry.names(), vec!["audit", "market.ticks"]);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = BrokerConfig::from_toml_str(
            r#"
            [[exchanges.declare]]
            name = "x"
            kind = "delayed"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, BrokerError::Config(_)));
    }

    #[test]
    fn test_validation() {
        let mut config = BrokerConfig::default();
        config.codec.max_frame_size = 16;
        assert!(config.validate().is_err());

        let mut config = BrokerConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = BrokerConfig::default();
        config.exchanges.declare.push(ExchangeDeclaration {
            name: String::new(),
            kind: ExchangeKind::Direct,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reserved_declaration_fails_build() {
        let mut config = BrokerConfig::default();
        config.exchanges.declare.push(ExchangeDeclaration {
            name: "amq.custom".into(),
            kind: ExchangeKind::Direct,
        });
        assert!(matches!(
            config.build_exchanges(),
            Err(BrokerError::Exchange(_))
        ));
    }
}
