use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use taskpay_escrow::EscrowConfig;
use taskpay_gateway::GatewayConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSettings,
    pub api: ApiConfig,
    pub gateway: GatewaySettings,
    pub business: BusinessConfig,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub base_url: String,
    pub secret_key: String,
    pub webhook_secret: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessConfig {
    pub platform_fee_percent: u8,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub jwt_secret: String,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: "taskpay-node".to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.flutterwave.com/v3".to_string(),
            secret_key: String::new(),
            webhook_secret: None,
            timeout_secs: 10,
        }
    }
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self {
            platform_fee_percent: 15,
            currency: "NGN".to_string(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node: NodeSettings::default(),
            api: ApiConfig::default(),
            gateway: GatewaySettings::default(),
            business: BusinessConfig::default(),
            auth: AuthSettings::default(),
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let mut config: NodeConfig = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Secrets come from the environment in deployment; TOML values are
    /// development defaults.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("TASKPAY_API_PORT") {
            if let Ok(port) = v.parse() {
                self.api.port = port;
            }
        }
        if let Ok(v) = env::var("TASKPAY_GATEWAY_BASE_URL") {
            self.gateway.base_url = v;
        }
        if let Ok(v) = env::var("TASKPAY_GATEWAY_SECRET_KEY") {
            self.gateway.secret_key = v;
        }
        if let Ok(v) = env::var("TASKPAY_WEBHOOK_SECRET") {
            self.gateway.webhook_secret = Some(v);
        }
        if let Ok(v) = env::var("TASKPAY_JWT_SECRET") {
            self.auth.jwt_secret = v;
        }
        if let Ok(v) = env::var("TASKPAY_PLATFORM_FEE_PERCENT") {
            if let Ok(percent) = v.parse() {
                self.business.platform_fee_percent = percent;
            }
        }
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            base_url: self.gateway.base_url.clone(),
            secret_key: self.gateway.secret_key.clone(),
            timeout_secs: self.gateway.timeout_secs,
            currency: self.business.currency.clone(),
        }
    }

    pub fn escrow_config(&self) -> EscrowConfig {
        EscrowConfig {
            platform_fee_percent: self.business.platform_fee_percent,
        }
    }
}
