//! mcdaq configuration management

use anyhow::{Context, Result, anyhow};
use common::LOG_LEVELS;
use daq::{BlinkProfile, BlinkTransport, MCC_VENDOR_ID, TransferTimeouts};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaqConfig {
    #[serde(default)]
    pub general: GeneralSettings,
    /// Transfer timeouts by link speed
    #[serde(default)]
    pub timeouts: TransferTimeouts,
    /// Blink profile for products without an entry in `products`
    #[serde(default = "DaqConfig::default_blink_profile")]
    pub default_profile: BlinkProfile,
    /// Per-model blink profiles
    ///
    /// # Example Configuration
    /// ```toml
    /// [[products]]
    /// product_id = 0x008d
    /// name = "USB-TEMP"
    /// command = 0x40
    /// transport = { kind = "interrupt", endpoint = 1 }
    /// ```
    #[serde(default)]
    pub products: Vec<ProductProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    #[serde(default = "GeneralSettings::default_log_level")]
    pub log_level: String,
    /// Vendor ID scanned for by `list`
    #[serde(default = "GeneralSettings::default_vendor_id")]
    pub vendor_id: u16,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            vendor_id: Self::default_vendor_id(),
        }
    }
}

impl GeneralSettings {
    fn default_log_level() -> String {
        "warn".to_string()
    }

    fn default_vendor_id() -> u16 {
        MCC_VENDOR_ID
    }
}

/// Blink settings for one product model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductProfile {
    pub product_id: u16,
    /// Human-readable model name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Firmware command code that blinks the LED
    pub command: u8,
    pub transport: BlinkTransport,
    #[serde(default)]
    pub interface: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ProductProfile {
    pub fn blink_profile(&self) -> BlinkProfile {
        BlinkProfile {
            command: self.command,
            transport: self.transport,
            interface: self.interface,
            timeout_ms: self.timeout_ms,
        }
    }
}

impl Default for DaqConfig {
    fn default() -> Self {
        Self {
            general: GeneralSettings::default(),
            timeouts: TransferTimeouts::default(),
            default_profile: Self::default_blink_profile(),
            products: vec![ProductProfile {
                product_id: 0x008d,
                name: Some("USB-TEMP".to_string()),
                command: 0x40,
                transport: BlinkTransport::Interrupt { endpoint: 1 },
                interface: 0,
                timeout_ms: None,
            }],
        }
    }
}

/// Directory under the user or system configuration root
const CONFIG_DIR: &str = "mcdaq";

const CONFIG_FILE: &str = "mcdaq.toml";

impl DaqConfig {
    fn default_blink_profile() -> BlinkProfile {
        BlinkProfile::interrupt(0x40, 1)
    }

    /// Files searched when no path is given, most specific first
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(2);
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join(CONFIG_DIR).join(CONFIG_FILE));
        }
        paths.push(Path::new("/etc").join(CONFIG_DIR).join(CONFIG_FILE));
        paths
    }

    /// Where `--save-config` writes
    pub fn default_path() -> PathBuf {
        Self::search_paths()
            .into_iter()
            .next()
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
    }

    /// Read `path`, or the first existing file from [`Self::search_paths`]
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::search_paths()
                .into_iter()
                .find(|p| p.is_file())
                .ok_or_else(|| anyhow!("No {} in any search path", CONFIG_FILE))?,
        };
        Self::read_file(&path)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_toml(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::debug!(
            "Loaded configuration from {} ({} product profile(s))",
            path.display(),
            config.products.len()
        );
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: DaqConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Search for a configuration file, falling back to built-in profiles
    ///
    /// A file that exists but does not parse is logged at warn level.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::search_paths().into_iter().find(|p| p.is_file()) else {
            tracing::debug!("No configuration file found, using built-in profiles");
            return Self::default();
        };

        Self::read_file(&path).unwrap_or_else(|e| {
            tracing::warn!("Ignoring configuration: {:#}", e);
            Self::default()
        })
    }

    /// Write this configuration as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        let body = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        fs::write(path, format!("# mcdaq configuration\n\n{}", body))
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Blink profile and model name for `product_id`
    pub fn profile_for(&self, product_id: u16) -> (BlinkProfile, Option<&str>) {
        match self.products.iter().find(|p| p.product_id == product_id) {
            Some(product) => (product.blink_profile(), product.name.as_deref()),
            None => (self.default_profile.clone(), None),
        }
    }

    fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.general.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.general.log_level,
                LOG_LEVELS.join(", ")
            ));
        }

        if self.timeouts.full_speed_ms == 0 || self.timeouts.high_speed_ms == 0 {
            return Err(anyhow!("Transfer timeouts must be greater than 0"));
        }

        Self::validate_profile(&self.default_profile).context("Invalid default_profile")?;

        let mut seen = HashSet::new();
        for product in &self.products {
            if !seen.insert(product.product_id) {
                return Err(anyhow!(
                    "Duplicate product profile for product ID 0x{}",
                    common::format_usb_id(product.product_id)
                ));
            }
            Self::validate_profile(&product.blink_profile()).with_context(|| {
                format!(
                    "Invalid profile for product ID 0x{}",
                    common::format_usb_id(product.product_id)
                )
            })?;
        }

        Ok(())
    }

    fn validate_profile(profile: &BlinkProfile) -> Result<()> {
        if profile.timeout_ms == Some(0) {
            return Err(anyhow!("timeout_ms must be greater than 0"));
        }
        if let BlinkTransport::Interrupt { endpoint } = profile.transport {
            if endpoint & 0x0f == 0 {
                return Err(anyhow!(
                    "Interrupt endpoint {:#04x} is the control endpoint",
                    endpoint
                ));
            }
        }
        Ok(())
    }
}

/// Load configuration from a path that may start with `~`
pub fn load_config(path: &Path) -> Result<DaqConfig> {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    DaqConfig::load(Some(PathBuf::from(expanded)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaqConfig::default();
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.general.vendor_id, 0x09db);
        assert_eq!(config.timeouts.full_speed_ms, 10_000);
        assert_eq!(config.timeouts.high_speed_ms, 2_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_profile_lookup() {
        let config = DaqConfig::default();

        let (profile, name) = config.profile_for(0x008d);
        assert_eq!(name, Some("USB-TEMP"));
        assert_eq!(profile, BlinkProfile::interrupt(0x40, 1));

        let (profile, name) = config.profile_for(0xbeef);
        assert_eq!(name, None);
        assert_eq!(profile, config.default_profile);
    }

    #[test]
    fn test_config_serialization() {
        let config = DaqConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = DaqConfig::from_toml(&toml_str).unwrap();

        assert_eq!(config.general.vendor_id, parsed.general.vendor_id);
        assert_eq!(config.products, parsed.products);
        assert_eq!(config.default_profile, parsed.default_profile);
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = DaqConfig::default();
        config.general.log_level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.general.log_level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_control_endpoint() {
        let mut config = DaqConfig::default();
        config.default_profile = BlinkProfile::interrupt(0x40, 0x80);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_profile_timeout() {
        let mut config = DaqConfig::default();
        config.products[0].timeout_ms = Some(0);
        assert!(config.validate().is_err());

        let mut config = DaqConfig::default();
        config.default_profile.timeout_ms = Some(0);
        assert!(config.validate().is_err());

        config.default_profile.timeout_ms = Some(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_search_paths_end_with_system_file() {
        let paths = DaqConfig::search_paths();
        assert_eq!(
            paths.last().unwrap(),
            &PathBuf::from("/etc/mcdaq/mcdaq.toml")
        );
        assert!(DaqConfig::default_path().ends_with("mcdaq/mcdaq.toml"));
    }

    #[test]
    fn test_validate_rejects_duplicate_products() {
        let mut config = DaqConfig::default();
        let duplicate = config.products[0].clone();
        config.products.push(duplicate);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("008d"));
    }
}
