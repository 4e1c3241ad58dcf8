//! Configuration
//!
//! vCenter connection settings are resolved in three layers: built-in
//! defaults, then `--vsphere.*` flags or their `VSPHERE_*` environment
//! variables, then the optional YAML config file. Listener settings come from
//! the command line only.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::Args;
use serde::Deserialize;

use crate::adapters::VimJsonConfig;
use crate::domain::PerfQuerySpec;
use crate::error::{Error, Result};
use crate::metrics::{CollectorConfig, CollisionPolicy};

// =============================================================================
// Command Line / Environment
// =============================================================================

/// vCenter settings taken from flags or the environment. Unset values keep
/// the built-in default.
#[derive(Args, Clone, Default)]
pub struct VsphereArgs {
    /// vCenter address
    #[arg(long = "vsphere.hostname", env = "VSPHERE_HOSTNAME")]
    pub hostname: Option<String>,

    /// vCenter login principal
    #[arg(long = "vsphere.username", env = "VSPHERE_USERNAME")]
    pub username: Option<String>,

    /// vCenter login password
    #[arg(
        long = "vsphere.password",
        env = "VSPHERE_PASSWORD",
        hide_env_values = true
    )]
    pub password: Option<String>,

    /// Datacenter to scrape (default: the only datacenter)
    #[arg(long = "vsphere.datacenter", env = "VSPHERE_DATACENTER")]
    pub datacenter: Option<String>,

    /// Accept self-signed vCenter certificates
    #[arg(
        long = "vsphere.insecure",
        env = "VSPHERE_INSECURE",
        value_parser = BoolishValueParser::new()
    )]
    pub insecure: Option<bool>,

    /// VI/JSON API release
    #[arg(long = "vsphere.api-release", env = "VSPHERE_API_RELEASE")]
    pub api_release: Option<String>,
}

impl std::fmt::Debug for VsphereArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VsphereArgs")
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("datacenter", &self.datacenter)
            .field("insecure", &self.insecure)
            .field("api_release", &self.api_release)
            .finish()
    }
}

// =============================================================================
// Exporter Configuration
// =============================================================================

/// Resolved vCenter configuration
#[derive(Clone, PartialEq, Eq)]
pub struct VsphereConfig {
    /// vCenter address
    pub hostname: String,

    /// Login principal
    pub username: String,

    /// Login password
    pub password: String,

    /// Datacenter to scrape, empty for the default datacenter
    pub datacenter: String,

    /// Accept self-signed certificates
    pub insecure: bool,

    /// VI/JSON API release
    pub api_release: String,

    /// Per-request timeout
    pub query_timeout: Duration,

    /// Handling of counters whose names collide
    pub collision_policy: CollisionPolicy,
}

impl Default for VsphereConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            username: "administrator@vsphere.local".to_string(),
            password: String::new(),
            datacenter: String::new(),
            insecure: true,
            api_release: "8.0.1.0".to_string(),
            query_timeout: Duration::from_secs(30),
            collision_policy: CollisionPolicy::Overwrite,
        }
    }
}

impl std::fmt::Debug for VsphereConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VsphereConfig")
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("datacenter", &self.datacenter)
            .field("insecure", &self.insecure)
            .field("api_release", &self.api_release)
            .field("query_timeout", &self.query_timeout)
            .field("collision_policy", &self.collision_policy)
            .finish()
    }
}

impl VsphereConfig {
    /// Defaults overridden by the flag/environment values that are set.
    pub fn from_args(args: &VsphereArgs) -> Self {
        let mut config = Self::default();

        if let Some(hostname) = &args.hostname {
            config.hostname = hostname.clone();
        }
        if let Some(username) = &args.username {
            config.username = username.clone();
        }
        if let Some(password) = &args.password {
            config.password = password.clone();
        }
        if let Some(datacenter) = &args.datacenter {
            config.datacenter = datacenter.clone();
        }
        if let Some(insecure) = args.insecure {
            config.insecure = insecure;
        }
        if let Some(release) = &args.api_release {
            config.api_release = release.clone();
        }

        config
    }

    /// Overlay the keys present in a config file.
    pub fn apply(&mut self, file: ConfigFile) {
        if let Some(hostname) = file.hostname {
            self.hostname = hostname;
        }
        if let Some(username) = file.username {
            self.username = username;
        }
        if let Some(password) = file.password {
            self.password = password;
        }
        if let Some(datacenter) = file.datacenter {
            self.datacenter = datacenter;
        }
        if let Some(insecure) = file.insecure {
            self.insecure = insecure;
        }
        if let Some(release) = file.api_release {
            self.api_release = release;
        }
        if let Some(seconds) = file.query_timeout_seconds {
            self.query_timeout = Duration::from_secs(seconds);
        }
        if let Some(policy) = file.collision_policy {
            self.collision_policy = policy;
        }
    }

    /// Resolve the full configuration: flags/environment, then `path` if
    /// given.
    pub fn load(args: &VsphereArgs, path: Option<&Path>) -> Result<Self> {
        let mut config = Self::from_args(args);
        if let Some(path) = path {
            config.apply(ConfigFile::read(path)?);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hostname.trim().is_empty() {
            return Err(Error::Config("hostname must not be empty".into()));
        }
        if self.api_release.trim().is_empty() {
            return Err(Error::Config("api_release must not be empty".into()));
        }
        if self.query_timeout.is_zero() {
            return Err(Error::Config("query_timeout_seconds must be positive".into()));
        }
        Ok(())
    }

    pub fn session_config(&self) -> VimJsonConfig {
        VimJsonConfig {
            hostname: self.hostname.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            api_release: self.api_release.clone(),
            insecure: self.insecure,
            query_timeout: self.query_timeout,
        }
    }

    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            datacenter: self.datacenter.clone(),
            collision_policy: self.collision_policy,
            query: PerfQuerySpec::latest(),
        }
    }
}

// =============================================================================
// Config File
// =============================================================================

/// YAML config file. Every key is optional; present keys win over flags and
/// the environment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub hostname: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub datacenter: Option<String>,
    pub insecure: Option<bool>,
    pub api_release: Option<String>,
    pub query_timeout_seconds: Option<u64>,
    pub collision_policy: Option<CollisionPolicy>,
}

impl ConfigFile {
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }
}

// =============================================================================
// Listen Address
// =============================================================================

/// Parse a listen address, accepting the `:port` shorthand for all
/// interfaces.
pub fn parse_listen_address(addr: &str) -> Result<SocketAddr> {
    let addr = addr.trim();
    let full = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };
    full.parse()
        .map_err(|e| Error::Config(format!("Invalid listen address '{}': {}", addr, e)))
}
