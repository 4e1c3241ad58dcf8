//! vSphere Exporter
//!
//! Prometheus exporter for VMware vSphere host performance counters.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        vSphere Exporter                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │   vCenter    │───▶│  Collector   │───▶│  Exposition  │       │
//! │  │   Session    │    │  (Registry)  │    │    (HTTP)    │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vsphere_exporter::adapters::VimJsonSession;
use vsphere_exporter::config::{parse_listen_address, VsphereArgs, VsphereConfig};
use vsphere_exporter::error::{Error, Result};
use vsphere_exporter::metrics::{Exposition, VsphereCollector};
use vsphere_exporter::server::{self, Exporter};

// =============================================================================
// CLI Arguments
// =============================================================================

/// vSphere Exporter - host performance counters for Prometheus
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on for web interface and telemetry
    #[arg(long = "web.listen-address", default_value = ":9155")]
    listen_address: String,

    /// Path under which to expose metrics
    #[arg(long = "web.telemetry-path", default_value = "/metrics")]
    telemetry_path: String,

    /// Optional YAML config file; its keys override the vSphere flags
    #[arg(long = "config.file")]
    config_file: Option<PathBuf>,

    #[command(flatten)]
    vsphere: VsphereArgs,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let addr = parse_listen_address(&args.listen_address)?;
    let config = VsphereConfig::load(&args.vsphere, args.config_file.as_deref())?;

    info!("Starting vSphere Exporter");
    info!("  vCenter: {}", config.hostname);
    info!("  User: {}", config.username);
    info!(
        "  Datacenter: {}",
        if config.datacenter.is_empty() {
            "(default)"
        } else {
            config.datacenter.as_str()
        }
    );
    info!("  Insecure TLS: {}", config.insecure);

    let session = VimJsonSession::connect(config.session_config())
        .await
        .inspect_err(|e| error!("Failed to connect to vCenter: {}", e))?;

    info!("Connected to vCenter");

    let collector = Arc::new(VsphereCollector::new(
        Arc::new(session),
        config.collector_config(),
    ));
    let counters = collector
        .initialize()
        .await
        .inspect_err(|e| error!("Failed to build counter registry: {}", e))?;

    let exposition = Arc::new(Exposition::new()?);
    exposition
        .claim(counters)
        .inspect_err(|e| error!("Failed to register collector: {}", e))?;

    let exporter = Arc::new(Exporter::new(
        collector,
        exposition,
        args.telemetry_path.clone(),
    ));

    tokio::select! {
        result = server::run(addr, exporter) => {
            if let Err(e) = &result {
                error!("Metrics server error: {}", e);
            }
            result?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown signal received");
        }
    }

    info!("Exporter shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let directive = |d: &str| {
        d.parse::<Directive>()
            .map_err(|e| Error::Config(format!("Invalid log directive '{}': {}", d, e)))
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive(directive("hyper=warn")?)
        .add_directive(directive("reqwest=info")?)
        .add_directive(directive("rustls=warn")?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_defaults() {
        let args = Args::try_parse_from(["vsphere-exporter"]).unwrap();

        assert_eq!(args.listen_address, ":9155");
        assert_eq!(args.telemetry_path, "/metrics");
        assert!(args.config_file.is_none());
    }

    #[test]
    fn test_vsphere_flags_are_flattened() {
        let args = Args::try_parse_from([
            "vsphere-exporter",
            "--vsphere.hostname",
            "vcenter.lab",
            "--vsphere.datacenter",
            "dc1",
            "--config.file",
            "/etc/vsphere.yml",
        ])
        .unwrap();

        assert_eq!(args.vsphere.hostname.as_deref(), Some("vcenter.lab"));
        assert_eq!(args.vsphere.datacenter.as_deref(), Some("dc1"));
        assert_eq!(args.config_file, Some(PathBuf::from("/etc/vsphere.yml")));
    }

    #[test]
    fn test_environment_fills_unset_flags() {
        // Only this test touches these variables
        std::env::set_var("VSPHERE_API_RELEASE", "7.0.3.0");
        std::env::set_var("VSPHERE_INSECURE", "off");

        let from_env = Args::try_parse_from(["vsphere-exporter"]).unwrap();
        let from_flag = Args::try_parse_from([
            "vsphere-exporter",
            "--vsphere.api-release",
            "8.0.2.0",
        ])
        .unwrap();

        std::env::remove_var("VSPHERE_API_RELEASE");
        std::env::remove_var("VSPHERE_INSECURE");

        assert_eq!(from_env.vsphere.api_release.as_deref(), Some("7.0.3.0"));
        assert_eq!(from_env.vsphere.insecure, Some(false));
        assert_eq!(from_flag.vsphere.api_release.as_deref(), Some("8.0.2.0"));

        let config = VsphereConfig::from_args(&from_env.vsphere);
        assert!(!config.insecure);
        assert_eq!(config.api_release, "7.0.3.0");
    }
}
