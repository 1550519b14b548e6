// # linkwatchd - Link Monitor Daemon
//
// A thin integration layer around `linkwatch-core`:
// 1. Reading configuration from the environment and a JSON file
// 2. Initializing logging and the runtime
// 3. Registering the DNS and ICMP probes
// 4. Running the coordinator until shutdown
//
// ## Configuration
//
// - `LINKWATCH_CONFIG`: path to the JSON monitor configuration (required)
// - `LINKWATCH_LOG_LEVEL`: trace, debug, info, warn or error (default info)
//
// ## Signals
//
// - `SIGTERM` / `SIGINT`: stop the coordinator and exit
// - `SIGHUP`: reset every link's configured address and re-learn it
//
// ## Example
//
// ```bash
// cat > /etc/linkwatch.json <<'EOF'
// {
//   "name": "Internet Status",
//   "links": [
//     {"name": "Fibre", "role": "primary", "probe_type": "google", "probe_target": "ns1.google.com"},
//     {"name": "LTE", "role": "secondary", "probe_type": "opendns", "probe_target": "resolver1.opendns.com"},
//     {"name": "Gateway", "probe_type": "ping", "probe_target": "192.168.1.1"}
//   ]
// }
// EOF
// export LINKWATCH_CONFIG=/etc/linkwatch.json
//
// linkwatchd
// ```

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use linkwatch_core::{Coordinator, CoordinatorEvent, MonitorConfig, ProbeRegistry};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum LinkwatchExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<LinkwatchExitCode> for ExitCode {
    fn from(code: LinkwatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon settings from the environment
struct Settings {
    config_path: PathBuf,
    log_level: String,
}

impl Settings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            config_path: env::var("LINKWATCH_CONFIG")
                .context("LINKWATCH_CONFIG is required")?
                .into(),
            log_level: env::var("LINKWATCH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.config_path.as_os_str().is_empty() {
            anyhow::bail!(
                "LINKWATCH_CONFIG cannot be empty. \
                Set it via: export LINKWATCH_CONFIG=/etc/linkwatch.json"
            );
        }
        if !self.config_path.is_file() {
            anyhow::bail!(
                "LINKWATCH_CONFIG does not point to a file: {}",
                self.config_path.display()
            );
        }

        if self.level().is_none() {
            anyhow::bail!(
                "LINKWATCH_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            );
        }

        Ok(())
    }

    fn level(&self) -> Option<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }

    /// Read and validate the monitor configuration
    fn load_monitor_config(&self) -> Result<MonitorConfig> {
        let json = std::fs::read_to_string(&self.config_path)
            .with_context(|| format!("cannot read {}", self.config_path.display()))?;
        let config = MonitorConfig::from_json(&json)
            .with_context(|| format!("invalid configuration in {}", self.config_path.display()))?;
        config.validate()?;

        if config.links.is_empty() {
            anyhow::bail!(
                "{} defines no links. At least one primary link is required",
                self.config_path.display()
            );
        }

        Ok(config)
    }
}

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return LinkwatchExitCode::ConfigError.into();
        }
    };

    if let Err(e) = settings.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return LinkwatchExitCode::ConfigError.into();
    }

    let config = match settings.load_monitor_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return LinkwatchExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(settings.level().unwrap_or(Level::INFO))
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return LinkwatchExitCode::ConfigError.into();
    }

    info!("Starting linkwatchd");
    info!(
        "Configuration loaded from {}: {} link(s)",
        settings.config_path.display(),
        config.links.len()
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return LinkwatchExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => LinkwatchExitCode::CleanShutdown,
            Err(e) if is_config_error(&e) => {
                error!("Startup failed: {:#}", e);
                LinkwatchExitCode::ConfigError
            }
            Err(e) => {
                error!("Daemon error: {:#}", e);
                LinkwatchExitCode::RuntimeError
            }
        }
    })
    .into()
}

fn is_config_error(e: &anyhow::Error) -> bool {
    e.downcast_ref::<linkwatch_core::Error>()
        .is_some_and(linkwatch_core::Error::is_config)
}

/// Register probes, build the coordinator and run it until a shutdown signal
async fn run_daemon(config: MonitorConfig) -> Result<()> {
    let registry = ProbeRegistry::with_builtin();

    #[cfg(feature = "dns")]
    {
        info!("Registering DNS probes");
        linkwatch_probe_dns::register(&registry, config.reverse_resolver);
    }

    #[cfg(feature = "icmp")]
    {
        info!("Registering ICMP probe");
        linkwatch_probe_icmp::register(&registry);
    }

    debug!("Available probes: {:?}", registry.list_probes());

    let (coordinator, events) = Coordinator::new(&config, &registry).await?;
    let coordinator = Arc::new(coordinator);
    info!(
        "{}: polling every {:?}",
        coordinator.name(),
        coordinator.poll_interval()
    );

    let event_task = tokio::spawn(log_events(Arc::downgrade(&coordinator), events));

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let runner = coordinator.clone();
    let mut run_task = tokio::spawn(async move { runner.run_with_shutdown(Some(shutdown_rx)).await });

    tokio::select! {
        result = &mut run_task => {
            drop(coordinator);
            let _ = event_task.await;
            return result?.map_err(Into::into);
        }
        signal = wait_for_shutdown(Arc::downgrade(&coordinator)) => {
            info!("Received shutdown signal: {}", signal?);
        }
    }

    let _ = shutdown_tx.send(());
    let result = run_task.await?;
    // Last reference; dropping it closes the event channel once drained
    drop(coordinator);
    let _ = event_task.await;

    info!("Shutting down linkwatchd");
    result.map_err(Into::into)
}

/// Log coordinator events, with the JSON status report after each change
async fn log_events(
    coordinator: Weak<Coordinator>,
    events: tokio::sync::mpsc::Receiver<CoordinatorEvent>,
) {
    let mut events = ReceiverStream::new(events);

    while let Some(event) = events.next().await {
        match event {
            CoordinatorEvent::Started { name, links_count } => {
                info!("{} started with {} link(s)", name, links_count);
            }
            CoordinatorEvent::StatusChanged { previous, current } => {
                match previous {
                    Some(previous) => info!("Internet status: {} -> {}", previous, current),
                    None => info!("Internet status: {}", current),
                }
                log_report(&coordinator).await;
            }
            CoordinatorEvent::LinkStatusChanged {
                link,
                previous,
                current,
            } => {
                info!("{}: {} -> {}", link, previous, current);
                log_report(&coordinator).await;
            }
            CoordinatorEvent::RttReport { link, rtt, samples } => match rtt {
                Some(rtt) => info!("{}: rtt {:.3} ms over {:?}", link, rtt, samples),
                None => info!("{}: no rtt samples", link),
            },
            CoordinatorEvent::Stopped { reason } => {
                info!("Coordinator stopped: {}", reason);
            }
            other => debug!("Event: {:?}", other),
        }
    }
}

async fn log_report(coordinator: &Weak<Coordinator>) {
    let Some(coordinator) = coordinator.upgrade() else {
        return;
    };
    match serde_json::to_string(&coordinator.report().await) {
        Ok(json) => debug!("Status report: {}", json),
        Err(e) => warn!("Failed to serialize status report: {}", e),
    }
}

/// Wait for SIGTERM or SIGINT, handling SIGHUP resets meanwhile
///
/// # Returns
///
/// The name of the signal that requested shutdown
#[cfg(unix)]
async fn wait_for_shutdown(coordinator: Weak<Coordinator>) -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;
    let mut sighup = signal(SignalKind::hangup())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGHUP handler: {}", e))?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => return Ok("SIGTERM"),
            _ = sigint.recv() => return Ok("SIGINT"),
            _ = sighup.recv() => {
                let Some(coordinator) = coordinator.upgrade() else {
                    continue;
                };
                info!("SIGHUP: resetting configured addresses");
                let status = coordinator.reset_all_configured_addresses().await;
                info!("Internet status after reset: {}", status);
            }
        }
    }
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown(_coordinator: Weak<Coordinator>) -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
