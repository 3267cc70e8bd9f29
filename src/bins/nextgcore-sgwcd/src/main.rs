//! NextGCore SGWC (Serving Gateway Control Plane)
//!
//! Daemon entry point: loads the configuration, binds the S11 and S5/S8-C
//! sockets and runs the application task next to one path task per
//! interface until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nextgcore_sgwcd::gtp_path::{self, GtpPath, UdpTransport};
use nextgcore_sgwcd::sm::{self, SgwcFsm};
use nextgcore_sgwcd::{GtpInterface, SgwcConfig, SgwcContext, SgwcEvent};
use ogs_core::log::{ogs_log_init_level, OgsLogLevel};
use ogs_core::UidGenerator;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// NextGCore SGWC - Serving Gateway Control Plane
#[derive(Parser, Debug)]
#[command(name = "nextgcore-sgwcd")]
#[command(author = "NextGCore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "EPC Serving Gateway Control Plane")]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/nextgcore/sgwc.yaml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Disable color output
    #[arg(long)]
    no_color: bool,

    /// Run in daemon mode
    #[arg(short, long)]
    daemon: bool,
}

/// SGWC application state
pub struct SgwcApp {
    /// Running flag
    running: Arc<AtomicBool>,
    config: Arc<SgwcConfig>,
    ids: Arc<UidGenerator>,
}

impl SgwcApp {
    pub fn new(config: SgwcConfig) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            config: Arc::new(config),
            ids: Arc::new(UidGenerator::new()),
        }
    }

    /// Bind both interfaces and run every task until stopped
    pub async fn run(&self) -> Result<()> {
        let s11_socket = bind(self.config.gtpc.s11).await?;
        let s5c_socket = bind(self.config.gtpc.s5c).await?;
        log::info!("S11 listening on {}", self.config.gtpc.s11);
        log::info!("S5-C listening on {}", self.config.gtpc.s5c);

        let (app_tx, app_rx) = mpsc::unbounded_channel();
        let (s11_tx, s11_rx) = mpsc::unbounded_channel();
        let (s5c_tx, s5c_rx) = mpsc::unbounded_channel();

        let s11_path = self.path(GtpInterface::S11, &s11_socket);
        let s5c_path = self.path(GtpInterface::S5s8, &s5c_socket);
        let s11_task = tokio::spawn(gtp_path::run_path(
            s11_path,
            s11_socket,
            s11_rx,
            app_tx.clone(),
            Arc::clone(&self.running),
        ));
        let s5c_task = tokio::spawn(gtp_path::run_path(
            s5c_path,
            s5c_socket,
            s5c_rx,
            app_tx.clone(),
            Arc::clone(&self.running),
        ));

        let context = SgwcContext::new(Arc::clone(&self.config), Arc::clone(&self.ids));
        let app_task = tokio::spawn(sm::run_app(SgwcFsm::new(context), app_rx, s11_tx, s5c_tx));

        log::info!("SGWC running...");
        while self.running.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        self.shutdown(app_tx, app_task, [s11_task, s5c_task]).await
    }

    fn path(&self, iface: GtpInterface, socket: &Arc<UdpSocket>) -> GtpPath<UdpTransport> {
        GtpPath::new(
            iface,
            self.config.xact_config(),
            Arc::clone(&self.ids),
            UdpTransport::new(Arc::clone(socket)),
            self.config.restart_counter,
        )
    }

    async fn shutdown(
        &self,
        app_tx: mpsc::UnboundedSender<SgwcEvent>,
        app_task: tokio::task::JoinHandle<SgwcFsm>,
        paths: [tokio::task::JoinHandle<()>; 2],
    ) -> Result<()> {
        log::info!("Shutting down SGWC...");

        if app_tx.send(SgwcEvent::exit()).is_err() {
            log::warn!("Application task already stopped");
        }
        drop(app_tx);

        let fsm = app_task.await.context("application task failed")?;
        log::debug!(
            "SGWC state machine finalized: {:?}, {} UE left",
            fsm.state,
            fsm.context().ue_count()
        );
        for path in paths {
            path.await.context("path task failed")?;
        }

        log::info!("SGWC shutdown complete");
        Ok(())
    }

    /// Signal the application to stop
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Get the running flag for signal handlers
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }
}

async fn bind(addr: std::net::SocketAddr) -> Result<Arc<UdpSocket>> {
    let socket = UdpSocket::bind(addr)
        .await
        .with_context(|| format!("failed to bind GTP-C socket {addr}"))?;
    Ok(Arc::new(socket))
}

fn load_config(path: &str) -> Result<SgwcConfig> {
    if std::path::Path::new(path).exists() {
        log::info!("Loading configuration from {}", path);
        SgwcConfig::load(path).with_context(|| format!("invalid configuration {path}"))
    } else {
        log::warn!("Configuration file not found: {}, using defaults", path);
        Ok(SgwcConfig::default())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    ogs_log_init_level(OgsLogLevel::from_name(&args.log_level), args.no_color);

    log::info!("NextGCore SGWC v{}", env!("CARGO_PKG_VERSION"));
    if args.daemon {
        log::debug!("Daemon mode requested, running in foreground");
    }

    let config = load_config(&args.config)?;
    let app = SgwcApp::new(config);

    let running = app.running_flag();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    app.run().await?;

    log::info!("NextGCore SGWC terminated");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
