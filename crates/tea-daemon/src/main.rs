//! tea-daemon: local staking ledger service.
//!
//! Single OS process running a Tokio async runtime. Hosts one
//! [`StakingLedger`] over in-memory token and vesting services and exposes
//! it via JSON-RPC over a Unix socket.

mod clock;
mod commands;
mod config;
mod events;
mod rpc;

use std::sync::Arc;

use tea_staking::stub::{MemoryBank, StubVesting};
use tea_staking::StakingLedger;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info};

use crate::config::DaemonConfig;
use crate::events::EventBus;
use crate::rpc::RpcServer;

/// The ledger as hosted by the daemon.
pub type Ledger = StakingLedger<MemoryBank, StubVesting>;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// The ledger. Every call takes the lock for its whole duration.
    pub ledger: Mutex<Ledger>,
    /// Configuration.
    pub config: DaemonConfig,
    /// Event bus for pushing events to subscribers.
    pub event_bus: EventBus,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
}

impl DaemonState {
    /// Build the ledger described by `config`.
    pub fn new(config: DaemonConfig, shutdown_tx: broadcast::Sender<()>) -> anyhow::Result<Self> {
        let params = config.ledger.to_params(&config.lock)?;

        let mut bank = MemoryBank::new();
        bank.register_token(params.primary_token, config.ledger.token_decimals);
        for token in &params.auxiliary_tokens {
            bank.register_token(*token, config.ledger.token_decimals);
        }

        let ledger = StakingLedger::new(params, bank, StubVesting::new())?;
        let event_bus = EventBus::new(config.rpc.event_buffer);

        Ok(Self {
            ledger: Mutex::new(ledger),
            config,
            event_bus,
            shutdown_tx,
        })
    }

    /// Forward the ledger's pending events to the bus.
    pub fn publish(&self, ledger: &mut Ledger, timestamp: u64) {
        self.event_bus.publish(ledger.drain_events(), timestamp);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("tea={}", config.logging.level).parse()?),
        )
        .init();

    info!("tea-staking daemon starting");

    std::fs::create_dir_all(config.data_dir())?;

    // 2. Create shutdown channel
    let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

    // 3. Build daemon state
    let state = Arc::new(DaemonState::new(config, shutdown_tx.clone())?);
    let socket_path = state.config.socket_path();
    let accrual_interval = state.config.ledger.accrual_interval_secs;

    // 4. Log every bus event
    let mut events_rx = state.event_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events_rx.recv().await {
            info!(
                event = %event.event_type,
                sequence = event.sequence,
                payload = %event.payload,
                "event"
            );
        }
    });

    // 5. Periodic accrual refresh
    tokio::spawn(clock::run_accrual_ticker(state.clone(), accrual_interval));

    // 6. Start IPC server
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());
    info!("Starting JSON-RPC server on {:?}", socket_path);

    state.event_bus.emit(
        "DaemonStarted",
        clock::now(),
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
        }),
    );

    // 7. Run the RPC server until shutdown
    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    // Graceful shutdown
    info!("Daemon shutting down gracefully");
    let _ = shutdown_tx.send(());

    // Clean up socket file
    let _ = std::fs::remove_file(&socket_path);

    info!("Daemon stopped");
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_state(config: DaemonConfig) -> Arc<DaemonState> {
    let (shutdown_tx, _) = broadcast::channel(1);
    Arc::new(DaemonState::new(config, shutdown_tx).expect("test state"))
}
