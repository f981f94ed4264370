//! Dashboard server entrypoint: config, identity, gateway pool, discovery,
//! then the HTTP loop.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use maestro::gateway::discover_agents;
use maestro::thinker::GatewayThinker;
use maestro::{
    AgentRegistry, DeviceIdentity, GatewayAdapter, GatewayClient, GatewayConfig, GatewayRegistry,
    Orchestrator, RunStore, SqliteRunStore,
};
use serve::{run_serve, AppState};

const APP_NAME: &str = "maestro";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer();
    match std::env::var("MAESTRO_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "maestro-serve.log");
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(appender))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .init();
        }
    }
}

fn data_path(file: &str) -> PathBuf {
    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")),
    };
    base.join(APP_NAME).join(file)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Err(e) = config::load_and_apply(APP_NAME, None) {
        eprintln!("config load failed: {}", e);
    }
    init_tracing();

    let settings = config::Settings::load(APP_NAME)?;

    let identity_path = settings
        .identity_path()
        .cloned()
        .unwrap_or_else(DeviceIdentity::default_path);
    let identity = Arc::new(DeviceIdentity::load_or_create(&identity_path)?);
    info!(device_id = %identity.device_id(), "device identity ready");

    let mut gateways = GatewayRegistry::new();
    for gw in &settings.gateways {
        let mut config = GatewayConfig::new(&gw.name, &gw.url);
        if let Some(token) = &gw.token {
            config = config.with_token(token);
        }
        gateways.add(Arc::new(GatewayClient::new(config, Arc::clone(&identity))));
    }
    if settings.gateways.is_empty() {
        warn!("no gateways configured; submitted runs will fail until one is added");
    }
    let gateways = Arc::new(gateways);

    // Best-effort discovery: register every reachable gateway's agents.
    let mut agents = AgentRegistry::new();
    for name in gateways.names() {
        let Some(client) = gateways.get(&name) else {
            continue;
        };
        if let Err(e) = client.connect().await {
            warn!(gateway = %name, "gateway unreachable at startup: {}", e);
            continue;
        }
        match discover_agents(&client).await {
            Ok(discovered) => {
                info!(gateway = %name, count = discovered.len(), "agents discovered");
                for agent in discovered {
                    let adapter = GatewayAdapter::from_discovered(agent, Arc::clone(&client));
                    if let Err(e) = agents.add(Arc::new(adapter)) {
                        warn!("skipping duplicate agent: {}", e);
                    }
                }
            }
            Err(e) => warn!(gateway = %name, "agent discovery failed: {}", e),
        }
    }
    let agents = Arc::new(agents);

    let store: Arc<dyn RunStore> = Arc::new(SqliteRunStore::new(data_path("runs.db"))?);
    let thinker = Arc::new(GatewayThinker::new(Arc::clone(&gateways)));
    let orchestrator = Arc::new(
        Orchestrator::new(thinker, Arc::clone(&agents)).with_store(Arc::clone(&store)),
    );

    let state = Arc::new(
        AppState::new(orchestrator, Arc::clone(&gateways))
            .with_store(store)
            .with_max_runs(settings.dashboard.max_runs),
    );
    run_serve(Some(&settings.dashboard.addr), state).await
}
