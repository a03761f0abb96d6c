use std::sync::Arc;

use anyhow::Context;
use hub_core::config::HubCfg;
use hub_core::intent::RuleTable;
use hub_core::io::{AgentListener, input};
use hub_core::runtime::{Runtime, ShutdownGuard};
use hub_link::WsConnector;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cfg = Arc::new(HubCfg::from_env());
    for (key, value, desc) in cfg.to_entries() {
        tracing::debug!(key, value = %value, desc, "config");
    }

    let rules = match &cfg.rules_path {
        Some(path) => RuleTable::load(path).with_context(|| format!("loading rules from {path}"))?,
        None => RuleTable::reference(),
    };
    if rules.is_empty() {
        tracing::warn!("rule table is empty, no intents will be recognized");
    }

    // Bind first: failing to listen is fatal.
    let listener = AgentListener::bind(&cfg.listen_addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        downstream = %cfg.downstream_url,
        "intent hub starting"
    );

    let shutdown = ShutdownGuard::new();
    shutdown.spawn_signal_listener();
    let token = shutdown.token();

    let connector = Arc::new(WsConnector::new(cfg.downstream_url.clone()));
    let (mut runtime, mut status_rx) = Runtime::new(cfg.clone(), rules, connector);
    let (event_tx, event_rx) = input::channel(cfg.event_buffer);
    let registry = listener.registry();

    let status_token = token.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = status_token.cancelled() => break,
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = status_rx.borrow_and_update().clone();
                    tracing::debug!(
                        events = status.events,
                        matched = status.matched,
                        suppressed = status.suppressed,
                        agents = registry.len(),
                        last_action = ?status.last_action,
                        "hub status"
                    );
                }
            }
        }
    });

    let serve_fut = listener.serve(event_tx, token.clone());
    let runtime_fut = runtime.run(event_rx, token.clone());
    tokio::join!(serve_fut, runtime_fut);

    Ok(())
}

/// Human-readable logs by default; JSON lines when `HUB_LOG_JSON=1`.
/// Filter via `RUST_LOG`, defaulting to `info`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("HUB_LOG_JSON").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}
