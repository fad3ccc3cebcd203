mod config;
mod db;
mod mqtt;
mod scheduler;
mod state;
mod web;

use anyhow::{Context, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::{env, sync::Arc, time::Duration};
use time::macros::format_description;
use time::UtcOffset;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use db::Db;
use mqtt::{extract_device_id, parse_state_payload, subscribe_states, STATE_FILTER};
use state::SystemState;
use web::AppState;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // The local offset can only be read reliably while the process is still
    // single-threaded, i.e. before the runtime starts.
    let offset = local_offset()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?
        .block_on(run(offset))
}

/// `TZ_OFFSET` (e.g. "-03:00") wins; otherwise the host's current offset.
fn local_offset() -> Result<UtcOffset> {
    if let Ok(raw) = env::var("TZ_OFFSET") {
        let offset = UtcOffset::parse(
            &raw,
            format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
        )
        .with_context(|| format!("invalid TZ_OFFSET '{raw}' (expected e.g. -03:00)"))?;
        return Ok(offset);
    }
    match UtcOffset::current_local_offset() {
        Ok(offset) => Ok(offset),
        Err(e) => {
            warn!("cannot determine local offset ({e}); schedules will run on UTC");
            Ok(UtcOffset::UTC)
        }
    }
}

async fn run(offset: UtcOffset) -> Result<()> {
    // ── Env config ──────────────────────────────────────────────────
    let broker = env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("MQTT_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1883);
    let db_url = env::var("DB_URL")
        .unwrap_or_else(|_| "sqlite:automation.db?mode=rwc".to_string());

    // ── Database ────────────────────────────────────────────────────
    let db = Db::connect(&db_url).await?;
    db.migrate().await?;

    // ── Config file (devices + schedules) ───────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = config::load(&config_path)?;
    config::apply(&cfg, &db).await?;

    let registered = db.load_devices().await?;
    if registered.is_empty() {
        warn!("no devices registered in the database");
    }
    info!(
        devices = cfg.devices.len(),
        registered = registered.len(),
        %offset,
        "db ready"
    );

    // ── Shared state (ephemeral, for the status API) ────────────────
    let device_names: Vec<(String, String)> = cfg
        .devices
        .iter()
        .map(|d| (d.device_id.clone(), d.name.clone()))
        .collect();
    let shared = Arc::new(RwLock::new(SystemState::new(&device_names)));
    {
        let mut st = shared.write().await;
        st.record_system("hub started".to_string());
    }

    // ── Web server ──────────────────────────────────────────────────
    let app = AppState {
        shared: Arc::clone(&shared),
        db: db.clone(),
        offset,
    };
    tokio::spawn(async move {
        if let Err(e) = web::serve(app).await {
            error!("{e:#}");
        }
    });

    // ── MQTT ────────────────────────────────────────────────────────
    let mut mqttoptions = MqttOptions::new("automation-hub", broker, port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 20);

    // ── Scheduler ───────────────────────────────────────────────────
    tokio::spawn(scheduler::run(
        db.clone(),
        cfg.devices,
        cfg.engine,
        cfg.verdict_log,
        client.clone(),
        Arc::clone(&shared),
        offset,
    ));

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(p))) => {
                let topic = p.topic.clone();

                let Some(device_id) = extract_device_id(&topic) else {
                    warn!(%topic, "unhandled topic");
                    continue;
                };

                match parse_state_payload(&p.payload) {
                    Ok(on) => {
                        info!(device = %device_id, on, "state report");
                        let mut st = shared.write().await;
                        st.record_report(device_id, on);
                    }
                    Err(msg) => {
                        warn!(device = %device_id, "{msg} (use ON/OFF)");
                        let mut st = shared.write().await;
                        st.record_error(format!("{device_id}: {msg}"));
                    }
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("mqtt connected");
                // Clean session: subscriptions do not survive a reconnect.
                if let Err(e) = subscribe_states(&client) {
                    // Queue full: wait for room on another task while this
                    // loop keeps draining it.
                    warn!("mqtt request queue busy ({e}); subscribing in background");
                    let client = client.clone();
                    tokio::spawn(async move {
                        if let Err(e) = client.subscribe(STATE_FILTER, QoS::AtLeastOnce).await {
                            error!("mqtt subscribe failed: {e}");
                        }
                    });
                } else {
                    info!("hub subscribed to {STATE_FILTER}");
                }
                let mut st = shared.write().await;
                st.mqtt_connected = true;
                st.record_system("mqtt connected".to_string());
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("mqtt disconnected");
                let mut st = shared.write().await;
                st.mqtt_connected = false;
                st.record_system("mqtt disconnected".to_string());
            }
            Ok(_) => {}
            Err(e) => {
                error!("mqtt error: {e}. reconnecting...");
                let mut st = shared.write().await;
                st.mqtt_connected = false;
                st.record_error(format!("mqtt error: {e}"));
                drop(st);

                sleep(Duration::from_secs(2)).await;
            }
        }
    }
}
