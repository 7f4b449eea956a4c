mod agent;
mod clock;
mod command;
mod config;
mod dispatch;
mod error;
mod output;
mod router;
mod schedule;
mod sensors;
mod state;
mod status;
mod supervisor;
mod tasks;
mod transport;
mod web;

use anyhow::{Context, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet};
use std::{env, sync::Arc, time::Duration};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use agent::Agent;
use clock::LocalClock;
use output::OutputBoard;
use sensors::SimSensors;
use state::{EventKind, SystemState};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let mut cfg = config::load(&config_path)?;
    apply_env_overrides(&mut cfg);
    cfg.validate().context("invalid config after env overrides")?;

    // ── Outputs, clock, sensors ─────────────────────────────────────
    let board = OutputBoard::new(cfg.pin_map(), cfg.outputs.active_low)?;
    let clock = LocalClock::from_hours(cfg.clock.utc_offset_hours)?;
    let sensors = SimSensors::new();

    // ── Shared state (read by the status endpoint) ──────────────────
    let shared = SystemState::shared(&cfg.device_id);
    shared
        .write()
        .await
        .record(EventKind::System, "agent started".to_string());

    if cfg.web.enabled {
        let listener = web::bind(cfg.web.port).await?;
        let web_state = Arc::clone(&shared);
        tokio::spawn(async move {
            web::serve(listener, web_state).await;
        });
    }

    // ── MQTT ────────────────────────────────────────────────────────
    let client_id = format!("grow-agent-{}", cfg.device_id);
    let mut opts = MqttOptions::new(client_id, cfg.mqtt.host.clone(), cfg.mqtt.port);
    opts.set_keep_alive(Duration::from_secs(cfg.mqtt.keep_alive_sec));
    let (client, mut eventloop) = AsyncClient::new(opts, cfg.mqtt.queue_cap);

    info!(
        broker = %format!("{}:{}", cfg.mqtt.host, cfg.mqtt.port),
        "connecting"
    );

    let mut agent = Agent::new(&cfg, board, clock, sensors, shared, Instant::now());

    let mut ticker = interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = eventloop.poll(), if agent.may_poll(Instant::now()) => match event {
                Ok(Event::Incoming(Packet::Publish(p))) => {
                    agent.on_message(&p.topic, &p.payload).await;
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    agent.on_connected(&client).await;
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    agent.on_disconnected(Instant::now(), "broker sent disconnect").await;
                }
                Ok(other) => debug!(?other, "mqtt event"),
                Err(e) => {
                    agent.on_disconnected(Instant::now(), &e.to_string()).await;
                }
            },
            _ = ticker.tick() => {
                agent.run_due(Instant::now(), &client).await;
            }
        }
    }
}

/// `MQTT_HOST`, `MQTT_PORT`, `DEVICE_ID` and `WEB_PORT` take precedence over
/// the file. Unparseable ports are ignored.
fn apply_env_overrides(cfg: &mut config::Config) {
    if let Ok(host) = env::var("MQTT_HOST") {
        cfg.mqtt.host = host;
    }
    if let Ok(port) = env::var("MQTT_PORT") {
        match port.parse() {
            Ok(p) => cfg.mqtt.port = p,
            Err(_) => warn!(%port, "ignoring unparseable MQTT_PORT"),
        }
    }
    if let Ok(id) = env::var("DEVICE_ID") {
        cfg.device_id = id;
    }
    if let Ok(port) = env::var("WEB_PORT") {
        match port.parse() {
            Ok(p) => cfg.web.port = p,
            Err(_) => warn!(%port, "ignoring unparseable WEB_PORT"),
        }
    }
}
