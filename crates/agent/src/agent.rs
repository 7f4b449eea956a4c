//! The control-loop context.
//!
//! `Agent` owns the schedule store, the outputs, the clock, the sensors and
//! the connection supervisor. The loop in `main` feeds it transport events
//! and one-second ticks; every handler here runs to completion without
//! waiting on the broker.

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::command::{Command, CommandKind, OnOff};
use crate::config::Config;
use crate::dispatch::{dispatch, Dispatch};
use crate::error::ErrorKind;
use crate::output::DeviceOutput;
use crate::router::{route, Routed, ScheduleEdit, Topics};
use crate::schedule::{self, ScheduleStore};
use crate::sensors::{SensorSnapshot, SensorSource};
use crate::state::{EventKind, SharedState};
use crate::status::{report_heartbeat, report_status, report_telemetry};
use crate::supervisor::{ConnectionSupervisor, Liveness};
use crate::tasks::{PeriodicTasks, TaskKind};
use crate::transport::Publisher;

pub struct Agent<O, C, S> {
    device_id: String,
    topics: Topics,
    store: ScheduleStore,
    output: O,
    clock: C,
    sensors: S,
    supervisor: ConnectionSupervisor,
    tasks: PeriodicTasks,
    pump_cutoff: Option<u8>,
    latest: Option<SensorSnapshot>,
    shared: SharedState,
}

impl<O: DeviceOutput, C: Clock, S: SensorSource> Agent<O, C, S> {
    pub fn new(
        cfg: &Config,
        output: O,
        clock: C,
        sensors: S,
        shared: SharedState,
        start: Instant,
    ) -> Self {
        let topics = Topics::new(&cfg.device_id, cfg.group_id.as_deref());
        let supervisor =
            ConnectionSupervisor::new(topics.subscriptions(), cfg.reconnect_interval());
        let tasks = PeriodicTasks::new(&cfg.task_table(), start);

        info!(
            device_id = %cfg.device_id,
            topics = ?topics.subscriptions(),
            schedule_every = ?tasks.interval(TaskKind::ScheduleTick),
            pump_cutoff = ?cfg.safety.pump_cutoff_percent,
            "agent ready"
        );

        Self {
            device_id: cfg.device_id.clone(),
            topics,
            store: ScheduleStore::new(),
            output,
            clock,
            sensors,
            supervisor,
            tasks,
            pump_cutoff: cfg.safety.pump_cutoff_percent,
            latest: None,
            shared,
        }
    }

    pub fn may_poll(&self, now: Instant) -> bool {
        self.supervisor.may_poll(now)
    }

    // -----------------------------------------------------------------------
    // Transport events
    // -----------------------------------------------------------------------

    pub async fn on_message(&mut self, topic: &str, payload: &[u8]) -> Routed {
        let routed = route(&self.topics, topic, payload, &mut self.store, &mut self.output);

        let mut st = self.shared.write().await;
        match &routed {
            Routed::Malformed(e) => st.record(EventKind::Error, format!("{topic}: {e}")),
            Routed::Handled {
                immediate,
                schedule,
            } => {
                if let Some(Dispatch::Applied { kind, value }) = immediate {
                    st.record(EventKind::Command, format!("{kind} set {value}"));
                }
                match schedule {
                    Some(ScheduleEdit::Added(e)) => st.record(
                        EventKind::Schedule,
                        format!("added {} {} at {}", e.command, e.value, e.trigger_time),
                    ),
                    Some(ScheduleEdit::Removed(e)) => st.record(
                        EventKind::Schedule,
                        format!("deleted {} {} at {}", e.command, e.value, e.trigger_time),
                    ),
                    _ => {}
                }
            }
            Routed::UnknownTopic | Routed::StatusEcho => {}
        }
        st.sync(&self.output, &self.store);
        drop(st);

        routed
    }

    pub async fn on_connected(&mut self, publisher: &dyn Publisher) {
        let failures = self.supervisor.on_connected(publisher);
        let mut st = self.shared.write().await;
        st.mqtt_connected = true;
        st.record(EventKind::System, "mqtt connected".to_string());
        for e in failures {
            st.record(EventKind::Error, e.to_string());
        }
    }

    pub async fn on_disconnected(&mut self, now: Instant, reason: &str) {
        let err = self.supervisor.on_disconnected(now, reason);
        let mut st = self.shared.write().await;
        st.mqtt_connected = false;
        st.record(
            EventKind::Error,
            format!("{err} (attempt {})", self.supervisor.attempts()),
        );
    }

    // -----------------------------------------------------------------------
    // Periodic tasks
    // -----------------------------------------------------------------------

    pub async fn run_due(&mut self, now: Instant, publisher: &dyn Publisher) {
        for kind in self.tasks.due(now) {
            self.run_task(kind, now, publisher).await;
        }
    }

    pub async fn run_task(&mut self, kind: TaskKind, now: Instant, publisher: &dyn Publisher) {
        match kind {
            TaskKind::ScheduleTick => self.schedule_tick().await,
            TaskKind::Sample => self.sample().await,
            TaskKind::Telemetry => {
                let Some(snapshot) = self.latest else {
                    debug!("no sensor sample yet, skipping telemetry");
                    return;
                };
                if let Err(e) = report_telemetry(publisher, &self.topics.telemetry, &snapshot) {
                    warn!("telemetry dropped: {e}");
                }
            }
            TaskKind::StatusReport => {
                report_status(publisher, &self.topics.device, &self.output);
            }
            TaskKind::Heartbeat => {
                if let Err(e) = report_heartbeat(publisher, &self.topics.heartbeat, &self.device_id) {
                    warn!("heartbeat dropped: {e}");
                }
            }
            TaskKind::ConnectionCheck => {
                let liveness = self.supervisor.check(now);
                self.shared.write().await.mqtt_connected = liveness == Liveness::Connected;
            }
        }
    }

    async fn schedule_tick(&mut self) {
        match schedule::tick(&mut self.store, &mut self.output, &self.clock) {
            Ok(fired) if fired.is_empty() => {}
            Ok(fired) => {
                let mut st = self.shared.write().await;
                for e in &fired {
                    st.record(
                        EventKind::Schedule,
                        format!("fired {} {} (due {})", e.command, e.value, e.trigger_time),
                    );
                }
                st.sync(&self.output, &self.store);
            }
            Err(ErrorKind::ClockUnavailable) if self.store.is_empty() => {
                debug!("clock not synchronised, schedule tick skipped");
            }
            Err(e) => warn!(pending = self.store.len(), "schedule tick skipped: {e}"),
        }
    }

    async fn sample(&mut self) {
        let pumping = self.output.get(CommandKind::Pump).is_on();
        self.sensors.set_pumping(pumping);
        let snapshot = self.sensors.sample();
        self.latest = Some(snapshot);

        let cut = self.overflow_cutoff(&snapshot);

        let mut st = self.shared.write().await;
        st.record_sensors(snapshot);
        if let Some(level) = cut {
            st.record(
                EventKind::Command,
                format!("PUMP forced OFF, water level {level}%"),
            );
            st.sync(&self.output, &self.store);
        }
    }

    /// Stop the pump when the tank is over the cutoff. Goes through the
    /// regular command path. Returns the level that triggered it.
    fn overflow_cutoff(&mut self, snapshot: &SensorSnapshot) -> Option<u8> {
        let cutoff = self.pump_cutoff?;
        let level = snapshot.water_percent();
        if level <= cutoff || !self.output.get(CommandKind::Pump).is_on() {
            return None;
        }
        warn!(level, cutoff, "water level over cutoff, stopping pump");
        let off = Command::immediate(CommandKind::Pump, OnOff::Off);
        matches!(dispatch(&off, &mut self.output), Dispatch::Applied { .. }).then_some(level)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
