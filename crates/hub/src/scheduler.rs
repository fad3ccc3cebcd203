//! Schedule runner: every tick, asks the engine what each device should be
//! doing and publishes `ON`/`OFF` to `device/<device_id>/set`.
//!
//! All devices are evaluated on every tick; they share nothing, so there is
//! no rotation or ordering between them. Every verdict is appended to the
//! verdict log, including holds.
//!
//! A command is only published when the gateway-reported state differs from
//! the verdict (or is still unknown), so level-triggered schedules do not
//! flood the broker once per tick.
//!
//! Ticks are phase-locked to the wall-clock minute (one second past it), so
//! a late timer never lands two ticks in one minute and skips the next.

use std::time::Duration;

use rumqttc::{AsyncClient, QoS};
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use automation_engine::clock::to_iso_date;
use automation_engine::{process_device, Action, ScheduleRequest, Verdict};

use crate::config::{DeviceEntry, EngineSection, VerdictLogSection};
use crate::db::{Db, VerdictRecord};
use crate::mqtt::{command_payload, command_topic};
use crate::state::SharedState;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Offset of every tick past the minute boundary.
const TICK_PHASE: Duration = Duration::from_secs(1);

/// Run the scheduler loop.  Intended to be `tokio::spawn`-ed from main.
pub async fn run(
    db: Db,
    devices: Vec<DeviceEntry>,
    engine: EngineSection,
    verdict_log: VerdictLogSection,
    mqtt: AsyncClient,
    shared: SharedState,
    offset: UtcOffset,
) {
    let first = Instant::now() + until_next_minute(OffsetDateTime::now_utc().to_offset(offset));
    let mut ticker = tokio::time::interval_at(first, Duration::from_secs(engine.tick_sec));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        devices = devices.len(),
        tick_sec = engine.tick_sec,
        precedence = ?engine.precedence,
        %offset,
        "scheduler started"
    );
    {
        let mut st = shared.write().await;
        st.record_scheduler(format!(
            "scheduler started ({} device(s), tick {}s, {:?})",
            devices.len(),
            engine.tick_sec,
            engine.precedence
        ));
    }

    let mut last_pruned: Option<Date> = None;

    // One evaluation right away, then aligned ticks.
    let now = OffsetDateTime::now_utc().to_offset(offset);
    tick(&devices, &engine, now, &db, &mqtt, &shared).await;

    loop {
        ticker.tick().await;
        let now = OffsetDateTime::now_utc().to_offset(offset);
        let published = tick(&devices, &engine, now, &db, &mqtt, &shared).await;
        debug!(published, "scheduler tick done");

        prune_once_a_day(&db, now, verdict_log.retention_days, &mut last_pruned).await;
    }
}

/// Time from `now` to the next minute boundary plus [`TICK_PHASE`].
pub(crate) fn until_next_minute(now: OffsetDateTime) -> Duration {
    let into_minute = Duration::new(u64::from(now.second()), now.nanosecond());
    Duration::from_secs(60) - into_minute + TICK_PHASE
}

/// Drop verdict rows older than `retention_days`, at most once per local day.
/// Returns the number of rows removed.
pub(crate) async fn prune_once_a_day(
    db: &Db,
    now: OffsetDateTime,
    retention_days: u32,
    last_pruned: &mut Option<Date>,
) -> u64 {
    if *last_pruned == Some(now.date()) {
        return 0;
    }
    let cutoff = now - time::Duration::days(i64::from(retention_days));
    match db.prune_verdicts(cutoff.unix_timestamp()).await {
        Ok(removed) => {
            *last_pruned = Some(now.date());
            info!(removed, retention_days, "verdict log pruned");
            removed
        }
        Err(e) => {
            warn!("scheduler: {e:#}");
            0
        }
    }
}

/// Evaluate every device once. Returns how many commands were published.
pub(crate) async fn tick(
    devices: &[DeviceEntry],
    engine: &EngineSection,
    now: OffsetDateTime,
    db: &Db,
    mqtt: &AsyncClient,
    shared: &SharedState,
) -> usize {
    let mut published = 0;
    for dev in devices {
        if evaluate_device(dev, engine, now, db, mqtt, shared).await {
            published += 1;
        }
    }
    published
}

// ---------------------------------------------------------------------------
// Per-device evaluation
// ---------------------------------------------------------------------------

/// Run the engine for one device, log the verdict, and actuate.
/// Returns `true` when a command was published.
async fn evaluate_device(
    dev: &DeviceEntry,
    engine: &EngineSection,
    now: OffsetDateTime,
    db: &Db,
    mqtt: &AsyncClient,
    shared: &SharedState,
) -> bool {
    let device = dev.device();
    let req = ScheduleRequest {
        device: Some(&device),
        schedules: dev.schedules.as_deref(),
        excluded_days: &dev.excluded_days,
        holidays: &engine.holidays,
        now: PrimitiveDateTime::new(now.date(), now.time()),
        holiday_policy: engine.holiday_policy,
        precedence: engine.precedence,
    };
    let verdict = process_device(&req);

    {
        let mut st = shared.write().await;
        st.record_verdict(&dev.device_id, verdict.action, verdict.reason);
    }

    let day = to_iso_date(now.date());
    let record = VerdictRecord::new(now.unix_timestamp(), &day, &dev.device_id, &verdict);
    if let Err(e) = db.insert_verdict(&record).await {
        error!(device = %dev.device_id, "scheduler: insert_verdict failed: {e:#}");
    }

    actuate(&dev.device_id, &verdict, mqtt, shared).await
}

/// Publish the verdict's command if the device is not already there.
async fn actuate(
    device_id: &str,
    verdict: &Verdict,
    mqtt: &AsyncClient,
    shared: &SharedState,
) -> bool {
    let Some(payload) = command_payload(verdict.action) else {
        return false;
    };
    let want_on = verdict.action == Action::Activate;

    // ── Guards ───────────────────────────────────────────────────
    {
        let st = shared.read().await;
        if !st.mqtt_connected {
            return false;
        }
        if st.devices.get(device_id).and_then(|d| d.on) == Some(want_on) {
            return false;
        }
    }

    if let Err(e) = mqtt
        .publish(command_topic(device_id), QoS::AtLeastOnce, false, payload.to_vec())
        .await
    {
        error!(device = %device_id, "scheduler: failed to publish command: {e}");
        let mut st = shared.write().await;
        st.record_error(format!("{device_id}: publish failed: {e}"));
        return false;
    }

    info!(
        device = %device_id,
        on = want_on,
        reason = verdict.reason.as_str(),
        applied = ?verdict.applied_schedule.as_ref().map(|s| format!("{}-{}", s.start_hour, s.end_hour)),
        "scheduler: command published"
    );
    {
        let mut st = shared.write().await;
        st.record_command(device_id, want_on, verdict.reason);
    }
    true
}

// ===========================================================================
// Tests
// ===========================================================================
