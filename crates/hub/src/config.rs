//! TOML config file loading, validation, and database seeding for devices
//! and their schedules.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;

use automation_engine::clock::parse_iso_date;
use automation_engine::{Device, HolidayPolicy, Precedence, ScheduleEntry};

use crate::db::Db;

/// Default evaluation period. Edge-triggered schedules only fire in their
/// boundary minute, so the tick may never be longer than this.
pub const MAX_TICK_SEC: u64 = 60;

/// Days of verdict history kept when the config does not say.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub verdict_log: VerdictLogSection,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct VerdictLogSection {
    /// Rows older than this many days are pruned once per local day.
    pub retention_days: u32,
}

impl Default for VerdictLogSection {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub holiday_policy: HolidayPolicy,
    pub precedence: Precedence,
    pub tick_sec: u64,
    /// `YYYY-MM-DD`, shared by every device.
    pub holidays: Vec<String>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            holiday_policy: HolidayPolicy::default(),
            precedence: Precedence::default(),
            tick_sec: MAX_TICK_SEC,
            holidays: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceEntry {
    pub device_id: String,
    pub name: String,
    #[serde(default)]
    pub excluded_days: Vec<String>,
    /// Absent means "not configured yet"; the engine holds such devices.
    pub schedules: Option<Vec<ScheduleEntry>>,
}

impl DeviceEntry {
    pub fn device(&self) -> Device {
        Device {
            device_id: self.device_id.clone(),
            device_name: self.name.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_engine(&mut errors);
        self.validate_devices(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_engine(&self, errors: &mut Vec<String>) {
        let e = &self.engine;
        if e.tick_sec == 0 || e.tick_sec > MAX_TICK_SEC {
            errors.push(format!(
                "engine: tick_sec {} out of range [1, {MAX_TICK_SEC}]",
                e.tick_sec
            ));
        } else if MAX_TICK_SEC % e.tick_sec != 0 {
            // Ticks are aligned to the minute; every minute must see the same phase.
            errors.push(format!("engine: tick_sec {} does not divide 60", e.tick_sec));
        }
        if self.verdict_log.retention_days == 0 {
            errors.push("verdict_log: retention_days must be at least 1".to_string());
        }
        for day in &e.holidays {
            if parse_iso_date(day).is_err() {
                errors.push(format!("engine: holiday '{day}' is not a YYYY-MM-DD date"));
            }
        }
    }

    fn validate_devices(&self, errors: &mut Vec<String>) {
        let mut seen_ids: HashSet<&str> = HashSet::new();

        for (i, d) in self.devices.iter().enumerate() {
            let ctx = || {
                if d.device_id.is_empty() {
                    format!("devices[{i}]")
                } else {
                    format!("device '{}'", d.device_id)
                }
            };

            // ── Identity ────────────────────────────────────────
            if d.device_id.trim().is_empty() {
                errors.push(format!("{}: device_id is empty", ctx()));
            } else if !seen_ids.insert(&d.device_id) {
                errors.push(format!("{}: duplicate device_id", ctx()));
            }

            // device_id becomes an MQTT topic level
            if d.device_id.contains(&['/', '+', '#'][..]) {
                errors.push(format!(
                    "{}: device_id must not contain '/', '+' or '#'",
                    ctx()
                ));
            }

            if d.name.trim().is_empty() {
                errors.push(format!("{}: name is empty", ctx()));
            }

            // ── Excluded days ───────────────────────────────────
            for day in &d.excluded_days {
                if parse_iso_date(day).is_err() {
                    errors.push(format!(
                        "{}: excluded day '{day}' is not a YYYY-MM-DD date",
                        ctx()
                    ));
                }
            }

            // ── Schedules ───────────────────────────────────────
            for (j, s) in d.schedules.iter().flatten().enumerate() {
                if s.start_hour == s.end_hour {
                    errors.push(format!(
                        "{}: schedules[{j}]: start_hour and end_hour are both {}; window is empty",
                        ctx(),
                        s.start_hour
                    ));
                }
                if !s.holiday && s.days_week.is_empty() {
                    errors.push(format!(
                        "{}: schedules[{j}]: days_week has no day set and holiday is false",
                        ctx()
                    ));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Load + apply
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

/// Register every configured device in the database so verdict rows can
/// reference it.
pub async fn apply(config: &Config, db: &Db) -> Result<()> {
    for d in &config.devices {
        db.upsert_device(&d.device_id, &d.name)
            .await
            .with_context(|| format!("failed to upsert device '{}'", d.device_id))?;
    }

    tracing::info!(
        devices = config.devices.len(),
        holidays = config.engine.holidays.len(),
        "config applied"
    );

    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use automation_engine::{DaysWeek, WeekDay};

    // -- Helper: build a valid baseline config that passes validation ------

    fn valid_schedule() -> ScheduleEntry {
        ScheduleEntry {
            start_hour: "08:00".parse().unwrap(),
            end_hour: "18:00".parse().unwrap(),
            days_week: DaysWeek::from_days(&[WeekDay::Mon, WeekDay::Tue]),
            holiday: false,
            retain: true,
        }
    }

    fn valid_device() -> DeviceEntry {
        DeviceEntry {
            device_id: "ac-01".into(),
            name: "Lobby AC".into(),
            excluded_days: vec!["2026-11-02".into()],
            schedules: Some(vec![valid_schedule()]),
        }
    }

    fn valid_config() -> Config {
        Config {
            engine: EngineSection {
                holidays: vec!["2026-12-25".into()],
                ..EngineSection::default()
            },
            verdict_log: VerdictLogSection::default(),
            devices: vec![valid_device()],
        }
    }

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[engine]
holiday_policy = "exclusive"
precedence = "shutdown_wins"
tick_sec = 30
holidays = ["2026-12-25"]

[[devices]]
device_id = "ac-01"
name = "Lobby AC"
excluded_days = ["2026-11-02"]

[[devices.schedules]]
start_hour = "23:00"
end_hour = "05:00"
retain = true
days_week = { mon = true, fri = true }

[[devices]]
device_id = "pump-02"
name = "Pump"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.precedence, Precedence::ShutdownWins);
        assert_eq!(config.engine.tick_sec, 30);
        assert_eq!(config.devices.len(), 2);

        let schedules = config.devices[0].schedules.as_ref().unwrap();
        assert_eq!(schedules.len(), 1);
        assert!(schedules[0].crosses_midnight());
        assert!(schedules[0].days_week.fri);
        assert!(config.devices[1].schedules.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn shipped_example_is_valid() {
        let cfg: Config = toml::from_str(include_str!("../config.example.toml")).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.devices.len(), 2);
        assert!(cfg.devices[1].schedules.as_ref().unwrap()[0].crosses_midnight());
    }

    #[test]
    fn parse_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.devices.is_empty());
        assert_eq!(config.engine.tick_sec, MAX_TICK_SEC);
        assert_eq!(config.engine.precedence, Precedence::ActivateWins);
        assert_eq!(config.engine.holiday_policy, HolidayPolicy::Exclusive);
        assert_eq!(config.verdict_log.retention_days, DEFAULT_RETENTION_DAYS);
    }

    #[test]
    fn parse_verdict_log_section() {
        let config: Config = toml::from_str("[verdict_log]\nretention_days = 7\n").unwrap();
        assert_eq!(config.verdict_log.retention_days, 7);
        config.validate().unwrap();
    }

    #[test]
    fn zero_retention_rejected() {
        let mut cfg = valid_config();
        cfg.verdict_log.retention_days = 0;
        assert_validation_err(&cfg, "retention_days must be at least 1");
    }

    #[test]
    fn tick_not_dividing_a_minute_rejected() {
        let mut cfg = valid_config();
        cfg.engine.tick_sec = 45;
        assert_validation_err(&cfg, "tick_sec 45 does not divide 60");
        cfg.engine.tick_sec = 15;
        cfg.validate().unwrap();
    }

    #[test]
    fn parse_rejects_bad_time() {
        let toml_str = r#"
[[devices]]
device_id = "ac-01"
name = "Lobby AC"

[[devices.schedules]]
start_hour = "8:00"
end_hour = "18:00"
"#;
        let err = toml::from_str::<Config>(toml_str).unwrap_err();
        assert!(err.to_string().contains("invalid time format"), "{err}");
    }

    #[test]
    fn parse_rejects_unknown_policy() {
        let err = toml::from_str::<Config>("[engine]\nholiday_policy = \"lenient\"\n");
        assert!(err.is_err());
    }

    // -- Validation: valid configs pass -----------------------------------

    #[test]
    fn valid_config_passes() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn device_without_schedules_passes() {
        let mut cfg = valid_config();
        cfg.devices[0].schedules = None;
        cfg.validate().unwrap();
    }

    // -- Engine section ---------------------------------------------------

    #[test]
    fn tick_zero_rejected() {
        let mut cfg = valid_config();
        cfg.engine.tick_sec = 0;
        assert_validation_err(&cfg, "tick_sec 0 out of range");
    }

    #[test]
    fn tick_over_a_minute_rejected() {
        let mut cfg = valid_config();
        cfg.engine.tick_sec = 61;
        assert_validation_err(&cfg, "tick_sec 61 out of range");
    }

    #[test]
    fn bad_holiday_rejected() {
        let mut cfg = valid_config();
        cfg.engine.holidays.push("25/12/2026".into());
        assert_validation_err(&cfg, "holiday '25/12/2026'");
    }

    // -- Device identity --------------------------------------------------

    #[test]
    fn device_empty_id_rejected() {
        let mut cfg = valid_config();
        cfg.devices[0].device_id = "".into();
        assert_validation_err(&cfg, "device_id is empty");
    }

    #[test]
    fn device_duplicate_id_rejected() {
        let mut cfg = valid_config();
        cfg.devices.push(valid_device());
        assert_validation_err(&cfg, "duplicate device_id");
    }

    #[test]
    fn device_topic_wildcard_rejected() {
        let mut cfg = valid_config();
        cfg.devices[0].device_id = "floor/1".into();
        assert_validation_err(&cfg, "must not contain");
    }

    #[test]
    fn device_empty_name_rejected() {
        let mut cfg = valid_config();
        cfg.devices[0].name = "  ".into();
        assert_validation_err(&cfg, "name is empty");
    }

    #[test]
    fn excluded_day_not_a_date_rejected() {
        let mut cfg = valid_config();
        cfg.devices[0].excluded_days = vec!["2026-02-30".into()];
        assert_validation_err(&cfg, "excluded day '2026-02-30'");
    }

    // -- Schedules --------------------------------------------------------

    #[test]
    fn zero_length_window_rejected() {
        let mut cfg = valid_config();
        let s = &mut cfg.devices[0].schedules.as_mut().unwrap()[0];
        s.end_hour = s.start_hour;
        assert_validation_err(&cfg, "window is empty");
    }

    #[test]
    fn no_days_rejected_unless_holiday() {
        let mut cfg = valid_config();
        cfg.devices[0].schedules.as_mut().unwrap()[0].days_week = DaysWeek::default();
        assert_validation_err(&cfg, "days_week has no day set");

        cfg.devices[0].schedules.as_mut().unwrap()[0].holiday = true;
        cfg.validate().unwrap();
    }

    // -- Multiple errors reported at once ---------------------------------

    #[test]
    fn multiple_errors_collected() {
        let cfg = Config {
            engine: EngineSection {
                tick_sec: 0,
                ..EngineSection::default()
            },
            verdict_log: VerdictLogSection::default(),
            devices: vec![DeviceEntry {
                device_id: "".into(),
                name: "".into(),
                excluded_days: vec!["tomorrow".into()],
                schedules: None,
            }],
        };
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("tick_sec"), "missing tick error in: {msg}");
        assert!(msg.contains("device_id is empty"), "missing id error in: {msg}");
        assert!(msg.contains("excluded day"), "missing date error in: {msg}");
    }

    // -- DB integration ---------------------------------------------------

    #[tokio::test]
    async fn apply_seeds_database() {
        let db = Db::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();

        let config = valid_config();
        config.validate().unwrap();

        apply(&config, &db).await.unwrap();

        let devices = db.load_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device_id, "ac-01");
        assert_eq!(devices[0].name, "Lobby AC");
    }
}
