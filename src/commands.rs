use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use log::warn;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::{
    alarms::{
        describe_recurrence, parse_days, Alarm, AlarmBook, AlarmPatch,
        JsonFileRepository, NewAlarm,
    },
    audio::{AudioEngineHandle, SilentOutput, SoundOutput},
    engine::{WakeEngine, WakePhase},
    service::SoftWake,
    settings::{self, PushSubscription, SettingsStore, ALARMS_FILE, SETTINGS_FILE},
    sync::{PushSync, SyncStatus},
};
#[cfg(unix)]
use crate::trigger::{self, TriggerListener, TriggerReply, TRIGGER_SOCKET};

#[derive(Parser)]
#[command(name = "softwake", version, about = "Gentle alarm clock")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Watch alarms and play the wake soundscape when one is due
    Run {
        /// Run the schedule without opening an audio device
        #[arg(long)]
        silent: bool,
    },
    /// Add an alarm
    Add {
        /// Local time, HH:MM
        #[arg(long)]
        time: String,
        /// mon,wed,fri | weekdays | weekends | everyday | once
        #[arg(long)]
        days: Option<String>,
        /// First date the alarm may fire (YYYY-MM-DD), defaults to today
        #[arg(long)]
        start: Option<NaiveDate>,
    },
    /// List alarms
    List,
    /// Edit an alarm
    Edit {
        id: String,
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        days: Option<String>,
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Let the alarm fire from today on, dropping its start date
        #[arg(long, conflicts_with = "start")]
        no_start: bool,
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
    },
    /// Delete an alarm
    Remove { id: String },
    /// Enable or disable an alarm
    Toggle { id: String },
    /// Start a wake session now, as if an alarm had just fired. Handed to
    /// the running watcher when there is one
    Wake {
        #[arg(long)]
        silent: bool,
    },
    /// Push the alarm set to the push registry
    Sync,
    /// Configure the push registry
    Config {
        /// Subscribe route of the push registry
        #[arg(long)]
        endpoint: Option<String>,
        /// JSON file holding a push subscription ({endpoint, keys})
        #[arg(long)]
        subscription: Option<PathBuf>,
    },
}

pub async fn run(command: Command) -> Result<()> {
    match command {
        Command::Run { silent } => watch(silent).await,
        Command::Add { time, days, start } => add(&time, days.as_deref(), start).await,
        Command::List => list().await,
        Command::Edit {
            id,
            time,
            days,
            start,
            no_start,
            enable,
            disable,
        } => {
            let enabled = match (enable, disable) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let start_date = match (start, no_start) {
                (Some(date), _) => Some(Some(date)),
                (None, true) => Some(None),
                (None, false) => None,
            };
            edit(&id, time.as_deref(), days.as_deref(), start_date, enabled).await
        }
        Command::Remove { id } => remove(&id).await,
        Command::Toggle { id } => toggle(&id).await,
        Command::Wake { silent } => wake(silent).await,
        Command::Sync => sync().await,
        Command::Config {
            endpoint,
            subscription,
        } => configure(endpoint, subscription),
    }
}

fn open_settings() -> Result<(PathBuf, SettingsStore)> {
    let dir = settings::data_dir()?;
    let store = SettingsStore::new(dir.join(SETTINGS_FILE))?;
    Ok((dir, store))
}

fn open_service(silent: bool) -> Result<SoftWake> {
    let (dir, settings) = open_settings()?;
    let engine_settings = settings.engine();

    let book = AlarmBook::load(Arc::new(JsonFileRepository::new(dir.join(ALARMS_FILE))));

    let output: Arc<dyn SoundOutput> = if silent {
        Arc::new(SilentOutput)
    } else {
        Arc::new(AudioEngineHandle::new())
    };
    let engine = WakeEngine::with_tick_interval(output, engine_settings.tick_interval());

    let sync = match PushSync::new(&settings.sync()) {
        Ok(sync) => {
            sync.on_status(print_sync_status);
            Some(Arc::new(sync))
        }
        Err(err) => {
            warn!("Push sync disabled: {err:#}");
            None
        }
    };

    Ok(SoftWake::new(
        book,
        engine,
        sync,
        engine_settings.due_check_interval(),
    ))
}

fn print_sync_status(status: &SyncStatus) {
    match status {
        SyncStatus::Synced { count } => eprintln!("synced {count} alarm(s)"),
        SyncStatus::Unavailable(reason) => eprintln!("sync skipped: {reason}"),
        SyncStatus::Failed(reason) => eprintln!("sync failed: {reason}"),
    }
}

/// Parse `HH:MM` (or `H:MM`).
pub fn parse_time(input: &str) -> Result<(u8, u8)> {
    let (hour, minute) = input
        .trim()
        .split_once(':')
        .ok_or_else(|| anyhow!("expected HH:MM, got '{input}'"))?;
    let hour: u8 = hour.parse().with_context(|| format!("invalid hour in '{input}'"))?;
    let minute: u8 = minute
        .parse()
        .with_context(|| format!("invalid minute in '{input}'"))?;
    if hour > 23 || minute > 59 {
        bail!("'{input}' is not a valid time of day");
    }
    Ok((hour, minute))
}

fn print_alarm(alarm: &Alarm) {
    println!(
        "{}  {}  {:<22} {}{}",
        alarm.id,
        alarm.time_label(),
        describe_recurrence(&alarm.days),
        if alarm.enabled { "on" } else { "off" },
        alarm
            .start_date
            .map(|date| format!("  from {date}"))
            .unwrap_or_default(),
    );
}

async fn watch(silent: bool) -> Result<()> {
    let service = open_service(silent)?;
    if !silent {
        if let Err(err) = service.engine().ensure_context() {
            warn!("Audio output unavailable, sessions will be silent: {err}");
        }
    }
    report_session(service.engine());
    service.sync_on_change().await;

    let shutdown = CancellationToken::new();

    #[cfg(unix)]
    let trigger = {
        let listener = TriggerListener::bind(settings::data_dir()?.join(TRIGGER_SOCKET)).await?;
        tokio::spawn(listener.serve(service.clone(), shutdown.clone()))
    };

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    service.run(shutdown).await;
    #[cfg(unix)]
    if let Err(err) = trigger.await {
        warn!("Wake trigger listener ended abnormally: {err}");
    }
    Ok(())
}

async fn add(time: &str, days: Option<&str>, start: Option<NaiveDate>) -> Result<()> {
    let (hour, minute) = parse_time(time)?;
    let days = days.map(parse_days).transpose()?.unwrap_or_default();
    let start = start.unwrap_or_else(|| Local::now().date_naive());

    let service = open_service(true)?;
    let alarm = {
        let alarms = service.alarms();
        let mut book = alarms.lock().await;
        book.add(NewAlarm {
            hour,
            minute,
            days,
            start_date: Some(start),
        })?
    };
    print_alarm(&alarm);
    service.sync_now().await;
    Ok(())
}

async fn list() -> Result<()> {
    let service = open_service(true)?;
    let alarms = service.alarms().lock().await.get_all();
    if alarms.is_empty() {
        println!("no alarms");
    }
    alarms.iter().for_each(print_alarm);
    Ok(())
}

async fn edit(
    id: &str,
    time: Option<&str>,
    days: Option<&str>,
    start_date: Option<Option<NaiveDate>>,
    enabled: Option<bool>,
) -> Result<()> {
    let (hour, minute) = match time.map(parse_time).transpose()? {
        Some((hour, minute)) => (Some(hour), Some(minute)),
        None => (None, None),
    };
    let patch = AlarmPatch {
        hour,
        minute,
        days: days.map(parse_days).transpose()?,
        start_date,
        enabled,
    };
    if patch.is_empty() {
        bail!("nothing to change");
    }

    let service = open_service(true)?;
    let updated = service.alarms().lock().await.update(id, &patch)?;
    let alarm = updated.ok_or_else(|| anyhow!("no alarm with id {id}"))?;
    print_alarm(&alarm);
    service.sync_now().await;
    Ok(())
}

async fn remove(id: &str) -> Result<()> {
    let service = open_service(true)?;
    if !service.alarms().lock().await.remove(id) {
        bail!("no alarm with id {id}");
    }
    println!("removed {id}");
    service.sync_now().await;
    Ok(())
}

async fn toggle(id: &str) -> Result<()> {
    let service = open_service(true)?;
    let alarm = {
        let alarms = service.alarms();
        let mut book = alarms.lock().await;
        book.toggle(id);
        book.get_by_id(id)
    };
    let alarm = alarm.ok_or_else(|| anyhow!("no alarm with id {id}"))?;
    print_alarm(&alarm);
    service.sync_now().await;
    Ok(())
}

async fn wake(silent: bool) -> Result<()> {
    #[cfg(unix)]
    match trigger::request_wake(&settings::data_dir()?.join(TRIGGER_SOCKET)).await? {
        Some(TriggerReply::Started) => {
            println!("wake session started by the running watcher");
            return Ok(());
        }
        Some(TriggerReply::AlreadyPlaying) => bail!("a wake session is already playing"),
        None => {}
    }

    let service = open_service(silent)?;
    let finished = Arc::new(Notify::new());

    report_session(service.engine());
    let done = finished.clone();
    service.engine().on_stop(move || {
        eprintln!("wake session finished");
        done.notify_one();
    });

    if !service.trigger_now() {
        bail!("a wake session is already playing");
    }

    tokio::select! {
        _ = finished.notified() => {}
        _ = tokio::signal::ctrl_c() => {
            service.engine().stop();
        }
    }
    Ok(())
}

/// Print phase changes and a coarse countdown while a session plays.
fn report_session(engine: &WakeEngine) {
    let last_phase: Mutex<Option<WakePhase>> = Mutex::new(None);
    engine.on_phase(move |phase| {
        if let Ok(mut last) = last_phase.lock() {
            if *last != Some(phase) {
                eprintln!("{phase}");
                *last = Some(phase);
            }
        }
    });

    let last_remaining = Mutex::new(String::new());
    engine.on_progress(move |fraction, remaining| {
        if let Ok(mut last) = last_remaining.lock() {
            if remaining.ends_with('0') && *last != remaining {
                eprintln!("{remaining} left ({:.0}%)", fraction * 100.0);
                *last = remaining.to_string();
            }
        }
    });
}

async fn sync() -> Result<()> {
    let service = open_service(true)?;
    if service.push_sync().is_none() {
        bail!("push sync is not configured; see `softwake config`");
    }
    if !service.sync_now().await {
        bail!("sync did not complete");
    }
    Ok(())
}

fn configure(endpoint: Option<String>, subscription: Option<PathBuf>) -> Result<()> {
    let (_, store) = open_settings()?;
    let mut sync = store.sync();

    if let Some(endpoint) = endpoint {
        url::Url::parse(&endpoint).with_context(|| format!("invalid endpoint '{endpoint}'"))?;
        sync.endpoint = Some(endpoint);
    }
    if let Some(path) = subscription {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let parsed: PushSubscription =
            serde_json::from_str(&contents).context("invalid push subscription JSON")?;
        sync.subscription = Some(parsed);
    }

    store.update_sync(sync.clone())?;
    println!(
        "endpoint: {}\nsubscription: {}\ndevice: {}",
        sync.endpoint.as_deref().unwrap_or("(none)"),
        sync.subscription
            .as_ref()
            .map(|s| s.endpoint.as_str())
            .unwrap_or("(none)"),
        sync.device_id
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clock_times() {
        assert_eq!(parse_time("07:30").unwrap(), (7, 30));
        assert_eq!(parse_time("7:05").unwrap(), (7, 5));
        assert_eq!(parse_time(" 23:59 ").unwrap(), (23, 59));
    }

    #[test]
    fn rejects_malformed_times() {
        assert!(parse_time("0730").is_err());
        assert!(parse_time("24:00").is_err());
        assert!(parse_time("07:60").is_err());
        assert!(parse_time("ab:cd").is_err());
    }

    #[test]
    fn cli_parses_add_arguments() {
        let cli = Cli::try_parse_from([
            "softwake", "add", "--time", "06:45", "--days", "weekdays", "--start", "2026-10-19",
        ])
        .unwrap();
        match cli.command {
            Command::Add { time, days, start } => {
                assert_eq!(time, "06:45");
                assert_eq!(days.as_deref(), Some("weekdays"));
                assert_eq!(start, NaiveDate::from_ymd_opt(2026, 10, 19));
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn cli_rejects_conflicting_edit_flags() {
        assert!(Cli::try_parse_from(["softwake", "edit", "x", "--enable", "--disable"]).is_err());
        assert!(Cli::try_parse_from([
            "softwake", "edit", "x", "--start", "2026-10-19", "--no-start",
        ])
        .is_err());
    }

    #[test]
    fn cli_parses_start_date_clearing() {
        let cli = Cli::try_parse_from(["softwake", "edit", "x", "--no-start"]).unwrap();
        match cli.command {
            Command::Edit { start, no_start, .. } => {
                assert_eq!(start, None);
                assert!(no_start);
            }
            _ => panic!("expected edit"),
        }
    }
}
