use std::{sync::Arc, time::Duration};

use chrono::{Local, NaiveDateTime};
use log::{debug, info};
use tokio::{
    sync::Mutex,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    alarms::{Alarm, AlarmBook},
    engine::WakeEngine,
    sync::{current_offset_minutes, utc_views, PushSync, RemoteSync},
};

/// Alarm book, wake engine and remote sync, wired together.
#[derive(Clone)]
pub struct SoftWake {
    alarms: Arc<Mutex<AlarmBook>>,
    engine: WakeEngine,
    sync: Option<Arc<PushSync>>,
    due_check_interval: Duration,
}

impl SoftWake {
    pub fn new(
        book: AlarmBook,
        engine: WakeEngine,
        sync: Option<Arc<PushSync>>,
        due_check_interval: Duration,
    ) -> Self {
        Self {
            alarms: Arc::new(Mutex::new(book)),
            engine,
            sync,
            due_check_interval,
        }
    }

    pub fn alarms(&self) -> Arc<Mutex<AlarmBook>> {
        Arc::clone(&self.alarms)
    }

    pub fn engine(&self) -> &WakeEngine {
        &self.engine
    }

    pub fn push_sync(&self) -> Option<&Arc<PushSync>> {
        self.sync.as_ref()
    }

    /// One due check at local time `now`.
    ///
    /// An alarm is only consumed once its session has actually started, so a
    /// due alarm meeting a playing session (from an earlier alarm or an
    /// external trigger) is left for a later check.
    pub async fn poll_due(&self, now: NaiveDateTime) -> Option<Alarm> {
        let mut book = self.alarms.lock().await;
        let due = book.next_due(now)?;
        if !self.engine.start() {
            debug!("Alarm {} is due while a session plays; holding it", due.id);
            return None;
        }

        info!("Started wake session for alarm {}", due.id);
        book.check_due(now)
    }

    /// External wake-up: a push notification or scheduled event says an
    /// alarm time has arrived. Returns `false` if a session is already active.
    pub fn trigger_now(&self) -> bool {
        let started = self.engine.start();
        if started {
            info!("Wake session started by external trigger");
        }
        started
    }

    /// Push the UTC projection of the current alarm set, translated with the
    /// host's offset as of now.
    pub async fn sync_now(&self) -> bool {
        let Some(sync) = &self.sync else {
            return false;
        };
        let views = {
            let mut book = self.alarms.lock().await;
            book.refresh();
            utc_views(book.alarms(), current_offset_minutes())
        };
        sync.push(views).await
    }

    /// Re-sync in the background whenever the alarm set changes, firing
    /// transitions included.
    pub async fn sync_on_change(&self) {
        let Some(sync) = self.sync.clone() else {
            return;
        };
        self.alarms.lock().await.subscribe(move |alarms| {
            sync.spawn_push(utc_views(alarms, current_offset_minutes()));
        });
    }

    /// Due-check loop. Runs until `shutdown` fires, then stops any session.
    pub async fn run(&self, shutdown: CancellationToken) {
        self.run_with_clock(shutdown, || Local::now().naive_local()).await
    }

    /// [`run`](Self::run) reading local time from `clock`.
    pub async fn run_with_clock<F>(&self, shutdown: CancellationToken, clock: F)
    where
        F: Fn() -> NaiveDateTime + Send + Sync,
    {
        let mut ticker = time::interval(self.due_check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Watching alarms every {} ms",
            self.due_check_interval.as_millis()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_due(clock()).await;
                }
                _ = shutdown.cancelled() => {
                    info!("Alarm watcher shutting down");
                    break;
                }
            }
        }

        self.engine.stop();
    }
}
