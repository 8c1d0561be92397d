use anyhow::Result;
use chrono::NaiveDateTime;
use log::{debug, error, info};
use std::sync::Arc;
use uuid::Uuid;

use super::model::{Alarm, AlarmPatch, NewAlarm};
use super::repository::{AlarmRepository, Revision};

pub type ListenerId = u64;

type Listener = Box<dyn Fn(&[Alarm]) + Send + Sync>;

/// The user's alarm set and the "is anything due now" decision.
///
/// Constructed once per process around a repository and passed to whoever
/// needs it. Several processes may share one store: every mutation and due
/// check first picks up writes made by the others. The in-memory set stays
/// authoritative while saving fails.
pub struct AlarmBook {
    alarms: Vec<Alarm>,
    repository: Arc<dyn AlarmRepository>,
    seen: Option<Revision>,
    unsaved: bool,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener_id: ListenerId,
}

impl AlarmBook {
    pub fn load(repository: Arc<dyn AlarmRepository>) -> Self {
        let seen = repository.revision();
        let alarms = repository.load_all();
        info!("Loaded {} alarm(s)", alarms.len());
        Self {
            alarms,
            repository,
            seen,
            unsaved: false,
            listeners: Vec::new(),
            next_listener_id: 1,
        }
    }

    /// Reload from the repository if it was written since we last looked.
    /// Returns whether the in-memory set changed.
    pub fn refresh(&mut self) -> bool {
        if self.unsaved {
            return false;
        }
        let revision = self.repository.revision();
        if revision.is_some() && revision == self.seen {
            return false;
        }

        let stored = self.repository.load_all();
        self.seen = revision;
        if stored == self.alarms {
            return false;
        }
        debug!("Picked up {} alarm(s) from storage", stored.len());
        self.alarms = stored;
        true
    }

    pub fn add(&mut self, new_alarm: NewAlarm) -> Result<Alarm> {
        self.refresh();
        new_alarm.validate()?;

        let alarm = Alarm {
            id: Uuid::new_v4().to_string(),
            hour: new_alarm.hour,
            minute: new_alarm.minute,
            days: new_alarm.days,
            start_date: new_alarm.start_date,
            enabled: true,
            last_fired_date: None,
        };
        self.alarms.push(alarm.clone());
        self.changed();
        Ok(alarm)
    }

    /// Merge `patch` into the alarm with `id`. `Ok(None)` if no such alarm.
    pub fn update(&mut self, id: &str, patch: &AlarmPatch) -> Result<Option<Alarm>> {
        self.refresh();
        let Some(alarm) = self.alarms.iter_mut().find(|a| a.id == id) else {
            return Ok(None);
        };
        patch.apply_to(alarm)?;
        let updated = alarm.clone();
        self.changed();
        Ok(Some(updated))
    }

    /// Returns whether an alarm was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        self.refresh();
        let before = self.alarms.len();
        self.alarms.retain(|a| a.id != id);
        if self.alarms.len() == before {
            return false;
        }
        self.changed();
        true
    }

    /// Flip `enabled`, returning the new state; `false` for an unknown id.
    pub fn toggle(&mut self, id: &str) -> bool {
        self.refresh();
        let Some(alarm) = self.alarms.iter_mut().find(|a| a.id == id) else {
            return false;
        };
        alarm.enabled = !alarm.enabled;
        let enabled = alarm.enabled;
        self.changed();
        enabled
    }

    pub fn get_all(&self) -> Vec<Alarm> {
        self.alarms.clone()
    }

    pub fn get_by_id(&self, id: &str) -> Option<Alarm> {
        self.alarms.iter().find(|a| a.id == id).cloned()
    }

    pub fn alarms(&self) -> &[Alarm] {
        &self.alarms
    }

    /// The alarm `check_due` would fire at `now`, without firing it.
    pub fn next_due(&mut self, now: NaiveDateTime) -> Option<Alarm> {
        self.refresh();
        self.alarms.iter().find(|a| a.is_due(now)).cloned()
    }

    /// Fire the first due alarm, in insertion order, at local time `now`.
    ///
    /// Matching is on exact hour:minute equality, so polling at least once a
    /// minute is enough; `last_fired_date` keeps it to once per day.
    pub fn check_due(&mut self, now: NaiveDateTime) -> Option<Alarm> {
        self.refresh();
        let alarm = self.alarms.iter_mut().find(|a| a.is_due(now))?;
        alarm.mark_fired(now.date());
        let fired = alarm.clone();
        info!(
            "Alarm {} due at {} ({})",
            fired.id,
            fired.time_label(),
            if fired.is_one_shot() { "one-shot" } else { "repeating" }
        );
        self.changed();
        Some(fired)
    }

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&[Alarm]) + Send + Sync + 'static,
    {
        let id = self.next_listener_id;
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    fn changed(&mut self) {
        match self.repository.save_all(&self.alarms) {
            Ok(()) => {
                self.unsaved = false;
                self.seen = self.repository.revision();
            }
            Err(err) => {
                self.unsaved = true;
                error!("Failed to persist alarms: {err:#}");
            }
        }
        for (_, listener) in &self.listeners {
            listener(&self.alarms);
        }
    }
}
