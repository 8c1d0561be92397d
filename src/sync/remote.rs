use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use crate::settings::{PushSubscription, SyncSettings};

use super::translate::UtcAlarmView;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Outcome of one sync attempt, reported to the status callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Synced { count: usize },
    /// Nothing to sync to: no endpoint or no push subscription configured.
    Unavailable(String),
    Failed(String),
}

/// Remote sync collaborator. Never errors; the outcome is the returned flag
/// plus whatever the implementation reports through its status channel.
pub trait RemoteSync: Send + Sync {
    fn push(&self, alarms: Vec<UtcAlarmView>) -> impl Future<Output = bool> + Send;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeRequest<'a> {
    subscription: &'a PushSubscription,
    alarms: &'a [UtcAlarmView],
    device_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    received_alarms: Option<usize>,
}

type StatusFn = Arc<dyn Fn(&SyncStatus) + Send + Sync>;

/// Posts the UTC alarm projection to the push registry's subscribe route.
pub struct PushSync {
    client: reqwest::Client,
    endpoint: Option<Url>,
    subscription: Option<PushSubscription>,
    device_id: String,
    on_status: Mutex<Option<StatusFn>>,
}

impl PushSync {
    pub fn new(settings: &SyncSettings) -> Result<Self> {
        let endpoint = settings
            .endpoint
            .as_deref()
            .map(Url::parse)
            .transpose()
            .context("invalid sync endpoint")?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            subscription: settings.subscription.clone(),
            device_id: settings.device_id.clone(),
            on_status: Mutex::new(None),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some() && self.subscription.is_some()
    }

    /// Single status slot; registering again replaces the previous callback.
    pub fn on_status<F>(&self, callback: F)
    where
        F: Fn(&SyncStatus) + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.on_status.lock() {
            *slot = Some(Arc::new(callback));
        }
    }

    /// Fire-and-forget variant of [`RemoteSync::push`] for callers that
    /// cannot await, such as alarm-book observers.
    pub fn spawn_push(self: &Arc<Self>, alarms: Vec<UtcAlarmView>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.push(alarms).await;
        });
    }

    async fn send(&self, alarms: &[UtcAlarmView]) -> Result<usize> {
        let (Some(endpoint), Some(subscription)) = (&self.endpoint, &self.subscription) else {
            return Err(anyhow!("sync not configured"));
        };

        let response = self
            .client
            .post(endpoint.clone())
            .json(&SubscribeRequest {
                subscription,
                alarms,
                device_id: &self.device_id,
            })
            .send()
            .await
            .context("request to push registry failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("push registry responded with {status}"));
        }

        let body: SubscribeResponse = response
            .json()
            .await
            .context("unreadable push registry response")?;
        if !body.ok {
            return Err(anyhow!("push registry rejected the alarm set"));
        }
        Ok(body.received_alarms.unwrap_or(alarms.len()))
    }

    fn report(&self, status: SyncStatus) {
        let callback = self.on_status.lock().ok().and_then(|slot| slot.clone());
        if let Some(callback) = callback {
            callback(&status);
        }
    }
}

impl RemoteSync for PushSync {
    async fn push(&self, alarms: Vec<UtcAlarmView>) -> bool {
        if !self.is_configured() {
            warn!("Alarm sync skipped: no push endpoint or subscription configured");
            self.report(SyncStatus::Unavailable(
                "push notifications are not configured".into(),
            ));
            return false;
        }

        match self.send(&alarms).await {
            Ok(count) => {
                info!("Synced {} alarm(s) to push registry", count);
                self.report(SyncStatus::Synced { count });
                true
            }
            Err(err) => {
                error!("Alarm sync failed: {err:#}");
                self.report(SyncStatus::Failed(format!("{err:#}")));
                false
            }
        }
    }
}
