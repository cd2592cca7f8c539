use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use shared_config::{DispatchBackend, DispatchConfig};
use shared_utils::{run_with_timeout, Clock};

use crate::models::{DeliveryOutcome, DeliveryReport, DeliveryResult, DispatchError, InterventionAction};

/// Outbound notification collaborator.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, action: &InterventionAction) -> Result<DeliveryResult, DispatchError>;
}

/// Writes each action to the log instead of contacting a provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn send(&self, action: &InterventionAction) -> Result<DeliveryResult, DispatchError> {
        info!(
            action_id = %action.id,
            appointment_id = %action.appointment_id,
            channel = %action.channel,
            template = %action.message_template_key,
            "Sending notification"
        );
        Ok(DeliveryResult {
            action_id: action.id,
            provider_reference: Some(format!("log-{}", action.id)),
        })
    }
}

/// POSTs each action as JSON to a configured endpoint.
pub struct WebhookDispatcher {
    client: Client,
    url: String,
}

impl WebhookDispatcher {
    pub fn new(url: &str, timeout_ms: u64) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn send(&self, action: &InterventionAction) -> Result<DeliveryResult, DispatchError> {
        debug!("Posting action {} to {}", action.id, self.url);
        let response = self.client.post(&self.url).json(action).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected(format!("{}: {}", status, error_text)));
        }

        let body: Value = response.json().await.unwrap_or_else(|_| json!({}));
        Ok(DeliveryResult {
            action_id: action.id,
            provider_reference: body
                .get("reference")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

pub fn build_dispatcher(config: &DispatchConfig) -> Result<Arc<dyn NotificationDispatcher>, DispatchError> {
    match config.backend {
        DispatchBackend::Log => Ok(Arc::new(LogDispatcher)),
        DispatchBackend::Webhook => Ok(Arc::new(WebhookDispatcher::new(&config.webhook_url, config.timeout_ms)?)),
    }
}

/// Fire-and-forget dispatch. Each action is sent on its own task with a
/// bounded timeout; the outcome comes back as a [`DeliveryReport`] on the
/// channel returned by [`DispatchService::new`].
#[derive(Clone)]
pub struct DispatchService {
    dispatcher: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    timeout_ms: u64,
    reports: mpsc::UnboundedSender<DeliveryReport>,
}

impl DispatchService {
    pub fn new(
        dispatcher: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        timeout_ms: u64,
    ) -> (Self, mpsc::UnboundedReceiver<DeliveryReport>) {
        let (reports, receiver) = mpsc::unbounded_channel();
        (
            Self {
                dispatcher,
                clock,
                timeout_ms,
                reports,
            },
            receiver,
        )
    }

    /// Returns as soon as the sends are spawned.
    pub fn dispatch(&self, actions: Vec<InterventionAction>) {
        for action in actions {
            let service = self.clone();
            tokio::spawn(async move {
                let report = service.send_one(&action).await;
                if service.reports.send(report).is_err() {
                    warn!("Delivery report for action {} dropped: receiver closed", action.id);
                }
            });
        }
    }

    /// Sends one action and waits for its report.
    pub async fn send_one(&self, action: &InterventionAction) -> DeliveryReport {
        let result = match run_with_timeout(self.timeout_ms, self.dispatcher.send(action)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout(self.timeout_ms)),
        };

        let outcome = match result {
            Ok(delivery) => DeliveryOutcome::Delivered {
                provider_reference: delivery.provider_reference,
            },
            Err(e) => {
                warn!(
                    "Dispatch of action {} via {} failed: {}",
                    action.id, action.channel, e
                );
                DeliveryOutcome::Failed { reason: e.to_string() }
            }
        };

        DeliveryReport {
            action_id: action.id,
            appointment_id: action.appointment_id,
            channel: action.channel,
            outcome,
            reported_at: self.clock.now(),
        }
    }
}
