//! Push dispatcher — persist first, then deliver.
//!
//! Records are written before the push attempt: the notification center
//! shows every attempt regardless of delivery outcome. Accepted product
//! behavior, not a bug to fix.

use std::sync::Arc;

use rally_core::{Payload, Result};
use rally_store::{DocStore, NotificationRecord};
use serde::Serialize;

use crate::gateway::{MulticastOutcome, PushGateway, PushMessage};
use crate::resolve;

/// Outcome of one dispatch call: what was persisted and what the gateway
/// reported.
#[derive(Debug, Serialize)]
pub struct DispatchReport {
    pub saved: Vec<NotificationRecord>,
    pub sent: MulticastOutcome,
}

/// Sends multicast pushes to resolved device tokens, recording one
/// notification per recipient when asked to persist.
pub struct Dispatcher {
    pub(crate) store: Arc<DocStore>,
    pub(crate) gateway: Arc<dyn PushGateway>,
}

impl Dispatcher {
    pub fn new(store: Arc<DocStore>, gateway: Arc<dyn PushGateway>) -> Self {
        Self { store, gateway }
    }

    /// Dispatch to a uid list. With `persist`, one record per uid is
    /// written before tokens are even resolved. An empty resolved audience
    /// is not an error: the call reports zero counts without contacting
    /// the gateway.
    pub async fn send_to_uids(
        &self,
        uids: &[String],
        title: &str,
        body: &str,
        payload: &Payload,
        persist: bool,
    ) -> Result<DispatchReport> {
        let mut saved = Vec::new();
        if persist {
            for uid in uids {
                let record = NotificationRecord::new(uid, title, body, payload);
                self.store.insert_notification(&record)?;
                saved.push(record);
            }
        }

        let tokens = resolve::tokens_for(&self.store, uids)?;
        if tokens.is_empty() {
            tracing::debug!(uids = uids.len(), "no device tokens resolved, skipping push");
            return Ok(DispatchReport {
                saved,
                sent: MulticastOutcome::default(),
            });
        }

        let message = PushMessage {
            tokens,
            title: title.to_string(),
            body: body.to_string(),
            data: payload.to_string_map(),
        };
        let sent = self.gateway.send_multicast(&message).await?;
        tracing::info!(
            success = sent.success_count,
            failure = sent.failure_count,
            "push multicast delivered"
        );
        Ok(DispatchReport { saved, sent })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use rally_core::{RallyError, Result};

    use crate::gateway::{MulticastOutcome, PushGateway, PushMessage, TokenResult};

    /// Records every multicast call; fails when any token matches
    /// `fail_token`.
    pub struct FakeGateway {
        pub calls: Mutex<Vec<PushMessage>>,
        pub fail_token: Option<String>,
    }

    impl FakeGateway {
        pub fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_token: None,
            }
        }

        pub fn failing_on(token: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_token: Some(token.to_string()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PushGateway for FakeGateway {
        async fn send_multicast(&self, message: &PushMessage) -> Result<MulticastOutcome> {
            self.calls.lock().unwrap().push(message.clone());
            if let Some(bad) = &self.fail_token
                && message.tokens.iter().any(|t| t == bad)
            {
                return Err(RallyError::Delivery("gateway refused token".into()));
            }
            Ok(MulticastOutcome {
                success_count: message.tokens.len() as u32,
                failure_count: 0,
                responses: message
                    .tokens
                    .iter()
                    .map(|_| TokenResult {
                        success: true,
                        error: None,
                    })
                    .collect(),
            })
        }
    }
}
