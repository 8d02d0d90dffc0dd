//! Session-scoped fan-out
//!
//! Delivers an envelope to every other live connection in the sender's
//! session. Delivery is best effort: closed recipients are skipped and nothing
//! is queued or retried, since a stale offer or candidate is useless anyway.

use std::sync::Arc;

use super::events::SignalEnvelope;
use super::registry::{ConnectionRegistry, RegistryKey};

/// What a single `route` call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// At least one peer was present
    Delivered { recipients: usize, skipped: usize },
    /// Sender was alone; `notified` is whether it got a `no-participant` frame
    NoParticipant { notified: bool },
    /// The envelope could not be serialized
    EncodeFailed,
}

#[derive(Clone)]
pub struct SessionRouter {
    registry: Arc<ConnectionRegistry>,
}

impl SessionRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Send `envelope` to everyone in `session_id` except `sender_user_id`
    ///
    /// With no one else present the sender is told `no-participant` instead.
    pub async fn route(
        &self,
        session_id: &str,
        sender_user_id: &str,
        envelope: &SignalEnvelope,
    ) -> RouteOutcome {
        let recipients: Vec<_> = self
            .registry
            .list_by_session(session_id)
            .await
            .into_iter()
            .filter(|c| c.user_id != sender_user_id)
            .collect();

        if recipients.is_empty() {
            return self.notify_alone(session_id, sender_user_id).await;
        }

        let frame = match envelope.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    event_type = %envelope.kind(),
                    error = %e,
                    "Failed to serialize envelope"
                );
                return RouteOutcome::EncodeFailed;
            }
        };

        let mut delivered = 0;
        let mut skipped = 0;
        for conn in &recipients {
            if conn.send_text(frame.as_str()) {
                delivered += 1;
            } else {
                skipped += 1;
            }
        }

        tracing::debug!(
            session_id = %session_id,
            sender = %sender_user_id,
            event_type = %envelope.kind(),
            recipients = delivered,
            skipped,
            "Routed envelope to session"
        );

        RouteOutcome::Delivered {
            recipients: delivered,
            skipped,
        }
    }

    async fn notify_alone(&self, session_id: &str, sender_user_id: &str) -> RouteOutcome {
        let key = RegistryKey::new(sender_user_id, session_id);
        let notified = match self.registry.get(&key).await {
            Some(conn) if conn.is_open() => match SignalEnvelope::no_participant().encode() {
                Ok(frame) => conn.send_text(frame),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to serialize no-participant");
                    false
                }
            },
            _ => false,
        };

        tracing::debug!(
            session_id = %session_id,
            sender = %sender_user_id,
            notified,
            "No other participant in session"
        );

        RouteOutcome::NoParticipant { notified }
    }
}
