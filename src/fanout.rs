use crate::directory::UserDirectory;
use crate::ports::ClientNotifier;
use crate::signing::NotificationSigner;
use crate::types::appointment::{AppointmentSnapshot, UserId};
use crate::types::push::{CallbackAddress, ClientEvent};

use futures::future::join_all;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Why a single recipient did not get a notification. Never aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryFailure {
    #[error("'{user}' has no registered callback address")]
    UnknownUser { user: UserId },
    #[error("delivery to '{user}' timed out after {timeout:?}")]
    Timeout { user: UserId, timeout: Duration },
    #[error("delivery to '{user}' failed: {reason}")]
    Transport { user: UserId, reason: String },
    #[error("notification for '{user}' could not be signed: {reason}")]
    Signing { user: UserId, reason: String },
}

impl DeliveryFailure {
    pub fn user(&self) -> &str {
        match self {
            DeliveryFailure::UnknownUser { user }
            | DeliveryFailure::Timeout { user, .. }
            | DeliveryFailure::Transport { user, .. }
            | DeliveryFailure::Signing { user, .. } => user,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: Vec<UserId>,
    pub failed: Vec<DeliveryFailure>,
}

#[derive(Debug, Clone)]
pub struct NotificationFanout<N> {
    notifier: N,
    timeout: Duration,
}

impl<N> NotificationFanout<N>
where
    N: ClientNotifier,
{
    pub fn new(notifier: N, timeout: Duration) -> Self {
        Self { notifier, timeout }
    }

    /// Signed "new appointment" event to every guest but the owner.
    pub async fn notify_new_appointment(
        &self,
        directory: &UserDirectory,
        signer: &NotificationSigner,
        appointment: &AppointmentSnapshot,
    ) -> FanoutReport {
        let recipients: Vec<UserId> = appointment
            .guests
            .iter()
            .filter(|guest| **guest != appointment.owner)
            .cloned()
            .collect();
        self.notify_new_appointment_to(directory, signer, appointment, &recipients)
            .await
    }

    pub(crate) async fn notify_new_appointment_to(
        &self,
        directory: &UserDirectory,
        signer: &NotificationSigner,
        appointment: &AppointmentSnapshot,
        recipients: &[UserId],
    ) -> FanoutReport {
        if recipients.is_empty() {
            return FanoutReport::default();
        }
        let signature = match signer.sign_snapshot(appointment) {
            Ok(signature) => signature,
            Err(err) => {
                error!(
                    "failed to sign appointment '{}' of '{}': {err}",
                    appointment.name, appointment.owner
                );
                return FanoutReport {
                    delivered: Vec::new(),
                    failed: recipients
                        .iter()
                        .map(|user| DeliveryFailure::Signing {
                            user: user.clone(),
                            reason: err.to_string(),
                        })
                        .collect(),
                };
            }
        };
        let event = ClientEvent::NewAppointment {
            appointment: appointment.clone(),
            signature,
        };
        self.deliver_all(directory, recipients, &event).await
    }

    /// "Alert fired" event to exactly `users`.
    pub async fn notify_alert(
        &self,
        directory: &UserDirectory,
        appointment: &AppointmentSnapshot,
        users: &[UserId],
    ) -> FanoutReport {
        let event = ClientEvent::Alert {
            appointment: appointment.clone(),
        };
        self.deliver_all(directory, users, &event).await
    }

    async fn deliver_all(
        &self,
        directory: &UserDirectory,
        recipients: &[UserId],
        event: &ClientEvent,
    ) -> FanoutReport {
        let mut report = FanoutReport::default();
        let mut targets = Vec::with_capacity(recipients.len());
        for user in recipients {
            match directory.resolve(user) {
                Some(address) => targets.push((user.as_str(), address)),
                None => report
                    .failed
                    .push(DeliveryFailure::UnknownUser { user: user.clone() }),
            }
        }

        let deliveries: Vec<_> = targets
            .iter()
            .map(|(user, address)| self.deliver_one(user, address, event))
            .collect();
        let outcomes = join_all(deliveries).await;
        for outcome in outcomes {
            match outcome {
                Ok(user) => report.delivered.push(user),
                Err(failure) => report.failed.push(failure),
            }
        }

        let appointment = event.appointment();
        for failure in &report.failed {
            warn!(
                "push delivery warning: {failure} ({} '{}' of '{}')",
                event.kind(),
                appointment.name,
                appointment.owner
            );
        }
        debug!(
            "delivered {} '{}' to {} of {} recipients",
            event.kind(),
            appointment.name,
            report.delivered.len(),
            recipients.len()
        );
        report
    }

    async fn deliver_one(
        &self,
        user: &str,
        address: &CallbackAddress,
        event: &ClientEvent,
    ) -> Result<UserId, DeliveryFailure> {
        match tokio::time::timeout(self.timeout, self.notifier.deliver(address, event)).await {
            Ok(Ok(())) => Ok(user.to_string()),
            Ok(Err(err)) => Err(DeliveryFailure::Transport {
                user: user.to_string(),
                reason: err.to_string(),
            }),
            Err(_) => Err(DeliveryFailure::Timeout {
                user: user.to_string(),
                timeout: self.timeout,
            }),
        }
    }
}
