use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use time::OffsetDateTime;

pub type UserId = String;

/// Store-internal reference shared by the per-user lists and the alert buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppointmentId(pub(crate) u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appointment {
    pub(crate) id: AppointmentId,
    pub owner: UserId,
    pub name: String,
    pub date: OffsetDateTime,
    /// Always contains `owner`.
    pub guests: BTreeSet<UserId>,
    pub alerts: BTreeMap<UserId, OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertState {
    Unset,
    Scheduled(OffsetDateTime),
}

impl Appointment {
    pub fn id(&self) -> AppointmentId {
        self.id
    }

    pub fn is_guest(&self, user: &str) -> bool {
        self.guests.contains(user)
    }

    pub fn alert_state(&self, user: &str) -> AlertState {
        match self.alerts.get(user) {
            Some(at) => AlertState::Scheduled(*at),
            None => AlertState::Unset,
        }
    }

    /// Whether any guest still has an alert at `at`.
    pub(crate) fn targets(&self, at: OffsetDateTime) -> bool {
        self.alerts.values().any(|value| *value == at)
    }

    /// Distinct alert times, each reported once.
    pub(crate) fn alert_times(&self) -> BTreeSet<OffsetDateTime> {
        self.alerts.values().copied().collect()
    }

    pub(crate) fn take_due(&mut self, at: OffsetDateTime) -> Vec<UserId> {
        let due: Vec<UserId> = self
            .alerts
            .iter()
            .filter(|(_, value)| **value == at)
            .map(|(user, _)| user.clone())
            .collect();
        for user in &due {
            self.alerts.remove(user);
        }
        due
    }

    pub fn snapshot(&self) -> AppointmentSnapshot {
        AppointmentSnapshot {
            owner: self.owner.clone(),
            name: self.name.clone(),
            date: self.date,
            guests: self.guests.iter().cloned().collect(),
            alerts: self
                .alerts
                .iter()
                .map(|(user, at)| AlertEntry {
                    user: user.clone(),
                    at: *at,
                })
                .collect(),
        }
    }
}

/// Owned, serializable view of an appointment handed to callers and clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentSnapshot {
    pub owner: UserId,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub guests: Vec<UserId>,
    pub alerts: Vec<AlertEntry>,
}

impl AppointmentSnapshot {
    pub fn alert_for(&self, user: &str) -> Option<OffsetDateTime> {
        self.alerts
            .iter()
            .find(|entry| entry.user == user)
            .map(|entry| entry.at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEntry {
    pub user: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn standup() -> Appointment {
        Appointment {
            id: AppointmentId(1),
            owner: "alice".to_string(),
            name: "standup".to_string(),
            date: datetime!(2024-01-02 09:00 UTC),
            guests: ["alice".to_string(), "bob".to_string(), "carol".to_string()]
                .into_iter()
                .collect(),
            alerts: [
                ("bob".to_string(), datetime!(2024-01-02 08:45 UTC)),
                ("carol".to_string(), datetime!(2024-01-02 08:45 UTC)),
                ("alice".to_string(), datetime!(2024-01-02 08:30 UTC)),
            ]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn take_due__should_consume_only_matching_alerts() {
        // Given
        let mut appointment = standup();

        // When
        let due = appointment.take_due(datetime!(2024-01-02 08:45 UTC));

        // Then
        assert_eq!(due, vec!["bob".to_string(), "carol".to_string()]);
        assert_eq!(appointment.alert_state("bob"), AlertState::Unset);
        assert_eq!(
            appointment.alert_state("alice"),
            AlertState::Scheduled(datetime!(2024-01-02 08:30 UTC))
        );
        assert!(!appointment.targets(datetime!(2024-01-02 08:45 UTC)));
    }

    #[test]
    fn alert_times__should_deduplicate_shared_times() {
        // Given
        let appointment = standup();

        // When
        let times = appointment.alert_times();

        // Then
        assert_eq!(times.len(), 2);
    }

    #[test]
    fn snapshot__should_serialize_rfc3339_dates() {
        // Given
        let snapshot = standup().snapshot();

        // When
        let json = serde_json::to_value(&snapshot).expect("serialize snapshot");

        // Then
        assert_eq!(json["date"], "2024-01-02T09:00:00Z");
        assert_eq!(json["guests"][0], "alice");
        assert_eq!(json["alerts"][0]["user"], "alice");
        assert_eq!(
            snapshot.alert_for("bob"),
            Some(datetime!(2024-01-02 08:45 UTC))
        );
    }
}
