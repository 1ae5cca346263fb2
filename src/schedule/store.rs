use super::alerts::{AlertIndex, AlertTimer, Removal};
use crate::error::{EngineError, EngineResult};
use crate::types::appointment::{Appointment, AppointmentId, AppointmentSnapshot, UserId};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use time::OffsetDateTime;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub owner: UserId,
    pub name: String,
    pub date: OffsetDateTime,
    pub guests: Vec<UserId>,
    pub alerts: BTreeMap<UserId, OffsetDateTime>,
}

/// Timer work left over by a mutation: buckets that need arming and timers
/// whose buckets are gone.
#[derive(Debug, Default)]
pub(crate) struct IndexChanges {
    pub(crate) created: Vec<OffsetDateTime>,
    pub(crate) emptied: Vec<AlertTimer>,
}

impl IndexChanges {
    fn record(&mut self, removal: Removal) {
        if let Removal::Emptied(Some(timer)) = removal {
            self.emptied.push(timer);
        }
    }

    fn merge(&mut self, other: IndexChanges) {
        self.created.extend(other.created);
        self.emptied.extend(other.emptied);
    }
}

/// Alerts taken out of a fired bucket for one appointment.
#[derive(Debug, Clone)]
pub(crate) struct FiredAlert {
    pub(crate) appointment: AppointmentSnapshot,
    pub(crate) users: Vec<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentKey {
    pub owner: UserId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBucket {
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub appointments: Vec<AppointmentKey>,
}

/// Appointments, the per-user lists that reference them, and the alert
/// index. Every method keeps the three in agreement.
#[derive(Debug, Default)]
pub struct AppointmentStore {
    next_id: u64,
    appointments: HashMap<AppointmentId, Appointment>,
    by_user: HashMap<UserId, Vec<AppointmentId>>,
    alerts: AlertIndex,
}

impl AppointmentStore {
    pub(crate) fn create(
        &mut self,
        request: NewAppointment,
    ) -> EngineResult<(AppointmentId, IndexChanges)> {
        let NewAppointment {
            owner,
            name,
            date,
            guests,
            alerts,
        } = request;
        if owner.trim().is_empty() {
            return Err(EngineError::InvalidRequest("owner must not be empty"));
        }
        if name.trim().is_empty() {
            return Err(EngineError::InvalidRequest(
                "appointment name must not be empty",
            ));
        }
        if self.owned(&owner, &name).is_some() {
            return Err(EngineError::DuplicateName { owner, name });
        }

        let id = AppointmentId(self.next_id);
        self.next_id += 1;

        let mut guests: BTreeSet<UserId> = guests
            .into_iter()
            .filter(|guest| !guest.trim().is_empty())
            .collect();
        guests.insert(owner.clone());

        for guest in &guests {
            self.index_user(guest, id, date);
        }
        self.appointments.insert(
            id,
            Appointment {
                id,
                owner,
                name,
                date,
                guests,
                alerts: BTreeMap::new(),
            },
        );

        let mut changes = IndexChanges::default();
        for (user, at) in alerts {
            match self.schedule(id, &user, at) {
                Ok(scheduled) => changes.merge(scheduled),
                Err(err) => warn!("skipping alert for '{user}': {err}"),
            }
        }
        Ok((id, changes))
    }

    /// The appointment `user` takes part in under `name`. When several
    /// owners used the same name, the user's own appointment wins, then the
    /// earliest one.
    pub fn find(&self, user: &str, name: &str) -> EngineResult<AppointmentId> {
        let mut matches = self
            .list(user)
            .into_iter()
            .filter(|appointment| appointment.name == name);
        let first = matches.next();
        let owned = first
            .filter(|appointment| appointment.owner == user)
            .or_else(|| matches.find(|appointment| appointment.owner == user));
        owned
            .or(first)
            .map(Appointment::id)
            .ok_or_else(|| EngineError::appointment_not_found(user, name))
    }

    /// Like [`AppointmentStore::find`], but an appointment on which `user`
    /// holds an alert comes first.
    pub fn find_alerted(&self, user: &str, name: &str) -> EngineResult<AppointmentId> {
        self.list(user)
            .into_iter()
            .find(|appointment| appointment.name == name && appointment.alerts.contains_key(user))
            .map(Appointment::id)
            .map_or_else(|| self.find(user, name), Ok)
    }

    pub fn find_owned(&self, owner: &str, name: &str) -> EngineResult<AppointmentId> {
        self.owned(owner, name)
            .ok_or_else(|| EngineError::appointment_not_found(owner, name))
    }

    pub fn get(&self, id: AppointmentId) -> Option<&Appointment> {
        self.appointments.get(&id)
    }

    /// Returns `false` when `user` already was a guest.
    pub(crate) fn add_guest(&mut self, id: AppointmentId, user: &str) -> EngineResult<bool> {
        if user.trim().is_empty() {
            return Err(EngineError::InvalidRequest("guest must not be empty"));
        }
        let appointment = self.appointments.get_mut(&id).ok_or(UNKNOWN_REFERENCE)?;
        if !appointment.guests.insert(user.to_string()) {
            return Ok(false);
        }
        let date = appointment.date;
        self.index_user(user, id, date);
        Ok(true)
    }

    pub(crate) fn remove_guest(
        &mut self,
        id: AppointmentId,
        user: &str,
    ) -> EngineResult<IndexChanges> {
        let appointment = self.appointments.get_mut(&id).ok_or(UNKNOWN_REFERENCE)?;
        if appointment.owner == user {
            return Err(EngineError::InvalidRequest(
                "the owner cannot be removed from an appointment",
            ));
        }
        if !appointment.guests.remove(user) {
            return Err(EngineError::GuestNotFound {
                user: user.to_string(),
                name: appointment.name.clone(),
            });
        }

        let mut changes = IndexChanges::default();
        if let Some(old) = appointment.alerts.remove(user)
            && !appointment.targets(old)
        {
            changes.record(self.alerts.remove(old, id));
        }
        self.unindex_user(user, id);
        Ok(changes)
    }

    pub(crate) fn cancel(
        &mut self,
        owner: &str,
        name: &str,
    ) -> EngineResult<(Appointment, IndexChanges)> {
        let id = self.find_owned(owner, name)?;
        let appointment = self.appointments.remove(&id).ok_or(UNKNOWN_REFERENCE)?;

        for guest in &appointment.guests {
            self.unindex_user(guest, id);
        }
        let mut changes = IndexChanges::default();
        for at in appointment.alert_times() {
            changes.record(self.alerts.remove(at, id));
        }
        Ok((appointment, changes))
    }

    pub fn list(&self, user: &str) -> Vec<&Appointment> {
        self.by_user
            .get(user)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.appointments.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn schedule(
        &mut self,
        id: AppointmentId,
        user: &str,
        at: OffsetDateTime,
    ) -> EngineResult<IndexChanges> {
        let appointment = self.appointments.get_mut(&id).ok_or(UNKNOWN_REFERENCE)?;
        if !appointment.is_guest(user) {
            return Err(EngineError::GuestNotFound {
                user: user.to_string(),
                name: appointment.name.clone(),
            });
        }

        let mut changes = IndexChanges::default();
        match appointment.alerts.insert(user.to_string(), at) {
            Some(old) if old == at => return Ok(changes),
            Some(old) if !appointment.targets(old) => {
                changes.record(self.alerts.remove(old, id));
            }
            _ => {}
        }
        if self.alerts.insert(at, id) {
            changes.created.push(at);
        }
        Ok(changes)
    }

    pub(crate) fn unschedule(
        &mut self,
        id: AppointmentId,
        user: &str,
    ) -> EngineResult<IndexChanges> {
        let appointment = self.appointments.get_mut(&id).ok_or(UNKNOWN_REFERENCE)?;
        let Some(old) = appointment.alerts.remove(user) else {
            return Err(EngineError::AlertNotFound {
                user: user.to_string(),
                name: appointment.name.clone(),
            });
        };

        let mut changes = IndexChanges::default();
        if !appointment.targets(old) {
            changes.record(self.alerts.remove(old, id));
        }
        Ok(changes)
    }

    pub(crate) fn arm(&mut self, at: OffsetDateTime, timer: AlertTimer) -> Option<AlertTimer> {
        self.alerts.arm(at, timer)
    }

    /// Removes the bucket at `at` and consumes every alert it stood for.
    pub(crate) fn take_due(&mut self, at: OffsetDateTime, timer_id: u64) -> Vec<FiredAlert> {
        let Some(ids) = self.alerts.take(at, timer_id) else {
            return Vec::new();
        };
        ids.into_iter()
            .filter_map(|id| {
                let appointment = self.appointments.get_mut(&id)?;
                let users = appointment.take_due(at);
                if users.is_empty() {
                    return None;
                }
                Some(FiredAlert {
                    appointment: appointment.snapshot(),
                    users,
                })
            })
            .collect()
    }

    pub fn alerts(&self) -> &AlertIndex {
        &self.alerts
    }

    pub fn pending(&self) -> Vec<PendingBucket> {
        self.alerts
            .timeline()
            .into_iter()
            .map(|(at, ids)| PendingBucket {
                at,
                appointments: ids
                    .into_iter()
                    .filter_map(|id| self.appointments.get(&id))
                    .map(|appointment| AppointmentKey {
                        owner: appointment.owner.clone(),
                        name: appointment.name.clone(),
                    })
                    .collect(),
            })
            .collect()
    }

    fn owned(&self, owner: &str, name: &str) -> Option<AppointmentId> {
        self.by_user.get(owner)?.iter().copied().find(|id| {
            self.appointments
                .get(id)
                .is_some_and(|appointment| appointment.owner == owner && appointment.name == name)
        })
    }

    fn index_user(&mut self, user: &str, id: AppointmentId, date: OffsetDateTime) {
        let appointments = &self.appointments;
        let list = self.by_user.entry(user.to_string()).or_default();
        if list.contains(&id) {
            return;
        }
        let position = list.partition_point(|other| {
            appointments
                .get(other)
                .is_some_and(|appointment| appointment.date <= date)
        });
        list.insert(position, id);
    }

    fn unindex_user(&mut self, user: &str, id: AppointmentId) {
        if let Some(list) = self.by_user.get_mut(user) {
            list.retain(|other| *other != id);
            if list.is_empty() {
                self.by_user.remove(user);
            }
        }
    }
}

const UNKNOWN_REFERENCE: EngineError = EngineError::InvalidRequest("unknown appointment reference");

#[cfg(test)]
impl AppointmentStore {
    /// Panics unless the per-user lists, the appointment records and the
    /// alert buckets all describe the same state.
    pub(crate) fn assert_consistent(&self) {
        for (user, ids) in &self.by_user {
            assert!(!ids.is_empty(), "empty list kept for {user}");
            let mut last = None;
            for id in ids {
                let appointment = self.appointments.get(id).expect("listed appointment exists");
                assert!(appointment.is_guest(user), "{user} listed but not a guest");
                if let Some(previous) = last {
                    assert!(previous <= appointment.date, "list for {user} not sorted");
                }
                last = Some(appointment.date);
            }
        }
        for (id, appointment) in &self.appointments {
            for guest in &appointment.guests {
                let listed = self
                    .by_user
                    .get(guest)
                    .map(|ids| ids.iter().filter(|other| *other == id).count())
                    .unwrap_or(0);
                assert_eq!(listed, 1, "{guest} must list {} once", appointment.name);
            }
            for (user, at) in &appointment.alerts {
                assert!(appointment.is_guest(user));
                assert!(self.alerts.contains(*at, *id), "alert of {user} not indexed");
            }
        }
        for (at, ids) in self.alerts.timeline() {
            assert!(!ids.is_empty(), "empty bucket kept at {at}");
            for id in ids {
                let appointment = self.appointments.get(&id).expect("bucket references record");
                assert!(appointment.targets(at), "bucket at {at} is stale");
            }
        }
    }
}
