//! The callable surface of the scheduling server.
//!
//! All appointment and alert state lives in one [`AppointmentStore`] behind a
//! single lock, so a mutation touching both the per-user lists and the alert
//! buckets is seen whole or not at all. The user directory has its own lock.
//! Notifications go out only after the store lock is released.

mod timer;

use crate::directory::UserDirectory;
use crate::error::{EngineError, EngineResult};
use crate::fanout::{FanoutReport, NotificationFanout};
use crate::ports;
use crate::schedule::{AppointmentStore, IndexChanges, NewAppointment, PendingBucket};
use crate::signing::NotificationSigner;
use crate::types::appointment::{Appointment, AppointmentSnapshot};
use crate::types::push::CallbackAddress;

use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Outcome of a mutation that notified guests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registered {
    pub appointment: AppointmentSnapshot,
    pub notified: FanoutReport,
}

/// Alert timers run as tokio tasks, so operations that schedule alerts must
/// be called from within a tokio runtime. Outside one they fail with
/// [`EngineError::NoRuntime`] before touching any state.
pub struct Engine<T, N> {
    inner: Arc<EngineInner<T, N>>,
}

impl<T, N> Clone for Engine<T, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct EngineInner<T, N> {
    time: T,
    store: Mutex<AppointmentStore>,
    directory: UserDirectory,
    fanout: NotificationFanout<N>,
    signer: NotificationSigner,
    next_timer: AtomicU64,
}

impl<T, N> Engine<T, N>
where
    T: ports::TimeProvider,
    N: ports::ClientNotifier,
{
    pub fn new(
        time: T,
        notifier: N,
        signer: NotificationSigner,
        delivery_timeout: Duration,
    ) -> Self {
        let directory = UserDirectory::new(signer.public_key());
        Self {
            inner: Arc::new(EngineInner {
                time,
                store: Mutex::new(AppointmentStore::default()),
                directory,
                fanout: NotificationFanout::new(notifier, delivery_timeout),
                signer,
                next_timer: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the credential clients use to verify signed notifications.
    pub fn register_user(&self, user: &str, address: CallbackAddress) -> EngineResult<String> {
        self.inner.directory.register(user, address)
    }

    pub async fn register_appointment(&self, request: NewAppointment) -> EngineResult<Registered> {
        let runtime = current_runtime()?;
        let appointment = {
            let mut store = self.inner.lock_store();
            let (id, changes) = store.create(request)?;
            self.inner.apply(&mut store, changes, &runtime);
            store.get(id).map(Appointment::snapshot)
        };
        let appointment = appointment.ok_or(EngineError::InvalidRequest(
            "appointment vanished during registration",
        ))?;
        info!(
            "registered appointment '{}' of '{}' with {} guest(s)",
            appointment.name,
            appointment.owner,
            appointment.guests.len()
        );

        let notified = self
            .inner
            .fanout
            .notify_new_appointment(&self.inner.directory, &self.inner.signer, &appointment)
            .await;
        Ok(Registered {
            appointment,
            notified,
        })
    }

    pub fn cancel_appointment(&self, owner: &str, name: &str) -> EngineResult<AppointmentSnapshot> {
        let cancelled = {
            let mut store = self.inner.lock_store();
            let (appointment, changes) = store.cancel(owner, name)?;
            EngineInner::<T, N>::release(changes);
            appointment.snapshot()
        };
        info!("cancelled appointment '{name}' of '{owner}'");
        Ok(cancelled)
    }

    pub async fn add_guest(
        &self,
        owner: &str,
        name: &str,
        guest: &str,
    ) -> EngineResult<Registered> {
        let (appointment, added) = {
            let mut store = self.inner.lock_store();
            let id = store.find_owned(owner, name)?;
            let added = store.add_guest(id, guest)?;
            let appointment = store.get(id).map(Appointment::snapshot);
            (appointment, added)
        };
        let appointment =
            appointment.ok_or_else(|| EngineError::appointment_not_found(owner, name))?;
        if !added {
            return Ok(Registered {
                appointment,
                notified: FanoutReport::default(),
            });
        }

        info!("added '{guest}' to appointment '{name}' of '{owner}'");
        let notified = self
            .inner
            .fanout
            .notify_new_appointment_to(
                &self.inner.directory,
                &self.inner.signer,
                &appointment,
                &[guest.to_string()],
            )
            .await;
        Ok(Registered {
            appointment,
            notified,
        })
    }

    pub fn remove_guest(
        &self,
        owner: &str,
        name: &str,
        guest: &str,
    ) -> EngineResult<AppointmentSnapshot> {
        let mut store = self.inner.lock_store();
        let id = store.find_owned(owner, name)?;
        let changes = store.remove_guest(id, guest)?;
        EngineInner::<T, N>::release(changes);
        info!("removed '{guest}' from appointment '{name}' of '{owner}'");
        store
            .get(id)
            .map(Appointment::snapshot)
            .ok_or_else(|| EngineError::appointment_not_found(owner, name))
    }

    /// Schedules `caller`'s alert on `owner`'s appointment `name`, replacing
    /// any earlier alert `caller` had there.
    pub fn register_alert(
        &self,
        caller: &str,
        owner: &str,
        name: &str,
        at: OffsetDateTime,
    ) -> EngineResult<()> {
        let runtime = current_runtime()?;
        let mut store = self.inner.lock_store();
        let id = store.find_owned(owner, name)?;
        let changes = store.schedule(id, caller, at)?;
        self.inner.apply(&mut store, changes, &runtime);
        debug!("'{caller}' set an alert at {at} on '{name}' of '{owner}'");
        Ok(())
    }

    pub fn cancel_alert(&self, caller: &str, name: &str) -> EngineResult<()> {
        let mut store = self.inner.lock_store();
        let id = store.find_alerted(caller, name)?;
        let changes = store.unschedule(id, caller)?;
        EngineInner::<T, N>::release(changes);
        debug!("'{caller}' cancelled their alert on '{name}'");
        Ok(())
    }

    /// The user's appointments ordered by date.
    pub fn get_appointments(&self, user: &str) -> Vec<AppointmentSnapshot> {
        let store = self.inner.lock_store();
        store
            .list(user)
            .into_iter()
            .map(Appointment::snapshot)
            .collect()
    }

    pub fn appointment(&self, user: &str, name: &str) -> EngineResult<AppointmentSnapshot> {
        let store = self.inner.lock_store();
        let id = store.find(user, name)?;
        store
            .get(id)
            .map(Appointment::snapshot)
            .ok_or_else(|| EngineError::appointment_not_found(user, name))
    }

    pub fn pending_alerts(&self) -> Vec<PendingBucket> {
        self.inner.lock_store().pending()
    }

    pub fn next_deadline(&self) -> Option<OffsetDateTime> {
        self.inner.lock_store().alerts().next_deadline()
    }

    pub fn credential(&self) -> String {
        self.inner.signer.public_key()
    }

    pub fn now(&self) -> OffsetDateTime {
        self.inner.time.now()
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        self.inner.lock_store().assert_consistent();
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self, at: OffsetDateTime) -> bool {
        self.inner.lock_store().alerts().is_armed(at)
    }
}

impl<T, N> EngineInner<T, N>
where
    T: ports::TimeProvider,
    N: ports::ClientNotifier,
{
    fn lock_store(&self) -> MutexGuard<'_, AppointmentStore> {
        self.store.lock().expect("appointment store lock")
    }

    /// Cancels timers of emptied buckets and arms new ones. Runs under the
    /// store lock so a timer is attached before it can fire.
    fn apply(
        self: &Arc<Self>,
        store: &mut AppointmentStore,
        changes: IndexChanges,
        runtime: &Handle,
    ) {
        for timer in changes.emptied {
            debug!("cancelling alert timer {}", timer.id);
            timer.cancel();
        }
        for at in changes.created {
            self.arm(store, at, runtime);
        }
    }

    /// Cancels timers of emptied buckets. Removals never create buckets.
    fn release(changes: IndexChanges) {
        debug_assert!(changes.created.is_empty());
        for timer in changes.emptied {
            debug!("cancelling alert timer {}", timer.id);
            timer.cancel();
        }
    }

    fn arm(self: &Arc<Self>, store: &mut AppointmentStore, at: OffsetDateTime, runtime: &Handle) {
        let id = self.next_timer.fetch_add(1, Ordering::Relaxed);
        let engine = Arc::downgrade(self);
        let timer = timer::spawn_timer(runtime, self.time.clone(), id, at, move || async move {
            if let Some(engine) = engine.upgrade() {
                engine.fire(at, id).await;
            }
        });
        debug!("armed alert timer {id} for {at}");
        if let Some(stale) = store.arm(at, timer) {
            stale.cancel();
        }
    }

    async fn fire(&self, at: OffsetDateTime, timer_id: u64) {
        let fired = {
            let mut store = self.lock_store();
            store.take_due(at, timer_id)
        };
        if fired.is_empty() {
            debug!("alert timer {timer_id} for {at} found nothing to fire");
            return;
        }

        info!("firing {} appointment alert(s) due at {at}", fired.len());
        let deliveries: Vec<_> = fired
            .iter()
            .map(|alert| {
                self.fanout
                    .notify_alert(&self.directory, &alert.appointment, &alert.users)
            })
            .collect();
        join_all(deliveries).await;
    }
}

fn current_runtime() -> EngineResult<Handle> {
    Handle::try_current().map_err(|_| EngineError::NoRuntime)
}
