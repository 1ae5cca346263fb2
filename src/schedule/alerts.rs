use crate::types::appointment::AppointmentId;

use std::collections::{BTreeMap, BTreeSet};
use time::OffsetDateTime;
use tokio::task::JoinHandle;

/// Timer task armed for one bucket. `id` tells a stale wake-up apart from
/// the timer of a bucket that was emptied and re-created at the same instant.
#[derive(Debug)]
pub(crate) struct AlertTimer {
    pub(crate) id: u64,
    handle: JoinHandle<()>,
}

impl AlertTimer {
    pub(crate) fn new(id: u64, handle: JoinHandle<()>) -> Self {
        Self { id, handle }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub(crate) fn cancel(self) {
        self.handle.abort();
    }
}

#[derive(Debug, Default)]
pub(crate) struct AlertBucket {
    appointments: BTreeSet<AppointmentId>,
    timer: Option<AlertTimer>,
}

#[derive(Debug)]
pub(crate) enum Removal {
    Absent,
    Kept,
    Emptied(Option<AlertTimer>),
}

/// Pending alerts grouped by trigger instant. Keys are ordered, so the
/// first entry is always the next deadline.
#[derive(Debug, Default)]
pub struct AlertIndex {
    buckets: BTreeMap<OffsetDateTime, AlertBucket>,
}

impl AlertIndex {
    /// Adds `id` to the bucket at `at`. Returns `true` when the bucket is new
    /// and still needs a timer.
    pub(crate) fn insert(&mut self, at: OffsetDateTime, id: AppointmentId) -> bool {
        let created = !self.buckets.contains_key(&at);
        self.buckets.entry(at).or_default().appointments.insert(id);
        created
    }

    pub(crate) fn remove(&mut self, at: OffsetDateTime, id: AppointmentId) -> Removal {
        let Some(bucket) = self.buckets.get_mut(&at) else {
            return Removal::Absent;
        };
        if !bucket.appointments.remove(&id) {
            return Removal::Absent;
        }
        if !bucket.appointments.is_empty() {
            return Removal::Kept;
        }
        match self.buckets.remove(&at) {
            Some(bucket) => Removal::Emptied(bucket.timer),
            None => Removal::Emptied(None),
        }
    }

    /// Attaches `timer` to the bucket at `at`. Whatever must be cancelled is
    /// handed back: a displaced timer, or `timer` itself when the bucket is gone.
    pub(crate) fn arm(&mut self, at: OffsetDateTime, timer: AlertTimer) -> Option<AlertTimer> {
        match self.buckets.get_mut(&at) {
            Some(bucket) => bucket.timer.replace(timer),
            None => Some(timer),
        }
    }

    /// Removes the bucket at `at` if it is still owned by timer `timer_id`.
    pub(crate) fn take(
        &mut self,
        at: OffsetDateTime,
        timer_id: u64,
    ) -> Option<BTreeSet<AppointmentId>> {
        let owned = self
            .buckets
            .get(&at)
            .and_then(|bucket| bucket.timer.as_ref())
            .is_some_and(|timer| timer.id == timer_id);
        if !owned {
            return None;
        }
        self.buckets.remove(&at).map(|bucket| bucket.appointments)
    }

    pub fn next_deadline(&self) -> Option<OffsetDateTime> {
        self.buckets.keys().next().copied()
    }

    pub fn contains(&self, at: OffsetDateTime, id: AppointmentId) -> bool {
        self.buckets
            .get(&at)
            .is_some_and(|bucket| bucket.appointments.contains(&id))
    }

    pub fn references(&self, id: AppointmentId) -> bool {
        self.buckets
            .values()
            .any(|bucket| bucket.appointments.contains(&id))
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub(crate) fn is_armed(&self, at: OffsetDateTime) -> bool {
        self.buckets
            .get(&at)
            .and_then(|bucket| bucket.timer.as_ref())
            .is_some_and(|timer| !timer.is_finished())
    }

    pub fn timeline(&self) -> Vec<(OffsetDateTime, Vec<AppointmentId>)> {
        self.buckets
            .iter()
            .map(|(at, bucket)| (*at, bucket.appointments.iter().copied().collect()))
            .collect()
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const QUARTER_TO: OffsetDateTime = datetime!(2024-01-02 08:45 UTC);
    const HALF_PAST: OffsetDateTime = datetime!(2024-01-02 08:30 UTC);

    #[test]
    fn insert__should_create_bucket_once_per_instant() {
        // Given
        let mut index = AlertIndex::default();

        // When
        let first = index.insert(QUARTER_TO, AppointmentId(1));
        let second = index.insert(QUARTER_TO, AppointmentId(2));

        // Then
        assert!(first);
        assert!(!second);
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.timeline(),
            vec![(QUARTER_TO, vec![AppointmentId(1), AppointmentId(2)])]
        );
    }

    #[test]
    fn remove__should_keep_bucket_while_other_appointments_remain() {
        // Given
        let mut index = AlertIndex::default();
        index.insert(QUARTER_TO, AppointmentId(1));
        index.insert(QUARTER_TO, AppointmentId(2));

        // When
        let removal = index.remove(QUARTER_TO, AppointmentId(1));

        // Then
        assert!(matches!(removal, Removal::Kept));
        assert!(index.contains(QUARTER_TO, AppointmentId(2)));
        assert!(!index.references(AppointmentId(1)));
    }

    #[test]
    fn remove__should_delete_bucket_when_emptied() {
        // Given
        let mut index = AlertIndex::default();
        index.insert(QUARTER_TO, AppointmentId(1));

        // When
        let removal = index.remove(QUARTER_TO, AppointmentId(1));

        // Then
        assert!(matches!(removal, Removal::Emptied(None)));
        assert!(index.is_empty());
        assert!(matches!(
            index.remove(QUARTER_TO, AppointmentId(1)),
            Removal::Absent
        ));
    }

    #[test]
    fn next_deadline__should_return_earliest_bucket() {
        // Given
        let mut index = AlertIndex::default();
        index.insert(QUARTER_TO, AppointmentId(1));
        index.insert(HALF_PAST, AppointmentId(2));

        // Then
        assert_eq!(index.next_deadline(), Some(HALF_PAST));
    }

    #[tokio::test]
    async fn take__should_ignore_stale_timer() {
        // Given
        let mut index = AlertIndex::default();
        index.insert(QUARTER_TO, AppointmentId(1));
        let timer = AlertTimer::new(7, tokio::spawn(std::future::pending::<()>()));
        assert!(index.arm(QUARTER_TO, timer).is_none());
        assert!(index.is_armed(QUARTER_TO));

        // When
        let stale = index.take(QUARTER_TO, 3);
        let owned = index.take(QUARTER_TO, 7);

        // Then
        assert!(stale.is_none());
        assert_eq!(owned, Some([AppointmentId(1)].into_iter().collect()));
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn arm__should_return_timer_when_bucket_is_gone() {
        // Given
        let mut index = AlertIndex::default();
        let timer = AlertTimer::new(1, tokio::spawn(std::future::pending::<()>()));

        // When
        let leftover = index.arm(QUARTER_TO, timer);

        // Then
        let leftover = leftover.expect("timer handed back");
        assert_eq!(leftover.id, 1);
        leftover.cancel();
    }

    #[tokio::test]
    async fn remove__should_hand_back_armed_timer() {
        // Given
        let mut index = AlertIndex::default();
        index.insert(QUARTER_TO, AppointmentId(1));
        index.arm(
            QUARTER_TO,
            AlertTimer::new(4, tokio::spawn(std::future::pending::<()>())),
        );

        // When
        let removal = index.remove(QUARTER_TO, AppointmentId(1));

        // Then
        match removal {
            Removal::Emptied(Some(timer)) => {
                assert_eq!(timer.id, 4);
                timer.cancel();
            }
            other => panic!("unexpected removal: {other:?}"),
        }
    }
}
