mod alerts;
mod store;

pub(crate) use alerts::AlertTimer;
pub use alerts::AlertIndex;
pub(crate) use store::IndexChanges;
pub use store::{AppointmentKey, AppointmentStore, NewAppointment, PendingBucket};
