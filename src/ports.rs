pub mod notify;
pub mod time;

pub use self::notify::ClientNotifier;
pub use self::time::TimeProvider;
