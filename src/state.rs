use crate::adapters::{Notifier, TokioTimeProvider};
use crate::config::AppConfig;
use crate::engine::Engine;

pub type AppEngine = Engine<TokioTimeProvider, Notifier>;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub engine: AppEngine,
}
