use crate::adapters::{Notifier, WebPushNotifier};
use crate::config;

pub(crate) mod vapid;

use tracing::{info, warn};

pub(crate) use vapid::{VapidConfigStatus, load_vapid_config};

/// Picks the notifier for the configured VAPID credentials. Missing or
/// broken credentials leave push disabled rather than stopping the server.
pub fn build_notifier(config: &config::AppConfig) -> Notifier {
    let vapid = match load_vapid_config(config) {
        VapidConfigStatus::Ready(vapid) => vapid,
        VapidConfigStatus::Incomplete => {
            warn!("push notifications disabled: incomplete VAPID configuration");
            return Notifier::Disabled;
        }
        VapidConfigStatus::Missing => {
            warn!("push notifications disabled: no VAPID configuration");
            return Notifier::Disabled;
        }
    };

    match WebPushNotifier::new(vapid) {
        Ok(notifier) => {
            info!("push notifications enabled");
            Notifier::WebPush(notifier)
        }
        Err(err) => {
            warn!("push notifications disabled: failed to init web-push ({err})");
            Notifier::Disabled
        }
    }
}
