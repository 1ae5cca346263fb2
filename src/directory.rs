use crate::error::{EngineError, EngineResult};
use crate::types::appointment::UserId;
use crate::types::push::CallbackAddress;

use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

/// Maps users to the address their client listens on. The lock is only held
/// for a single lookup or insert.
#[derive(Debug)]
pub struct UserDirectory {
    credential: String,
    users: Mutex<HashMap<UserId, CallbackAddress>>,
}

impl UserDirectory {
    /// `credential` is handed to every registering client so it can verify
    /// what the server signs.
    pub fn new(credential: String) -> Self {
        Self {
            credential,
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Registers or replaces `user`'s callback address.
    pub fn register(&self, user: &str, address: CallbackAddress) -> EngineResult<String> {
        if user.trim().is_empty() {
            return Err(EngineError::InvalidRequest("user must not be empty"));
        }
        if address.endpoint.trim().is_empty()
            || address.p256dh.trim().is_empty()
            || address.auth.trim().is_empty()
        {
            return Err(EngineError::InvalidRequest(
                "endpoint, p256dh, and auth are required",
            ));
        }

        let replaced = {
            let mut users = self.users.lock().expect("user directory lock");
            users.insert(user.to_string(), address).is_some()
        };
        if replaced {
            info!("updated callback address for '{user}'");
        } else {
            info!("registered user '{user}'");
        }
        Ok(self.credential.clone())
    }

    pub fn resolve(&self, user: &str) -> Option<CallbackAddress> {
        let users = self.users.lock().expect("user directory lock");
        users.get(user).cloned()
    }

    pub fn len(&self) -> usize {
        self.users.lock().expect("user directory lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
