use crate::types::appointment::AppointmentSnapshot;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct VapidConfig {
    pub private_key: String,
    pub public_key: String,
    pub subject: String,
}

/// Where a user's client wants to be reached: a Web Push subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackAddress {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

/// One-way notification pushed to a remote client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    NewAppointment {
        appointment: AppointmentSnapshot,
        signature: String,
    },
    Alert {
        appointment: AppointmentSnapshot,
    },
}

impl ClientEvent {
    pub fn appointment(&self) -> &AppointmentSnapshot {
        match self {
            ClientEvent::NewAppointment { appointment, .. } => appointment,
            ClientEvent::Alert { appointment } => appointment,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::NewAppointment { .. } => "new_appointment",
            ClientEvent::Alert { .. } => "alert",
        }
    }
}
