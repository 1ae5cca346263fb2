use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;

use crate::ports;
use crate::types::push::{CallbackAddress, ClientEvent, VapidConfig};

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimeProvider;

impl ports::TimeProvider for TokioTimeProvider {
    type Sleep<'a>
        = tokio::time::Sleep
    where
        Self: 'a;

    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn sleep<'a>(&'a self, duration: Duration) -> Self::Sleep<'a> {
        tokio::time::sleep(duration)
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("web push error: {0}")]
    WebPush(#[from] web_push::WebPushError),
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("push notifications are disabled")]
    Disabled,
}

/// Delivers client events as encrypted Web Push messages signed with VAPID.
#[derive(Clone)]
pub struct WebPushNotifier {
    vapid: VapidConfig,
    client: Arc<web_push::WebPushClient>,
}

impl WebPushNotifier {
    pub fn new(vapid: VapidConfig) -> Result<Self, web_push::WebPushError> {
        let client = web_push::WebPushClient::new()?;
        Ok(Self {
            vapid,
            client: Arc::new(client),
        })
    }

    async fn push(
        &self,
        address: &CallbackAddress,
        event: &ClientEvent,
    ) -> Result<(), NotifyError> {
        let payload = serde_json::to_vec(event)?;
        let subscription_info = web_push::SubscriptionInfo::new(
            address.endpoint.clone(),
            address.p256dh.clone(),
            address.auth.clone(),
        );
        let mut builder = web_push::WebPushMessageBuilder::new(&subscription_info)?;
        builder.set_payload(web_push::ContentEncoding::Aes128Gcm, &payload);
        let mut signature_builder = web_push::VapidSignatureBuilder::from_base64(
            &self.vapid.private_key,
            web_push::URL_SAFE_NO_PAD,
            &subscription_info,
        )?;
        signature_builder.add_claim("sub", self.vapid.subject.as_str());
        builder.set_vapid_signature(signature_builder.build()?);
        self.client.send(builder.build()?).await?;
        Ok(())
    }
}

/// The notifier the server runs with. Without a usable VAPID configuration
/// every delivery fails, which the fanout reports per recipient.
#[derive(Clone)]
pub enum Notifier {
    WebPush(WebPushNotifier),
    Disabled,
}

impl Notifier {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Notifier::WebPush(_))
    }
}

impl ports::ClientNotifier for Notifier {
    type Error = NotifyError;
    type Fut<'a>
        = Pin<Box<dyn Future<Output = Result<(), Self::Error>> + Send + 'a>>
    where
        Self: 'a;

    fn deliver<'a>(
        &'a self,
        address: &'a CallbackAddress,
        event: &'a ClientEvent,
    ) -> Self::Fut<'a> {
        Box::pin(async move {
            match self {
                Notifier::WebPush(notifier) => notifier.push(address, event).await,
                Notifier::Disabled => Err(NotifyError::Disabled),
            }
        })
    }
}
