use crate::types::push::{CallbackAddress, ClientEvent};

/// Outbound call into a remote client's callback surface.
pub trait ClientNotifier: Clone + Send + Sync + 'static {
    type Error: std::fmt::Display + Send + Sync + 'static;
    type Fut<'a>: Future<Output = Result<(), Self::Error>> + Send + 'a
    where
        Self: 'a;

    fn deliver<'a>(&'a self, address: &'a CallbackAddress, event: &'a ClientEvent)
    -> Self::Fut<'a>;
}
