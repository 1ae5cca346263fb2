//! Port doubles shared by the unit tests.

use crate::keys;
use crate::ports;
use crate::signing::NotificationSigner;
use crate::types::push::{CallbackAddress, ClientEvent};

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::oneshot;

pub(crate) fn address(user: &str) -> CallbackAddress {
    CallbackAddress {
        endpoint: format!("https://push.example/{user}"),
        p256dh: "p256".to_string(),
        auth: "auth".to_string(),
    }
}

pub(crate) fn test_signer() -> NotificationSigner {
    let mut rng = StdRng::from_seed([11u8; 32]);
    let key_pair = keys::generate_es256_keypair_with_rng(&mut rng);
    NotificationSigner::from_key_pair(key_pair, "agenda", time::Duration::hours(1))
}

/// Lets spawned tasks run until they block again.
pub(crate) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

struct Sleeper {
    deadline: OffsetDateTime,
    wake: oneshot::Sender<()>,
}

struct ManualState {
    now: OffsetDateTime,
    sleepers: Vec<Sleeper>,
    durations: Vec<Duration>,
}

/// Clock that only moves when a test calls [`ManualTime::advance_to`].
#[derive(Clone)]
pub(crate) struct ManualTime {
    state: Arc<Mutex<ManualState>>,
}

impl ManualTime {
    pub(crate) fn new(now: OffsetDateTime) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now,
                sleepers: Vec::new(),
                durations: Vec::new(),
            })),
        }
    }

    pub(crate) fn advance_to(&self, now: OffsetDateTime) {
        let mut state = self.state.lock().expect("manual time lock");
        state.now = now;
        let (due, waiting): (Vec<Sleeper>, Vec<Sleeper>) = state
            .sleepers
            .drain(..)
            .partition(|sleeper| sleeper.deadline <= now);
        state.sleepers = waiting;
        for sleeper in due {
            let _ = sleeper.wake.send(());
        }
    }

    pub(crate) fn sleep_durations(&self) -> Vec<Duration> {
        self.state.lock().expect("manual time lock").durations.clone()
    }
}

pub(crate) struct ManualSleep {
    receiver: oneshot::Receiver<()>,
}

impl Future for ManualSleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(_) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl ports::TimeProvider for ManualTime {
    type Sleep<'a>
        = ManualSleep
    where
        Self: 'a;

    fn now(&self) -> OffsetDateTime {
        self.state.lock().expect("manual time lock").now
    }

    fn sleep<'a>(&'a self, duration: Duration) -> Self::Sleep<'a> {
        let (wake, receiver) = oneshot::channel();
        let mut state = self.state.lock().expect("manual time lock");
        let deadline = state.now + duration;
        state.durations.push(duration);
        state.sleepers.push(Sleeper { deadline, wake });
        ManualSleep { receiver }
    }
}

#[derive(Debug)]
pub(crate) struct TestSendError;

impl std::fmt::Display for TestSendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("test send error")
    }
}

/// Records every delivery; endpoints can be told to fail or never answer.
#[derive(Clone, Default)]
pub(crate) struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(String, ClientEvent)>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    stalled: Arc<Mutex<HashSet<String>>>,
}

impl RecordingNotifier {
    pub(crate) fn fail_for(&self, user: &str) {
        self.failing
            .lock()
            .expect("failing lock")
            .insert(address(user).endpoint);
    }

    pub(crate) fn stall_for(&self, user: &str) {
        self.stalled
            .lock()
            .expect("stalled lock")
            .insert(address(user).endpoint);
    }

    pub(crate) fn sent(&self) -> Vec<(String, ClientEvent)> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub(crate) fn events_for(&self, user: &str) -> Vec<ClientEvent> {
        let endpoint = address(user).endpoint;
        self.sent()
            .into_iter()
            .filter(|(target, _)| *target == endpoint)
            .map(|(_, event)| event)
            .collect()
    }
}

impl ports::ClientNotifier for RecordingNotifier {
    type Error = TestSendError;
    type Fut<'a>
        = Pin<Box<dyn Future<Output = Result<(), Self::Error>> + Send + 'a>>
    where
        Self: 'a;

    fn deliver<'a>(
        &'a self,
        address: &'a CallbackAddress,
        event: &'a ClientEvent,
    ) -> Self::Fut<'a> {
        let endpoint = address.endpoint.clone();
        if self.stalled.lock().expect("stalled lock").contains(&endpoint) {
            return Box::pin(std::future::pending());
        }
        if self.failing.lock().expect("failing lock").contains(&endpoint) {
            return Box::pin(std::future::ready(Err(TestSendError)));
        }
        self.sent
            .lock()
            .expect("sent lock")
            .push((endpoint, event.clone()));
        Box::pin(std::future::ready(Ok(())))
    }
}
