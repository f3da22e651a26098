use crate::prelude::*;

/// Transport-level identity of a peripheral.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PeripheralId(pub String);

impl std::fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(s: &str) -> Self {
        PeripheralId(s.to_owned())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RadioState {
    Unknown,
    PoweredOn,
    PoweredOff,
}

/// Everything a transport binding can report. Events arrive in the order the transport produced them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LinkEvent {
    RadioState(RadioState),
    Discovered {
        id: PeripheralId,
        name: Option<String>,
    },
    Connected(PeripheralId),
    ConnectFailed(PeripheralId, String),
    /// The serial channel is open and subscribed.
    Ready(PeripheralId),
    Disconnected(PeripheralId, String),
    Data(PeripheralId, Vec<u8>),
}

/// Async-ish traits for a transport binding. See https://smallcultfollowing.com/babysteps/blog/2019/10/26/async-fn-in-traits-are-hard/
/// for some tips on making async trait functions.
///
/// None of these block on the radio: the outcome of a scan or a connection shows up later as a [`LinkEvent`].
pub trait LinkDriver: Send + Sync {
    /// Read the next event, or `None` if the transport has shut down.
    fn read<'a>(&'a self) -> AsyncFuture<'a, Option<LinkEvent>>;

    fn start_scan<'a>(&'a self) -> AsyncFuture<'a, ()>;

    fn stop_scan<'a>(&'a self) -> AsyncFuture<'a, ()>;

    /// Begin connecting to a previously discovered peripheral.
    fn connect<'a>(&'a self, id: PeripheralId) -> AsyncFuture<'a, ()>;

    /// Write raw bytes to a connected peripheral.
    fn write<'a>(&'a self, id: PeripheralId, data: Vec<u8>) -> AsyncFuture<'a, ()>;
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::link::{LinkError, LinkEventReceiver};
    use std::sync::Mutex;

    #[derive(Clone, Debug, Eq, PartialEq)]
    pub enum DriverCall {
        StartScan,
        StopScan,
        Connect(PeripheralId),
        Write(PeripheralId, Vec<u8>),
    }

    /// A [`LinkDriver`] that records every call and replays events injected by the test.
    pub struct RecordingDriver {
        pub calls: Arc<Mutex<Vec<DriverCall>>>,
        events: LinkEventReceiver,
    }

    /// The test's side of a [`RecordingDriver`].
    #[derive(Clone)]
    pub struct DriverProbe {
        pub calls: Arc<Mutex<Vec<DriverCall>>>,
        tx: tokio::sync::mpsc::Sender<LinkEvent>,
    }

    impl DriverProbe {
        pub async fn inject(&self, event: LinkEvent) {
            self.tx.send(event).await.expect("driver dropped");
        }

        pub fn calls(&self) -> Vec<DriverCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn count(&self, call: &DriverCall) -> usize {
            self.calls().iter().filter(|c| *c == call).count()
        }
    }

    impl RecordingDriver {
        pub fn new() -> (Self, DriverProbe) {
            let events = LinkEventReceiver::new();
            let calls = Arc::new(Mutex::new(vec![]));
            let probe = DriverProbe {
                calls: calls.clone(),
                tx: events.sender(),
            };
            (RecordingDriver { calls, events }, probe)
        }

        fn record(&self, call: DriverCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl LinkDriver for RecordingDriver {
        fn read<'a>(&'a self) -> AsyncFuture<'a, Option<LinkEvent>> {
            Box::pin(self.events.recv())
        }

        fn start_scan<'a>(&'a self) -> AsyncFuture<'a, ()> {
            self.record(DriverCall::StartScan);
            Box::pin(async { Ok(()) })
        }

        fn stop_scan<'a>(&'a self) -> AsyncFuture<'a, ()> {
            self.record(DriverCall::StopScan);
            Box::pin(async { Ok(()) })
        }

        fn connect<'a>(&'a self, id: PeripheralId) -> AsyncFuture<'a, ()> {
            self.record(DriverCall::Connect(id));
            Box::pin(async { Ok(()) })
        }

        fn write<'a>(&'a self, id: PeripheralId, data: Vec<u8>) -> AsyncFuture<'a, ()> {
            self.record(DriverCall::Write(id, data));
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn test_read() -> Result<(), LinkError> {
        let (driver, probe) = RecordingDriver::new();
        probe
            .inject(LinkEvent::RadioState(RadioState::PoweredOn))
            .await;
        probe.inject(LinkEvent::Ready("a".into())).await;
        assert_eq!(
            LinkEvent::RadioState(RadioState::PoweredOn),
            driver.read().await?.expect("expected item")
        );
        assert_eq!(
            LinkEvent::Ready("a".into()),
            driver.read().await?.expect("expected item")
        );
        driver.connect("a".into()).await?;
        assert_eq!(vec![DriverCall::Connect("a".into())], probe.calls());
        Ok(())
    }
}
