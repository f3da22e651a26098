use crate::prelude::*;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::sync::Mutex;

use crate::link::{LinkError, LinkEvent};

/// Funnels events from any number of producers (central events, connection tasks, notification streams)
/// into one queue that a [`crate::link::LinkDriver`] can await.
pub struct LinkEventReceiver {
    tx: Sender<LinkEvent>,
    rx: Mutex<Receiver<LinkEvent>>,
}

impl Default for LinkEventReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkEventReceiver {
    pub fn new() -> Self {
        let (tx, rx) = tokio::sync::mpsc::channel(100);
        LinkEventReceiver {
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn sender(&self) -> Sender<LinkEvent> {
        self.tx.clone()
    }

    /// Forwards a stream of events into this receiver until the stream ends.
    pub fn forward<T: futures::Stream<Item = LinkEvent> + Unpin + Send + 'static>(
        &self,
        mut stream: T,
    ) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            trace_shutdown!("LinkEventReceiver::forward");
        });
    }

    pub async fn recv(&self) -> Result<Option<LinkEvent>, LinkError> {
        Ok(self.rx.lock().await.recv().await)
    }
}
