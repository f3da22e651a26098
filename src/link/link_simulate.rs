use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use async_stream::stream;
use tokio::sync::Mutex;

use crate::link::{LinkDriver, LinkError, LinkEvent, LinkEventReceiver, PeripheralId, RadioState};
use crate::prelude::*;
use crate::protocol::OPCODE_DISPENSE;

/// Peripherals the simulator advertises, as `(id, name)`.
pub const SIMULATED_DEVICES: [(&str, &str); 2] =
    [("sim-00:01", "Other Device"), ("sim-30:06", "=Team 306")];

const DELAY: Duration = Duration::from_millis(250);
/// Grams added per simulated reading.
const STEP: u8 = 5;

/// A fake dispenser that answers orders with a rising weight.
struct LinkSimulate {
    events: LinkEventReceiver,
    scanning: Arc<AtomicBool>,
    connected: Arc<Mutex<HashSet<PeripheralId>>>,
}

impl LinkDriver for LinkSimulate {
    fn read<'a>(&'a self) -> AsyncFuture<'a, Option<LinkEvent>> {
        Box::pin(self.events.recv())
    }

    fn start_scan<'a>(&'a self) -> AsyncFuture<'a, ()> {
        self.scanning.store(true, Ordering::Relaxed);
        self.events
            .forward(Box::pin(advertisements(self.scanning.clone())));
        Box::pin(async { Ok(()) })
    }

    fn stop_scan<'a>(&'a self) -> AsyncFuture<'a, ()> {
        self.scanning.store(false, Ordering::Relaxed);
        Box::pin(async { Ok(()) })
    }

    fn connect<'a>(&'a self, id: PeripheralId) -> AsyncFuture<'a, ()> {
        Box::pin(async move {
            let known = SIMULATED_DEVICES.iter().any(|(sim, _)| *sim == id.0);
            if known {
                self.connected.lock().await.insert(id.clone());
            }
            self.events.forward(Box::pin(stream! {
                tokio::time::sleep(DELAY).await;
                if known {
                    yield LinkEvent::Connected(id.clone());
                    tokio::time::sleep(DELAY).await;
                    yield LinkEvent::Ready(id);
                } else {
                    yield LinkEvent::ConnectFailed(id, "unknown peripheral".to_owned());
                }
            }));
            Ok(())
        })
    }

    fn write<'a>(&'a self, id: PeripheralId, data: Vec<u8>) -> AsyncFuture<'a, ()> {
        Box::pin(async move {
            if !self.connected.lock().await.contains(&id) {
                return Err(LinkError::NotConnected);
            }
            match data.as_slice() {
                &[OPCODE_DISPENSE, resource, quantity] => {
                    trace_packet!("Simulating {} g of resource {}", quantity, resource);
                    self.events.forward(Box::pin(readings(id, quantity)));
                }
                _ => trace_packet!("Simulator ignoring {:?}", String::from_utf8_lossy(&data)),
            }
            Ok(())
        })
    }
}

/// Advertises each simulated device in turn while the scan is running.
fn advertisements(scanning: Arc<AtomicBool>) -> impl Stream<Item = LinkEvent> {
    stream! {
        for (id, name) in SIMULATED_DEVICES {
            tokio::time::sleep(DELAY).await;
            if !scanning.load(Ordering::Relaxed) {
                break;
            }
            yield LinkEvent::Discovered { id: id.into(), name: Some(name.to_owned()) };
        }
    }
}

/// Weight readings for a dispense, ending exactly at the ordered quantity.
fn readings(id: PeripheralId, quantity: u8) -> impl Stream<Item = LinkEvent> {
    stream! {
        let mut weight: u8 = 0;
        loop {
            tokio::time::sleep(DELAY).await;
            yield LinkEvent::Data(id.clone(), weight.to_string().into_bytes());
            if weight == quantity {
                break;
            }
            weight = weight.saturating_add(STEP).min(quantity);
        }
    }
}

pub async fn get_link_simulator() -> Result<impl LinkDriver, LinkError> {
    let events = LinkEventReceiver::new();
    events
        .sender()
        .send(LinkEvent::RadioState(RadioState::PoweredOn))
        .await
        .map_err(|_| LinkError::ChannelClosed)?;
    Ok(LinkSimulate {
        events,
        scanning: Arc::new(AtomicBool::new(false)),
        connected: Arc::new(Mutex::new(HashSet::new())),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::link::{ConnectionManager, LinkConfig};
    use crate::protocol::{CommandFrame, OrderRequest, ResourceType};

    #[tokio::test(start_paused = true)]
    async fn simulated_readings() {
        let readings: Vec<_> = Box::pin(readings("x".into(), 12)).collect().await;
        let expected: Vec<_> = ["0", "5", "10", "12"]
            .iter()
            .map(|w| LinkEvent::Data("x".into(), w.as_bytes().to_vec()))
            .collect();
        assert_eq!(expected, readings);
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_order() -> Result<(), LinkError> {
        let driver = get_link_simulator().await?;
        let link = ConnectionManager::spawn(Box::new(driver), LinkConfig::default());
        let id = link.wait_for_connection().await?;
        assert_eq!(PeripheralId::from("sim-30:06"), id);

        let mut messages = Box::pin(link.messages());
        let order = OrderRequest::new(ResourceType::Barley, 20).unwrap();
        link.send(CommandFrame::encode(&order)).await?;
        let mut last = None;
        while let Some(message) = messages.next().await {
            let done = message.text == "20";
            last = Some(message);
            if done {
                break;
            }
        }
        assert_eq!("20 g", last.expect("no readings").as_weight());
        Ok(())
    }
}
