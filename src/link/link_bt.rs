use std::collections::HashMap;

use crate::link::{LinkDriver, LinkError, LinkEvent, LinkEventReceiver, PeripheralId, RadioState};
use crate::prelude::*;
use crate::protocol::hexdump;
use async_stream::stream;
use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, PeripheralId as RawPeripheralId};
use itertools::Itertools;
use stream_cancel::{StreamExt as _, Tripwire};
use tokio::sync::Mutex;
use tokio::time;

/// HM-10 style UART-over-GATT service.
const SERIAL_SERVICE_UUID: uuid::Uuid = uuid::Uuid::from_u128(0x0000ffe0_0000_1000_8000_00805f9b34fb);
const SERIAL_CHARACTERISTIC_UUID: uuid::Uuid =
    uuid::Uuid::from_u128(0x0000ffe1_0000_1000_8000_00805f9b34fb);

/// The concrete peripheral type to avoid going crazy here managaing an unsized trait.
type Peripheral = <Adapter as Central>::Peripheral;

type KnownPeripherals = Arc<Mutex<HashMap<PeripheralId, RawPeripheralId>>>;
type ConnectedPeripherals = Arc<Mutex<HashMap<PeripheralId, SerialPeripheral>>>;

/// Bluetooth implementation of [`LinkDriver`], running on top of [`btleplug`].
pub struct LinkBT {
    #[allow(unused)]
    manager: Manager,
    adapter: Adapter,
    events: LinkEventReceiver,
    known: KnownPeripherals,
    connected: ConnectedPeripherals,
}

impl LinkBT {
    /// Opens the first Bluetooth adapter and starts listening for its events.
    pub async fn new() -> Result<Self, LinkError> {
        let manager = Manager::new().await?;
        let adapter = first_adapter(&manager).await?;
        trace_packet!("Using adapter {}", adapter.adapter_info().await?);

        let events = LinkEventReceiver::new();
        let known: KnownPeripherals = Default::default();
        let connected: ConnectedPeripherals = Default::default();
        events.forward(Box::pin(central_events(
            adapter.clone(),
            known.clone(),
            connected.clone(),
        )));

        Ok(LinkBT {
            manager,
            adapter,
            events,
            known,
            connected,
        })
    }

    /// Connects in the background, reporting progress as events.
    async fn begin_connect(&self, id: PeripheralId) -> Result<(), LinkError> {
        let raw = self
            .known
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(LinkError::NotFound)?;
        let peripheral = self.adapter.peripheral(&raw).await?;
        let tx = self.events.sender();
        let connected = self.connected.clone();

        tokio::spawn(async move {
            if let Err(e) = peripheral.connect().await {
                let _ = tx.send(LinkEvent::ConnectFailed(id, e.to_string())).await;
                return;
            }
            let _ = tx.send(LinkEvent::Connected(id.clone())).await;

            let serial = match SerialPeripheral::open(peripheral.clone()).await {
                Ok(serial) => serial,
                Err(e) => {
                    // Dropping the link surfaces as a disconnect, which the manager already handles
                    warning!("{} has no usable serial channel: {}", id, e);
                    let _ = peripheral.disconnect().await;
                    return;
                }
            };
            let mut notifications = match serial.clone().notifications(id.clone()).await {
                Ok(notifications) => Box::pin(notifications),
                Err(e) => {
                    warning!("Failed to subscribe to {}: {}", id, e);
                    let _ = peripheral.disconnect().await;
                    return;
                }
            };
            connected.lock().await.insert(id.clone(), serial);
            let _ = tx.send(LinkEvent::Ready(id)).await;

            while let Some(event) = notifications.next().await {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            trace_shutdown!("LinkBT notifications");
        });

        Ok(())
    }

    async fn write_serial(&self, id: PeripheralId, data: Vec<u8>) -> Result<(), LinkError> {
        let serial = self
            .connected
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(LinkError::NotConnected)?;
        serial.write(data).await
    }
}

impl LinkDriver for LinkBT {
    fn read<'a>(&'a self) -> AsyncFuture<'a, Option<LinkEvent>> {
        Box::pin(self.events.recv())
    }

    fn start_scan<'a>(&'a self) -> AsyncFuture<'a, ()> {
        Box::pin(async move { Ok(self.adapter.start_scan(ScanFilter::default()).await?) })
    }

    fn stop_scan<'a>(&'a self) -> AsyncFuture<'a, ()> {
        Box::pin(async move { Ok(self.adapter.stop_scan().await?) })
    }

    fn connect<'a>(&'a self, id: PeripheralId) -> AsyncFuture<'a, ()> {
        Box::pin(self.begin_connect(id))
    }

    fn write<'a>(&'a self, id: PeripheralId, data: Vec<u8>) -> AsyncFuture<'a, ()> {
        Box::pin(self.write_serial(id, data))
    }
}

/// Holds the serial channel of a connected peripheral.
#[derive(Clone)]
struct SerialPeripheral {
    peripheral: Peripheral,
    characteristic: Characteristic,
}

impl SerialPeripheral {
    /// Finds the serial characteristic on a connected [`Peripheral`].
    async fn open(peripheral: Peripheral) -> Result<Self, LinkError> {
        peripheral.discover_services().await?;
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| {
                c.service_uuid == SERIAL_SERVICE_UUID && c.uuid == SERIAL_CHARACTERISTIC_UUID
            })
            .ok_or(LinkError::NotFound)?;
        Ok(SerialPeripheral {
            peripheral,
            characteristic,
        })
    }

    async fn write(&self, data: Vec<u8>) -> Result<(), LinkError> {
        trace_packet!("{{host->device}} {}", hexdump(&data));
        Ok(self
            .peripheral
            .write(&self.characteristic, &data, WriteType::WithoutResponse)
            .await?)
    }

    /// Subscribes to the serial characteristic. The stream ends when the peripheral disconnects.
    async fn notifications(
        self,
        id: PeripheralId,
    ) -> Result<impl Stream<Item = LinkEvent>, LinkError> {
        self.peripheral.subscribe(&self.characteristic).await?;
        let peripheral = self.peripheral.clone();
        let (trigger, tripwire) = Tripwire::new();
        tokio::spawn(async move {
            while peripheral.is_connected().await.unwrap_or_default() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            trace_shutdown!("peripheral.is_connected");
            drop(trigger);
        });

        let uuid = self.characteristic.uuid;
        let n = self
            .peripheral
            .notifications()
            .await?
            .filter(move |m| m.uuid == uuid)
            .map(move |m| LinkEvent::Data(id.clone(), m.value))
            .take_until_if(tripwire);
        Ok(n)
    }
}

fn peripheral_id(raw: &RawPeripheralId) -> PeripheralId {
    PeripheralId(format!("{:?}", raw))
}

fn radio_state(state: CentralState) -> RadioState {
    match state {
        CentralState::PoweredOn => RadioState::PoweredOn,
        CentralState::PoweredOff => RadioState::PoweredOff,
        _ => RadioState::Unknown,
    }
}

async fn first_adapter(manager: &Manager) -> Result<Adapter, LinkError> {
    manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or(LinkError::NotFound)
}

async fn local_name(adapter: &Adapter, raw: &RawPeripheralId) -> Option<String> {
    let peripheral = adapter.peripheral(raw).await.ok()?;
    peripheral.properties().await.ok()??.local_name
}

/// Translates adapter events into [`LinkEvent`]s, remembering every peripheral seen so it can be connected later.
fn central_events(
    adapter: Adapter,
    known: KnownPeripherals,
    connected: ConnectedPeripherals,
) -> impl Stream<Item = LinkEvent> {
    stream! {
        match adapter.events().await {
            Ok(mut events) => {
                while let Some(event) = events.next().await {
                    match event {
                        CentralEvent::DeviceDiscovered(raw) | CentralEvent::DeviceUpdated(raw) => {
                            let name = local_name(&adapter, &raw).await;
                            let id = peripheral_id(&raw);
                            known.lock().await.insert(id.clone(), raw);
                            yield LinkEvent::Discovered { id, name };
                        }
                        CentralEvent::DeviceDisconnected(raw) => {
                            let id = peripheral_id(&raw);
                            connected.lock().await.remove(&id);
                            yield LinkEvent::Disconnected(id, "peripheral disconnected".to_owned());
                        }
                        CentralEvent::StateUpdate(state) => {
                            yield LinkEvent::RadioState(radio_state(state));
                        }
                        _ => {}
                    }
                }
            }
            Err(e) => warning!("Failed to listen for Bluetooth events: {}", e),
        }
        trace_shutdown!("LinkBT central events");
    }
}

/// Scans for a while and returns every named peripheral, sorted by name.
pub async fn scan(duration: Duration) -> Result<Vec<(String, PeripheralId)>, LinkError> {
    let manager = Manager::new().await?;
    let adapter = first_adapter(&manager).await?;
    trace_packet!("Starting scan on {}...", adapter.adapter_info().await?);
    adapter.start_scan(ScanFilter::default()).await?;
    time::sleep(duration).await;

    let mut found = vec![];
    for peripheral in adapter.peripherals().await? {
        trace_packet!("Found peripheral, address = {:?}", peripheral.address());
        if let Some(name) = peripheral.properties().await?.and_then(|p| p.local_name) {
            found.push((name, peripheral_id(&peripheral.id())));
        }
    }
    adapter.stop_scan().await?;

    Ok(found.into_iter().unique().sorted().collect())
}
