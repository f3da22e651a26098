use crate::prelude::*;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};

use crate::link::{
    LinkDriver, LinkError, LinkEvent, PeripheralId, RadioState, DEFAULT_DEVICE_NAME,
    DEFAULT_GREETING,
};
use crate::protocol::{hexdump, CommandFrame, InboundMessage};

/// Settings for a [`ConnectionManager`].
#[derive(Clone, Debug)]
pub struct LinkConfig {
    /// Only a peripheral advertising exactly this name is connected to.
    pub device_name: String,
    /// Delay between spawning the manager and the first scan.
    pub startup_delay: Duration,
    /// Sent once per connection, as soon as the serial channel is ready.
    pub greeting: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            device_name: DEFAULT_DEVICE_NAME.to_owned(),
            startup_delay: Duration::from_secs(2),
            greeting: DEFAULT_GREETING.to_owned(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DisconnectCause {
    /// The connection attempt itself failed. Nothing retries from here.
    ConnectFailed(String),
    /// An established link dropped.
    Dropped(String),
}

impl std::fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectCause::ConnectFailed(s) => write!(f, "connection failed: {}", s),
            DisconnectCause::Dropped(s) => write!(f, "connection dropped: {}", s),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LinkState {
    Idle,
    Scanning,
    Connecting(PeripheralId),
    ReadyHandshakePending(PeripheralId),
    Connected(PeripheralId),
    Disconnected(PeripheralId, DisconnectCause),
}

impl LinkState {
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected(..))
    }

    /// The peripheral this state refers to, if any.
    pub fn peripheral(&self) -> Option<&PeripheralId> {
        match self {
            LinkState::Idle | LinkState::Scanning => None,
            LinkState::Connecting(id)
            | LinkState::ReadyHandshakePending(id)
            | LinkState::Connected(id)
            | LinkState::Disconnected(id, _) => Some(id),
        }
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Idle => f.write_str("Idle"),
            LinkState::Scanning => f.write_str("Scanning..."),
            LinkState::Connecting(id) => write!(f, "Connecting to {}...", id),
            LinkState::ReadyHandshakePending(id) => write!(f, "Opening channel to {}...", id),
            LinkState::Connected(id) => write!(f, "Connected to {}", id),
            LinkState::Disconnected(id, cause) => write!(f, "Disconnected from {} ({})", id, cause),
        }
    }
}

/// Readings a subscriber may fall behind by before it starts losing them.
const MESSAGE_BUFFER: usize = 128;

enum LinkCommand {
    Send(CommandFrame, oneshot::Sender<Result<(), LinkError>>),
}

/// Owns the link lifecycle: scanning, connecting, the readiness handshake, and reconnection.
///
/// The manager runs as a single task that exclusively owns the driver and the current [`LinkState`]. Every
/// transport event and every command from a [`LinkHandle`] is processed on that task, one at a time.
pub struct ConnectionManager {
    driver: Box<dyn LinkDriver>,
    config: LinkConfig,
    state: LinkState,
    radio: RadioState,
    started: bool,
    state_tx: watch::Sender<LinkState>,
    message_tx: Arc<broadcast::Sender<InboundMessage>>,
}

impl ConnectionManager {
    /// Starts the manager task and returns the handle to it. The task stops once every handle is dropped.
    pub fn spawn(driver: Box<dyn LinkDriver>, config: LinkConfig) -> LinkHandle {
        let (state_tx, state_rx) = watch::channel(LinkState::Idle);
        let (message_tx, _) = broadcast::channel(MESSAGE_BUFFER);
        let message_tx = Arc::new(message_tx);
        let (command_tx, command_rx) = mpsc::channel(16);

        let manager = ConnectionManager {
            driver,
            config,
            state: LinkState::Idle,
            radio: RadioState::Unknown,
            started: false,
            state_tx,
            message_tx: message_tx.clone(),
        };
        tokio::spawn(manager.run(command_rx));

        LinkHandle {
            commands: command_tx,
            state: state_rx,
            messages: message_tx,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<LinkCommand>) -> Result<(), LinkError> {
        let startup = tokio::time::sleep(self.config.startup_delay);
        tokio::pin!(startup);

        loop {
            tokio::select! {
                _ = &mut startup, if !self.started => {
                    self.started = true;
                    self.start_scan().await;
                }
                event = self.driver.read() => {
                    match event? {
                        Some(event) => self.handle_event(event).await,
                        None => break,
                    }
                }
                command = commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => break,
                    }
                }
            }
        }

        trace_shutdown!("ConnectionManager");
        Ok(())
    }

    fn set_state(&mut self, state: LinkState) {
        trace_packet!("Link state: {:?} -> {:?}", self.state, state);
        self.state = state.clone();
        let _ = self.state_tx.send(state);
    }

    fn radio_available(&self) -> bool {
        self.radio != RadioState::PoweredOff
    }

    async fn start_scan(&mut self) {
        if !self.radio_available() {
            warning!("Bluetooth is not powered on, waiting before scanning");
            return;
        }
        match self.driver.start_scan().await {
            Ok(()) => self.set_state(LinkState::Scanning),
            Err(e) => warning!("Failed to start scanning: {}", e),
        }
    }

    /// Only called from `Scanning` or `Disconnected`, so at most one attempt is ever in flight.
    async fn connect(&mut self, id: PeripheralId) {
        if !self.radio_available() {
            warning!("Bluetooth is not powered on, deferring connection to {}", id);
            return;
        }
        self.set_state(LinkState::Connecting(id.clone()));
        if let Err(e) = self.driver.connect(id.clone()).await {
            warning!("Connection to {} failed: {}", id, e);
            self.set_state(LinkState::Disconnected(
                id,
                DisconnectCause::ConnectFailed(e.to_string()),
            ));
        }
    }

    async fn handle_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::RadioState(radio) => self.handle_radio(radio).await,
            LinkEvent::Discovered { id, name } => {
                // A failed attempt leaves nothing in flight, so a fresh advertisement may try again
                let accepting = matches!(
                    self.state,
                    LinkState::Scanning
                        | LinkState::Disconnected(_, DisconnectCause::ConnectFailed(_))
                );
                if !accepting {
                    return;
                }
                if name.as_deref() != Some(self.config.device_name.as_str()) {
                    trace_packet!("Ignoring peripheral {} ({:?})", id, name);
                    return;
                }
                info!("Found '{}' ({}), connecting", self.config.device_name, id);
                // Don't scan and connect at the same time
                if let Err(e) = self.driver.stop_scan().await {
                    warning!("Failed to stop scanning: {}", e);
                }
                self.connect(id).await;
            }
            LinkEvent::Connected(id) => {
                if self.state == LinkState::Connecting(id.clone()) {
                    self.set_state(LinkState::ReadyHandshakePending(id));
                }
            }
            LinkEvent::ConnectFailed(id, cause) => {
                if self.state == LinkState::Connecting(id.clone()) {
                    warning!("Connection to {} failed: {}", id, cause);
                    self.set_state(LinkState::Disconnected(
                        id,
                        DisconnectCause::ConnectFailed(cause),
                    ));
                }
            }
            LinkEvent::Ready(id) => {
                if self.state == LinkState::ReadyHandshakePending(id.clone()) {
                    self.set_state(LinkState::Connected(id.clone()));
                    let greeting = self.config.greeting.clone().into_bytes();
                    trace_packet!("{{host->device}} {}", hexdump(&greeting));
                    if let Err(e) = self.driver.write(id, greeting).await {
                        warning!("Failed to send greeting: {}", e);
                    }
                }
            }
            LinkEvent::Disconnected(id, cause) => {
                let is_current = matches!(
                    &self.state,
                    LinkState::Connected(current) | LinkState::ReadyHandshakePending(current)
                        if *current == id
                );
                if !is_current {
                    trace_packet!("Ignoring disconnect from {} in {:?}", id, self.state);
                    return;
                }
                warning!("Lost connection to {}: {}, reconnecting", id, cause);
                self.set_state(LinkState::Disconnected(
                    id.clone(),
                    DisconnectCause::Dropped(cause),
                ));
                // Straight back to the same peripheral, no rescan
                self.connect(id).await;
            }
            LinkEvent::Data(id, bytes) => {
                trace_packet!("{{device->host}} {}", hexdump(&bytes));
                if self.state == LinkState::Connected(id) {
                    let _ = self.message_tx.send(InboundMessage::decode(&bytes));
                }
            }
        }
    }

    async fn handle_radio(&mut self, radio: RadioState) {
        let was_off = !self.radio_available();
        self.radio = radio;
        if radio == RadioState::PoweredOff {
            warning!("Bluetooth was turned off");
            return;
        }
        if !was_off {
            return;
        }

        // Pick up whatever was suppressed while the radio was off
        match self.state.clone() {
            LinkState::Idle if self.started => self.start_scan().await,
            LinkState::Scanning => self.start_scan().await,
            LinkState::Disconnected(id, DisconnectCause::Dropped(_)) => self.connect(id).await,
            _ => {}
        }
    }

    async fn handle_command(&mut self, command: LinkCommand) {
        match command {
            LinkCommand::Send(frame, reply) => {
                let result = if !self.radio_available() {
                    warning!("Dropping {:?}, Bluetooth is off", frame);
                    Err(LinkError::RadioUnavailable)
                } else if let LinkState::Connected(id) = &self.state {
                    trace_packet!("{{host->device}} {:?}", frame);
                    self.driver.write(id.clone(), frame.to_vec()).await
                } else {
                    warning!("Dropping {:?}, link is {}", frame, self.state);
                    Err(LinkError::NotConnected)
                };
                let _ = reply.send(result);
            }
        }
    }
}

/// Handle to a running [`ConnectionManager`]. When all clones are dropped, the manager shuts down.
#[derive(Clone)]
pub struct LinkHandle {
    commands: mpsc::Sender<LinkCommand>,
    state: watch::Receiver<LinkState>,
    messages: Arc<broadcast::Sender<InboundMessage>>,
}

impl LinkHandle {
    /// Sends a frame to the connected peripheral. Frames sent while not connected are rejected with
    /// [`LinkError::NotConnected`] (or [`LinkError::RadioUnavailable`] while Bluetooth is off), never queued.
    pub async fn send(&self, frame: CommandFrame) -> Result<(), LinkError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(LinkCommand::Send(frame, tx))
            .await
            .map_err(|_| LinkError::ChannelClosed)?;
        rx.await.map_err(|_| LinkError::ChannelClosed)?
    }

    pub fn state(&self) -> LinkState {
        self.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    /// Blocks until the link state matches the predicate.
    pub async fn wait_for_state<F: Fn(&LinkState) -> bool>(
        &self,
        predicate: F,
    ) -> Result<LinkState, LinkError> {
        let mut rx = self.state.clone();
        loop {
            {
                let state = rx.borrow();
                if predicate(&*state) {
                    return Ok(state.clone());
                }
            }
            rx.changed().await.map_err(|_| LinkError::ChannelClosed)?;
        }
    }

    /// Blocks until a peripheral is connected and its channel is ready.
    pub async fn wait_for_connection(&self) -> Result<PeripheralId, LinkError> {
        let state = self.wait_for_state(LinkState::is_connected).await?;
        state.peripheral().cloned().ok_or(LinkError::Unknown)
    }

    /// Messages received from the peripheral from this point on.
    pub fn messages(&self) -> impl Stream<Item = InboundMessage> {
        BroadcastStream::new(self.messages.subscribe()).filter_map(received)
    }

    /// The current state, followed by every change.
    pub fn state_changes(&self) -> impl Stream<Item = LinkState> {
        WatchStream::new(self.state.clone())
    }
}

/// Subscribers that fall behind lose the oldest readings; make that visible.
fn received(
    message: Result<InboundMessage, BroadcastStreamRecvError>,
) -> Option<InboundMessage> {
    match message {
        Ok(message) => Some(message),
        Err(BroadcastStreamRecvError::Lagged(n)) => {
            warning!("Dropped {} weight readings", n);
            None
        }
    }
}
