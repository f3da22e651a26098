use thiserror::Error;

use crate::auth::AuthGate;
use crate::link::{LinkError, LinkHandle, LinkState};
use crate::prelude::*;
use crate::protocol::{CommandFrame, OrderRequest, ValidationError};

/// The presentation side of the dispenser. Everything the operator should see arrives through here.
pub trait OrderObserver: Send + Sync {
    /// A weight reading, in grams, exactly as the peripheral sent it.
    fn on_weight_update(&self, text: &str);

    fn on_auth_failure(&self);

    fn on_validation_error(&self, message: &str);

    fn on_connection_state(&self, _state: &LinkState) {}

    fn on_order_sent(&self, _order: &OrderRequest) {}
}

/// Where encoded frames go. [`LinkHandle`] is the real one.
pub trait FrameSink: Send + Sync {
    fn send_frame<'a>(&'a self, frame: CommandFrame) -> AsyncFuture<'a, ()>;
}

impl FrameSink for LinkHandle {
    fn send_frame<'a>(&'a self, frame: CommandFrame) -> AsyncFuture<'a, ()> {
        Box::pin(self.send(frame))
    }
}

#[derive(Error, Debug)]
pub enum OrderError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Validates orders, authenticates the operator, and hands the encoded frame to the link.
pub struct OrderDispatcher {
    auth: Box<dyn AuthGate>,
    sink: Box<dyn FrameSink>,
    observer: Arc<dyn OrderObserver>,
}

impl OrderDispatcher {
    pub fn new(
        auth: Box<dyn AuthGate>,
        sink: Box<dyn FrameSink>,
        observer: Arc<dyn OrderObserver>,
    ) -> Self {
        OrderDispatcher {
            auth,
            sink,
            observer,
        }
    }

    /// Relays the link's state and readings to this dispatcher's observer.
    pub fn observe(&self, link: &LinkHandle) -> tokio::task::JoinHandle<Result<(), LinkError>> {
        tokio::spawn(super::monitor(link.clone(), self.observer.clone()))
    }

    /// Checks raw operator input without authenticating or sending, reporting problems to the observer.
    pub fn validate(&self, quantity: &str, selection: i64) -> Result<OrderRequest, OrderError> {
        OrderRequest::parse(quantity, selection).map_err(|e| {
            self.observer.on_validation_error(&e.to_string());
            e.into()
        })
    }

    /// Submits an order from raw operator input.
    ///
    /// `quantity` is the operator's input field: it is cleared once authentication succeeds, and left alone
    /// otherwise so that the value can be resubmitted. Every call authenticates afresh, and nothing is retried.
    pub async fn submit(
        &self,
        quantity: &mut String,
        selection: i64,
    ) -> Result<CommandFrame, OrderError> {
        let order = self.validate(quantity, selection)?;

        if !self.auth.authenticate().await {
            self.observer.on_auth_failure();
            return Err(OrderError::AuthenticationFailed);
        }
        quantity.clear();

        let frame = CommandFrame::encode(&order);
        info!(
            "Ordering {} g of {}",
            order.quantity(),
            order.resource().name()
        );
        if let Err(e) = self.sink.send_frame(frame).await {
            warning!("Failed to send order: {}", e);
            return Err(e.into());
        }
        self.observer.on_order_sent(&order);
        Ok(frame)
    }
}
