use crate::prelude::*;

use crate::link::{LinkError, LinkHandle};
use crate::operations::OrderObserver;

/// Relays link state changes and weight readings to the observer until the link shuts down.
///
/// The handle is only used to subscribe, so monitoring never keeps the link alive by itself.
pub async fn monitor(link: LinkHandle, observer: Arc<dyn OrderObserver>) -> Result<(), LinkError> {
    let mut states = Box::pin(link.state_changes());
    let mut messages = Box::pin(link.messages());
    drop(link);

    loop {
        tokio::select! {
            state = states.next() => match state {
                Some(state) => observer.on_connection_state(&state),
                None => break,
            },
            message = messages.next() => match message {
                Some(message) => observer.on_weight_update(&message.text),
                None => break,
            },
        }
    }

    trace_shutdown!("monitor");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::link::driver_test::RecordingDriver;
    use crate::link::{ConnectionManager, LinkConfig, LinkEvent, LinkState, PeripheralId};
    use crate::operations::dispatcher::test::RecordingObserver;

    async fn wait_for_weights(observer: &RecordingObserver, count: usize) {
        while observer.weights().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn weight_updates_once_per_chunk() -> Result<(), LinkError> {
        let (driver, probe) = RecordingDriver::new();
        let link = ConnectionManager::spawn(Box::new(driver), LinkConfig::default());
        let observer = Arc::new(RecordingObserver::default());
        let handle = tokio::spawn(monitor(link.clone(), observer.clone()));

        link.wait_for_state(|s| *s == LinkState::Scanning).await?;
        let id = PeripheralId::from("team");
        probe
            .inject(LinkEvent::Discovered {
                id: id.clone(),
                name: Some("=Team 306".to_owned()),
            })
            .await;
        probe.inject(LinkEvent::Connected(id.clone())).await;
        probe.inject(LinkEvent::Ready(id.clone())).await;
        link.wait_for_connection().await?;

        probe.inject(LinkEvent::Data(id.clone(), b"42".to_vec())).await;
        wait_for_weights(&observer, 1).await;
        probe.inject(LinkEvent::Data(id.clone(), b"43".to_vec())).await;
        wait_for_weights(&observer, 2).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(vec!["42".to_owned(), "43".to_owned()], observer.weights());

        // Dropping the last handle stops the manager, and with it the monitor
        drop(link);
        handle.await.expect("monitor panicked")?;
        Ok(())
    }
}
