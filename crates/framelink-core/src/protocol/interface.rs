//! Command interface over a stream
//!
//! [`Interface`] layers a blocking request/response workflow on top of
//! [`Stream`]: `transmit` writes an item and optionally waits for the reply
//! a caller-supplied predicate selects, bounded by a timeout. Everything
//! else (events, lifecycle) delegates to the underlying stream.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use super::{Device, ProtocolError, Stream, StreamCodec, StreamState, DEFAULT_RESPONSE_TIMEOUT_MS};
use crate::events::EventHook;

/// Predicate selecting the response an in-flight transmit is waiting for
pub type ResponseCheck<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// Request/response front end for a [`Stream`].
pub struct Interface<C: StreamCodec> {
    stream: Stream<C>,
    timeout: Mutex<Duration>,
}

impl<C: StreamCodec + 'static> Interface<C> {
    /// Build a stream over `device` and wrap it
    pub fn new(device: Box<dyn Device>, codec: C) -> Self {
        Self::with_stream(Stream::new(device, codec))
    }

    /// Wrap an existing stream
    pub fn with_stream(stream: Stream<C>) -> Self {
        Self {
            stream,
            timeout: Mutex::new(Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS)),
        }
    }

    /// Send an item, optionally waiting for a matching response.
    ///
    /// Without `logic` this is a plain send and returns `None` immediately.
    /// With `logic`, the call blocks until an incoming item satisfies the
    /// predicate or the timeout expires; `timeout` of `None` uses the
    /// interface default. The predicate stops observing traffic before this
    /// method returns, whatever the outcome.
    pub fn transmit(
        &self,
        item: &C::Item,
        logic: Option<ResponseCheck<C::Item>>,
        timeout: Option<Duration>,
    ) -> Option<C::Item> {
        let Some(logic) = logic else {
            self.stream.send(item);
            return None;
        };
        let timeout = timeout.unwrap_or_else(|| self.timeout());

        let slot: Arc<(Mutex<Option<C::Item>>, Condvar)> =
            Arc::new((Mutex::new(None), Condvar::new()));
        let waiter = Arc::clone(&slot);
        let subscription = self.stream.on_receive().subscribe(move |response| {
            if logic(response) {
                let (result, ready) = &*waiter;
                if let Ok(mut result) = result.lock() {
                    // Only the first match counts.
                    if result.is_none() {
                        *result = Some(response.clone());
                        ready.notify_all();
                    }
                }
            }
        });

        self.stream.send(item);

        let deadline = Instant::now() + timeout;
        let (result, ready) = &*slot;
        let response = result.lock().ok().and_then(|mut guard| loop {
            if guard.is_some() {
                return guard.take();
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            match ready.wait_timeout(guard, deadline - now) {
                Ok((next, _)) => guard = next,
                Err(_) => return None,
            }
        });

        self.stream.on_receive().unsubscribe(subscription);
        if response.is_none() {
            debug!("transmit timed out waiting for response");
        }
        response
    }

    /// Send an item without waiting for any response
    pub fn send(&self, item: &C::Item) {
        self.stream.send(item);
    }

    /// Default response timeout used when `transmit` is not given one
    pub fn timeout(&self) -> Duration {
        self.timeout
            .lock()
            .map(|t| *t)
            .unwrap_or(Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS))
    }

    /// Change the default response timeout. Zero is rejected.
    pub fn set_timeout(&self, timeout: Duration) -> Result<(), ProtocolError> {
        if timeout.is_zero() {
            return Err(ProtocolError::InvalidTimeout);
        }
        if let Ok(mut current) = self.timeout.lock() {
            *current = timeout;
        }
        Ok(())
    }

    /// Underlying stream
    pub fn stream(&self) -> &Stream<C> {
        &self.stream
    }

    /// Current lifecycle state of the underlying stream
    pub fn state(&self) -> StreamState {
        self.stream.state()
    }

    /// Hook fired for every decoded item
    pub fn on_receive(&self) -> &EventHook<C::Item> {
        self.stream.on_receive()
    }

    /// Hook fired once the first connection succeeds
    pub fn on_connect(&self) -> &EventHook {
        self.stream.on_connect()
    }

    /// Hook fired when the device comes back after a disconnection
    pub fn on_reconnect(&self) -> &EventHook {
        self.stream.on_reconnect()
    }

    /// Hook fired when the device goes away
    pub fn on_disconnect(&self) -> &EventHook {
        self.stream.on_disconnect()
    }

    /// Stop the underlying stream and wait for its worker to exit
    pub fn stop(&self) {
        self.stream.stop();
    }

    /// Block until the underlying stream's worker has exited
    pub fn join(&self) {
        self.stream.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CobsCodec, LoopDevice, Packet};
    use std::thread;

    fn loop_interface() -> Interface<CobsCodec<Packet>> {
        let device = LoopDevice::with_timeout(Duration::from_millis(10));
        Interface::new(Box::new(device), CobsCodec::new())
    }

    fn wait_running(interface: &Interface<CobsCodec<Packet>>) {
        let deadline = Instant::now() + Duration::from_secs(1);
        while interface.state() != StreamState::Running && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(interface.state(), StreamState::Running);
    }

    #[test]
    fn test_transmit_without_logic_returns_immediately() {
        let interface = loop_interface();
        wait_running(&interface);

        let started = Instant::now();
        let response = interface.transmit(&Packet::new(0x01, 0x02, vec![0x10]), None, None);
        assert!(response.is_none());
        assert!(started.elapsed() < Duration::from_millis(100));
        interface.stop();
    }

    #[test]
    fn test_transmit_matches_echoed_response() {
        let interface = loop_interface();
        wait_running(&interface);

        let packet = Packet::new(0x05, 0x06, vec![0xAA, 0x00, 0xBB]);
        let expected = packet.clone();
        let response = interface.transmit(
            &packet,
            Some(Box::new(move |item: &Packet| *item == expected)),
            Some(Duration::from_secs(1)),
        );
        assert_eq!(response, Some(packet));
        interface.stop();
    }

    #[test]
    fn test_transmit_times_out_and_unsubscribes() {
        let interface = loop_interface();
        wait_running(&interface);

        let started = Instant::now();
        let response = interface.transmit(
            &Packet::new(0x01, 0x02, vec![0x33]),
            Some(Box::new(|_: &Packet| false)),
            Some(Duration::from_millis(100)),
        );
        let elapsed = started.elapsed();

        assert!(response.is_none());
        assert!(elapsed >= Duration::from_millis(90));
        assert!(elapsed < Duration::from_secs(1));
        // The predicate was detached on the way out.
        assert!(interface.on_receive().is_empty());
        interface.stop();
    }

    #[test]
    fn test_transmit_returns_first_match_only() {
        let interface = loop_interface();
        wait_running(&interface);

        // Both copies echo back; the waiter must settle on one response.
        let packet = Packet::new(0x07, 0x08, vec![0x01]);
        interface.send(&packet);
        let response = interface.transmit(
            &packet,
            Some(Box::new(|item: &Packet| item.source == 0x07)),
            Some(Duration::from_secs(1)),
        );
        assert_eq!(response, Some(packet));
        interface.stop();
    }

    #[test]
    fn test_concurrent_transmits_resolve_independently() {
        let interface = loop_interface();
        wait_running(&interface);

        let first = Packet::new(0x01, 0x10, vec![0xA1]);
        let second = Packet::new(0x02, 0x20, vec![0xB2]);

        // Each waiter holds its own subscription, so the echoes route to
        // the transmit that asked for them.
        let (a, b) = thread::scope(|s| {
            let a = s.spawn(|| {
                interface.transmit(
                    &first,
                    Some(Box::new(|item: &Packet| item.source == 0x01)),
                    Some(Duration::from_secs(1)),
                )
            });
            let b = s.spawn(|| {
                interface.transmit(
                    &second,
                    Some(Box::new(|item: &Packet| item.source == 0x02)),
                    Some(Duration::from_secs(1)),
                )
            });
            (
                a.join().expect("Should finish"),
                b.join().expect("Should finish"),
            )
        });

        assert_eq!(a, Some(first));
        assert_eq!(b, Some(second));
        interface.stop();
    }

    #[test]
    fn test_set_timeout_rejects_zero() {
        let interface = loop_interface();
        assert!(matches!(
            interface.set_timeout(Duration::ZERO),
            Err(ProtocolError::InvalidTimeout)
        ));

        interface
            .set_timeout(Duration::from_millis(250))
            .expect("Should accept a positive timeout");
        assert_eq!(interface.timeout(), Duration::from_millis(250));
        interface.stop();
    }
}
