//! Transport stream engine
//!
//! [`Stream`] owns a [`Device`] and a background worker thread that pulls
//! frames out of it, emitting decoded items as events. The worker survives
//! device loss: on a failed read it announces the disconnection and retries
//! opening the device until it comes back or the stream is stopped.
//!
//! Events:
//! - `on_receive(item)`: a frame was decoded from the device
//! - `on_connect()`: the first connection attempt succeeded
//! - `on_reconnect()`: the device came back after a disconnection
//! - `on_disconnect()`: the device went away
//!
//! All events fire synchronously on the worker thread, so subscribers must
//! not block.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Device, StreamCodec, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RECONNECT_PERIOD_MS};
use crate::events::EventHook;

/// Lifecycle state of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    /// Trying to open the device (startup or reconnection)
    Connecting,
    /// Device open, frames flowing
    Running,
    /// Worker idle and device closed; resumable
    Paused,
    /// Worker exited; terminal
    Stopped,
}

/// Stream engine timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Delay between reconnection attempts in milliseconds
    pub reconnect_period_ms: u64,
    /// Worker sleep after an empty poll in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_period_ms: DEFAULT_RECONNECT_PERIOD_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

/// Why a worker phase was cut short
enum Interrupt {
    Pause,
    Stop,
}

struct Control {
    state: StreamState,
    pause_requested: bool,
    stop_requested: bool,
}

struct Shared<C: StreamCodec> {
    device: Mutex<Box<dyn Device>>,
    codec: C,
    control: Mutex<Control>,
    control_changed: Condvar,
    config: StreamConfig,
    on_receive: EventHook<C::Item>,
    on_connect: EventHook,
    on_reconnect: EventHook,
    on_disconnect: EventHook,
}

impl<C: StreamCodec> Shared<C> {
    fn set_state(&self, state: StreamState) {
        if let Ok(mut control) = self.control.lock() {
            control.state = state;
            self.control_changed.notify_all();
        }
    }

    fn check_interrupt(&self) -> Result<(), Interrupt> {
        let Ok(control) = self.control.lock() else {
            return Err(Interrupt::Stop);
        };
        if control.stop_requested {
            Err(Interrupt::Stop)
        } else if control.pause_requested {
            Err(Interrupt::Pause)
        } else {
            Ok(())
        }
    }

    /// Close the device and retry opening it until it comes up or the
    /// worker is told to pause or stop.
    fn reconnect_device(&self) -> Result<(), Interrupt> {
        if let Ok(mut device) = self.device.lock() {
            device.close();
        }
        loop {
            self.check_interrupt()?;
            let opened = match self.device.lock() {
                Ok(mut device) => {
                    if device.open() {
                        device.flush();
                        true
                    } else {
                        false
                    }
                }
                Err(_) => return Err(Interrupt::Stop),
            };
            if opened {
                return Ok(());
            }
            debug!("connection attempt failed, retrying");
            thread::sleep(Duration::from_millis(self.config.reconnect_period_ms));
        }
    }

    /// Park in the paused state until resumed. Returns `false` when the
    /// stream was stopped while parked.
    fn park(&self) -> bool {
        let Ok(mut control) = self.control.lock() else {
            return false;
        };
        control.state = StreamState::Paused;
        self.control_changed.notify_all();
        info!("stream paused");

        while control.pause_requested && !control.stop_requested {
            control = match self.control_changed.wait(control) {
                Ok(guard) => guard,
                Err(_) => return false,
            };
        }
        if control.stop_requested {
            return false;
        }
        control.state = StreamState::Connecting;
        self.control_changed.notify_all();
        info!("stream resuming");
        true
    }
}

fn worker_loop<C: StreamCodec>(shared: Arc<Shared<C>>) {
    // Bring the device up, unless the caller handed it over already open.
    let pre_opened = shared.device.lock().map(|d| d.is_open()).unwrap_or(false);
    if pre_opened {
        shared.set_state(StreamState::Running);
        info!("stream running on pre-opened device");
    } else {
        match shared.reconnect_device() {
            Ok(()) => {
                shared.set_state(StreamState::Running);
                shared.on_connect.notify();
                info!("stream connected");
            }
            Err(Interrupt::Pause) => {} // handled at the top of the loop
            Err(Interrupt::Stop) => {
                finish(&shared);
                return;
            }
        }
    }

    loop {
        match shared.check_interrupt() {
            Ok(()) => {}
            Err(Interrupt::Stop) => break,
            Err(Interrupt::Pause) => {
                if !shared.park() {
                    break;
                }
                // Resuming; the device was closed by pause. No connection
                // event is announced for this reopen.
                match shared.reconnect_device() {
                    Ok(()) => shared.set_state(StreamState::Running),
                    Err(Interrupt::Pause) => {}
                    Err(Interrupt::Stop) => break,
                }
                continue;
            }
        }

        let result = match shared.device.lock() {
            Ok(mut device) => shared.codec.decode_stream(device.as_mut()),
            Err(_) => break,
        };

        match result {
            Ok(Some(item)) => {
                debug!("item received");
                shared.on_receive.emit(&item);
            }
            Ok(None) => {
                thread::sleep(Duration::from_millis(shared.config.poll_interval_ms));
            }
            Err(e) => {
                warn!(error = %e, "device lost");
                shared.set_state(StreamState::Connecting);
                shared.on_disconnect.notify();
                match shared.reconnect_device() {
                    Ok(()) => {
                        shared.set_state(StreamState::Running);
                        shared.on_reconnect.notify();
                        info!("stream reconnected");
                    }
                    Err(Interrupt::Pause) => {} // park at the top of the loop
                    Err(Interrupt::Stop) => break,
                }
            }
        }
    }

    finish(&shared);
}

fn finish<C: StreamCodec>(shared: &Shared<C>) {
    if let Ok(mut device) = shared.device.lock() {
        device.close();
    }
    shared.set_state(StreamState::Stopped);
    info!("stream stopped");
}

/// Asynchronous framed transport over a [`Device`].
///
/// The constructor spawns the background worker immediately; the stream is
/// connecting or running as soon as it exists. Dropping the stream stops it.
pub struct Stream<C: StreamCodec> {
    shared: Arc<Shared<C>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<C: StreamCodec + 'static> Stream<C> {
    /// Create a stream with default timing and start its worker
    pub fn new(device: Box<dyn Device>, codec: C) -> Self {
        Self::with_config(device, codec, StreamConfig::default())
    }

    /// Create a stream with explicit timing and start its worker
    pub fn with_config(device: Box<dyn Device>, codec: C, config: StreamConfig) -> Self {
        let shared = Arc::new(Shared {
            device: Mutex::new(device),
            codec,
            control: Mutex::new(Control {
                state: StreamState::Connecting,
                pause_requested: false,
                stop_requested: false,
            }),
            control_changed: Condvar::new(),
            config,
            on_receive: EventHook::new(),
            on_connect: EventHook::new(),
            on_reconnect: EventHook::new(),
            on_disconnect: EventHook::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || worker_loop(worker_shared));

        Self {
            shared,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Encode and write an item to the device.
    ///
    /// Only a [`Running`](StreamState::Running) stream writes; in any other
    /// state the item is silently dropped.
    pub fn send(&self, item: &C::Item) {
        if self.state() != StreamState::Running {
            debug!("send dropped: stream not running");
            return;
        }
        let frame = self.shared.codec.encode(item);
        if let Ok(mut device) = self.shared.device.lock() {
            let written = device.write(&frame);
            if written < frame.len() {
                warn!(written, expected = frame.len(), "frame write came up short");
            } else {
                debug!(bytes = written, "frame sent");
            }
        }
    }

    /// Suspend the worker and close the device.
    ///
    /// Blocks until the worker has acknowledged the pause, so the device is
    /// guaranteed untouched after this returns. No-op when already paused
    /// or stopped.
    pub fn pause(&self) {
        {
            let Ok(mut control) = self.shared.control.lock() else {
                return;
            };
            if control.stop_requested
                || matches!(control.state, StreamState::Paused | StreamState::Stopped)
            {
                return;
            }
            control.pause_requested = true;
            self.shared.control_changed.notify_all();

            while !matches!(control.state, StreamState::Paused | StreamState::Stopped) {
                control = match self.shared.control_changed.wait(control) {
                    Ok(guard) => guard,
                    Err(_) => return,
                };
            }
            if control.state == StreamState::Stopped {
                return;
            }
        }
        // Worker is parked; the device can be closed from this thread.
        if let Ok(mut device) = self.shared.device.lock() {
            device.close();
        }
        debug!("device closed for pause");
    }

    /// Let a paused worker reopen the device and continue.
    ///
    /// Returns immediately; the worker performs the reopen (retrying on
    /// failure like a reconnection). No-op unless paused.
    pub fn resume(&self) {
        if let Ok(mut control) = self.shared.control.lock() {
            if control.pause_requested {
                control.pause_requested = false;
                self.shared.control_changed.notify_all();
            }
        }
    }

    /// Stop the stream permanently.
    ///
    /// Blocks until the worker thread has exited and the device is closed.
    /// Safe to call from any thread and more than once.
    pub fn stop(&self) {
        if let Ok(mut control) = self.shared.control.lock() {
            if !control.stop_requested {
                control.stop_requested = true;
                self.shared.control_changed.notify_all();
            }
        }
        self.join();
    }

    /// Block until the worker thread has exited.
    pub fn join(&self) {
        let handle = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(handle) = handle {
            let _ = handle.join();
        } else if let Ok(mut control) = self.shared.control.lock() {
            // Someone else owns the join; wait for the terminal state.
            while control.state != StreamState::Stopped {
                control = match self.shared.control_changed.wait(control) {
                    Ok(guard) => guard,
                    Err(_) => return,
                };
            }
        }
    }

    /// Replace the device, preserving the current one if the replacement
    /// carries no port identity.
    pub fn set_device(&self, device: Box<dyn Device>) {
        self.pause();
        if device.port().is_some() {
            if let Ok(mut current) = self.shared.device.lock() {
                *current = device;
            }
        } else {
            warn!("replacement device has no port identity, keeping current device");
        }
        self.resume();
    }

    /// Current lifecycle state
    pub fn state(&self) -> StreamState {
        self.shared
            .control
            .lock()
            .map(|c| c.state)
            .unwrap_or(StreamState::Stopped)
    }

    /// Whether the worker is still around (i.e. not stopped)
    pub fn is_alive(&self) -> bool {
        self.state() != StreamState::Stopped
    }

    /// Codec used to frame items
    pub fn codec(&self) -> &C {
        &self.shared.codec
    }

    /// Hook fired for every decoded item
    pub fn on_receive(&self) -> &EventHook<C::Item> {
        &self.shared.on_receive
    }

    /// Hook fired once the first connection succeeds
    pub fn on_connect(&self) -> &EventHook {
        &self.shared.on_connect
    }

    /// Hook fired when the device comes back after a disconnection
    pub fn on_reconnect(&self) -> &EventHook {
        &self.shared.on_reconnect
    }

    /// Hook fired when the device goes away
    pub fn on_disconnect(&self) -> &EventHook {
        &self.shared.on_disconnect
    }
}

impl<C: StreamCodec> Drop for Stream<C> {
    fn drop(&mut self) {
        if let Ok(mut control) = self.shared.control.lock() {
            control.stop_requested = true;
            self.shared.control_changed.notify_all();
        }
        if let Ok(mut worker) = self.worker.lock() {
            if let Some(handle) = worker.take() {
                let _ = handle.join();
            }
        }
    }
}
