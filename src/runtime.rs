use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent};
use log::{debug, warn};

/// Rehearsal clock period.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Identifies the clock a tick came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClockId(u64);

impl ClockId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Unified event type consumed by the app runner
#[derive(Clone, Debug)]
pub enum RehearsalEvent {
    Key(KeyEvent),
    Resize,
    Tick(ClockId),
}

/// Source of input events. Every producer (keyboard, clock) feeds the same
/// queue so events are handled in arrival order.
pub trait EventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<RehearsalEvent, RecvTimeoutError>;

    /// Handle for additional producers such as a [`ClockTask`].
    fn sender(&self) -> Sender<RehearsalEvent>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    tx: Sender<RehearsalEvent>,
    rx: Receiver<RehearsalEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        let key_tx = tx.clone();

        thread::spawn(move || loop {
            let forwarded = match event::read() {
                Ok(CtEvent::Key(key)) => key_tx.send(RehearsalEvent::Key(key)),
                Ok(CtEvent::Resize(_, _)) => key_tx.send(RehearsalEvent::Resize),
                Ok(_) => Ok(()),
                Err(err) => {
                    warn!("terminal input closed: {err}");
                    break;
                }
            };
            if forwarded.is_err() {
                break;
            }
        });

        Self { tx, rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<RehearsalEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    fn sender(&self) -> Sender<RehearsalEvent> {
        self.tx.clone()
    }
}

/// Test event source fed through the returned sender
pub struct TestEventSource {
    tx: Sender<RehearsalEvent>,
    rx: Receiver<RehearsalEvent>,
}

impl TestEventSource {
    pub fn new() -> (Self, Sender<RehearsalEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: tx.clone(), rx }, tx)
    }
}

impl EventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<RehearsalEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    fn sender(&self) -> Sender<RehearsalEvent> {
        self.tx.clone()
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for FixedTicker {
    fn default() -> Self {
        Self::new(TICK_INTERVAL)
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// A running periodic clock. Sends `Tick(id)` every interval until dropped;
/// dropping cancels the thread and waits for it, so no tick is produced after
/// the guard is gone.
pub struct ClockTask {
    id: ClockId,
    cancel: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl ClockTask {
    pub fn spawn(ticker: &dyn Ticker, sink: Sender<RehearsalEvent>) -> Self {
        let id = ClockId::next();
        let interval = ticker.interval();
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();

        let worker = thread::Builder::new()
            .name(format!("slideflow-clock-{}", id.0))
            .spawn(move || loop {
                match cancel_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if sink.send(RehearsalEvent::Tick(id)).is_err() {
                            break;
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!("failed to spawn rehearsal clock: {err}");
                None
            }
        };
        debug!("clock {} started", id.0);

        Self {
            id,
            cancel: Some(cancel_tx),
            worker,
        }
    }

    pub fn id(&self) -> ClockId {
        self.id
    }
}

impl Drop for ClockTask {
    fn drop(&mut self) {
        // closing the channel wakes the worker immediately
        self.cancel.take();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("clock {} panicked", self.id.0);
            }
        }
        debug!("clock {} cancelled", self.id.0);
    }
}

/// Runner that hands the app one event at a time
pub struct Runner<E: EventSource> {
    event_source: E,
    redraw_interval: Duration,
}

impl<E: EventSource> Runner<E> {
    pub fn new(event_source: E, redraw_interval: Duration) -> Self {
        Self {
            event_source,
            redraw_interval,
        }
    }

    pub fn event_source(&self) -> &E {
        &self.event_source
    }

    /// Blocks up to the redraw interval; `None` means nothing arrived.
    pub fn step(&self) -> Option<RehearsalEvent> {
        match self.event_source.recv_timeout(self.redraw_interval) {
            Ok(ev) => Some(ev),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}
