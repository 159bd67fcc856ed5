//! # Notification Pipeline
//!
//! Purpose: Own a subscription connection, turn every pushed message into a
//! `KeyEvent`, optionally enrich it with the key's value, and hand it to the
//! consumer until cancelled or the stream fails.
//!
//! ## Design Principles
//! 1. **Single Reader**: The loop is sequential; one `read_message` is
//!    outstanding at a time, so the subscription side needs no locking.
//! 2. **Degrade, Don't Die**: Lookup and sink failures are logged and counted;
//!    only transport and protocol failures end a run.
//! 3. **Cooperative Cancellation**: The cancel flag is checked once per
//!    message. Cancelling also shuts the socket down so a blocked read returns.
//! 4. **Explicit Collaborators**: Sink and lookup are injected at
//!    construction.
//!
//! ## State Machine
//!
//! ```text
//! Starting -> Subscribed -> Streaming -> Stopping -> Stopped
//!     |            |             |           ^
//!     +------------+-------------+-----------+  (failure or cancellation)
//! ```

use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use kev_common::{Endpoint, KeyEvent, MIN_PUSH_ELEMENTS};
use tracing::{debug, error, info, warn};

use crate::connection::{ConnectionConfig, StreamCloser};
use crate::error::{ClientError, ClientResult, ProtocolError};
use crate::metrics::{PipelineMetrics, PipelineStats};
use crate::subscription::{SubscriptionConnection, DEFAULT_PATTERN};

/// Consumer of decoded events, supplied by the host application.
///
/// Errors are logged by the pipeline and never stop the stream.
pub trait NotifySink: Send + Sync {
    fn notify(&self, event: KeyEvent) -> anyhow::Result<()>;
}

impl<F> NotifySink for F
where
    F: Fn(KeyEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn notify(&self, event: KeyEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Optional source of a key's current value.
///
/// `Ok(None)` means the key does not exist.
pub trait ValueLookup: Send + Sync {
    fn lookup_value(&self, key: &str) -> anyhow::Result<Option<String>>;
}

impl<F> ValueLookup for F
where
    F: Fn(&str) -> anyhow::Result<Option<String>> + Send + Sync,
{
    fn lookup_value(&self, key: &str) -> anyhow::Result<Option<String>> {
        self(key)
    }
}

/// Lifecycle of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Starting = 0,
    Subscribed = 1,
    Streaming = 2,
    Stopping = 3,
    Stopped = 4,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PipelineState::Starting,
            1 => PipelineState::Subscribed,
            2 => PipelineState::Streaming,
            3 => PipelineState::Stopping,
            _ => PipelineState::Stopped,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Starting => "starting",
            PipelineState::Subscribed => "subscribed",
            PipelineState::Streaming => "streaming",
            PipelineState::Stopping => "stopping",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Cloneable cancellation signal shared between a pipeline and its host.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    closer: Mutex<Option<StreamCloser>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop and shuts down the registered socket, if any.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        if let Some(closer) = self.slot().take() {
            closer.shutdown();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Registers the socket to shut down on cancellation. If the token is
    /// already cancelled the socket is shut down right away.
    fn register(&self, closer: StreamCloser) {
        let mut slot = self.slot();
        if self.is_cancelled() {
            closer.shutdown();
        } else {
            *slot = Some(closer);
        }
    }

    fn unregister(&self) {
        self.slot().take();
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<StreamCloser>> {
        self.inner.closer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Settings for one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Channel pattern passed to `PSUBSCRIBE`.
    pub pattern: String,
    /// Socket options for the subscription connection.
    pub connection: ConnectionConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            pattern: DEFAULT_PATTERN.to_string(),
            connection: ConnectionConfig::default(),
        }
    }
}

/// Long-running subscribe/decode/enrich/deliver loop.
pub struct NotificationPipeline {
    endpoint: Endpoint,
    config: PipelineConfig,
    sink: Arc<dyn NotifySink>,
    lookup: Option<Arc<dyn ValueLookup>>,
    cancel: CancelToken,
    state: Arc<AtomicU8>,
    metrics: Arc<PipelineMetrics>,
}

impl NotificationPipeline {
    pub fn new(endpoint: Endpoint, sink: impl NotifySink + 'static) -> Self {
        NotificationPipeline {
            endpoint,
            config: PipelineConfig::default(),
            sink: Arc::new(sink),
            lookup: None,
            cancel: CancelToken::new(),
            state: Arc::new(AtomicU8::new(PipelineState::Starting as u8)),
            metrics: Arc::new(PipelineMetrics::default()),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.pattern = pattern.into();
        self
    }

    /// Enriches every event with the value returned by `lookup`.
    pub fn with_lookup(mut self, lookup: Arc<dyn ValueLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn stats(&self) -> PipelineStats {
        self.metrics.snapshot()
    }

    /// Runs the pipeline on the calling thread until cancelled or failed.
    ///
    /// Cancellation returns `Ok` with the final counters. Transport and
    /// protocol failures end the run and are returned to the caller, which
    /// decides whether to start a new pipeline.
    pub fn run(&self) -> ClientResult<PipelineStats> {
        self.set_state(PipelineState::Starting);
        info!(
            endpoint = %self.endpoint,
            pattern = %self.config.pattern,
            lookup = self.lookup.is_some(),
            "starting notification pipeline"
        );

        let result = self.open_and_stream();
        self.set_state(PipelineState::Stopped);

        let stats = self.metrics.snapshot();
        match result {
            Ok(()) => {
                info!(?stats, "notification pipeline stopped");
                Ok(stats)
            }
            Err(err) => {
                error!(error = %err, ?stats, "notification pipeline failed");
                Err(err)
            }
        }
    }

    /// Runs the pipeline on a dedicated thread.
    pub fn spawn(self) -> io::Result<PipelineHandle> {
        let cancel = self.cancel.clone();
        let state = self.state.clone();
        let metrics = self.metrics.clone();
        let thread = thread::Builder::new()
            .name("kev-pipeline".to_string())
            .spawn(move || self.run())?;
        Ok(PipelineHandle {
            cancel,
            state,
            metrics,
            thread,
        })
    }

    fn open_and_stream(&self) -> ClientResult<()> {
        let mut subscription = SubscriptionConnection::connect(&self.endpoint, &self.config.connection)?;
        self.cancel.register(subscription.closer()?);
        self.set_state(PipelineState::Subscribed);

        let result = self.subscribe_and_stream(&mut subscription);

        self.set_state(PipelineState::Stopping);
        self.cancel.unregister();
        subscription.close();
        result
    }

    fn subscribe_and_stream(&self, subscription: &mut SubscriptionConnection) -> ClientResult<()> {
        if let Err(err) = subscription.subscribe(&self.config.pattern) {
            return self.absorb_cancellation(err);
        }
        self.set_state(PipelineState::Streaming);
        info!(pattern = %self.config.pattern, "subscribed to key events");

        loop {
            if self.cancel.is_cancelled() {
                info!("cancellation requested");
                return Ok(());
            }
            match subscription.read_message() {
                Ok(message) => {
                    self.metrics.record_message();
                    self.handle_message(message);
                }
                Err(err) => return self.absorb_cancellation(err),
            }
        }
    }

    /// Decides, at the failing call, whether `err` is the socket shutdown
    /// caused by cancellation or a genuine stream failure.
    fn absorb_cancellation(&self, err: ClientError) -> ClientResult<()> {
        if ended_by_cancellation(self.cancel.is_cancelled(), &err) {
            debug!(error = %err, "read interrupted by cancellation");
            Ok(())
        } else {
            Err(err)
        }
    }

    fn handle_message(&self, message: Vec<String>) {
        if message.len() < MIN_PUSH_ELEMENTS {
            warn!(
                elements = message.len(),
                message = %message.join(" | "),
                "received incomplete message"
            );
            self.metrics.record_malformed();
            return;
        }
        let Some(mut event) = KeyEvent::from_message(message) else {
            return;
        };

        if let Some(lookup) = &self.lookup {
            match lookup.lookup_value(&event.key) {
                Ok(value) => event.value = value,
                Err(err) => {
                    warn!(key = %event.key, error = %format!("{:#}", err), "value lookup failed");
                    self.metrics.record_lookup_failure();
                }
            }
        }

        self.deliver(event);
    }

    fn deliver(&self, event: KeyEvent) {
        let key = event.key.clone();
        self.metrics.record_delivery();
        match panic::catch_unwind(AssertUnwindSafe(|| self.sink.notify(event))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(key = %key, error = %format!("{:#}", err), "notification sink failed");
                self.metrics.record_sink_failure();
            }
            Err(_) => {
                warn!(key = %key, "notification sink panicked");
                self.metrics.record_sink_failure();
            }
        }
    }

    fn set_state(&self, state: PipelineState) {
        let previous = self.state.swap(state as u8, Ordering::SeqCst);
        if previous != state as u8 {
            debug!(from = %PipelineState::from_u8(previous), to = %state, "pipeline state");
        }
    }
}

/// A shut-down socket reads as end-of-stream or fails at the transport level.
/// Any other error was produced by the store and is reported even when a
/// cancellation lands right after it.
fn ended_by_cancellation(cancelled: bool, err: &ClientError) -> bool {
    cancelled
        && matches!(
            err,
            ClientError::Transport(_) | ClientError::Protocol(ProtocolError::UnexpectedEof)
        )
}

impl fmt::Debug for NotificationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationPipeline")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .field("lookup", &self.lookup.is_some())
            .field("state", &self.state())
            .finish()
    }
}

/// Host-side handle to a pipeline running on its own thread.
pub struct PipelineHandle {
    cancel: CancelToken,
    state: Arc<AtomicU8>,
    metrics: Arc<PipelineMetrics>,
    thread: JoinHandle<ClientResult<PipelineStats>>,
}

impl PipelineHandle {
    /// Requests a stop; see `CancelToken::cancel`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn stats(&self) -> PipelineStats {
        self.metrics.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the pipeline thread and returns its outcome.
    pub fn join(self) -> ClientResult<PipelineStats> {
        match self.thread.join() {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}
