//! Unified logger
//!
//! Log calls build a [`LogEntry`] and push it onto an unbounded queue; they
//! never wait on storage. A single background task drains the queue and
//! writes every entry to every enabled destination, in enqueue order. A
//! failing destination is reported on the `tracing` fallback channel and
//! skipped; it never stops delivery to the others.

use crate::config::ServerConfig;
use crate::log_system::correlation::INIT_CORRELATION;
use crate::log_system::{
    CorrelationId, DestinationFactory, LogDestination, LogEntry, LogLevel, LogType,
};
use crate::pipeline::CallContext;
use crate::types::LogError;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

static GLOBAL: OnceCell<UnifiedLogger> = OnceCell::const_new();

enum Message {
    Entry(Box<LogEntry>),
    Flush(oneshot::Sender<()>),
}

type Pending = (mpsc::UnboundedReceiver<Message>, Vec<Arc<dyn LogDestination>>);

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of queue activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggerStats {
    pub accepted: u64,
    pub delivered: u64,
    pub failed: u64,
}

struct Inner {
    sender: RwLock<Option<mpsc::UnboundedSender<Message>>>,
    /// Receiver parked until a runtime is bound.
    pending: Mutex<Option<Pending>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    startup: RwLock<Option<CorrelationId>>,
    min_level: LogLevel,
    destination_names: Vec<String>,
    counters: Arc<Counters>,
}

/// Process-wide asynchronous log sink. Cheap to clone.
#[derive(Clone)]
pub struct UnifiedLogger {
    inner: Arc<Inner>,
}

impl UnifiedLogger {
    /// Create a logger over `destinations`. The drain task starts right
    /// away when called inside a tokio runtime, otherwise on
    /// [`bind_execution_context`](Self::bind_execution_context).
    pub fn new(destinations: Vec<Arc<dyn LogDestination>>, min_level: LogLevel) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let destination_names = destinations.iter().map(|d| d.name().to_string()).collect();

        let logger = Self {
            inner: Arc::new(Inner {
                sender: RwLock::new(Some(sender)),
                pending: Mutex::new(Some((receiver, destinations))),
                worker: Mutex::new(None),
                startup: RwLock::new(None),
                min_level,
                destination_names,
                counters: Arc::new(Counters::default()),
            }),
        };

        if let Ok(handle) = Handle::try_current() {
            logger.bind_execution_context(&handle);
        }

        logger
    }

    /// Build destinations from configuration and start a logger over them.
    pub async fn from_config(
        config: &ServerConfig,
        factory: &DestinationFactory,
    ) -> Result<Self, LogError> {
        let destinations = factory
            .create_enabled(&config.destinations, config)
            .await?;
        Ok(Self::new(destinations, config.level()))
    }

    /// Initialize the process-wide logger. Later calls return the
    /// already-initialized instance.
    pub async fn initialize(
        config: &ServerConfig,
        factory: &DestinationFactory,
    ) -> Result<Self, LogError> {
        let logger = GLOBAL
            .get_or_try_init(|| async {
                let logger = Self::from_config(config, factory).await?;
                info!(
                    "Unified logging initialized with {} destination(s)",
                    logger.inner.destination_names.len()
                );
                Ok::<_, LogError>(logger)
            })
            .await?;
        Ok(logger.clone())
    }

    pub fn global() -> Option<&'static UnifiedLogger> {
        GLOBAL.get()
    }

    /// Start the drain task on `handle` if it is not running yet.
    pub fn bind_execution_context(&self, handle: &Handle) {
        let pending = lock(&self.inner.pending).take();
        if let Some((receiver, destinations)) = pending {
            let counters = Arc::clone(&self.inner.counters);
            let worker = handle.spawn(drain(receiver, destinations, counters));
            *lock(&self.inner.worker) = Some(worker);
            debug!("Log drain task started");
        }
    }

    pub fn get_logger(&self, name: impl AsRef<str>) -> Logger {
        Logger {
            name: Arc::from(name.as_ref()),
            correlation: None,
            log_type: LogType::Internal,
            sink: self.clone(),
        }
    }

    pub fn destination_names(&self) -> &[String] {
        &self.inner.destination_names
    }

    pub fn min_level(&self) -> LogLevel {
        self.inner.min_level
    }

    pub fn is_closed(&self) -> bool {
        read(&self.inner.sender).is_none()
    }

    /// Tag untagged entries with a startup id until the guard drops.
    pub fn begin_startup(&self) -> StartupScope {
        let id = CorrelationId::startup();
        *write(&self.inner.startup) = Some(id.clone());
        StartupScope {
            logger: self.clone(),
            id,
        }
    }

    pub fn startup_id(&self) -> Option<CorrelationId> {
        read(&self.inner.startup).clone()
    }

    /// Enqueue an entry. Entries below the threshold are dropped silently;
    /// after [`close`](Self::close) every entry is rejected.
    pub fn submit(&self, mut entry: LogEntry) -> Result<(), LogError> {
        if entry.level < self.inner.min_level {
            return Ok(());
        }

        if entry.correlation_id.is_empty() {
            entry.correlation_id = match read(&self.inner.startup).as_ref() {
                Some(id) => id.to_string(),
                None => INIT_CORRELATION.to_string(),
            };
        }

        let sender = read(&self.inner.sender);
        let sender = sender.as_ref().ok_or(LogError::Closed)?;
        sender
            .send(Message::Entry(Box::new(entry)))
            .map_err(|_| LogError::Closed)?;

        self.inner.counters.accepted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Wait until everything enqueued before this call has been written.
    pub async fn flush(&self) -> Result<(), LogError> {
        let (tx, rx) = oneshot::channel();
        {
            let sender = read(&self.inner.sender);
            let sender = sender.as_ref().ok_or(LogError::Closed)?;
            sender.send(Message::Flush(tx)).map_err(|_| LogError::Closed)?;
        }

        self.ensure_worker();
        rx.await.map_err(|_| LogError::Closed)
    }

    /// Stop accepting entries, deliver everything already accepted, then
    /// close every destination. Calling it again is a no-op.
    pub async fn close(&self) -> Result<(), LogError> {
        let sender = write(&self.inner.sender).take();
        if sender.is_none() {
            return Ok(());
        }
        drop(sender);

        self.ensure_worker();

        let worker = lock(&self.inner.worker).take();
        if let Some(worker) = worker {
            worker
                .await
                .map_err(|e| LogError::Destination("drain".to_string(), e.to_string()))?;
        }

        let stats = self.stats();
        debug!(
            "Unified logger closed: {} accepted, {} delivered, {} failed writes",
            stats.accepted, stats.delivered, stats.failed
        );
        Ok(())
    }

    pub fn stats(&self) -> LoggerStats {
        let counters = &self.inner.counters;
        LoggerStats {
            accepted: counters.accepted.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        }
    }

    fn ensure_worker(&self) {
        if let Ok(handle) = Handle::try_current() {
            self.bind_execution_context(&handle);
        }
    }
}

async fn drain(
    mut receiver: mpsc::UnboundedReceiver<Message>,
    destinations: Vec<Arc<dyn LogDestination>>,
    counters: Arc<Counters>,
) {
    while let Some(message) = receiver.recv().await {
        match message {
            Message::Entry(entry) => {
                for destination in &destinations {
                    match destination.write(&entry).await {
                        Ok(()) => {
                            counters.delivered.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                destination = destination.name(),
                                "Could not write log entry: {}", e
                            );
                        }
                    }
                }
            }
            Message::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    for destination in &destinations {
        if let Err(e) = destination.close().await {
            warn!(
                destination = destination.name(),
                "Failed to close log destination: {}", e
            );
        }
    }
}

/// Clears the startup correlation id when dropped.
pub struct StartupScope {
    logger: UnifiedLogger,
    id: CorrelationId,
}

impl StartupScope {
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }
}

impl Drop for StartupScope {
    fn drop(&mut self) {
        let mut startup = write(&self.logger.inner.startup);
        if startup.as_ref() == Some(&self.id) {
            *startup = None;
        }
    }
}

/// Named, optionally correlation-bound handle with level-based calls.
#[derive(Clone)]
pub struct Logger {
    name: Arc<str>,
    correlation: Option<CorrelationId>,
    log_type: LogType,
    sink: UnifiedLogger,
}

impl Logger {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn correlation(&self) -> Option<&CorrelationId> {
        self.correlation.as_ref()
    }

    /// Copy of this handle tagged with the context's correlation id.
    pub fn bind(&self, ctx: &CallContext) -> Self {
        self.with_correlation(ctx.current().cloned())
    }

    pub fn with_correlation(&self, correlation: Option<CorrelationId>) -> Self {
        Self {
            correlation,
            ..self.clone()
        }
    }

    pub fn with_log_type(&self, log_type: LogType) -> Self {
        Self {
            log_type,
            ..self.clone()
        }
    }

    /// Pre-filled entry for the caller to extend and [`emit`](Self::emit).
    #[track_caller]
    pub fn entry(&self, level: LogLevel, message: impl Into<String>) -> LogEntry {
        let caller = Location::caller();
        let mut entry = LogEntry::new(level, self.log_type, message)
            .with_location(caller.file(), None, Some(caller.line()));
        entry.logger = Some(self.name.to_string());
        if let Some(id) = &self.correlation {
            entry.correlation_id = id.to_string();
        }
        entry
    }

    /// Hand an entry to the sink. Logging never fails the caller.
    pub fn emit(&self, entry: LogEntry) {
        if let Err(e) = self.sink.submit(entry) {
            debug!(logger = %self.name, "Dropped log entry: {}", e);
        }
    }

    #[track_caller]
    pub fn debug(&self, message: impl Into<String>) {
        self.emit(self.entry(LogLevel::Debug, message));
    }

    #[track_caller]
    pub fn info(&self, message: impl Into<String>) {
        self.emit(self.entry(LogLevel::Info, message));
    }

    #[track_caller]
    pub fn warning(&self, message: impl Into<String>) {
        self.emit(self.entry(LogLevel::Warning, message));
    }

    #[track_caller]
    pub fn error(&self, message: impl Into<String>) {
        self.emit(self.entry(LogLevel::Error, message));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
