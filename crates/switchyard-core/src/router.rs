//! Event router for Switchyard.
//!
//! The router funnels the outbound stream of every source peripheral into one
//! bounded sink queue and dispatches each queued event to the destinations
//! listed for its source in the routing table.
//!
//! ```text
//!  source A ──forwarder──┐
//!  source B ──forwarder──┼──▶ sink queue ──▶ dispatch loop ──▶ sinks
//!  source C ──forwarder──┘     (bounded)
//! ```
//!
//! A full sink queue blocks the forwarders, and a slow sink blocks the
//! dispatch loop, so backpressure propagates to every source instead of
//! events being dropped.

use crate::event::EventRef;
use crate::metrics::{self, SkipReason, SourceGuard};
use crate::peripheral::{EventStream, Peripheral, PeripheralId};
use crate::registry::Registry;
use crate::routing::{RouteDescriptor, RouteError, RoutingTable};
use futures_util::StreamExt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Default capacity of the sink queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Router errors.
#[derive(Debug, Error)]
pub enum RouterError {
    /// An event's source has no route.
    #[error("Event received with unknown source identifier \"{0}\"")]
    UnknownSource(String),

    /// `run` was called more than once.
    #[error("Router already started")]
    AlreadyStarted,

    /// The routing table failed validation.
    #[error(transparent)]
    InvalidRoute(#[from] RouteError),

    /// The sink queue needs room for at least one event.
    #[error("Sink queue capacity must be at least 1")]
    ZeroCapacity,
}

/// What to do with an event whose source has no route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownSourcePolicy {
    /// Stop the router with [`RouterError::UnknownSource`].
    #[default]
    Halt,
    /// Log the event, drop it and keep routing.
    LogAndContinue,
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Capacity of the shared sink queue.
    pub queue_capacity: usize,
    /// Handling of unrouted events.
    pub unknown_source: UnknownSourcePolicy,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            unknown_source: UnknownSourcePolicy::default(),
        }
    }
}

/// Lifecycle of a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Unstarted,
    Running,
    Terminated,
}

const UNSTARTED: u8 = 0;
const RUNNING: u8 = 1;
const TERMINATED: u8 = 2;

type SinkQueue = (mpsc::Sender<EventRef>, mpsc::Receiver<EventRef>);

/// The fan-in/fan-out engine.
pub struct Router {
    /// Shared, sealed peripheral registry.
    registry: Arc<Registry>,
    /// Validated routes.
    routes: RoutingTable,
    config: RouterConfig,
    state: AtomicU8,
    /// Sink queue, taken by `run`.
    queue: Mutex<Option<SinkQueue>>,
}

impl Router {
    /// Create a router from route descriptors.
    ///
    /// Seals the registry.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::InvalidRoute`] if any descriptor is malformed,
    /// or [`RouterError::ZeroCapacity`] for an empty sink queue.
    pub fn new<I>(registry: Arc<Registry>, routes: I, config: RouterConfig) -> Result<Self, RouterError>
    where
        I: IntoIterator<Item = RouteDescriptor>,
    {
        let table = RoutingTable::from_descriptors(routes)?;
        Self::with_table(registry, table, config)
    }

    /// Create a router from an already compiled routing table.
    ///
    /// Seals the registry.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::ZeroCapacity`] for an empty sink queue.
    pub fn with_table(
        registry: Arc<Registry>,
        routes: RoutingTable,
        config: RouterConfig,
    ) -> Result<Self, RouterError> {
        if config.queue_capacity == 0 {
            return Err(RouterError::ZeroCapacity);
        }

        registry.seal();
        for (source, destinations) in routes.iter() {
            for dst in destinations {
                if !registry.contains(dst.as_str()) {
                    warn!(source = %source, destination = %dst, "Route destination is not registered");
                }
            }
        }

        info!(
            peripherals = registry.len(),
            routes = routes.route_count(),
            queue_capacity = config.queue_capacity,
            "Creating router"
        );

        let queue = mpsc::channel(config.queue_capacity);
        Ok(Self {
            registry,
            routes,
            config,
            state: AtomicU8::new(UNSTARTED),
            queue: Mutex::new(Some(queue)),
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RouterState {
        match self.state.load(Ordering::Acquire) {
            UNSTARTED => RouterState::Unstarted,
            RUNNING => RouterState::Running,
            _ => RouterState::Terminated,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[must_use]
    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Start routing and block until the router terminates.
    ///
    /// Spawns one forwarding task per source peripheral, then dispatches
    /// queued events until every source stream has ended, `cancel` fires,
    /// or a fatal routing error occurs. Forwarding tasks are stopped before
    /// this returns.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::AlreadyStarted`] on a second call and
    /// [`RouterError::UnknownSource`] when an unrouted event halts the router.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), RouterError> {
        self.state
            .compare_exchange(UNSTARTED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RouterError::AlreadyStarted)?;

        let queue = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let result = match queue {
            Some((sender, receiver)) => self.route_events(sender, receiver, cancel).await,
            None => Err(RouterError::AlreadyStarted),
        };

        self.state.store(TERMINATED, Ordering::Release);
        match &result {
            Ok(()) => info!("Router stopped"),
            Err(e) => error!(error = %e, "Router terminated"),
        }
        result
    }

    async fn route_events(
        &self,
        sender: mpsc::Sender<EventRef>,
        mut receiver: mpsc::Receiver<EventRef>,
        cancel: CancellationToken,
    ) -> Result<(), RouterError> {
        let shutdown = cancel.child_token();
        let mut forwarders = JoinSet::new();

        debug!("Funnelling sources into the sink queue");
        self.registry
            .for_each(|peripheral| {
                if let Some(stream) = Self::source_stream(peripheral) {
                    forwarders.spawn(forward_source(
                        peripheral.id().clone(),
                        stream,
                        sender.clone(),
                        shutdown.clone(),
                    ));
                }
                Ok::<(), std::convert::Infallible>(())
            })
            .unwrap_or_else(|never| match never {});
        // Only forwarders hold senders now, so the queue closes when the
        // last source ends.
        drop(sender);

        info!(sources = forwarders.len(), "Router running");

        let result = loop {
            let event = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    debug!("Router cancelled");
                    break Ok(());
                }
                next = receiver.recv() => match next {
                    Some(event) => event,
                    None => {
                        debug!("All sources ended");
                        break Ok(());
                    }
                },
            };

            if let Err(e) = self.dispatch(event, &shutdown).await {
                break Err(e);
            }
        };

        shutdown.cancel();
        forwarders.shutdown().await;
        result
    }

    fn source_stream(peripheral: &Arc<dyn Peripheral>) -> Option<EventStream> {
        let source = peripheral.source()?;
        let stream = source.events();
        if stream.is_none() {
            warn!(peripheral = %peripheral.id(), "Source stream unavailable, not forwarding");
        }
        stream
    }

    /// Deliver one event to every destination routed from its source.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::UnknownSource`] if the source has no route and
    /// the policy is [`UnknownSourcePolicy::Halt`].
    pub async fn forward_event(&self, event: EventRef) -> Result<(), RouterError> {
        self.dispatch(event, &CancellationToken::new()).await
    }

    async fn dispatch(
        &self,
        event: EventRef,
        shutdown: &CancellationToken,
    ) -> Result<(), RouterError> {
        let source = event.source_id();
        metrics::record_received(source);

        let Some(destinations) = self.routes.route(source) else {
            metrics::record_unrouted(source);
            return match self.config.unknown_source {
                UnknownSourcePolicy::Halt => Err(RouterError::UnknownSource(source.to_string())),
                UnknownSourcePolicy::LogAndContinue => {
                    warn!(source = %source, "Dropping event with unknown source identifier");
                    Ok(())
                }
            };
        };

        trace!(source = %source, destinations = destinations.len(), "Forwarding event");

        for dst in destinations {
            let Some(peripheral) = self.registry.lookup(dst.as_str()) else {
                debug!(destination = %dst, "Destination not registered, skipping");
                metrics::record_skipped(SkipReason::Missing);
                continue;
            };
            let Some(sink) = peripheral.sink() else {
                debug!(destination = %dst, "Destination is not a sink, skipping");
                metrics::record_skipped(SkipReason::NotASink);
                continue;
            };

            tokio::select! {
                biased;
                () = shutdown.cancelled() => return Ok(()),
                delivered = sink.accept(Arc::clone(&event)) => match delivered {
                    Ok(()) => {
                        trace!(destination = %dst, "Event forwarded");
                        metrics::record_delivered(dst.as_str());
                    }
                    Err(e) => {
                        warn!(destination = %dst, error = %e, "Delivery failed");
                        metrics::record_failed(dst.as_str());
                    }
                },
            }
        }

        Ok(())
    }
}

/// Drain one source into the sink queue until the stream ends or shutdown.
async fn forward_source(
    id: PeripheralId,
    mut stream: EventStream,
    queue: mpsc::Sender<EventRef>,
    shutdown: CancellationToken,
) {
    let _guard = SourceGuard::new();
    debug!(peripheral = %id, "Forwarding task started");

    loop {
        let event = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            next = stream.next() => match next {
                Some(event) => event,
                None => {
                    debug!(peripheral = %id, "Source stream ended");
                    break;
                }
            },
        };

        trace!(peripheral = %id, source = %event.source_id(), "Queueing event");
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            sent = queue.send(event) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
