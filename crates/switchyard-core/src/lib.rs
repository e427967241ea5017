//! # switchyard-core
//!
//! Event routing engine for the Switchyard event bus.
//!
//! This crate provides the building blocks:
//!
//! - **Event** - Anything that can name the peripheral that produced it
//! - **Peripheral** - Identifiable component with optional source and sink capabilities
//! - **Registry** - Process-lifetime store of peripherals
//! - **Factory** - Two-step contract for constructing peripherals
//! - **Routing** - Static source to destinations table
//! - **Router** - Fan-in/fan-out engine with bounded backpressure
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Factories  │────▶│  Registry   │◀────│   Router    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                                                │
//!                                                ▼
//!                                         ┌─────────────┐
//!                                         │RoutingTable │
//!                                         └─────────────┘
//! ```

pub mod event;
pub mod factory;
pub mod loader;
pub mod logging;
pub mod metrics;
pub mod peripheral;
pub mod registry;
pub mod router;
pub mod routing;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use event::{CoreEvent, Event, EventRef, Message};
pub use factory::{
    BaseOptions, FactoryError, FactoryTable, PeripheralFactory, PeripheralOptions, ValidationError,
};
pub use loader::{load_peripherals, LoadError, PeripheralSpec};
pub use logging::LogSink;
pub use peripheral::{
    Capabilities, DeliveryError, EventStream, Inbox, Outbox, Peripheral, PeripheralId, Sink, Source,
};
pub use registry::{CoreHandle, Registry, RegistryError};
pub use router::{Router, RouterConfig, RouterError, RouterState, UnknownSourcePolicy};
pub use routing::{RouteDescriptor, RouteError, RoutingTable};
