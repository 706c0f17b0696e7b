//! Hierarchical aggregation for the IMU mesh.
//!
//! Each publish cycle the root waits until every known child has a fragment
//! queued, merges them with its own readings into one `{"things":[...]}`
//! document, publishes it and relays the collector's response code to every
//! child. A leaf sends its readings to the root and blocks for that code.
//!
//! The [`Pipeline`] feeds rounds from a double-buffered sampler and handles
//! the collector's resend requests.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod behavior;
pub mod coordinator;
pub mod error;
pub mod pipeline;
pub mod sensor;
pub mod sink;

pub use behavior::{LeafBehavior, RoleBehavior, RootBehavior};
pub use coordinator::AggregationCoordinator;
pub use error::{AggregationError, PublishError, SensorError};
pub use pipeline::{Pipeline, PipelineConfig, PipelineHandles, SampleBuffers, MAX_BUFFERED_READINGS};
pub use sensor::SensorSource;
pub use sink::{HttpPublishSink, LoggingSink, PublishSink, RESPONSE_CAPACITY};
