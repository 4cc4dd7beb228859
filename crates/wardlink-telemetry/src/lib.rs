//! Telemetry identification and fusion for Wardlink.
//!
//! Takes the stream of heterogeneous, partially-keyed messages delivered by
//! the transport and turns it into stable, deduplicated device records:
//! topic classification, alias-tolerant field access, identity resolution,
//! and the multi-fragment fusion cache for positioning tags.

pub mod downlink;
pub mod engine;
pub mod fields;
pub mod fusion;
pub mod identity;
pub mod message;

pub use downlink::{CommandRequest, DownlinkPublisher};
pub use engine::TelemetryEngine;
pub use fusion::{EvictionSweeper, FragmentKind, FusionCache};
pub use identity::resolve;
pub use message::{Envelope, GatewaySource, ReplayBuffer, TopicClass};
