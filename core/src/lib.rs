//! Acquisition, filtering and streaming core for the six-channel energy meter.
//!
//! Raw conversion frames from the hardware sampler are demultiplexed into
//! per-channel buffers, gap-filled, filtered and stamped into a fixed-layout
//! measurement packet, which the transmit stage streams over UDP to the
//! controller that claimed the device through the discovery handshake.

pub mod acquisition;
pub mod config;
pub mod discovery;
pub mod filters;
pub mod packet;
pub mod prelude;
pub mod session;
pub mod signal;
pub mod streaming;
pub mod telemetry;
pub mod transmit;

pub use config::DeviceConfig;
pub use packet::MeasurementPacket;
pub use prelude::{ChannelFilter, CoreError, CoreResult, StreamControl};
pub use session::SessionContext;
