pub mod bank;
pub mod butterworth;
pub mod thiran;

pub use bank::{saturate_to_i16, FilterBank};
pub use butterworth::ButterworthLowPass;
pub use thiran::ThiranDelay;
