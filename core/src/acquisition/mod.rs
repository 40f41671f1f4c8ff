//! Continuous-sampling pipeline: hardware sampler boundary, demultiplexing
//! with gap-fill, rate measurement and the acquisition task.

pub mod demux;
pub mod pipeline;
pub mod rate;
pub mod sampler;
pub mod task;

pub use demux::ChannelAssembler;
pub use pipeline::{AcquisitionPipeline, CycleReport};
pub use rate::RateMeter;
pub use sampler::{
    decode_type1_frame, ConversionRecord, Sampler, SamplerError, SamplerSettings, ADC_VALUE_MASK,
    TYPE1_RESULT_BYTES,
};
pub use task::AcquisitionTask;
