pub mod profile;
pub mod sampler;
