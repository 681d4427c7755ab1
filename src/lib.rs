pub mod divergence;
pub mod effect;
pub mod error;
pub mod experiment;
pub mod inject;
pub mod neuron;
pub mod params;
pub mod registry;
pub mod simulator;
pub mod snapshot;
pub mod synapse;

mod delay_buffer;
mod types;
mod util;
