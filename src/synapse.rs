use serde::{Deserialize, Serialize};

use crate::params::SynapseDef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synapse {
    pub source: usize,
    pub target: usize,
    pub weight: f32,
    pub delay: usize,
}

impl Synapse {
    pub fn new(source: usize, target: usize, weight: f32, delay: usize) -> Self {
        Self {
            source,
            target,
            weight,
            delay,
        }
    }
}

impl From<&SynapseDef> for Synapse {
    fn from(synapse_def: &SynapseDef) -> Self {
        Self::new(
            synapse_def.source,
            synapse_def.target,
            synapse_def.weight,
            synapse_def.delay,
        )
    }
}
