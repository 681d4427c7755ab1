use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use simple_error::SimpleError;

use crate::error::{RadSimError, RadSimResult};
use crate::types::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkParams {
    pub neurons: Vec<NeuronDef>,
    pub synapses: Vec<SynapseDef>,
    pub horizon: usize,
    #[serde(default)]
    pub input_schedule: BTreeMap<usize, Vec<usize>>,
    #[serde(default = "default_input_weight")]
    pub input_weight: f32,
    #[serde(default)]
    pub allow_self_loops: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeuronDef {
    pub id: usize,
    #[serde(default)]
    pub neuron_params: NeuronParams,
    #[serde(default)]
    pub initial_potential: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuronParams {
    pub threshold: f32,
    pub leak: f32,
    pub refractory_period: usize,
    pub reset_potential: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynapseDef {
    pub source: usize,
    pub target: usize,
    pub weight: f32,
    #[serde(default = "default_delay")]
    pub delay: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Severity {
    Fraction(f64),
    Count(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    All,
    Subpopulation(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectParams {
    pub kind: String,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub onset: usize,
    #[serde(default)]
    pub amplitude: Option<f32>,
    #[serde(default)]
    pub probability_per_t: Option<f64>,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalParams {
    pub num_threads: Option<usize>,
    pub pin_threads: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentParams {
    pub network: NetworkParams,
    pub effect: EffectParams,
    #[serde(default)]
    pub seeds: Vec<u64>,
    #[serde(default)]
    pub technical_params: TechnicalParams,
}

fn default_input_weight() -> f32 {
    1.0
}

fn default_delay() -> usize {
    1
}

impl NetworkParams {
    pub fn with_uniform_neurons(
        num_neurons: usize,
        neuron_params: NeuronParams,
        horizon: usize,
    ) -> Self {
        Self {
            neurons: (0..num_neurons)
                .map(|id| NeuronDef {
                    id,
                    neuron_params: neuron_params.clone(),
                    initial_potential: 0.0,
                })
                .collect(),
            horizon,
            ..Self::default()
        }
    }

    pub fn connect(&mut self, source: usize, target: usize, weight: f32, delay: usize) {
        self.synapses.push(SynapseDef {
            source,
            target,
            weight,
            delay,
        });
    }

    pub fn add_input(&mut self, t: usize, nid: usize) {
        self.input_schedule.entry(t).or_default().push(nid);
    }
}

impl EffectParams {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_owned(),
            severity: None,
            scope: Scope::All,
            onset: 0,
            amplitude: None,
            probability_per_t: None,
            seed: 0,
        }
    }

    pub fn neuron_death(severity: Severity) -> Self {
        let mut params = Self::new(crate::effect::NEURON_DEATH);
        params.severity = Some(severity);
        params
    }

    /// Hex sha256 of the effect settings, excluding the seed, so that reports
    /// of one setting can be grouped across seeds and toolchains.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();

        hasher.update((self.kind.len() as u64).to_le_bytes());
        hasher.update(self.kind.as_bytes());

        match self.severity {
            None => hasher.update([0u8]),
            Some(Severity::Fraction(fraction)) => {
                hasher.update([1u8]);
                hasher.update(fraction.to_le_bytes());
            }
            Some(Severity::Count(count)) => {
                hasher.update([2u8]);
                hasher.update((count as u64).to_le_bytes());
            }
        }

        match &self.scope {
            Scope::All => hasher.update([0u8]),
            Scope::Subpopulation(nids) => {
                hasher.update([1u8]);
                hasher.update((nids.len() as u64).to_le_bytes());
                for nid in nids {
                    hasher.update((*nid as u64).to_le_bytes());
                }
            }
        }

        hasher.update((self.onset as u64).to_le_bytes());

        match self.amplitude {
            None => hasher.update([0u8]),
            Some(amplitude) => {
                hasher.update([1u8]);
                hasher.update(amplitude.to_le_bytes());
            }
        }

        match self.probability_per_t {
            None => hasher.update([0u8]),
            Some(probability_per_t) => {
                hasher.update([1u8]);
                hasher.update(probability_per_t.to_le_bytes());
            }
        }

        format!("{:x}", hasher.finalize())
    }
}

impl ExperimentParams {
    pub fn from_yaml_str(yaml: &str) -> RadSimResult<Self> {
        serde_yaml::from_str(yaml).map_err(|err| RadSimError::InvalidConfig(err.to_string()))
    }

    pub fn from_json_str(json: &str) -> RadSimResult<Self> {
        serde_json::from_str(json).map_err(|err| RadSimError::InvalidConfig(err.to_string()))
    }

    /// Falls back to the effect's own seed when no sweep is declared.
    pub fn resolved_seeds(&self) -> Vec<u64> {
        if self.seeds.is_empty() {
            vec![self.effect.seed]
        } else {
            self.seeds.clone()
        }
    }
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            neurons: Vec::new(),
            synapses: Vec::new(),
            horizon: 0,
            input_schedule: BTreeMap::new(),
            input_weight: default_input_weight(),
            allow_self_loops: false,
        }
    }
}

impl Default for NeuronParams {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            leak: 0.0,
            refractory_period: 0,
            reset_potential: 0.0,
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Scope::All
    }
}

impl Default for TechnicalParams {
    fn default() -> Self {
        Self {
            num_threads: Some(1),
            pin_threads: false,
        }
    }
}

pub fn validate_network_params(network_params: &NetworkParams) -> Result<(), SimpleError> {
    let mut seen_nids = HashSet::default();

    for neuron_def in &network_params.neurons {
        if !seen_nids.insert(neuron_def.id) {
            return Err(SimpleError::new(format!(
                "duplicate neuron id: {}",
                neuron_def.id
            )));
        }

        validate_neuron_params(&neuron_def.neuron_params)?;

        if !neuron_def.initial_potential.is_finite() {
            return Err(SimpleError::new(format!(
                "initial_potential of neuron {} must be finite",
                neuron_def.id
            )));
        }
    }

    for (syn_idx, synapse_def) in network_params.synapses.iter().enumerate() {
        validate_synapse_def(syn_idx, synapse_def, &seen_nids, network_params)?;
    }

    for (t, nids) in &network_params.input_schedule {
        if *t >= network_params.horizon {
            return Err(SimpleError::new(format!(
                "input scheduled at t = {} beyond horizon {}",
                t, network_params.horizon
            )));
        }

        if let Some(nid) = nids.iter().find(|nid| !seen_nids.contains(nid)) {
            return Err(SimpleError::new(format!(
                "input at t = {} references unknown neuron {}",
                t, nid
            )));
        }
    }

    if !network_params.input_weight.is_finite() {
        return Err(SimpleError::new("input_weight must be finite"));
    }

    Ok(())
}

fn validate_synapse_def(
    syn_idx: usize,
    synapse_def: &SynapseDef,
    known_nids: &HashSet<usize>,
    network_params: &NetworkParams,
) -> Result<(), SimpleError> {
    for nid in [synapse_def.source, synapse_def.target] {
        if !known_nids.contains(&nid) {
            return Err(SimpleError::new(format!(
                "synapse {} references unknown neuron {}",
                syn_idx, nid
            )));
        }
    }

    if synapse_def.source == synapse_def.target && !network_params.allow_self_loops {
        return Err(SimpleError::new(format!(
            "synapse {} is a self-loop on neuron {}",
            syn_idx, synapse_def.source
        )));
    }

    if synapse_def.delay == 0 {
        return Err(SimpleError::new(format!(
            "synapse {}: delay must be strictly positive",
            syn_idx
        )));
    }

    if !synapse_def.weight.is_finite() {
        return Err(SimpleError::new(format!(
            "synapse {}: weight must be finite",
            syn_idx
        )));
    }

    Ok(())
}

fn validate_neuron_params(neuron_params: &NeuronParams) -> Result<(), SimpleError> {
    if !neuron_params.threshold.is_finite() {
        return Err(SimpleError::new("threshold must be finite"));
    }

    if !neuron_params.leak.is_finite() || neuron_params.leak < 0.0 {
        return Err(SimpleError::new("leak must not be negative"));
    }

    if !neuron_params.reset_potential.is_finite() {
        return Err(SimpleError::new("reset_potential must be finite"));
    }

    if neuron_params.reset_potential >= neuron_params.threshold {
        return Err(SimpleError::new(
            "reset_potential must be less than threshold",
        ));
    }

    Ok(())
}

pub fn validate_severity(severity: &Severity) -> Result<(), SimpleError> {
    match *severity {
        Severity::Fraction(fraction) => {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(SimpleError::new("severity fraction must be in (0, 1]"));
            }
        }
        Severity::Count(count) => {
            if count == 0 {
                return Err(SimpleError::new("severity count must be strictly positive"));
            }
        }
    }

    Ok(())
}

pub fn validate_scope(scope: &Scope) -> Result<(), SimpleError> {
    if let Scope::Subpopulation(nids) = scope {
        if nids.is_empty() {
            return Err(SimpleError::new("subpopulation must not be empty"));
        }
    }

    Ok(())
}

pub fn validate_probability_per_t(probability_per_t: f64) -> Result<(), SimpleError> {
    if !(0.0..=1.0).contains(&probability_per_t) {
        return Err(SimpleError::new("probability_per_t must be in [0, 1]"));
    }

    Ok(())
}

pub fn validate_amplitude(amplitude: f32) -> Result<(), SimpleError> {
    if !amplitude.is_finite() || amplitude == 0.0 {
        return Err(SimpleError::new("amplitude must be finite and non-zero"));
    }

    Ok(())
}

pub fn validate_technical_params(technical_params: &TechnicalParams) -> Result<(), SimpleError> {
    if technical_params.num_threads == Some(0) {
        return Err(SimpleError::new("num_threads must be strictly positive"));
    }

    Ok(())
}
