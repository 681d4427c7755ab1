use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use simple_error::{try_with, SimpleResult};

use crate::error::{RadSimError, RadSimResult};
use crate::params::{self, NetworkParams, NeuronParams};
use crate::synapse::Synapse;
use crate::types::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuronSpec {
    pub id: usize,
    pub neuron_params: NeuronParams,
    pub initial_potential: f32,
    pub dead_from: Option<usize>,
}

impl NeuronSpec {
    pub fn is_alive_at(&self, t: usize) -> bool {
        match self.dead_from {
            Some(onset) => t < onset,
            None => true,
        }
    }
}

/// State change scheduled for a single timestep of a faulted network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Perturbation {
    PotentialShift { nid: usize, delta: f32 },
    /// A spike that no neuron of the network emitted, arriving at `nid`.
    SpuriousInput { nid: usize, weight: f32 },
}

impl Perturbation {
    pub fn nid(&self) -> usize {
        match *self {
            Perturbation::PotentialShift { nid, .. } => nid,
            Perturbation::SpuriousInput { nid, .. } => nid,
        }
    }
}

/// Immutable network: neurons, synapses, horizon and external input. Faults
/// are only ever applied to a clone, through the fault injector.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSnapshot {
    neurons: Vec<NeuronSpec>,
    synapses: Vec<Synapse>,
    nid_to_idx: HashMap<usize, usize>,
    out_edges: Vec<Vec<usize>>,
    in_edges: Vec<Vec<usize>>,
    horizon: usize,
    input_schedule: Vec<Vec<usize>>,
    input_weight: f32,
    perturbations: BTreeMap<usize, Vec<Perturbation>>,
}

impl NetworkSnapshot {
    pub fn new(network_params: &NetworkParams) -> RadSimResult<Self> {
        Self::build(network_params).map_err(RadSimError::topology)
    }

    fn build(network_params: &NetworkParams) -> SimpleResult<Self> {
        try_with!(
            params::validate_network_params(network_params),
            "invalid network parameters"
        );

        let neurons: Vec<NeuronSpec> = network_params
            .neurons
            .iter()
            .map(|neuron_def| NeuronSpec {
                id: neuron_def.id,
                neuron_params: neuron_def.neuron_params.clone(),
                initial_potential: neuron_def.initial_potential,
                dead_from: None,
            })
            .collect();

        let nid_to_idx: HashMap<usize, usize> = neurons
            .iter()
            .enumerate()
            .map(|(idx, neuron)| (neuron.id, idx))
            .collect();

        let synapses: Vec<Synapse> = network_params.synapses.iter().map(Synapse::from).collect();

        let mut out_edges = vec![Vec::new(); neurons.len()];
        let mut in_edges = vec![Vec::new(); neurons.len()];

        for (syn_idx, synapse) in synapses.iter().enumerate() {
            out_edges[nid_to_idx[&synapse.source]].push(syn_idx);
            in_edges[nid_to_idx[&synapse.target]].push(syn_idx);
        }

        let mut input_schedule = vec![Vec::new(); network_params.horizon];

        for (t, nids) in &network_params.input_schedule {
            let inputs: &mut Vec<usize> = &mut input_schedule[*t];
            inputs.extend(nids);
            inputs.sort_unstable();
            inputs.dedup();
        }

        Ok(Self {
            neurons,
            synapses,
            nid_to_idx,
            out_edges,
            in_edges,
            horizon: network_params.horizon,
            input_schedule,
            input_weight: network_params.input_weight,
            perturbations: BTreeMap::new(),
        })
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn num_neurons(&self) -> usize {
        self.neurons.len()
    }

    pub fn neurons(&self) -> &[NeuronSpec] {
        &self.neurons
    }

    pub fn neuron(&self, nid: usize) -> Option<&NeuronSpec> {
        self.nid_to_idx.get(&nid).map(|idx| &self.neurons[*idx])
    }

    pub fn contains(&self, nid: usize) -> bool {
        self.nid_to_idx.contains_key(&nid)
    }

    pub fn neuron_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.neurons.iter().map(|neuron| neuron.id)
    }

    pub fn synapses(&self) -> &[Synapse] {
        &self.synapses
    }

    pub fn out_edges(&self, nid: usize) -> impl Iterator<Item = &Synapse> + '_ {
        self.edges_of(&self.out_edges, nid)
    }

    pub fn in_edges(&self, nid: usize) -> impl Iterator<Item = &Synapse> + '_ {
        self.edges_of(&self.in_edges, nid)
    }

    fn edges_of<'a>(
        &'a self,
        index: &'a [Vec<usize>],
        nid: usize,
    ) -> impl Iterator<Item = &'a Synapse> + 'a {
        self.nid_to_idx
            .get(&nid)
            .into_iter()
            .flat_map(move |idx| index[*idx].iter().map(move |syn_idx| &self.synapses[*syn_idx]))
    }

    pub fn input_spikes_at(&self, t: usize) -> &[usize] {
        self.input_schedule.get(t).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn input_weight(&self) -> f32 {
        self.input_weight
    }

    pub fn perturbations_at(&self, t: usize) -> &[Perturbation] {
        self.perturbations
            .get(&t)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn num_perturbations(&self) -> usize {
        self.perturbations.values().map(Vec::len).sum()
    }

    /// Ids of neurons that die at some point, in snapshot order.
    pub fn dead_neurons(&self) -> Vec<usize> {
        self.neurons
            .iter()
            .filter(|neuron| neuron.dead_from.is_some())
            .map(|neuron| neuron.id)
            .collect()
    }

    pub fn max_delay(&self) -> usize {
        self.synapses
            .iter()
            .map(|synapse| synapse.delay)
            .max()
            .unwrap_or(0)
    }

    pub(crate) fn index_of(&self, nid: usize) -> Option<usize> {
        self.nid_to_idx.get(&nid).copied()
    }

    pub(crate) fn out_edge_indices(&self, neuron_idx: usize) -> &[usize] {
        &self.out_edges[neuron_idx]
    }

    /// Keeps the earliest onset if the neuron was already scheduled to die.
    pub(crate) fn kill_neuron(&mut self, nid: usize, onset: usize) -> bool {
        match self.nid_to_idx.get(&nid) {
            Some(idx) => {
                let neuron = &mut self.neurons[*idx];
                neuron.dead_from = Some(neuron.dead_from.map_or(onset, |t| t.min(onset)));
                true
            }
            None => false,
        }
    }

    pub(crate) fn add_perturbation(&mut self, t: usize, perturbation: Perturbation) {
        self.perturbations.entry(t).or_default().push(perturbation);
    }
}
