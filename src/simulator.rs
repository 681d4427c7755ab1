use log::debug;
use serde::{Deserialize, Serialize};
use simple_error::{SimpleError, SimpleResult};

use crate::delay_buffer::DelayBuffer;
use crate::error::{RadSimError, RadSimResult};
use crate::neuron::{LifNeuron, NeuronModel};
use crate::snapshot::{NetworkSnapshot, NeuronSpec, Perturbation};

/// Ids of the neurons that spiked at each timestep, one entry per step of the
/// horizon. Each step is ascending and free of duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpikeTrace {
    num_neurons: usize,
    steps: Vec<Vec<usize>>,
}

impl SpikeTrace {
    pub fn new(num_neurons: usize, mut steps: Vec<Vec<usize>>) -> Self {
        for step in &mut steps {
            step.sort_unstable();
            step.dedup();
        }

        Self { num_neurons, steps }
    }

    pub fn horizon(&self) -> usize {
        self.steps.len()
    }

    pub fn num_neurons(&self) -> usize {
        self.num_neurons
    }

    pub fn spikes_at(&self, t: usize) -> &[usize] {
        self.steps.get(t).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn steps(&self) -> &[Vec<usize>] {
        &self.steps
    }

    pub fn spike_count(&self) -> usize {
        self.steps.iter().map(Vec::len).sum()
    }

    pub fn spike_times(&self, nid: usize) -> Vec<usize> {
        self.steps
            .iter()
            .enumerate()
            .filter(|(_, step)| step.binary_search(&nid).is_ok())
            .map(|(t, _)| t)
            .collect()
    }

    /// Neurons that spike at least once, ascending.
    pub fn spiking_neurons(&self) -> Vec<usize> {
        let mut nids: Vec<usize> = self.steps.iter().flatten().copied().collect();
        nids.sort_unstable();
        nids.dedup();
        nids
    }
}

pub fn simulate(snapshot: &NetworkSnapshot) -> RadSimResult<SpikeTrace> {
    simulate_with_model(snapshot, |neuron: &NeuronSpec| {
        LifNeuron::new(&neuron.neuron_params, neuron.initial_potential)
    })
}

/// Runs the network over its horizon with one model instance per neuron.
/// All neurons of a step see only spikes from earlier steps.
pub fn simulate_with_model<M, F>(
    snapshot: &NetworkSnapshot,
    mut create_model: F,
) -> RadSimResult<SpikeTrace>
where
    M: NeuronModel,
    F: FnMut(&NeuronSpec) -> M,
{
    let neurons = snapshot.neurons();
    let num_neurons = neurons.len();
    let horizon = snapshot.horizon();

    let synapse_targets: Vec<usize> = snapshot
        .synapses()
        .iter()
        .map(|synapse| index_of(snapshot, synapse.target))
        .collect::<SimpleResult<_>>()
        .map_err(RadSimError::invariant)?;

    let mut models: Vec<M> = neurons.iter().map(&mut create_model).collect();
    let mut next_active_t = vec![0; num_neurons];
    let mut currents = vec![0.0f32; num_neurons];
    let mut in_flight: DelayBuffer<(usize, f32)> = DelayBuffer::new(snapshot.max_delay());

    let mut steps = Vec::with_capacity(horizon);
    let mut spiking_idxs = Vec::new();

    for t in 0..horizon {
        currents.fill(0.0);
        spiking_idxs.clear();

        for nid in snapshot.input_spikes_at(t) {
            let idx = index_of(snapshot, *nid).map_err(RadSimError::invariant)?;
            currents[idx] += snapshot.input_weight();
        }

        for (target_idx, weight) in in_flight.advance() {
            currents[target_idx] += weight;
        }

        for perturbation in snapshot.perturbations_at(t) {
            let idx = index_of(snapshot, perturbation.nid()).map_err(RadSimError::invariant)?;

            currents[idx] += match perturbation {
                Perturbation::PotentialShift { delta, .. } => *delta,
                Perturbation::SpuriousInput { weight, .. } => *weight,
            };
        }

        for (idx, neuron) in neurons.iter().enumerate() {
            if !neuron.is_alive_at(t) {
                continue;
            }

            if t < next_active_t[idx] {
                continue;
            }

            let model = &mut models[idx];
            let potential = model.integrate(currents[idx]);

            if model.fires(potential) {
                model.reset();
                next_active_t[idx] = t + neuron.neuron_params.refractory_period + 1;
                spiking_idxs.push(idx);
            }
        }

        // guards the liveness filter above against regressions
        check_no_dead_spikes(neurons, &spiking_idxs, t).map_err(RadSimError::invariant)?;

        for idx in &spiking_idxs {
            for syn_idx in snapshot.out_edge_indices(*idx) {
                let synapse = &snapshot.synapses()[*syn_idx];
                in_flight.schedule(synapse.delay, (synapse_targets[*syn_idx], synapse.weight));
            }
        }

        steps.push(spiking_idxs.iter().map(|idx| neurons[*idx].id).collect());
    }

    let trace = SpikeTrace::new(num_neurons, steps);

    debug!(
        "simulated {} neurons over {} steps: {} spikes, {} still in flight",
        num_neurons,
        horizon,
        trace.spike_count(),
        in_flight.num_pending()
    );

    Ok(trace)
}

fn index_of(snapshot: &NetworkSnapshot, nid: usize) -> SimpleResult<usize> {
    snapshot
        .index_of(nid)
        .ok_or_else(|| SimpleError::new(format!("neuron {} is not part of the network", nid)))
}

fn check_no_dead_spikes(
    neurons: &[NeuronSpec],
    spiking_idxs: &[usize],
    t: usize,
) -> SimpleResult<()> {
    match spiking_idxs
        .iter()
        .map(|idx| &neurons[*idx])
        .find(|neuron| !neuron.is_alive_at(t))
    {
        Some(neuron) => Err(SimpleError::new(format!(
            "dead neuron {} spiked at t = {}",
            neuron.id, t
        ))),
        None => Ok(()),
    }
}
