use serde::{Deserialize, Serialize};
use simple_error::{SimpleError, SimpleResult};

use crate::error::{RadSimError, RadSimResult};
use crate::inject::FaultRecord;
use crate::simulator::SpikeTrace;
use crate::util::sorted_difference;

/// Spiking difference at a single timestep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDivergence {
    pub t: usize,
    /// Spiked in the baseline only.
    pub missing: Vec<usize>,
    /// Spiked in the faulted run only.
    pub extra: Vec<usize>,
}

/// Identifies the experiment a report belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentLabel {
    pub seed: u64,
    pub effect_kind: String,
    pub effect_fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceReport {
    pub label: Option<ExperimentLabel>,
    pub horizon: usize,
    pub num_neurons: usize,
    pub first_divergence: Option<usize>,
    pub divergent_steps: Vec<StepDivergence>,
    /// Neurons whose spiking differs at least once, ascending.
    pub affected_neurons: Vec<usize>,
    pub impact_score: f64,
    pub silenced_neurons: Vec<usize>,
    pub directly_faulted_neurons: Vec<usize>,
    pub propagated_neurons: Vec<usize>,
    pub fault_onset: Option<usize>,
    pub divergence_latency: Option<usize>,
    pub fault_record: FaultRecord,
}

impl DivergenceReport {
    pub fn is_divergent(&self) -> bool {
        self.first_divergence.is_some()
    }

    pub fn silenced_fraction(&self) -> f64 {
        fraction(self.silenced_neurons.len(), self.num_neurons)
    }

    /// All (t, nid) pairs where exactly one of the runs spiked.
    pub fn symmetric_difference(&self) -> Vec<(usize, usize)> {
        self.divergent_steps
            .iter()
            .flat_map(|step| {
                let mut nids: Vec<usize> =
                    step.missing.iter().chain(step.extra.iter()).copied().collect();
                nids.sort_unstable();
                nids.into_iter().map(move |nid| (step.t, nid))
            })
            .collect()
    }

    pub fn with_label(mut self, label: ExperimentLabel) -> Self {
        self.label = Some(label);
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

pub fn compare(
    baseline: &SpikeTrace,
    faulted: &SpikeTrace,
    fault_record: &FaultRecord,
) -> RadSimResult<DivergenceReport> {
    check_alignment(baseline, faulted).map_err(RadSimError::invariant)?;

    let mut divergent_steps = Vec::new();
    let mut affected_neurons = Vec::new();

    for (t, (baseline_step, faulted_step)) in baseline
        .steps()
        .iter()
        .zip(faulted.steps().iter())
        .enumerate()
    {
        let (missing, extra) = sorted_difference(baseline_step, faulted_step);

        if !missing.is_empty() || !extra.is_empty() {
            affected_neurons.extend(missing.iter().chain(extra.iter()));
            divergent_steps.push(StepDivergence { t, missing, extra });
        }
    }

    affected_neurons.sort_unstable();
    affected_neurons.dedup();

    let first_divergence = divergent_steps.first().map(|step| step.t);

    let (silenced_neurons, _) =
        sorted_difference(&baseline.spiking_neurons(), &faulted.spiking_neurons());

    let directly_faulted_neurons = fault_record.affected_neurons();
    let (propagated_neurons, _) = sorted_difference(&affected_neurons, &directly_faulted_neurons);

    let fault_onset = fault_record.earliest_t();
    let divergence_latency = match (first_divergence, fault_onset) {
        (Some(first), Some(onset)) => first.checked_sub(onset),
        _ => None,
    };

    Ok(DivergenceReport {
        label: None,
        horizon: baseline.horizon(),
        num_neurons: baseline.num_neurons(),
        first_divergence,
        divergent_steps,
        impact_score: fraction(affected_neurons.len(), baseline.num_neurons()),
        affected_neurons,
        silenced_neurons,
        directly_faulted_neurons,
        propagated_neurons,
        fault_onset,
        divergence_latency,
        fault_record: fault_record.clone(),
    })
}

fn check_alignment(baseline: &SpikeTrace, faulted: &SpikeTrace) -> SimpleResult<()> {
    if baseline.horizon() != faulted.horizon() {
        return Err(SimpleError::new(format!(
            "trace horizons differ: {} vs {}",
            baseline.horizon(),
            faulted.horizon()
        )));
    }

    if baseline.num_neurons() != faulted.num_neurons() {
        return Err(SimpleError::new(format!(
            "trace neuron counts differ: {} vs {}",
            baseline.num_neurons(),
            faulted.num_neurons()
        )));
    }

    Ok(())
}

fn fraction(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}
