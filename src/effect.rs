use std::fmt::Debug;
use std::ops::Range;

use rand::{distributions::Bernoulli, prelude::Distribution, rngs::StdRng};
use simple_error::{try_with, SimpleError, SimpleResult};

use crate::inject::{resolve_affected_count, resolve_population, sample_affected, FaultTarget};
use crate::params::{self, EffectParams, Scope, Severity};
use crate::snapshot::NetworkSnapshot;

pub const NEURON_DEATH: &str = "neuron_death";
pub const MEMBRANE_PERTURBATION: &str = "membrane_perturbation";
pub const SPURIOUS_SPIKE: &str = "spurious_spike";
pub const SPURIOUS_SYNAPTIC_EVENT: &str = "spurious_synaptic_event";

/// A radiation effect that can be applied to a network. Implementations only
/// alter the network through the `FaultTarget`, and draw all randomness from
/// the provided generator.
pub trait RadiationEffect: Debug + Send + Sync {
    fn kind(&self) -> &str;

    fn onset(&self) -> usize;

    /// Checks that depend on the concrete network, run before injection.
    fn validate_against(&self, _snapshot: &NetworkSnapshot) -> SimpleResult<()> {
        Ok(())
    }

    fn inject(&self, target: &mut FaultTarget<'_>, rng: &mut StdRng) -> SimpleResult<()>;
}

#[derive(Debug, Clone)]
struct AffectedSet {
    severity: Severity,
    scope: Scope,
}

impl AffectedSet {
    fn new(severity: Severity, scope: Scope) -> SimpleResult<Self> {
        params::validate_severity(&severity)?;
        params::validate_scope(&scope)?;
        Ok(Self { severity, scope })
    }

    fn validate_against(&self, snapshot: &NetworkSnapshot) -> SimpleResult<()> {
        let population = resolve_population(snapshot, &self.scope)?;
        resolve_affected_count(&self.severity, population.len(), snapshot.num_neurons())?;
        Ok(())
    }

    fn sample(&self, snapshot: &NetworkSnapshot, rng: &mut StdRng) -> SimpleResult<Vec<usize>> {
        let population = resolve_population(snapshot, &self.scope)?;
        let count =
            resolve_affected_count(&self.severity, population.len(), snapshot.num_neurons())?;
        Ok(sample_affected(&population, count, rng))
    }
}

#[derive(Debug, Clone)]
pub struct NeuronDeath {
    affected: AffectedSet,
    onset: usize,
}

impl NeuronDeath {
    pub fn new(severity: Severity, scope: Scope, onset: usize) -> SimpleResult<Self> {
        Ok(Self {
            affected: AffectedSet::new(severity, scope)?,
            onset,
        })
    }
}

impl RadiationEffect for NeuronDeath {
    fn kind(&self) -> &str {
        NEURON_DEATH
    }

    fn onset(&self) -> usize {
        self.onset
    }

    fn validate_against(&self, snapshot: &NetworkSnapshot) -> SimpleResult<()> {
        self.affected.validate_against(snapshot)
    }

    fn inject(&self, target: &mut FaultTarget<'_>, rng: &mut StdRng) -> SimpleResult<()> {
        for nid in self.affected.sample(target.snapshot(), rng)? {
            target.kill_neuron(nid, self.onset)?;
        }

        Ok(())
    }
}

/// Shifts the membrane potential of the affected neurons by `amplitude`,
/// independently at each step from onset with `probability_per_t`.
#[derive(Debug, Clone)]
pub struct MembranePerturbation {
    affected: AffectedSet,
    onset: usize,
    amplitude: f32,
    occurrence: Bernoulli,
}

impl MembranePerturbation {
    pub fn new(
        severity: Severity,
        scope: Scope,
        onset: usize,
        amplitude: f32,
        probability_per_t: f64,
    ) -> SimpleResult<Self> {
        params::validate_amplitude(amplitude)?;

        Ok(Self {
            affected: AffectedSet::new(severity, scope)?,
            onset,
            amplitude,
            occurrence: bernoulli(probability_per_t)?,
        })
    }
}

impl RadiationEffect for MembranePerturbation {
    fn kind(&self) -> &str {
        MEMBRANE_PERTURBATION
    }

    fn onset(&self) -> usize {
        self.onset
    }

    fn validate_against(&self, snapshot: &NetworkSnapshot) -> SimpleResult<()> {
        self.affected.validate_against(snapshot)
    }

    fn inject(&self, target: &mut FaultTarget<'_>, rng: &mut StdRng) -> SimpleResult<()> {
        let affected = self.affected.sample(target.snapshot(), rng)?;

        for t in self.onset..target.snapshot().horizon() {
            for nid in &affected {
                if self.occurrence.sample(rng) {
                    target.shift_potential(t, *nid, self.amplitude)?;
                }
            }
        }

        Ok(())
    }
}

/// Each affected neuron emits spurious spikes, independently at each step
/// from onset with `probability_per_t`. A spurious spike reaches every
/// out-neighbour with the synapse weight one step later. The neuron's own
/// potential and refractory state are left alone.
#[derive(Debug, Clone)]
pub struct SpuriousSpike {
    affected: AffectedSet,
    onset: usize,
    occurrence: Bernoulli,
}

impl SpuriousSpike {
    pub fn new(
        severity: Severity,
        scope: Scope,
        onset: usize,
        probability_per_t: f64,
    ) -> SimpleResult<Self> {
        Ok(Self {
            affected: AffectedSet::new(severity, scope)?,
            onset,
            occurrence: bernoulli(probability_per_t)?,
        })
    }
}

impl RadiationEffect for SpuriousSpike {
    fn kind(&self) -> &str {
        SPURIOUS_SPIKE
    }

    fn onset(&self) -> usize {
        self.onset
    }

    fn validate_against(&self, snapshot: &NetworkSnapshot) -> SimpleResult<()> {
        self.affected.validate_against(snapshot)
    }

    fn inject(&self, target: &mut FaultTarget<'_>, rng: &mut StdRng) -> SimpleResult<()> {
        let affected = self.affected.sample(target.snapshot(), rng)?;
        let fan_outs: Vec<Vec<OutSynapse>> = affected
            .iter()
            .map(|nid| out_synapses(target.snapshot(), *nid))
            .collect();

        for t in arrival_steps(self.onset, target.snapshot().horizon()) {
            for fan_out in &fan_outs {
                if self.occurrence.sample(rng) {
                    for synapse in fan_out {
                        target.inject_input(t, synapse.source, synapse.target, synapse.weight)?;
                    }
                }
            }
        }

        Ok(())
    }
}

/// Like `SpuriousSpike`, but every out-synapse of an affected neuron fires
/// on its own draw.
#[derive(Debug, Clone)]
pub struct SpuriousSynapticEvent {
    affected: AffectedSet,
    onset: usize,
    occurrence: Bernoulli,
}

impl SpuriousSynapticEvent {
    pub fn new(
        severity: Severity,
        scope: Scope,
        onset: usize,
        probability_per_t: f64,
    ) -> SimpleResult<Self> {
        Ok(Self {
            affected: AffectedSet::new(severity, scope)?,
            onset,
            occurrence: bernoulli(probability_per_t)?,
        })
    }
}

impl RadiationEffect for SpuriousSynapticEvent {
    fn kind(&self) -> &str {
        SPURIOUS_SYNAPTIC_EVENT
    }

    fn onset(&self) -> usize {
        self.onset
    }

    fn validate_against(&self, snapshot: &NetworkSnapshot) -> SimpleResult<()> {
        self.affected.validate_against(snapshot)
    }

    fn inject(&self, target: &mut FaultTarget<'_>, rng: &mut StdRng) -> SimpleResult<()> {
        let synapses: Vec<OutSynapse> = self
            .affected
            .sample(target.snapshot(), rng)?
            .into_iter()
            .flat_map(|nid| out_synapses(target.snapshot(), nid))
            .collect();

        for t in arrival_steps(self.onset, target.snapshot().horizon()) {
            for synapse in &synapses {
                if self.occurrence.sample(rng) {
                    target.inject_input(t, synapse.source, synapse.target, synapse.weight)?;
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct OutSynapse {
    source: usize,
    target: usize,
    weight: f32,
}

fn out_synapses(snapshot: &NetworkSnapshot, nid: usize) -> Vec<OutSynapse> {
    snapshot
        .out_edges(nid)
        .map(|synapse| OutSynapse {
            source: synapse.source,
            target: synapse.target,
            weight: synapse.weight,
        })
        .collect()
}

/// Spurious events emitted at t >= onset arrive at t + 1, within the horizon.
fn arrival_steps(onset: usize, horizon: usize) -> Range<usize> {
    onset.saturating_add(1)..horizon
}

fn bernoulli(probability_per_t: f64) -> SimpleResult<Bernoulli> {
    params::validate_probability_per_t(probability_per_t)?;
    Ok(try_with!(
        Bernoulli::new(probability_per_t),
        "invalid probability_per_t"
    ))
}

fn required<T: Copy>(value: Option<T>, kind: &str, name: &str) -> SimpleResult<T> {
    value.ok_or_else(|| SimpleError::new(format!("{} requires {}", kind, name)))
}

pub fn create_neuron_death(effect_params: &EffectParams) -> SimpleResult<Box<dyn RadiationEffect>> {
    let severity = effect_params
        .severity
        .clone()
        .ok_or_else(|| SimpleError::new(format!("{} requires severity", NEURON_DEATH)))?;

    Ok(Box::new(NeuronDeath::new(
        severity,
        effect_params.scope.clone(),
        effect_params.onset,
    )?))
}

pub fn create_membrane_perturbation(
    effect_params: &EffectParams,
) -> SimpleResult<Box<dyn RadiationEffect>> {
    let amplitude = required(effect_params.amplitude, MEMBRANE_PERTURBATION, "amplitude")?;
    let probability_per_t = required(
        effect_params.probability_per_t,
        MEMBRANE_PERTURBATION,
        "probability_per_t",
    )?;

    Ok(Box::new(MembranePerturbation::new(
        severity_or_all(effect_params),
        effect_params.scope.clone(),
        effect_params.onset,
        amplitude,
        probability_per_t,
    )?))
}

pub fn create_spurious_spike(
    effect_params: &EffectParams,
) -> SimpleResult<Box<dyn RadiationEffect>> {
    let probability_per_t = required(
        effect_params.probability_per_t,
        SPURIOUS_SPIKE,
        "probability_per_t",
    )?;

    Ok(Box::new(SpuriousSpike::new(
        severity_or_all(effect_params),
        effect_params.scope.clone(),
        effect_params.onset,
        probability_per_t,
    )?))
}

pub fn create_spurious_synaptic_event(
    effect_params: &EffectParams,
) -> SimpleResult<Box<dyn RadiationEffect>> {
    let probability_per_t = required(
        effect_params.probability_per_t,
        SPURIOUS_SYNAPTIC_EVENT,
        "probability_per_t",
    )?;

    Ok(Box::new(SpuriousSynapticEvent::new(
        severity_or_all(effect_params),
        effect_params.scope.clone(),
        effect_params.onset,
        probability_per_t,
    )?))
}

fn severity_or_all(effect_params: &EffectParams) -> Severity {
    effect_params
        .severity
        .clone()
        .unwrap_or(Severity::Fraction(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neuron_death_requires_severity() {
        let result = create_neuron_death(&EffectParams::new(NEURON_DEATH));
        assert_eq!(
            result.unwrap_err().as_str(),
            "neuron_death requires severity"
        );
    }

    #[test]
    fn neuron_death_rejects_invalid_severity() {
        let result = create_neuron_death(&EffectParams::neuron_death(Severity::Fraction(1.2)));
        assert_eq!(
            result.unwrap_err().as_str(),
            "severity fraction must be in (0, 1]"
        );

        let mut effect_params = EffectParams::neuron_death(Severity::Count(1));
        effect_params.scope = Scope::Subpopulation(Vec::new());
        assert_eq!(
            create_neuron_death(&effect_params).unwrap_err().as_str(),
            "subpopulation must not be empty"
        );
    }

    #[test]
    fn neuron_death_properties() {
        let mut effect_params = EffectParams::neuron_death(Severity::Count(2));
        effect_params.onset = 4;

        let sut = create_neuron_death(&effect_params).unwrap();

        assert_eq!(sut.kind(), NEURON_DEATH);
        assert_eq!(sut.onset(), 4);
    }

    #[test]
    fn perturbation_requires_parameters() {
        let mut effect_params = EffectParams::new(MEMBRANE_PERTURBATION);
        assert_eq!(
            create_membrane_perturbation(&effect_params)
                .unwrap_err()
                .as_str(),
            "membrane_perturbation requires amplitude"
        );

        effect_params.amplitude = Some(0.5);
        assert_eq!(
            create_membrane_perturbation(&effect_params)
                .unwrap_err()
                .as_str(),
            "membrane_perturbation requires probability_per_t"
        );

        effect_params.probability_per_t = Some(1.5);
        assert_eq!(
            create_membrane_perturbation(&effect_params)
                .unwrap_err()
                .as_str(),
            "probability_per_t must be in [0, 1]"
        );

        effect_params.probability_per_t = Some(0.5);
        effect_params.amplitude = Some(0.0);
        assert_eq!(
            create_membrane_perturbation(&effect_params)
                .unwrap_err()
                .as_str(),
            "amplitude must be finite and non-zero"
        );

        effect_params.amplitude = Some(-0.3);
        let sut = create_membrane_perturbation(&effect_params).unwrap();
        assert_eq!(sut.kind(), MEMBRANE_PERTURBATION);
    }

    #[test]
    fn spurious_spike_requires_probability() {
        let mut effect_params = EffectParams::new(SPURIOUS_SPIKE);
        assert_eq!(
            create_spurious_spike(&effect_params).unwrap_err().as_str(),
            "spurious_spike requires probability_per_t"
        );

        effect_params.probability_per_t = Some(0.0);
        assert_eq!(
            create_spurious_spike(&effect_params).unwrap().kind(),
            SPURIOUS_SPIKE
        );
    }

    #[test]
    fn spurious_synaptic_event_requires_probability() {
        let mut effect_params = EffectParams::new(SPURIOUS_SYNAPTIC_EVENT);
        assert_eq!(
            create_spurious_synaptic_event(&effect_params)
                .unwrap_err()
                .as_str(),
            "spurious_synaptic_event requires probability_per_t"
        );

        effect_params.probability_per_t = Some(0.25);
        effect_params.onset = 2;
        let sut = create_spurious_synaptic_event(&effect_params).unwrap();
        assert_eq!(sut.kind(), SPURIOUS_SYNAPTIC_EVENT);
        assert_eq!(sut.onset(), 2);
    }

    #[test]
    fn arrivals_follow_onset() {
        assert_eq!(arrival_steps(0, 5), 1..5);
        assert!(arrival_steps(4, 5).is_empty());
        assert!(arrival_steps(usize::MAX, 5).is_empty());
    }
}
