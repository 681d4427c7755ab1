use log::debug;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use simple_error::{SimpleError, SimpleResult};

use crate::effect::RadiationEffect;
use crate::error::{RadSimError, RadSimResult};
use crate::params::{Scope, Severity};
use crate::snapshot::{NetworkSnapshot, Perturbation};

const FLOOR_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FaultChange {
    Death,
    PotentialShift { delta: f32 },
    /// A spurious spike of the faulted neuron reaching `target` with `weight`.
    SpuriousInput { target: usize, weight: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultEvent {
    pub t: usize,
    pub nid: usize,
    pub kind: String,
    pub change: FaultChange,
}

/// Everything the injector altered, in the order it was applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaultRecord {
    events: Vec<FaultEvent>,
}

impl FaultRecord {
    pub fn events(&self) -> &[FaultEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Distinct neurons touched by any event, ascending.
    pub fn affected_neurons(&self) -> Vec<usize> {
        let mut nids: Vec<usize> = self.events.iter().map(|event| event.nid).collect();
        nids.sort_unstable();
        nids.dedup();
        nids
    }

    pub fn dead_neurons(&self) -> Vec<usize> {
        self.events
            .iter()
            .filter(|event| event.change == FaultChange::Death)
            .map(|event| event.nid)
            .collect()
    }

    pub fn earliest_t(&self) -> Option<usize> {
        self.events.iter().map(|event| event.t).min()
    }

    fn push(&mut self, event: FaultEvent) {
        self.events.push(event);
    }
}

/// Handle through which an effect alters the cloned snapshot. Every change
/// is recorded, so the fault record cannot drift from the faulted network.
pub struct FaultTarget<'a> {
    snapshot: &'a mut NetworkSnapshot,
    record: &'a mut FaultRecord,
    kind: &'a str,
}

impl<'a> FaultTarget<'a> {
    fn new(snapshot: &'a mut NetworkSnapshot, record: &'a mut FaultRecord, kind: &'a str) -> Self {
        Self {
            snapshot,
            record,
            kind,
        }
    }

    pub fn snapshot(&self) -> &NetworkSnapshot {
        &*self.snapshot
    }

    pub fn kill_neuron(&mut self, nid: usize, onset: usize) -> SimpleResult<()> {
        if !self.snapshot.kill_neuron(nid, onset) {
            return Err(unknown_neuron(nid));
        }

        self.record(onset, nid, FaultChange::Death);
        Ok(())
    }

    pub fn shift_potential(&mut self, t: usize, nid: usize, delta: f32) -> SimpleResult<()> {
        self.check_neuron(nid)?;
        self.snapshot
            .add_perturbation(t, Perturbation::PotentialShift { nid, delta });
        self.record(t, nid, FaultChange::PotentialShift { delta });
        Ok(())
    }

    /// Delivers `weight` to `target` at `t` on behalf of `nid`, leaving the
    /// state of `nid` itself untouched.
    pub fn inject_input(
        &mut self,
        t: usize,
        nid: usize,
        target: usize,
        weight: f32,
    ) -> SimpleResult<()> {
        self.check_neuron(nid)?;
        self.check_neuron(target)?;
        self.snapshot.add_perturbation(
            t,
            Perturbation::SpuriousInput {
                nid: target,
                weight,
            },
        );
        self.record(t, nid, FaultChange::SpuriousInput { target, weight });
        Ok(())
    }

    fn check_neuron(&self, nid: usize) -> SimpleResult<()> {
        if self.snapshot.contains(nid) {
            Ok(())
        } else {
            Err(unknown_neuron(nid))
        }
    }

    fn record(&mut self, t: usize, nid: usize, change: FaultChange) {
        self.record.push(FaultEvent {
            t,
            nid,
            kind: self.kind.to_owned(),
            change,
        });
    }
}

fn unknown_neuron(nid: usize) -> SimpleError {
    SimpleError::new(format!("fault targets unknown neuron {}", nid))
}

/// Applies `effect` to a deep copy of `snapshot`. The same snapshot, effect
/// and seed always produce the same faulted snapshot and record.
pub fn inject(
    snapshot: &NetworkSnapshot,
    effect: &dyn RadiationEffect,
    seed: u64,
) -> RadSimResult<(NetworkSnapshot, FaultRecord)> {
    effect
        .validate_against(snapshot)
        .map_err(RadSimError::parameter)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut faulted = snapshot.clone();
    let mut record = FaultRecord::default();

    {
        let mut target = FaultTarget::new(&mut faulted, &mut record, effect.kind());
        effect
            .inject(&mut target, &mut rng)
            .map_err(RadSimError::parameter)?;
    }

    verify_faults_applied(&faulted, &record).map_err(RadSimError::invariant)?;

    debug!(
        "injected {} (seed {}): {} fault events on {} neurons",
        effect.kind(),
        seed,
        record.len(),
        record.affected_neurons().len()
    );

    Ok((faulted, record))
}

fn verify_faults_applied(faulted: &NetworkSnapshot, record: &FaultRecord) -> SimpleResult<()> {
    for event in record.events() {
        let neuron = faulted.neuron(event.nid).ok_or_else(|| unknown_neuron(event.nid))?;

        let is_applied = match event.change {
            FaultChange::Death => neuron.dead_from.map_or(false, |onset| onset <= event.t),
            FaultChange::PotentialShift { delta } => faulted
                .perturbations_at(event.t)
                .contains(&Perturbation::PotentialShift {
                    nid: event.nid,
                    delta,
                }),
            FaultChange::SpuriousInput { target, weight } => faulted
                .perturbations_at(event.t)
                .contains(&Perturbation::SpuriousInput {
                    nid: target,
                    weight,
                }),
        };

        if !is_applied {
            return Err(SimpleError::new(format!(
                "{:?} of neuron {} at t = {} is recorded but not applied",
                event.change, event.nid, event.t
            )));
        }
    }

    Ok(())
}

/// Candidate population of an effect, ascending and without duplicates.
pub fn resolve_population(snapshot: &NetworkSnapshot, scope: &Scope) -> SimpleResult<Vec<usize>> {
    match scope {
        Scope::All => {
            let mut nids: Vec<usize> = snapshot.neuron_ids().collect();
            nids.sort_unstable();
            Ok(nids)
        }
        Scope::Subpopulation(nids) => {
            if let Some(nid) = nids.iter().find(|nid| !snapshot.contains(**nid)) {
                return Err(SimpleError::new(format!(
                    "subpopulation references unknown neuron {}",
                    nid
                )));
            }

            let mut nids = nids.clone();
            nids.sort_unstable();
            nids.dedup();
            Ok(nids)
        }
    }
}

pub fn resolve_affected_count(
    severity: &Severity,
    population_size: usize,
    num_neurons: usize,
) -> SimpleResult<usize> {
    let count = match *severity {
        Severity::Fraction(fraction) => floor_tolerant(fraction * population_size as f64),
        Severity::Count(count) => {
            if count > num_neurons {
                return Err(SimpleError::new(format!(
                    "severity count {} exceeds neuron count {}",
                    count, num_neurons
                )));
            }
            count
        }
    };

    Ok(count.min(population_size))
}

/// Floor that absorbs representation error, e.g. 0.29 * 100 = 28.999999999999996.
fn floor_tolerant(value: f64) -> usize {
    let nearest = value.round();

    if (value - nearest).abs() <= FLOOR_TOLERANCE * nearest.max(1.0) {
        nearest as usize
    } else {
        value.floor() as usize
    }
}

/// Uniform sampling without replacement. The candidates are shuffled as a
/// whole and a prefix is taken, so for a fixed seed a larger count always
/// selects a superset.
pub fn sample_affected(population: &[usize], count: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut shuffled = population.to_vec();
    shuffled.shuffle(rng);
    shuffled.truncate(count);
    shuffled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{
        create_membrane_perturbation, create_neuron_death, create_spurious_spike,
        create_spurious_synaptic_event, MEMBRANE_PERTURBATION, SPURIOUS_SPIKE,
        SPURIOUS_SYNAPTIC_EVENT,
    };
    use crate::params::EffectParams;
    use crate::util::test_util;
    use itertools::assert_equal;

    fn snapshot(num_neurons: usize) -> NetworkSnapshot {
        NetworkSnapshot::new(&test_util::ring_network_params(num_neurons, 1.5, 10)).unwrap()
    }

    #[test]
    fn population_all() {
        let sut = snapshot(4);
        assert_eq!(resolve_population(&sut, &Scope::All).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn population_subset_is_deduplicated() {
        let sut = snapshot(4);
        assert_eq!(
            resolve_population(&sut, &Scope::Subpopulation(vec![3, 1, 3])).unwrap(),
            vec![1, 3]
        );
    }

    #[test]
    fn population_unknown_neuron() {
        let sut = snapshot(4);
        assert_eq!(
            resolve_population(&sut, &Scope::Subpopulation(vec![1, 9]))
                .unwrap_err()
                .as_str(),
            "subpopulation references unknown neuron 9"
        );
    }

    #[test]
    fn affected_count() {
        assert_eq!(resolve_affected_count(&Severity::Fraction(0.5), 5, 5).unwrap(), 2);
        assert_eq!(resolve_affected_count(&Severity::Fraction(0.1), 5, 5).unwrap(), 0);
        assert_eq!(resolve_affected_count(&Severity::Fraction(1.0), 5, 5).unwrap(), 5);
        assert_eq!(resolve_affected_count(&Severity::Count(3), 5, 5).unwrap(), 3);

        // clamped to the subpopulation
        assert_eq!(resolve_affected_count(&Severity::Count(3), 2, 5).unwrap(), 2);

        for (fraction, expected) in [(0.29, 29), (0.57, 57), (0.58, 58), (0.999, 99), (0.015, 1)] {
            assert_eq!(
                resolve_affected_count(&Severity::Fraction(fraction), 100, 100).unwrap(),
                expected
            );
        }
        assert_eq!(resolve_affected_count(&Severity::Fraction(0.7), 10, 10).unwrap(), 7);

        assert_eq!(
            resolve_affected_count(&Severity::Count(6), 5, 5)
                .unwrap_err()
                .as_str(),
            "severity count 6 exceeds neuron count 5"
        );
    }

    #[test]
    fn sampling_is_reproducible() {
        let population: Vec<usize> = (0..50).collect();

        let first = sample_affected(&population, 10, &mut StdRng::seed_from_u64(3));
        let second = sample_affected(&population, 10, &mut StdRng::seed_from_u64(3));

        assert_eq!(first, second);
        assert_eq!(first.len(), 10);

        let mut distinct = first.clone();
        distinct.sort_unstable();
        distinct.dedup();
        assert_eq!(distinct.len(), 10);
    }

    #[test]
    fn sampling_is_nested() {
        let population: Vec<usize> = (0..30).collect();

        let mut previous = Vec::new();
        for count in 0..=30 {
            let sample = sample_affected(&population, count, &mut StdRng::seed_from_u64(11));
            assert_eq!(sample.len(), count);
            assert!(previous.iter().all(|nid| sample.contains(nid)));
            previous = sample;
        }
    }

    #[test]
    fn target_records_every_change() {
        let mut faulted = snapshot(3);
        let mut record = FaultRecord::default();

        {
            let mut sut = FaultTarget::new(&mut faulted, &mut record, "test_effect");
            sut.kill_neuron(2, 4).unwrap();
            sut.shift_potential(1, 0, 0.25).unwrap();
            sut.inject_input(3, 1, 2, 1.5).unwrap();
            assert!(sut.kill_neuron(7, 0).is_err());
            assert!(sut.inject_input(0, 7, 1, 1.0).is_err());
            assert!(sut.inject_input(0, 1, 7, 1.0).is_err());
        }

        assert_eq!(record.len(), 3);
        assert_eq!(record.affected_neurons(), vec![0, 1, 2]);
        assert_eq!(
            faulted.perturbations_at(3),
            [Perturbation::SpuriousInput {
                nid: 2,
                weight: 1.5
            }]
        );
        assert_eq!(record.dead_neurons(), vec![2]);
        assert_eq!(record.earliest_t(), Some(1));
        assert!(record.events().iter().all(|event| event.kind == "test_effect"));
        assert!(verify_faults_applied(&faulted, &record).is_ok());
    }

    fn death(severity: Severity) -> Box<dyn RadiationEffect> {
        create_neuron_death(&EffectParams::neuron_death(severity)).unwrap()
    }

    #[test]
    fn death_is_deterministic() {
        let baseline = snapshot(20);
        let effect = death(Severity::Fraction(0.3));

        let (first, first_record) = inject(&baseline, effect.as_ref(), 5).unwrap();
        let (second, second_record) = inject(&baseline, effect.as_ref(), 5).unwrap();

        assert_eq!(first, second);
        assert_eq!(first_record, second_record);
        assert_eq!(first.dead_neurons().len(), 6);
        assert!(baseline.dead_neurons().is_empty());
    }

    #[test]
    fn decimal_fractions_kill_exact_count() {
        let baseline = snapshot(100);

        for (fraction, expected) in [(0.29, 29), (0.57, 57), (0.58, 58)] {
            let (faulted, record) =
                inject(&baseline, death(Severity::Fraction(fraction)).as_ref(), 0).unwrap();

            assert_eq!(faulted.dead_neurons().len(), expected);
            assert_eq!(record.len(), expected);
        }
    }

    #[test]
    fn zero_affected_is_identical_clone() {
        let baseline = snapshot(5);

        let (faulted, record) =
            inject(&baseline, death(Severity::Fraction(0.1)).as_ref(), 1).unwrap();

        assert!(record.is_empty());
        assert_eq!(faulted, baseline);
    }

    #[test]
    fn higher_severity_kills_superset() {
        let baseline = snapshot(40);

        let mut previous: Vec<usize> = Vec::new();
        for count in 1..=40 {
            let (faulted, record) =
                inject(&baseline, death(Severity::Count(count)).as_ref(), 9).unwrap();
            let mut dead = faulted.dead_neurons();
            dead.sort_unstable();

            assert_eq!(dead.len(), count);
            assert_eq!(record.dead_neurons().len(), count);
            assert!(previous.iter().all(|nid| dead.contains(nid)));
            previous = dead;
        }
    }

    #[test]
    fn count_above_neuron_count() {
        let baseline = snapshot(5);

        let result = inject(&baseline, death(Severity::Count(6)).as_ref(), 0);

        assert_eq!(
            result.unwrap_err(),
            RadSimError::InvalidParameter("severity count 6 exceeds neuron count 5".to_owned())
        );
    }

    #[test]
    fn subpopulation_only() {
        let baseline = snapshot(10);
        let mut effect_params = EffectParams::neuron_death(Severity::Fraction(1.0));
        effect_params.scope = Scope::Subpopulation(vec![7, 2, 4]);
        effect_params.onset = 3;
        let effect = create_neuron_death(&effect_params).unwrap();

        let (faulted, record) = inject(&baseline, effect.as_ref(), 2).unwrap();

        let mut dead = faulted.dead_neurons();
        dead.sort_unstable();
        assert_eq!(dead, vec![2, 4, 7]);
        assert!(record.events().iter().all(|event| event.t == 3));
    }

    #[test]
    fn unknown_subpopulation_neuron() {
        let baseline = snapshot(3);
        let mut effect_params = EffectParams::neuron_death(Severity::Count(1));
        effect_params.scope = Scope::Subpopulation(vec![8]);
        let effect = create_neuron_death(&effect_params).unwrap();

        let result = inject(&baseline, effect.as_ref(), 2);

        assert!(matches!(result, Err(RadSimError::InvalidParameter(_))));
    }

    #[test]
    fn onset_beyond_horizon_is_recorded() {
        let baseline = snapshot(4);
        let mut effect_params = EffectParams::neuron_death(Severity::Count(2));
        effect_params.onset = 100;
        let effect = create_neuron_death(&effect_params).unwrap();

        let (faulted, record) = inject(&baseline, effect.as_ref(), 0).unwrap();

        assert_eq!(record.len(), 2);
        assert_eq!(record.earliest_t(), Some(100));
        assert!(faulted
            .neurons()
            .iter()
            .all(|neuron| neuron.is_alive_at(baseline.horizon() - 1)));
    }

    #[test]
    fn perturbations_are_drawn_at_injection() {
        let baseline = snapshot(6);
        let mut effect_params = EffectParams::new(MEMBRANE_PERTURBATION);
        effect_params.amplitude = Some(-0.5);
        effect_params.probability_per_t = Some(1.0);
        effect_params.onset = 7;
        let effect = create_membrane_perturbation(&effect_params).unwrap();

        let (faulted, record) = inject(&baseline, effect.as_ref(), 3).unwrap();

        // every neuron at t = 7, 8, 9
        assert_eq!(record.len(), 18);
        assert_eq!(faulted.num_perturbations(), 18);
        assert_eq!(faulted.perturbations_at(8).len(), 6);
        assert!(faulted.perturbations_at(6).is_empty());
        assert!(faulted.dead_neurons().is_empty());
    }

    #[test]
    fn spurious_spikes_follow_probability() {
        let baseline = snapshot(10);
        let mut effect_params = EffectParams::new(SPURIOUS_SPIKE);
        effect_params.probability_per_t = Some(0.0);
        let effect = create_spurious_spike(&effect_params).unwrap();

        let (faulted, record) = inject(&baseline, effect.as_ref(), 3).unwrap();
        assert!(record.is_empty());
        assert_eq!(faulted, baseline);

        effect_params.probability_per_t = Some(0.5);
        effect_params.severity = Some(Severity::Count(2));
        let effect = create_spurious_spike(&effect_params).unwrap();

        let (first, first_record) = inject(&baseline, effect.as_ref(), 8).unwrap();
        let (second, _) = inject(&baseline, effect.as_ref(), 8).unwrap();

        assert_eq!(first, second);
        assert!(first_record.affected_neurons().len() <= 2);
        assert!(first.dead_neurons().is_empty());
    }

    #[test]
    fn spurious_spike_reaches_out_neighbours() {
        let baseline = snapshot(5);
        let mut effect_params = EffectParams::new(SPURIOUS_SPIKE);
        effect_params.probability_per_t = Some(1.0);
        effect_params.scope = Scope::Subpopulation(vec![3]);
        effect_params.onset = 6;
        let effect = create_spurious_spike(&effect_params).unwrap();

        let (faulted, record) = inject(&baseline, effect.as_ref(), 0).unwrap();

        // emitted at t = 6, 7, 8, arriving one step later
        assert_equal(record.events().iter().map(|event| event.t), [7, 8, 9]);
        assert!(record.events().iter().all(|event| event.nid == 3
            && event.change
                == FaultChange::SpuriousInput {
                    target: 4,
                    weight: 1.5
                }));
        assert!(faulted.perturbations_at(6).is_empty());
        assert_eq!(
            faulted.perturbations_at(9),
            [Perturbation::SpuriousInput {
                nid: 4,
                weight: 1.5
            }]
        );
    }

    #[test]
    fn spurious_synaptic_events_per_synapse() {
        let baseline = NetworkSnapshot::new(&test_util::fan_network_params(5, 6)).unwrap();
        let mut effect_params = EffectParams::new(SPURIOUS_SYNAPTIC_EVENT);
        effect_params.probability_per_t = Some(1.0);
        effect_params.scope = Scope::Subpopulation(vec![0]);
        effect_params.onset = 3;
        let effect = create_spurious_synaptic_event(&effect_params).unwrap();

        let (faulted, record) = inject(&baseline, effect.as_ref(), 4).unwrap();

        // three synapses out of neuron 0, arrivals at t = 4, 5
        assert_eq!(record.len(), 6);
        assert_eq!(record.affected_neurons(), vec![0]);
        assert_eq!(faulted.num_perturbations(), 6);
        assert_equal(
            faulted.perturbations_at(4).iter().map(Perturbation::nid),
            [1, 2, 3],
        );

        effect_params.probability_per_t = Some(0.3);
        effect_params.scope = Scope::All;
        effect_params.onset = 0;
        let effect = create_spurious_synaptic_event(&effect_params).unwrap();

        let (first, first_record) = inject(&baseline, effect.as_ref(), 4).unwrap();
        let (second, second_record) = inject(&baseline, effect.as_ref(), 4).unwrap();

        assert_eq!(first, second);
        assert_eq!(first_record, second_record);
        assert!(first_record
            .events()
            .iter()
            .all(|event| event.kind == SPURIOUS_SYNAPTIC_EVENT && event.t >= 1));
    }

    #[test]
    fn verification_detects_missing_fault() {
        let faulted = snapshot(3);
        let mut record = FaultRecord::default();
        record.push(FaultEvent {
            t: 0,
            nid: 1,
            kind: "test_effect".to_owned(),
            change: FaultChange::Death,
        });

        assert_eq!(
            verify_faults_applied(&faulted, &record)
                .unwrap_err()
                .as_str(),
            "Death of neuron 1 at t = 0 is recorded but not applied"
        );
    }
}
