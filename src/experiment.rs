use std::ops::Deref;
use std::sync::mpsc::channel as mpsc_channel;
use std::sync::Arc;
use std::thread;

use core_affinity::CoreId;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use simple_error::SimpleError;
use statrs::statistics::Statistics;

use crate::divergence::{self, DivergenceReport, ExperimentLabel};
use crate::effect::RadiationEffect;
use crate::error::{RadSimError, RadSimResult};
use crate::inject;
use crate::params::{self, EffectParams, ExperimentParams, TechnicalParams};
use crate::registry::EffectRegistry;
use crate::simulator::{self, SpikeTrace};
use crate::snapshot::NetworkSnapshot;
use crate::util::get_partition_range;

/// Outcome of one seed of a sweep. A failing seed does not affect its siblings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedReport {
    pub seed: u64,
    pub outcome: Result<DivergenceReport, RadSimError>,
}

/// Everything a single seed needs besides its seed, computed once per sweep.
#[derive(Debug)]
struct SweepContext<S> {
    snapshot: S,
    baseline: SpikeTrace,
    effect: Box<dyn RadiationEffect>,
    effect_fingerprint: String,
}

impl<S: Deref<Target = NetworkSnapshot>> SweepContext<S> {
    fn run_seed(&self, seed: u64) -> SeedReport {
        SeedReport {
            seed,
            outcome: self.try_run_seed(seed),
        }
    }

    fn try_run_seed(&self, seed: u64) -> RadSimResult<DivergenceReport> {
        let (faulted, fault_record) = inject::inject(&*self.snapshot, self.effect.as_ref(), seed)?;
        let faulted_trace = simulator::simulate(&faulted)?;
        let report = divergence::compare(&self.baseline, &faulted_trace, &fault_record)?;

        Ok(report.with_label(ExperimentLabel {
            seed,
            effect_kind: self.effect.kind().to_owned(),
            effect_fingerprint: self.effect_fingerprint.clone(),
        }))
    }
}

/// Lazy, single-pass sequence of per-seed reports. Dropping it abandons the
/// remaining seeds.
pub struct Sweep<'a, I> {
    context: SweepContext<&'a NetworkSnapshot>,
    seeds: I,
}

impl<'a, I> Sweep<'a, I> {
    pub fn baseline(&self) -> &SpikeTrace {
        &self.context.baseline
    }
}

impl<'a, I: Iterator<Item = u64>> Iterator for Sweep<'a, I> {
    type Item = SeedReport;

    fn next(&mut self) -> Option<SeedReport> {
        let seed = self.seeds.next()?;
        let report = self.context.run_seed(seed);

        match &report.outcome {
            Err(err) if err.is_config_error() => warn!("seed {} failed: {}", seed, err),
            Err(err) => error!("seed {} failed: {}", seed, err),
            Ok(_) => {}
        }

        Some(report)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.seeds.size_hint()
    }
}

pub struct Experiment<'r> {
    registry: &'r EffectRegistry,
}

impl<'r> Experiment<'r> {
    pub fn new(registry: &'r EffectRegistry) -> Self {
        Self { registry }
    }

    /// Builds and validates the effect and simulates the baseline once. Any
    /// configuration error surfaces here, before the first seed runs.
    pub fn run<'a, I>(
        &self,
        snapshot: &'a NetworkSnapshot,
        effect_params: &EffectParams,
        seeds: I,
    ) -> RadSimResult<Sweep<'a, I::IntoIter>>
    where
        I: IntoIterator<Item = u64>,
    {
        Ok(Sweep {
            context: self.prepare(snapshot, effect_params)?,
            seeds: seeds.into_iter(),
        })
    }

    /// A single experiment. Unlike a sweep, a failure of the seed is returned
    /// as the error.
    pub fn run_single(
        &self,
        snapshot: &NetworkSnapshot,
        effect_params: &EffectParams,
        seed: u64,
    ) -> RadSimResult<DivergenceReport> {
        self.prepare(snapshot, effect_params)?.try_run_seed(seed)
    }

    /// Runs the seeds on worker threads, each taking a contiguous share.
    /// Reports come back in the order of `seeds`.
    pub fn run_parallel(
        &self,
        snapshot: &NetworkSnapshot,
        effect_params: &EffectParams,
        seeds: &[u64],
        technical_params: &TechnicalParams,
    ) -> RadSimResult<Vec<SeedReport>> {
        params::validate_technical_params(technical_params).map_err(RadSimError::parameter)?;

        let prepared = self.prepare(snapshot, effect_params)?;
        let context = Arc::new(SweepContext {
            snapshot: Arc::new(snapshot.clone()),
            baseline: prepared.baseline,
            effect: prepared.effect,
            effect_fingerprint: prepared.effect_fingerprint,
        });

        let num_threads = get_num_threads(technical_params).min(seeds.len()).max(1);
        let num_cores = num_cpus::get();
        let (report_tx, report_rx) = mpsc_channel();
        let mut join_handles = Vec::new();

        info!(
            "running {} seeds of {} on {} threads",
            seeds.len(),
            effect_params.kind,
            num_threads
        );

        for thread_id in 0..num_threads {
            let range = get_partition_range(num_threads, thread_id, seeds.len());
            let partition: Vec<u64> = seeds[range.clone()].to_vec();
            let context = Arc::clone(&context);
            let report_tx = report_tx.clone();
            let pin_threads = technical_params.pin_threads;

            join_handles.push(thread::spawn(move || {
                if pin_threads {
                    let core_id = CoreId {
                        id: thread_id % num_cores,
                    };
                    core_affinity::set_for_current(core_id);
                }

                for (offset, seed) in partition.into_iter().enumerate() {
                    if report_tx
                        .send((range.start + offset, context.run_seed(seed)))
                        .is_err()
                    {
                        break;
                    }
                }
            }));
        }

        drop(report_tx);

        let mut slots: Vec<Option<SeedReport>> = vec![None; seeds.len()];
        for (idx, report) in report_rx {
            slots[idx] = Some(report);
        }

        for join_handle in join_handles {
            join_handle.join().map_err(|_| {
                RadSimError::invariant(SimpleError::new("sweep worker thread panicked"))
            })?;
        }

        let reports = slots
            .into_iter()
            .zip(seeds)
            .map(|(slot, seed)| {
                slot.ok_or_else(|| {
                    RadSimError::invariant(SimpleError::new(format!(
                        "no report for seed {}",
                        seed
                    )))
                })
            })
            .collect::<RadSimResult<Vec<_>>>()?;

        debug!("collected {} reports", reports.len());

        Ok(reports)
    }

    fn prepare<'a>(
        &self,
        snapshot: &'a NetworkSnapshot,
        effect_params: &EffectParams,
    ) -> RadSimResult<SweepContext<&'a NetworkSnapshot>> {
        let effect = self.registry.create(effect_params)?;
        effect
            .validate_against(snapshot)
            .map_err(RadSimError::parameter)?;

        let baseline = simulator::simulate(snapshot)?;

        debug!(
            "baseline of {} neurons over {} steps: {} spikes",
            snapshot.num_neurons(),
            snapshot.horizon(),
            baseline.spike_count()
        );

        Ok(SweepContext {
            snapshot,
            baseline,
            effect,
            effect_fingerprint: effect_params.fingerprint(),
        })
    }
}

fn get_num_threads(technical_params: &TechnicalParams) -> usize {
    technical_params.num_threads.unwrap_or_else(num_cpus::get)
}

/// Builds the network from its definition and sweeps all declared seeds.
pub fn run_experiment(
    experiment_params: &ExperimentParams,
    registry: &EffectRegistry,
) -> RadSimResult<Vec<SeedReport>> {
    let snapshot = NetworkSnapshot::new(&experiment_params.network)?;

    Experiment::new(registry).run_parallel(
        &snapshot,
        &experiment_params.effect,
        &experiment_params.resolved_seeds(),
        &experiment_params.technical_params,
    )
}

/// Aggregate over the successful seeds of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub num_seeds: usize,
    pub num_failed: usize,
    pub mean_impact_score: f64,
    pub std_dev_impact_score: f64,
    pub divergent_fraction: f64,
    pub mean_first_divergence: Option<f64>,
    pub mean_silenced_fraction: f64,
}

impl SweepSummary {
    pub fn from_reports<'a, I>(reports: I) -> Self
    where
        I: IntoIterator<Item = &'a SeedReport>,
    {
        let mut num_seeds = 0;
        let mut divergence_reports = Vec::new();

        for report in reports {
            num_seeds += 1;
            if let Ok(divergence_report) = &report.outcome {
                divergence_reports.push(divergence_report);
            }
        }

        let impact_scores: Vec<f64> = divergence_reports
            .iter()
            .map(|report| report.impact_score)
            .collect();
        let silenced_fractions: Vec<f64> = divergence_reports
            .iter()
            .map(|report| report.silenced_fraction())
            .collect();
        let first_divergences: Vec<f64> = divergence_reports
            .iter()
            .filter_map(|report| report.first_divergence)
            .map(|t| t as f64)
            .collect();

        let divergent_fraction = if divergence_reports.is_empty() {
            0.0
        } else {
            first_divergences.len() as f64 / divergence_reports.len() as f64
        };

        Self {
            num_seeds,
            num_failed: num_seeds - divergence_reports.len(),
            mean_impact_score: mean_or_zero(&impact_scores),
            std_dev_impact_score: if impact_scores.len() < 2 {
                0.0
            } else {
                impact_scores.iter().std_dev()
            },
            divergent_fraction,
            mean_first_divergence: if first_divergences.is_empty() {
                None
            } else {
                Some(first_divergences.iter().mean())
            },
            mean_silenced_fraction: mean_or_zero(&silenced_fractions),
        }
    }
}

fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().mean()
    }
}
