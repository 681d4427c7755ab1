use std::time::Instant;

use rand::{
    distributions::Uniform, prelude::Distribution, rngs::StdRng, seq::SliceRandom, Rng,
    SeedableRng,
};
use snnrad::{
    experiment::{Experiment, SweepSummary},
    params::NetworkParams,
    registry::EffectRegistry,
    snapshot::NetworkSnapshot,
};
use statrs::distribution::Poisson;

#[path = "../scenario_params.rs"]
mod scenario_params;

use scenario_params::BenchmarkScenario;

fn create_network_params(scenario: &BenchmarkScenario) -> NetworkParams {
    let mut params = NetworkParams::with_uniform_neurons(
        scenario.num_neurons,
        scenario.neuron_params.clone(),
        scenario.horizon,
    );

    let mut rng = StdRng::seed_from_u64(0);
    let weight_dist = Uniform::new(0.0, scenario.max_weight);
    let delay_dist = Uniform::new_inclusive(1, scenario.max_delay);
    let num_inhibitory = (scenario.inhibitory_fraction * scenario.num_neurons as f64) as usize;

    for source in 0..scenario.num_neurons {
        let sign = if source < num_inhibitory { -1.0 } else { 1.0 };

        for target in 0..scenario.num_neurons {
            if source != target && rng.gen_bool(scenario.connect_density) {
                params.connect(
                    source,
                    target,
                    sign * weight_dist.sample(&mut rng),
                    delay_dist.sample(&mut rng),
                );
            }
        }
    }

    let all_nids: Vec<usize> = (0..scenario.num_neurons).collect();
    let num_input_spikes_dist = Poisson::new(scenario.mean_input_spikes_per_t).unwrap();

    for t in 0..scenario.horizon {
        let num_input_spikes = num_input_spikes_dist.sample(&mut rng) as usize;

        for nid in all_nids.choose_multiple(&mut rng, num_input_spikes) {
            params.add_input(t, *nid);
        }
    }

    params
}

fn main() {
    let scenario = scenario_params::get_scenario_params();
    let snapshot = NetworkSnapshot::new(&create_network_params(&scenario)).unwrap();
    let registry = EffectRegistry::default();
    let seeds: Vec<u64> = (0..scenario.num_seeds).collect();

    let wall_start = Instant::now();

    let reports = Experiment::new(&registry)
        .run_parallel(
            &snapshot,
            &scenario.effect,
            &seeds,
            &scenario.technical_params,
        )
        .unwrap();

    let wall_time = wall_start.elapsed();
    let summary = SweepSummary::from_reports(&reports);
    let neuron_steps = (seeds.len() * scenario.num_neurons * scenario.horizon) as f64;

    eprintln!("Synapses: {}", snapshot.synapses().len());
    eprintln!(
        "Mean impact score: {:.4} (std dev {:.4})",
        summary.mean_impact_score, summary.std_dev_impact_score
    );
    eprintln!("Divergent seeds: {:.1}%", summary.divergent_fraction * 100.0);
    eprintln!(
        "Seeds per second: {:.3}",
        seeds.len() as f64 / wall_time.as_secs_f64()
    );
    eprintln!(
        "Neuron update throughput: {:.3e} ({:.3} ns per update)",
        neuron_steps / wall_time.as_secs_f64(),
        1e9 * wall_time.as_secs_f64() / neuron_steps
    );
}
