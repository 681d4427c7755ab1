use serde::Deserialize;
use snnrad::params::{EffectParams, NeuronParams, TechnicalParams};

#[derive(Debug, Deserialize)]
pub struct BenchmarkScenario {
    pub num_neurons: usize,
    pub horizon: usize,
    pub neuron_params: NeuronParams,
    pub connect_density: f64,
    pub max_weight: f32,
    pub inhibitory_fraction: f64,
    pub max_delay: usize,
    pub mean_input_spikes_per_t: f64,
    pub effect: EffectParams,
    pub num_seeds: u64,
    pub technical_params: TechnicalParams,
}

pub fn get_scenario_params() -> BenchmarkScenario {
    let params_yaml_str = r#"
num_neurons: 1000
horizon: 2000
neuron_params:
  threshold: 1.0
  leak: 0.05
  refractory_period: 5
  reset_potential: 0.0
connect_density: 0.05
max_weight: 0.5
inhibitory_fraction: 0.2
max_delay: 20
mean_input_spikes_per_t: 5.0
effect:
  kind: neuron_death
  severity: !Fraction 0.05
  onset: 500
num_seeds: 32
technical_params:
  num_threads: null
  pin_threads: false
"#;

    serde_yaml::from_str(params_yaml_str).unwrap()
}
