use crate::params::NeuronParams;

/// Per-neuron integration step the simulator drives. Refractoriness and death
/// are tracked by the driver, so a model only has to integrate and decide.
pub trait NeuronModel {
    fn integrate(&mut self, current: f32) -> f32;
    fn fires(&self, potential: f32) -> bool;
    fn reset(&mut self);
}

/// Discrete-time leaky integrate-and-fire neuron. The leak pulls the potential
/// towards the reset potential by a fixed amount per step.
#[derive(Debug, Clone)]
pub struct LifNeuron {
    potential: f32,
    threshold: f32,
    leak: f32,
    reset_potential: f32,
}

impl LifNeuron {
    pub fn new(neuron_params: &NeuronParams, initial_potential: f32) -> Self {
        Self {
            potential: initial_potential,
            threshold: neuron_params.threshold,
            leak: neuron_params.leak,
            reset_potential: neuron_params.reset_potential,
        }
    }

    fn apply_leak(&self) -> f32 {
        if self.potential > self.reset_potential {
            (self.potential - self.leak).max(self.reset_potential)
        } else {
            (self.potential + self.leak).min(self.reset_potential)
        }
    }
}

impl NeuronModel for LifNeuron {
    fn integrate(&mut self, current: f32) -> f32 {
        self.potential = self.apply_leak() + current;
        self.potential
    }

    fn fires(&self, potential: f32) -> bool {
        potential >= self.threshold
    }

    fn reset(&mut self) {
        self.potential = self.reset_potential;
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use float_cmp::assert_approx_eq;

    fn params() -> NeuronParams {
        NeuronParams {
            threshold: 1.0,
            leak: 0.1,
            refractory_period: 2,
            reset_potential: 0.0,
        }
    }

    #[test]
    fn leak() {
        let mut sut = LifNeuron::new(&params(), 0.0);

        let potential = sut.integrate(0.5);
        assert_approx_eq!(f32, potential, 0.5);
        assert!(!sut.fires(potential));

        let potential = sut.integrate(0.0);
        assert_approx_eq!(f32, potential, 0.4);

        let potential = sut.integrate(0.3);
        assert_approx_eq!(f32, potential, 0.6);
    }

    #[test]
    fn leak_stops_at_reset_potential() {
        let mut sut = LifNeuron::new(&params(), 0.15);

        assert_approx_eq!(f32, sut.integrate(0.0), 0.05);
        assert_approx_eq!(f32, sut.integrate(0.0), 0.0);
        assert_approx_eq!(f32, sut.integrate(0.0), 0.0);
    }

    #[test]
    fn leak_lifts_hyperpolarized_potential() {
        let mut sut = LifNeuron::new(&params(), 0.0);

        assert_approx_eq!(f32, sut.integrate(-0.25), -0.25);
        assert_approx_eq!(f32, sut.integrate(0.0), -0.15);
        assert_approx_eq!(f32, sut.integrate(0.0), -0.05);
        assert_approx_eq!(f32, sut.integrate(0.0), 0.0);
    }

    #[test]
    fn spike_after_accumulation() {
        let mut sut = LifNeuron::new(&params(), 0.0);

        sut.integrate(0.6);
        let potential = sut.integrate(0.6);

        assert_approx_eq!(f32, potential, 1.1);
        assert!(sut.fires(potential));

        sut.reset();
        assert_approx_eq!(f32, sut.integrate(0.0), 0.0);
    }

    #[test]
    fn inhibition_prevents_spike() {
        let mut sut = LifNeuron::new(&params(), 0.0);

        let potential = sut.integrate(0.6 + 0.5 - 0.2);

        assert_approx_eq!(f32, potential, 0.9);
        assert!(!sut.fires(potential));
    }

    #[test]
    fn reset_to_non_zero_potential() {
        let mut params = params();
        params.reset_potential = -0.5;
        params.leak = 0.0;

        let mut sut = LifNeuron::new(&params, 0.8);
        let potential = sut.integrate(0.3);
        assert!(sut.fires(potential));
        sut.reset();
        assert_approx_eq!(f32, sut.integrate(0.0), -0.5);
    }
}
