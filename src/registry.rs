use log::{debug, warn};
use simple_error::SimpleResult;

use crate::effect::{self, RadiationEffect};
use crate::error::{RadSimError, RadSimResult};
use crate::params::EffectParams;
use crate::types::HashMap;

pub type EffectConstructor =
    Box<dyn Fn(&EffectParams) -> SimpleResult<Box<dyn RadiationEffect>> + Send + Sync>;

/// Maps effect kind names to constructors. Built once by the caller and
/// handed to the experiment; there is no process-wide instance.
pub struct EffectRegistry {
    constructors: HashMap<String, EffectConstructor>,
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::default(),
        }
    }

    pub fn with_builtin_effects() -> Self {
        let mut registry = Self::new();
        registry.register(effect::NEURON_DEATH, effect::create_neuron_death);
        registry.register(
            effect::MEMBRANE_PERTURBATION,
            effect::create_membrane_perturbation,
        );
        registry.register(effect::SPURIOUS_SPIKE, effect::create_spurious_spike);
        registry.register(
            effect::SPURIOUS_SYNAPTIC_EVENT,
            effect::create_spurious_synaptic_event,
        );
        registry
    }

    /// Returns true if an existing constructor for `kind` was replaced.
    pub fn register<F>(&mut self, kind: &str, constructor: F) -> bool
    where
        F: Fn(&EffectParams) -> SimpleResult<Box<dyn RadiationEffect>> + Send + Sync + 'static,
    {
        let replaced = self
            .constructors
            .insert(kind.to_owned(), Box::new(constructor))
            .is_some();

        if replaced {
            warn!("replaced constructor for effect kind {}", kind);
        } else {
            debug!("registered effect kind {}", kind);
        }

        replaced
    }

    pub fn unregister(&mut self, kind: &str) -> bool {
        self.constructors.remove(kind).is_some()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn create(&self, effect_params: &EffectParams) -> RadSimResult<Box<dyn RadiationEffect>> {
        let constructor = self
            .constructors
            .get(&effect_params.kind)
            .ok_or_else(|| RadSimError::UnknownEffectKind(effect_params.kind.clone()))?;

        constructor(effect_params).map_err(RadSimError::parameter)
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::with_builtin_effects()
    }
}
