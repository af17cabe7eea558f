//! # Motor de Referencia
//! src/engine/seeded.rs
//!
//! Implementación mínima de [`Engine`] para levantar el servidor sin el
//! motor real: redes de topología mínima (sensores + bias conectados
//! directo a las salidas) con pesos aleatorios. Cada generación conserva la
//! mitad con mejor fitness y completa con copias de pesos perturbados.

use super::{Engine, EngineError, Generation, Genome, Link, Neuron, NeuronType};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, MutexGuard};

/// Parámetros del motor de referencia
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Genomas por generación
    pub population_size: usize,
    /// Sensores del bot
    pub inputs: u32,
    /// Salidas: velocidad de oruga izquierda y derecha
    pub outputs: u32,
    /// Probabilidad de mutar cada peso
    pub mutation_rate: f64,
    /// Magnitud máxima de una mutación
    pub max_perturbation: f64,
    /// Semilla fija para poblaciones reproducibles
    pub seed: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            population_size: 20,
            inputs: 5,
            outputs: 2,
            mutation_rate: 0.2,
            max_perturbation: 0.5,
            seed: None,
        }
    }
}

struct PopulationState {
    rng: StdRng,
    population: Vec<Genome>,
    generation: u64,
}

/// Motor de referencia con RNG propio
pub struct SeededEngine {
    settings: EngineSettings,
    state: Mutex<PopulationState>,
}

impl SeededEngine {
    pub fn new(settings: EngineSettings) -> Self {
        let mut rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let population = Self::random_population(&settings, &mut rng);

        Self {
            settings,
            state: Mutex::new(PopulationState {
                rng,
                population,
                generation: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, PopulationState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn random_population(settings: &EngineSettings, rng: &mut StdRng) -> Vec<Genome> {
        (0..settings.population_size.max(1))
            .map(|_| Self::minimal_genome(settings, rng))
            .collect()
    }

    /// Entradas, bias y salidas; cada salida recibe un link de cada entrada y del bias
    fn minimal_genome(settings: &EngineSettings, rng: &mut StdRng) -> Genome {
        let bias_id = settings.inputs;
        let neuron = |id: u32, kind: NeuronType| Neuron {
            id,
            kind,
            activation_response: 1.0,
            in_links: Vec::new(),
            out_links: Vec::new(),
        };

        let mut neurons: Vec<Neuron> = (0..settings.inputs)
            .map(|id| neuron(id, NeuronType::Input))
            .collect();
        neurons.push(neuron(bias_id, NeuronType::Bias));

        for offset in 1..=settings.outputs {
            let id = bias_id + offset;
            let mut output = neuron(id, NeuronType::Output);
            output.in_links = (0..=bias_id)
                .map(|input_id| Link {
                    input_id,
                    output_id: id,
                    weight: rng.gen_range(-1.0..=1.0),
                })
                .collect();
            neurons.push(output);
        }

        let mut genome = Genome { neurons };
        genome.sync_out_links();
        genome
    }

    fn mutate(settings: &EngineSettings, rng: &mut StdRng, parent: &Genome) -> Genome {
        let mut child = parent.clone();
        let spread = settings.max_perturbation;

        for link in child.neurons.iter_mut().flat_map(|n| n.in_links.iter_mut()) {
            if rng.gen_bool(settings.mutation_rate.clamp(0.0, 1.0)) {
                link.weight += rng.gen_range(-spread..=spread);
            }
        }
        child.sync_out_links();
        child
    }
}

impl Engine for SeededEngine {
    fn initialize_population(&self) -> Result<Vec<Genome>, EngineError> {
        let mut state = self.state();
        let population = Self::random_population(&self.settings, &mut state.rng);
        state.population = population;
        state.generation = 0;
        Ok(state.population.clone())
    }

    fn advance_generation(&self, fitnesses: &[f64]) -> Result<Generation, EngineError> {
        let mut state = self.state();

        if fitnesses.len() != state.population.len() {
            return Err(EngineError::FitnessCount {
                expected: state.population.len(),
                got: fitnesses.len(),
            });
        }
        if let Some(index) = fitnesses.iter().position(|f| !f.is_finite()) {
            return Err(EngineError::InvalidFitness { index });
        }

        // Ranking por fitness, el mejor primero
        let mut ranked: Vec<usize> = (0..fitnesses.len()).collect();
        ranked.sort_by(|&a, &b| fitnesses[b].total_cmp(&fitnesses[a]));

        let size = state.population.len();
        let survivors: Vec<Genome> = ranked[..size.div_ceil(2)]
            .iter()
            .map(|&i| state.population[i].clone())
            .collect();

        let mut next = survivors.clone();
        let mut parents = survivors.iter().cycle();
        while next.len() < size {
            let Some(parent) = parents.next() else { break };
            let child = Self::mutate(&self.settings, &mut state.rng, parent);
            next.push(child);
        }

        state.population = next;
        state.generation += 1;
        Ok(Generation {
            number: state.generation,
            population: state.population.clone(),
        })
    }

    fn generation(&self) -> u64 {
        self.state().generation
    }
}
