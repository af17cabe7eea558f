//! # Frontera con el Motor Evolutivo
//! src/engine/mod.rs
//!
//! El motor que crea y muta las redes neuronales es un colaborador externo.
//! El front-end solo lo usa a través de [`Engine`]:
//!
//! - `initialize_population()` → población inicial
//! - `advance_generation(fitnesses)` → siguiente población y su número
//! - `serialize(genome)` → documento JSON que consume el cliente web
//!
//! [`SeededEngine`] es una implementación mínima para poder levantar el
//! servidor sin el motor real.

pub mod seeded;

pub use seeded::{EngineSettings, SeededEngine};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Fallas del motor. El front-end las trata como opacas.
#[derive(Debug, Error)]
pub enum EngineError {
    /// La cantidad de fitness no coincide con el tamaño de la población
    #[error("expected {expected} fitness values, got {got}")]
    FitnessCount { expected: usize, got: usize },

    /// Un fitness es NaN o infinito
    #[error("fitness #{index} is not a finite number")]
    InvalidFitness { index: usize },

    /// Cualquier otra falla reportada por el motor
    #[error("engine failure: {0}")]
    Failed(String),
}

/// Motor evolutivo visto desde el front-end
pub trait Engine: Send + Sync {
    /// Crea (o reinicia) la población y la retorna
    fn initialize_population(&self) -> Result<Vec<Genome>, EngineError>;

    /// Evalúa la generación actual con un fitness por genoma y retorna la siguiente
    fn advance_generation(&self, fitnesses: &[f64]) -> Result<Generation, EngineError>;

    /// Número de la generación actual
    fn generation(&self) -> u64;

    /// Documento JSON de un genoma
    fn serialize(&self, genome: &Genome) -> Value {
        serde_json::to_value(genome).unwrap_or(Value::Null)
    }
}

/// Una generación recién producida: número y población se leen juntos
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub number: u64,
    pub population: Vec<Genome>,
}

/// Tipo de neurona, como lo espera el cliente ("INPUT", "BIAS", ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NeuronType {
    Input,
    Bias,
    Hidden,
    Output,
}

/// Conexión con peso entre dos neuronas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "InputID")]
    pub input_id: u32,
    #[serde(rename = "OutputID")]
    pub output_id: u32,
    #[serde(rename = "Weight")]
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neuron {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "Type")]
    pub kind: NeuronType,
    #[serde(rename = "ActivationResponse")]
    pub activation_response: f64,
    #[serde(rename = "InLinks")]
    pub in_links: Vec<Link>,
    #[serde(rename = "OutLinks")]
    pub out_links: Vec<Link>,
}

/// Una red: lista de neuronas en orden de evaluación
/// (entradas, bias, ocultas, salidas)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Genome {
    pub neurons: Vec<Neuron>,
}

impl Genome {
    /// Todos los links, una vez cada uno (tomados de los `InLinks`)
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.neurons.iter().flat_map(|neuron| neuron.in_links.iter())
    }

    /// Reconstruye los `OutLinks` a partir de los `InLinks`
    pub(crate) fn sync_out_links(&mut self) {
        let links: Vec<Link> = self.links().cloned().collect();
        for neuron in &mut self.neurons {
            neuron.out_links = links
                .iter()
                .filter(|link| link.input_id == neuron.id)
                .cloned()
                .collect();
        }
    }
}
