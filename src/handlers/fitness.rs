//! # Handler de Fitness
//! src/handlers/fitness.rs
//!
//! `POST /fitness`: el cliente reporta el fitness de cada bot y recibe la
//! siguiente generación.
//!
//! Body aceptado (un elemento por genoma, en orden):
//! ```json
//! [1.5, 0.25, 3.0]
//! [{"id": 1, "fitness": 1.5}, {"id": 2, "fitness": 0.25}]
//! ```
//!
//! Respuesta:
//! ```json
//! {"generation": 4, "population": [[{"ID": 0, "Type": "INPUT", ...}], ...]}
//! ```

use crate::engine::Engine;
use crate::error::ServeError;
use crate::http::{Request, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Un fitness, suelto o dentro del objeto que manda el cliente web
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FitnessEntry {
    Score(f64),
    Tagged { fitness: f64 },
}

impl FitnessEntry {
    fn value(&self) -> f64 {
        match self {
            FitnessEntry::Score(value) | FitnessEntry::Tagged { fitness: value } => *value,
        }
    }
}

/// Handler para POST /fitness
pub fn fitness_handler(req: &Request, engine: &dyn Engine) -> Response {
    match advance(req.body(), engine) {
        Ok(document) => Response::json(&document.to_string()),
        Err(err) => {
            debug!(error = %err, "fitness submission rejected");
            err.into_response(req.path())
        }
    }
}

fn advance(body: &[u8], engine: &dyn Engine) -> Result<Value, ServeError> {
    let entries: Vec<FitnessEntry> = serde_json::from_slice(body)?;
    let fitnesses: Vec<f64> = entries.iter().map(FitnessEntry::value).collect();

    let next = engine.advance_generation(&fitnesses)?;
    info!(generation = next.number, genomes = next.population.len(), "generation advanced");

    let population: Vec<Value> = next.population.iter().map(|g| engine.serialize(g)).collect();
    Ok(json!({
        "generation": next.number,
        "population": population,
    }))
}

/// Handler para POST /fitness en modo eco: acepta cualquier JSON y lo devuelve
pub fn echo_fitness_handler(req: &Request) -> Response {
    match serde_json::from_slice::<Value>(req.body()) {
        Ok(received) => Response::json(&json!({"status": "ok", "received": received}).to_string()),
        Err(err) => ServeError::from(err).into_response(req.path()),
    }
}
