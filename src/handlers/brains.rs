//! # Handler de Población Inicial
//! src/handlers/brains.rs
//!
//! `GET /init_brains`: reinicia la población y retorna el arreglo de redes
//! serializadas, una por bot.

use crate::engine::Engine;
use crate::error::ServeError;
use crate::http::{Request, Response};
use serde_json::Value;
use tracing::info;

/// Handler para GET /init_brains
pub fn init_brains_handler(req: &Request, engine: &dyn Engine) -> Response {
    match engine.initialize_population() {
        Ok(population) => {
            info!(genomes = population.len(), "population initialized");
            let document: Vec<Value> = population.iter().map(|g| engine.serialize(g)).collect();
            Response::json(&Value::Array(document).to_string())
        }
        Err(err) => ServeError::from(err).into_response(req.path()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, EngineSettings, Generation, Genome, SeededEngine};
    use crate::http::StatusCode;

    struct BrokenEngine;

    impl Engine for BrokenEngine {
        fn initialize_population(&self) -> Result<Vec<Genome>, EngineError> {
            Err(EngineError::Failed("no seed genomes".to_string()))
        }

        fn advance_generation(&self, _: &[f64]) -> Result<Generation, EngineError> {
            Err(EngineError::Failed("unused".to_string()))
        }

        fn generation(&self) -> u64 {
            0
        }
    }

    fn get() -> Request {
        Request::parse(b"GET /init_brains HTTP/1.1\r\n\r\n").unwrap()
    }

    #[test]
    fn test_returns_array_of_networks() {
        let engine = SeededEngine::new(EngineSettings {
            population_size: 5,
            seed: Some(3),
            ..EngineSettings::default()
        });
        let response = init_brains_handler(&get(), &engine);

        assert_eq!(response.status(), StatusCode::Ok);
        let document: Value = serde_json::from_slice(response.body()).unwrap();
        let networks = document.as_array().unwrap();
        assert_eq!(networks.len(), 5);
        assert_eq!(networks[0][0]["Type"], "INPUT");
    }

    #[test]
    fn test_engine_failure_is_400() {
        let response = init_brains_handler(&get(), &BrokenEngine);

        assert_eq!(response.status(), StatusCode::BadRequest);
        assert_eq!(response.body(), b"engine failure: no seed genomes");
    }
}
