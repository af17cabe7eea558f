//! # Handlers de la API
//!
//! Adaptadores delgados sobre el motor evolutivo. Cada handler recibe un
//! Request y retorna una Response completa: los errores de parseo o del
//! motor terminan en un `400` con el mensaje como body.
//!
//! - **fitness**: `POST /fitness`
//! - **brains**: `GET /init_brains`
//! - `GET /metrics`

pub mod brains;
pub mod fitness;

pub use brains::init_brains_handler;
pub use fitness::{echo_fitness_handler, fitness_handler};

use crate::http::Response;
use crate::metrics::MetricsCollector;

/// Handler para GET /metrics
pub fn metrics_handler(metrics: &MetricsCollector) -> Response {
    Response::json(&metrics.to_json().to_string())
}
