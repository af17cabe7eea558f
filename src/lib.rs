//! # Brain Server
//! src/lib.rs
//!
//! Front-end HTTP de una simulación de bots con redes neuronales evolutivas.
//! Sirve el cliente web (HTML/JS/recursos) desde un document root y expone
//! una pequeña API JSON sobre el motor evolutivo.
//!
//! ## Arquitectura
//!
//! - `http`: parsing de requests, construcción de responses y el sink de salida
//! - `server`: acceptor TCP y pool de workers
//! - `router`: (método, patrón) → handler, con handler por defecto para GET
//! - `static_files`: resolución contenida de paths y streaming por chunks
//! - `handlers`: `/fitness`, `/init_brains`, `/metrics`
//! - `engine`: frontera con el motor evolutivo
//! - `metrics`: contadores y latencias
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use brain_server::config::Config;
//! use brain_server::engine::{EngineSettings, SeededEngine};
//! use brain_server::server::Server;
//! use std::sync::Arc;
//!
//! let config = Config::default();
//! let engine = Arc::new(SeededEngine::new(EngineSettings::default()));
//! let server = Server::bind(&config, engine).unwrap();
//! server.run().unwrap();
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod http;
pub mod metrics;
pub mod router;
pub mod server;
pub mod static_files;
