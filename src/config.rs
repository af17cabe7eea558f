//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración por argumentos CLI o variables de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./brain_server --port 8080 \
//!   --root ./web \
//!   --workers 4 \
//!   --stream-timeout-ms 10000
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! HTTP_PORT=8080 DOC_ROOT=./web ECHO_FITNESS=true ./brain_server
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Configuración del servidor de la simulación
#[derive(Debug, Clone, Parser)]
#[command(name = "brain_server")]
#[command(about = "Front-end HTTP de la simulación de bots: cliente web + API del motor evolutivo")]
#[command(version = "0.1.0")]
pub struct Config {
    /// Puerto en el que escucha el servidor
    #[arg(short, long, default_value = "8080", env = "HTTP_PORT")]
    pub port: u16,

    /// Host/IP en el que escucha
    #[arg(long, default_value = "127.0.0.1", env = "HTTP_HOST")]
    pub host: String,

    /// Document root del cliente web
    #[arg(long, default_value = "web", env = "DOC_ROOT")]
    pub root: PathBuf,

    // === Concurrencia ===

    /// Threads del pool que atiende conexiones y envíos
    #[arg(long, default_value = "1", env = "WORKERS")]
    pub workers: usize,

    // === Timeouts ===

    /// Tiempo máximo que un envío puede quedar bloqueado por un cliente que no lee (0 = sin límite)
    #[arg(long = "stream-timeout-ms", default_value = "30000", env = "STREAM_TIMEOUT_MS")]
    pub stream_timeout_ms: u64,

    /// Tiempo máximo para recibir el request completo
    #[arg(long = "read-timeout-ms", default_value = "5000", env = "READ_TIMEOUT_MS")]
    pub read_timeout_ms: u64,

    /// Tamaño máximo de cabecera + body de un request
    #[arg(long = "max-request-bytes", default_value = "1048576", env = "MAX_REQUEST_BYTES")]
    pub max_request_bytes: usize,

    // === Motor ===

    /// Genomas por generación
    #[arg(long = "population-size", default_value = "20", env = "POPULATION_SIZE")]
    pub population_size: usize,

    /// Semilla del motor (poblaciones reproducibles)
    #[arg(long, env = "ENGINE_SEED")]
    pub seed: Option<u64>,

    /// POST /fitness devuelve el JSON recibido en vez de avanzar la generación
    #[arg(long = "echo-fitness", env = "ECHO_FITNESS")]
    pub echo_fitness: bool,
}

impl Config {
    /// Obtiene la dirección completa para bind (host:port)
    ///
    /// # Ejemplo
    /// ```rust
    /// use brain_server::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(), "127.0.0.1:8080");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Timeout de escritura de cada socket; `None` si está deshabilitado
    pub fn stream_timeout(&self) -> Option<Duration> {
        (self.stream_timeout_ms > 0).then(|| Duration::from_millis(self.stream_timeout_ms))
    }

    /// Timeout de lectura del request; `None` si está deshabilitado
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    /// Valida la configuración
    ///
    /// Retorna errores si hay valores inválidos
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == 0 {
            return Err("Workers must be >= 1".to_string());
        }
        if self.population_size == 0 {
            return Err("Population size must be >= 1".to_string());
        }
        if self.max_request_bytes == 0 {
            return Err("Max request bytes must be > 0".to_string());
        }
        if self.root.as_os_str().is_empty() {
            return Err("Document root must not be empty".to_string());
        }

        Ok(())
    }

    /// Escribe la configuración efectiva en el log
    pub fn log_summary(&self) {
        info!(
            address = %self.address(),
            root = %self.root.display(),
            workers = self.workers,
            "network"
        );
        info!(
            stream_timeout_ms = self.stream_timeout_ms,
            read_timeout_ms = self.read_timeout_ms,
            max_request_bytes = self.max_request_bytes,
            "limits"
        );
        info!(
            population_size = self.population_size,
            seed = ?self.seed,
            echo_fitness = self.echo_fitness,
            "engine"
        );
    }
}

impl Default for Config {
    /// Configuración por defecto (igual a los defaults del CLI)
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            root: PathBuf::from("web"),
            workers: 1,
            stream_timeout_ms: 30_000,
            read_timeout_ms: 5_000,
            max_request_bytes: 1024 * 1024,
            population_size: 20,
            seed: None,
            echo_fitness: false,
        }
    }
}
