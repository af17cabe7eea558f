//! # Archivos Estáticos
//! src/static_files/mod.rs
//!
//! Handler por defecto del router: resuelve el path dentro del document
//! root, abre el archivo y devuelve la cabecera + archivo para que el
//! servidor lo envíe por chunks.
//!
//! Cualquier falla (escape del root, archivo inexistente, apertura fallida)
//! termina en un `400 Bad Request` completo que nombra el path pedido.

pub mod resolver;
pub mod streamer;

pub use resolver::{PathResolver, ResolvedPath, INDEX_FILE};
pub use streamer::{ChunkedFileStreamer, StaticFile, StreamState, CHUNK_SIZE};

use crate::error::ServeError;
use crate::http::Request;
use crate::router::Reply;
use tracing::debug;

/// Handler de archivos estáticos sobre un document root
#[derive(Debug, Clone)]
pub struct StaticFiles {
    resolver: PathResolver,
}

impl StaticFiles {
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Resuelve y abre; el archivo se abre antes de escribir un solo byte
    pub fn open(&self, request_path: &str) -> Result<StaticFile, ServeError> {
        let resolved = self.resolver.resolve(request_path)?;
        StaticFile::open(&resolved)
    }

    /// Handler: `Reply::Stream` si el archivo se pudo abrir, 400 si no
    pub fn serve(&self, request: &Request) -> Reply {
        match self.open(request.path()) {
            Ok(file) => Reply::Stream {
                head: file.response_head(),
                file,
            },
            Err(err) => {
                debug!(path = request.path(), error = %err, "static file rejected");
                Reply::Full(err.into_response(request.path()))
            }
        }
    }
}
