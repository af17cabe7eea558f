//! # Errores del Servidor
//! src/error.rs
//!
//! Taxonomía de errores que pueden ocurrir mientras se atiende un request.
//!
//! Ninguno de estos errores sale del handler: en la frontera del handler
//! se traducen a una respuesta `400 Bad Request` completa (ver
//! [`ServeError::into_response`]). Los errores de transporte durante el
//! streaming viven aparte, en [`crate::http::sink::TransportError`].

use crate::engine::EngineError;
use crate::http::{Response, StatusCode};
use std::io;
use thiserror::Error;

/// Errores de un request, antes de escribir cualquier byte de respuesta
#[derive(Debug, Error)]
pub enum ServeError {
    /// El path canónico quedó fuera del document root
    #[error("path escapes the document root")]
    PathForbidden,

    /// El path no existe o no es un archivo regular
    #[error("file does not exist")]
    PathNotFound,

    /// El archivo se validó pero no se pudo abrir (p. ej. lo borraron entre medio)
    #[error("could not read file: {0}")]
    FileOpenFailure(#[source] io::Error),

    /// Body JSON malformado
    #[error("{0}")]
    BodyParse(#[from] serde_json::Error),

    /// Falla opaca del motor evolutivo
    #[error("{0}")]
    Engine(#[from] EngineError),
}

impl ServeError {
    /// Convierte el error en la respuesta `400` en texto plano
    ///
    /// `subject` es lo que el cliente pidió (el path del request), así el
    /// body siempre nombra el recurso que falló.
    pub fn into_response(self, subject: &str) -> Response {
        let body = match &self {
            ServeError::BodyParse(_) | ServeError::Engine(_) => self.to_string(),
            _ => format!("Could not open path {}: {}", subject, self),
        };
        Response::text(StatusCode::BadRequest, &body)
    }
}
