//! # Sink de Respuesta
//! src/http/sink.rs
//!
//! Frontera con la capa de transporte. Un `ResponseSink` acumula bytes con
//! `write` y los despacha con `send`, que es asíncrono: retorna de inmediato
//! y más tarde invoca la continuación con el resultado.
//!
//! `send` consume el sink y la continuación lo recibe de vuelta. Mientras un
//! envío está pendiente nadie más tiene el sink, así que no puede haber dos
//! envíos en vuelo para la misma respuesta.
//!
//! ```text
//! write(chunk) → send(cont) ──(pool)──▶ flush ──▶ cont(sink, Ok) → write(next) → ...
//!                                              └─▶ cont(sink, Err) → abort
//! ```

use std::io;
use thiserror::Error;

/// Continuación que se invoca cuando un `send` termina, con éxito o error
pub type Continuation = Box<dyn FnOnce(Box<dyn ResponseSink>, Result<(), TransportError>) + Send>;

/// Errores del transporte a mitad de una respuesta
#[derive(Debug, Error)]
pub enum TransportError {
    /// El cliente se desconectó o dejó de leer (timeout de escritura)
    #[error("connection interrupted: {0}")]
    Io(#[from] io::Error),

    /// El pool que ejecuta los envíos ya se apagó
    #[error("send pool is shut down")]
    PoolClosed,
}

/// Salida de una respuesta HTTP, asociada a un único request
pub trait ResponseSink: Send {
    /// Agrega bytes al buffer de salida, sin enviarlos todavía
    fn write(&mut self, bytes: &[u8]);

    /// Envía lo acumulado y luego invoca `then` con el sink y el resultado
    fn send(self: Box<Self>, then: Continuation);

    /// Envía lo que quede en el buffer y cierra la respuesta
    fn finish(self: Box<Self>) -> Result<(), TransportError>;

    /// Identificador del cliente para los logs
    fn peer(&self) -> &str;
}
