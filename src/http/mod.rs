//! # Módulo HTTP
//!
//! El subconjunto de HTTP/1.x que necesita el front-end, implementado a mano:
//!
//! - Lectura y parsing de requests (GET/HEAD/POST con body JSON)
//! - Construcción de respuestas bufferizadas (JSON y errores)
//! - Códigos de estado
//! - La frontera de transporte ([`ResponseSink`]) sobre la que corre el
//!   streaming por chunks
//!
//! No hay transfer-encoding chunked, rangos ni compresión: los archivos se
//! envían con un `Content-Length` exacto y la conexión se cierra al final.

pub mod request;   // Parsing de requests
pub mod response;  // Construcción de responses
pub mod sink;      // Envío asíncrono con continuaciones
pub mod status;    // Códigos de estado HTTP

pub use request::{read_request, Method, ParseError, ReadError, Request};
pub use response::Response;
pub use sink::{Continuation, ResponseSink, TransportError};
pub use status::StatusCode;
