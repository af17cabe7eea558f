//! # Construcción de Respuestas HTTP
//! src/http/response.rs
//!
//! Respuestas bufferizadas: status line, headers y body completos en memoria.
//! Se usan para JSON y para los errores, que siempre se escriben de una sola
//! vez. Para archivos estáticos solo se usa la cabecera ([`Response::head_bytes`]);
//! el body lo escribe el streamer por chunks.
//!
//! ## Formato
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Type: application/json\r\n
//! Content-Length: 13\r\n
//! \r\n
//! {"ok": true}
//! ```
//!
//! ## Ejemplo de uso
//!
//! ```
//! use brain_server::http::{Response, StatusCode};
//!
//! let response = Response::new(StatusCode::Ok)
//!     .with_header("Content-Type", "application/json")
//!     .with_body(r#"{"message": "Hello"}"#);
//!
//! let bytes = response.to_bytes();
//! assert!(bytes.starts_with(b"HTTP/1.1 200 OK\r\n"));
//! ```

use super::StatusCode;

/// Una respuesta HTTP completa
#[derive(Debug, Clone)]
pub struct Response {
    /// Código de estado HTTP (200, 400, etc.)
    status: StatusCode,

    /// Headers en orden de inserción; un nombre aparece una sola vez
    headers: Vec<(String, String)>,

    /// Cuerpo de la respuesta (puede ser vacío)
    body: Vec<u8>,
}

impl Response {
    /// Crea una nueva respuesta sin headers ni body
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Agrega un header (builder). Si ya existe, se sobrescribe.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.add_header(name, value);
        self
    }

    /// Agrega un header a una respuesta existente
    ///
    /// La comparación del nombre no distingue mayúsculas.
    pub fn add_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    /// Establece el body desde un string y calcula `Content-Length`
    pub fn with_body(self, body: &str) -> Self {
        self.with_body_bytes(body.as_bytes().to_vec())
    }

    /// Establece el body desde bytes y calcula `Content-Length`
    pub fn with_body_bytes(mut self, body: Vec<u8>) -> Self {
        let length = body.len().to_string();
        self.body = body;
        self.add_header("Content-Length", &length);
        self
    }

    /// Respuesta JSON exitosa (200 OK)
    ///
    /// # Ejemplo
    /// ```
    /// use brain_server::http::Response;
    ///
    /// let response = Response::json(r#"{"status": "ok"}"#);
    /// assert_eq!(response.header("Content-Type"), Some("application/json"));
    /// assert_eq!(response.header("Content-Length"), Some("16"));
    /// ```
    pub fn json(body: &str) -> Self {
        Self::new(StatusCode::Ok)
            .with_header("Content-Type", "application/json")
            .with_body(body)
    }

    /// Respuesta en texto plano con el status indicado
    pub fn text(status: StatusCode, body: &str) -> Self {
        Self::new(status)
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_body(body)
    }

    /// Respuesta de error genérica (404, 413, 500) en texto plano
    pub fn error(status: StatusCode, message: &str) -> Self {
        Self::text(status, message)
    }

    /// Serializa solo la status line y los headers, terminando en `\r\n\r\n`
    pub fn head_bytes(&self) -> Vec<u8> {
        let mut result = format!("HTTP/1.1 {}\r\n", self.status).into_bytes();

        for (name, value) in &self.headers {
            result.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }

        result.extend_from_slice(b"\r\n");
        result
    }

    /// Serializa la respuesta completa (cabecera + body)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = self.head_bytes();
        result.extend_from_slice(&self.body);
        result
    }

    /// Obtiene el código de estado de la respuesta
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Obtiene los headers en orden
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Obtiene un header por nombre (sin distinguir mayúsculas)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Obtiene una referencia al body
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
