//! # Códigos de Estado HTTP
//!
//! Solo los códigos que el front-end realmente emite:
//!
//! - **2xx**: 200 para JSON y archivos estáticos
//! - **4xx**: 400 para cualquier falla de path, apertura o parseo; 404 para
//!   rutas sin handler; 413 para requests demasiado grandes
//! - **5xx**: 500 si el servidor no pudo armar la respuesta

/// Códigos de estado que soporta el servidor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// 200 OK - La petición fue exitosa
    Ok = 200,

    /// 400 Bad Request - Path inválido, archivo ilegible o body malformado
    BadRequest = 400,

    /// 404 Not Found - Ninguna ruta coincide (métodos distintos de GET)
    NotFound = 404,

    /// 413 Payload Too Large - El request supera `max_request_bytes`
    PayloadTooLarge = 413,

    /// 500 Internal Server Error - Error interno del servidor
    InternalServerError = 500,
}

impl StatusCode {
    /// Convierte el código a su valor numérico
    ///
    /// # Ejemplo
    /// ```
    /// use brain_server::http::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// ```
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Retorna el texto de razón (reason phrase) asociado al código
    ///
    /// # Ejemplo
    /// ```
    /// use brain_server::http::StatusCode;
    /// assert_eq!(StatusCode::BadRequest.reason_phrase(), "Bad Request");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }

    /// Verifica si el código indica éxito (2xx)
    pub fn is_success(&self) -> bool {
        matches!(self, StatusCode::Ok)
    }

    /// Verifica si el código indica error del cliente (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.as_u16())
    }
}

impl std::fmt::Display for StatusCode {
    /// Formato: "200 OK"
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_values() {
        assert_eq!(StatusCode::Ok.as_u16(), 200);
        assert_eq!(StatusCode::BadRequest.as_u16(), 400);
        assert_eq!(StatusCode::NotFound.as_u16(), 404);
        assert_eq!(StatusCode::PayloadTooLarge.as_u16(), 413);
    }

    #[test]
    fn test_classification() {
        assert!(StatusCode::Ok.is_success());
        assert!(!StatusCode::BadRequest.is_success());
        assert!(StatusCode::PayloadTooLarge.is_client_error());
        assert!(!StatusCode::InternalServerError.is_client_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(StatusCode::Ok.to_string(), "200 OK");
        assert_eq!(StatusCode::BadRequest.to_string(), "400 Bad Request");
    }
}
