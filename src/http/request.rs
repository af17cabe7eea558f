//! # Parsing de Requests HTTP
//! src/http/request.rs
//!
//! Parser del subconjunto de HTTP/1.x que necesita el front-end: GET para
//! archivos estáticos y `/init_brains`, POST con body JSON para `/fitness`.
//!
//! ## Formato de un Request
//!
//! ```text
//! POST /fitness HTTP/1.1\r\n
//! Host: localhost:8080\r\n
//! Content-Length: 9\r\n
//! \r\n
//! [1.0,2.5]
//! ```
//!
//! 1. **Request Line**: `METHOD /path?query HTTP/1.x`
//! 2. **Headers**: Pares `Name: Value` (uno por línea)
//! 3. **Empty Line**: `\r\n` que separa headers del body
//! 4. **Body**: exactamente `Content-Length` bytes
//!
//! El path se decodifica (percent-decoding) antes de exponerse, así
//! `/%2e%2e/etc/passwd` llega al resolver como `/../etc/passwd` y se valida
//! igual que cualquier otro intento de escape.

use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::io::{self, Read};
use thiserror::Error;

/// Separador entre cabecera y body
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Métodos HTTP soportados
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET - Obtener un recurso
    GET,

    /// HEAD - Como GET pero solo retorna headers
    HEAD,

    /// POST - Enviar datos a un recurso
    POST,
}

impl Method {
    /// Parsea un método HTTP desde un string
    fn from_str(s: &str) -> Result<Self, ParseError> {
        match s {
            "GET" => Ok(Method::GET),
            "HEAD" => Ok(Method::HEAD),
            "POST" => Ok(Method::POST),
            _ => Err(ParseError::UnsupportedMethod(s.to_string())),
        }
    }

    /// Convierte el método a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
        }
    }
}

/// Un request HTTP parseado. Inmutable una vez construido.
#[derive(Debug, Clone)]
pub struct Request {
    /// Método HTTP (GET, HEAD, POST)
    method: Method,

    /// Path decodificado (ej: "/app/game.js")
    path: String,

    /// Query parameters parseados (ej: {"v": "2"})
    query_params: HashMap<String, String>,

    /// Headers HTTP, con el nombre tal como llegó
    headers: HashMap<String, String>,

    /// Versión HTTP ("HTTP/1.0" o "HTTP/1.1")
    version: String,

    /// Body del request
    body: Vec<u8>,
}

/// Errores que pueden ocurrir durante el parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Request incompleto o truncado
    #[error("Incomplete HTTP request")]
    IncompleteRequest,

    /// Formato inválido de la request line
    #[error("Invalid request line format")]
    InvalidRequestLine,

    /// Método HTTP no soportado
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// Versión HTTP incorrecta
    #[error("Invalid HTTP version: {0}")]
    InvalidHttpVersion(String),

    /// Header malformado
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// El path no decodifica a UTF-8 válido
    #[error("Invalid request path: {0}")]
    InvalidPath(String),

    /// Request vacío
    #[error("Empty request")]
    EmptyRequest,
}

/// Errores al leer un request desde el socket
#[derive(Debug, Error)]
pub enum ReadError {
    /// Falla de I/O (incluye el timeout de lectura)
    #[error("failed to read request: {0}")]
    Io(#[from] io::Error),

    /// Cabecera + body superan el límite configurado
    #[error("request exceeds {limit} bytes")]
    TooLarge { limit: usize },

    /// `Content-Length` que no es un número decimal
    #[error("invalid Content-Length: {0}")]
    InvalidContentLength(String),
}

/// Lee un request completo: cabecera hasta `\r\n\r\n` y luego exactamente
/// `Content-Length` bytes de body.
///
/// Retorna `Ok(None)` si el peer cerró sin mandar nada. Si el peer cierra a
/// mitad de la cabecera se retorna lo recibido y el parser lo rechaza.
pub fn read_request<R: Read>(reader: &mut R, max_bytes: usize) -> Result<Option<Vec<u8>>, ReadError> {
    let mut data = Vec::new();
    let mut chunk = [0u8; 8192];

    // 1. Cabecera
    let head_end = loop {
        if let Some(pos) = find_head_end(&data) {
            break pos;
        }
        if data.len() > max_bytes {
            return Err(ReadError::TooLarge { limit: max_bytes });
        }

        let n = reader.read(&mut chunk)?;
        if n == 0 {
            return Ok(if data.is_empty() { None } else { Some(data) });
        }
        data.extend_from_slice(&chunk[..n]);
    };

    // 2. Body según Content-Length
    let head = String::from_utf8_lossy(&data[..head_end]);
    let content_length = match head
        .split("\r\n")
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("Content-Length"))
    {
        Some((_, value)) => parse_content_length(value.trim(), max_bytes)?,
        None => 0,
    };

    // El largo viene del cliente: se compara contra lo que queda del límite
    let head_len = head_end + HEAD_TERMINATOR.len();
    if content_length > max_bytes.saturating_sub(head_len) {
        return Err(ReadError::TooLarge { limit: max_bytes });
    }
    let total = head_len + content_length;

    while data.len() < total {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
    }
    data.truncate(total);

    Ok(Some(data))
}

/// Solo dígitos; un número que no cabe en `usize` también excede el límite
fn parse_content_length(value: &str, max_bytes: usize) -> Result<usize, ReadError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ReadError::InvalidContentLength(value.to_string()));
    }
    value
        .parse::<usize>()
        .map_err(|_| ReadError::TooLarge { limit: max_bytes })
}

fn find_head_end(data: &[u8]) -> Option<usize> {
    data.windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
}

impl Request {
    /// Parsea un request desde bytes
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use brain_server::http::Request;
    ///
    /// let raw = b"GET /app/game.js?v=2 HTTP/1.1\r\n\r\n";
    /// let request = Request::parse(raw).unwrap();
    ///
    /// assert_eq!(request.path(), "/app/game.js");
    /// assert_eq!(request.query_param("v"), Some("2"));
    /// ```
    pub fn parse(buffer: &[u8]) -> Result<Self, ParseError> {
        if buffer.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(ParseError::EmptyRequest);
        }

        // La cabecera debe ser UTF-8; el body se conserva tal cual
        let (head_bytes, body) = match find_head_end(buffer) {
            Some(pos) => (&buffer[..pos], buffer[pos + HEAD_TERMINATOR.len()..].to_vec()),
            None => (buffer, Vec::new()),
        };
        let head = std::str::from_utf8(head_bytes).map_err(|_| ParseError::InvalidRequestLine)?;

        let mut lines = head.split("\r\n");
        let request_line = lines.next().ok_or(ParseError::IncompleteRequest)?;

        // 1. Request line
        let (method, path, query_params, version) = Self::parse_request_line(request_line)?;

        // 2. Headers
        let headers = Self::parse_headers(lines)?;

        Ok(Request {
            method,
            path,
            query_params,
            headers,
            version,
            body,
        })
    }

    /// Parsea la request line: `GET /path?query HTTP/1.1`
    fn parse_request_line(
        line: &str,
    ) -> Result<(Method, String, HashMap<String, String>, String), ParseError> {
        let parts: Vec<&str> = line.split_whitespace().collect();

        // Debe tener exactamente 3 partes: METHOD PATH VERSION
        if parts.len() != 3 {
            return Err(ParseError::InvalidRequestLine);
        }

        let method = Method::from_str(parts[0])?;
        let (path, query_params) = Self::parse_path_and_query(parts[1])?;

        let version = parts[2].to_string();
        if version != "HTTP/1.0" && version != "HTTP/1.1" {
            return Err(ParseError::InvalidHttpVersion(version));
        }

        Ok((method, path, query_params, version))
    }

    /// Separa path y query, decodificando ambos
    fn parse_path_and_query(
        target: &str,
    ) -> Result<(String, HashMap<String, String>), ParseError> {
        let (raw_path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };

        let path = percent_decode_str(raw_path)
            .decode_utf8()
            .map_err(|_| ParseError::InvalidPath(raw_path.to_string()))?
            .into_owned();

        let query_params = query.map(Self::parse_query_string).unwrap_or_default();
        Ok((path, query_params))
    }

    /// Parsea una query string: "a=1&b=hola%20mundo&flag"
    fn parse_query_string(query: &str) -> HashMap<String, String> {
        query
            .split('&')
            .filter(|param| !param.is_empty())
            .map(|param| match param.split_once('=') {
                Some((key, value)) => (key.to_string(), Self::url_decode(value)),
                None => (param.to_string(), String::new()),
            })
            .collect()
    }

    fn url_decode(s: &str) -> String {
        let spaced = s.replace('+', " ");
        percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
    }

    /// Parsea los headers "Name: Value" hasta la línea vacía
    fn parse_headers<'a>(
        lines: impl Iterator<Item = &'a str>,
    ) -> Result<HashMap<String, String>, ParseError> {
        let mut headers = HashMap::new();

        for line in lines {
            if line.trim().is_empty() {
                break;
            }

            match line.split_once(':') {
                Some((name, value)) => {
                    headers.insert(name.trim().to_string(), value.trim().to_string());
                }
                None => return Err(ParseError::InvalidHeader(line.to_string())),
            }
        }

        Ok(headers)
    }

    // === Accesores ===

    /// Obtiene el método HTTP del request
    pub fn method(&self) -> Method {
        self.method
    }

    /// Obtiene el path decodificado del request
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Obtiene todos los query parameters
    pub fn query_params(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    /// Obtiene un query parameter específico
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(|s| s.as_str())
    }

    /// Obtiene un header (sin distinguir mayúsculas)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Obtiene la versión HTTP
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Obtiene el body del request
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_simple_get() {
        let request = Request::parse(b"GET / HTTP/1.0\r\n\r\n").unwrap();

        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.path(), "/");
        assert!(request.query_params().is_empty());
        assert!(request.body().is_empty());
    }

    #[test]
    fn test_parse_post_with_body() {
        let raw = b"POST /fitness HTTP/1.1\r\nContent-Length: 9\r\n\r\n[1.0,2.5]";
        let request = Request::parse(raw).unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.path(), "/fitness");
        assert_eq!(request.header("content-length"), Some("9"));
        assert_eq!(request.body(), b"[1.0,2.5]");
    }

    #[test]
    fn test_path_is_percent_decoded() {
        let request = Request::parse(b"GET /%2e%2e/etc/passwd HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.path(), "/../etc/passwd");

        let request = Request::parse(b"GET /my%20file.txt HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.path(), "/my file.txt");
    }

    #[test]
    fn test_invalid_utf8_path() {
        let result = Request::parse(b"GET /%ff%fe HTTP/1.1\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidPath(_))));
    }

    #[test]
    fn test_query_params_decoded() {
        let request = Request::parse(b"GET /x?text=hello+world&n=%31 HTTP/1.1\r\n\r\n").unwrap();

        assert_eq!(request.query_param("text"), Some("hello world"));
        assert_eq!(request.query_param("n"), Some("1"));
    }

    #[test]
    fn test_unsupported_method() {
        let result = Request::parse(b"DELETE / HTTP/1.1\r\n\r\n");
        assert!(matches!(result, Err(ParseError::UnsupportedMethod(_))));
    }

    #[test]
    fn test_invalid_version() {
        let result = Request::parse(b"GET / HTTP/2.0\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidHttpVersion(_))));
    }

    #[test]
    fn test_empty_request() {
        assert!(matches!(Request::parse(b""), Err(ParseError::EmptyRequest)));
    }

    #[test]
    fn test_invalid_header() {
        let result = Request::parse(b"GET / HTTP/1.1\r\nNoColonHere\r\n\r\n");
        assert!(matches!(result, Err(ParseError::InvalidHeader(_))));
    }

    #[test]
    fn test_read_request_waits_for_body() {
        let raw = b"POST /fitness HTTP/1.1\r\nContent-Length: 5\r\n\r\n[1.0]trailing".to_vec();
        let data = read_request(&mut Cursor::new(raw), 1024).unwrap().unwrap();

        assert!(data.ends_with(b"\r\n\r\n[1.0]"));
    }

    #[test]
    fn test_read_request_peer_closed() {
        let data = read_request(&mut Cursor::new(Vec::new()), 1024).unwrap();
        assert!(data.is_none());
    }

    #[test]
    fn test_read_request_too_large() {
        let raw = b"POST /fitness HTTP/1.1\r\nContent-Length: 4096\r\n\r\n".to_vec();
        let result = read_request(&mut Cursor::new(raw), 1024);

        assert!(matches!(result, Err(ReadError::TooLarge { limit: 1024 })));
    }

    #[test]
    fn test_read_request_content_length_at_usize_max() {
        let raw = b"POST /fitness HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\n".to_vec();
        let result = read_request(&mut Cursor::new(raw), 1 << 20);

        assert!(matches!(result, Err(ReadError::TooLarge { limit: 1048576 })));
    }

    #[test]
    fn test_read_request_content_length_beyond_usize() {
        let raw = b"POST /fitness HTTP/1.1\r\nContent-Length: 99999999999999999999999999\r\n\r\n".to_vec();
        let result = read_request(&mut Cursor::new(raw), 1 << 20);

        assert!(matches!(result, Err(ReadError::TooLarge { .. })));
    }

    #[test]
    fn test_read_request_content_length_not_a_number() {
        for value in ["abc", "-5", "12x", ""] {
            let raw = format!("POST /fitness HTTP/1.1\r\nContent-Length: {}\r\n\r\n", value);
            let result = read_request(&mut Cursor::new(raw.into_bytes()), 1024);

            assert!(
                matches!(result, Err(ReadError::InvalidContentLength(_))),
                "value {:?}",
                value
            );
        }
    }

    #[test]
    fn test_read_request_body_exactly_fills_cap() {
        let head = "POST /fitness HTTP/1.1\r\nContent-Length: 4\r\n\r\n";
        let raw = format!("{}[1]x", head);
        let cap = head.len() + 4;

        let data = read_request(&mut Cursor::new(raw.clone().into_bytes()), cap).unwrap().unwrap();
        assert_eq!(data, raw.as_bytes());

        let result = read_request(&mut Cursor::new(raw.into_bytes()), cap - 1);
        assert!(matches!(result, Err(ReadError::TooLarge { .. })));
    }
}
