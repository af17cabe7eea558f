//! # Sistema de Routing
//! src/router/mod.rs
//!
//! Mapea (método, patrón de path) a un handler.
//!
//! ```text
//! Request → Router → Handler → Reply::Full   (JSON / error, bufferizado)
//!                            └→ Reply::Stream (archivo estático por chunks)
//! ```
//!
//! Los patrones son expresiones regulares ancladas (`/fitness` equivale a
//! `^/fitness$`) y se prueban en orden de registro: gana el primero que
//! coincide. Un GET que no coincide con nada va al handler por defecto (los
//! archivos estáticos); cualquier otro método sin ruta recibe 404.
//!
//! La tabla se arma una vez antes de aceptar conexiones y después solo se
//! lee, por eso se comparte con un `Arc` sin locks.

use crate::http::{Method, Request, Response, StatusCode};
use crate::static_files::StaticFile;
use regex::Regex;

/// Resultado de un handler
#[derive(Debug)]
pub enum Reply {
    /// Respuesta completa en memoria; se escribe de una sola vez
    Full(Response),

    /// Cabecera + archivo ya abierto; el body sale por chunks
    Stream { head: Response, file: StaticFile },
}

impl Reply {
    /// Código de estado de la respuesta
    pub fn status(&self) -> StatusCode {
        match self {
            Reply::Full(response) => response.status(),
            Reply::Stream { head, .. } => head.status(),
        }
    }

    /// Cabecera (o respuesta completa) para agregar headers comunes
    pub fn head_mut(&mut self) -> &mut Response {
        match self {
            Reply::Full(response) => response,
            Reply::Stream { head, .. } => head,
        }
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Reply::Full(response)
    }
}

/// Tipo de handler: recibe el request y decide la respuesta
pub type Handler = Box<dyn Fn(&Request) -> Reply + Send + Sync>;

/// Una entrada de la tabla de rutas
struct Route {
    method: Method,
    pattern: Regex,
    handler: Handler,
}

/// Router que mapea (método, patrón) a handlers
pub struct Router {
    routes: Vec<Route>,
    default_handler: Option<Handler>,
}

impl Router {
    /// Crea un router vacío, sin handler por defecto
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            default_handler: None,
        }
    }

    /// Registra una ruta
    ///
    /// # Ejemplo
    /// ```
    /// use brain_server::http::{Method, Request, Response};
    /// use brain_server::router::Router;
    ///
    /// let mut router = Router::new();
    /// router
    ///     .register(Method::GET, "/hello", |_req: &Request| {
    ///         Response::json(r#"{"message": "Hello"}"#).into()
    ///     })
    ///     .unwrap();
    /// ```
    pub fn register<F>(&mut self, method: Method, pattern: &str, handler: F) -> Result<(), regex::Error>
    where
        F: Fn(&Request) -> Reply + Send + Sync + 'static,
    {
        let pattern = Regex::new(&format!("^(?:{})$", pattern))?;
        self.routes.push(Route {
            method,
            pattern,
            handler: Box::new(handler),
        });
        Ok(())
    }

    /// Establece el handler para los GET sin ruta (reemplaza al anterior)
    pub fn set_default<F>(&mut self, handler: F)
    where
        F: Fn(&Request) -> Reply + Send + Sync + 'static,
    {
        self.default_handler = Some(Box::new(handler));
    }

    /// Cantidad de rutas registradas (sin contar el default)
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Encuentra y ejecuta el handler apropiado para un request
    ///
    /// ```
    /// use brain_server::http::{Request, StatusCode};
    /// use brain_server::router::Router;
    ///
    /// let router = Router::new();
    /// let request = Request::parse(b"POST /nowhere HTTP/1.1\r\n\r\n").unwrap();
    ///
    /// assert_eq!(router.dispatch(&request).status(), StatusCode::NotFound);
    /// ```
    pub fn dispatch(&self, request: &Request) -> Reply {
        let path = request.path();

        let route = self
            .routes
            .iter()
            .find(|route| route.method == request.method() && route.pattern.is_match(path));

        let mut reply = match (route, &self.default_handler) {
            (Some(route), _) => (route.handler)(request),
            (None, Some(default)) if request.method() == Method::GET => default(request),
            _ => Reply::Full(Response::error(
                StatusCode::NotFound,
                &format!("Route not found: {} {}", request.method().as_str(), path),
            )),
        };

        Self::add_common_headers(reply.head_mut());
        reply
    }

    /// Headers comunes a todas las respuestas
    pub(crate) fn add_common_headers(response: &mut Response) {
        response.add_header("Server", "brain_server");
        response.add_header("Connection", "close");
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
