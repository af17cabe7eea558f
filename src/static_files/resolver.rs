//! # Resolución de Paths
//! src/static_files/resolver.rs
//!
//! Traduce el path de un request a un archivo dentro del document root.
//!
//! 1. El root se canonicaliza una sola vez, al construir el resolver.
//! 2. El path del request se une al root y se canonicaliza: esto resuelve
//!    `.`, `..` y symlinks.
//! 3. Si el resultado no desciende del root canónico → `PathForbidden`.
//! 4. Si es un directorio se le agrega `index.html` y se valida de nuevo.
//! 5. Si no existe o no es un archivo regular → `PathNotFound`.
//!
//! El resultado es una foto del filesystem: el archivo puede desaparecer
//! antes de abrirlo, por eso la apertura tiene su propio error
//! ([`ServeError::FileOpenFailure`]).

use crate::error::ServeError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Archivo que se sirve cuando el path apunta a un directorio
pub const INDEX_FILE: &str = "index.html";

/// Path canónico validado dentro del document root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath(PathBuf);

impl ResolvedPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

/// Resolver de paths contra un document root fijo
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Canonicaliza el document root. Falla si no existe o no es directorio.
    pub fn new<P: AsRef<Path>>(document_root: P) -> io::Result<Self> {
        let root = fs::canonicalize(document_root.as_ref())?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("document root {} is not a directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    /// Document root canónico
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resuelve `request_path` (ya decodificado) a un archivo servible
    pub fn resolve(&self, request_path: &str) -> Result<ResolvedPath, ServeError> {
        // Sin los '/' iniciales, `join` no reemplaza el root por un path absoluto
        let relative = request_path.trim_start_matches(['/', '\\']);

        let mut path = self.contain(&self.root.join(relative))?;

        if path.is_dir() {
            path = self.contain(&path.join(INDEX_FILE))?;
        }

        if !path.is_file() {
            return Err(ServeError::PathNotFound);
        }

        Ok(ResolvedPath(path))
    }

    /// Canonicaliza y verifica que el resultado siga dentro del root
    fn contain(&self, candidate: &Path) -> Result<PathBuf, ServeError> {
        let canonical = fs::canonicalize(candidate).map_err(|_| ServeError::PathNotFound)?;

        if !canonical.starts_with(&self.root) {
            return Err(ServeError::PathForbidden);
        }

        Ok(canonical)
    }
}
