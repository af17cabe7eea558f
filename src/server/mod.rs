//! # Módulo del Servidor HTTP
//! src/server/mod.rs
//!
//! - **tcp**: acceptor, atención de conexiones y `TcpResponse`
//! - **pool**: pool de workers que ejecuta conexiones y envíos
//!
//! Con un solo worker todo ocurre en un thread y los streams concurrentes
//! avanzan intercalando sus chunks en la cola del pool.

pub mod pool;
pub mod tcp;

pub use pool::{Job, PoolClosed, WorkerPool};
pub use tcp::{Server, ShutdownHandle, TcpResponse};
