//! # Servidor TCP
//! src/server/tcp.rs
//!
//! Un thread acepta conexiones y las entrega al pool. Cada conexión lleva
//! exactamente un request (`Connection: close`):
//!
//! ```text
//! accept → pool: leer request → parsear → Router::dispatch
//!                                          ├─ Reply::Full   → write + finish
//!                                          └─ Reply::Stream → ChunkedFileStreamer
//!                                                              (cada send es otro job del pool)
//! ```

use super::pool::WorkerPool;
use crate::config::Config;
use crate::engine::Engine;
use crate::handlers;
use crate::http::{
    read_request, Continuation, Method, ReadError, Request, Response, ResponseSink, StatusCode,
    TransportError,
};
use crate::metrics::MetricsCollector;
use crate::router::{Reply, Router};
use crate::static_files::{ChunkedFileStreamer, PathResolver, StaticFiles};
use anyhow::Context;
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Lo que necesita cada conexión; se clona hacia los jobs del pool
#[derive(Clone)]
struct ConnectionContext {
    router: Arc<Router>,
    streamer: ChunkedFileStreamer,
    metrics: MetricsCollector,
    pool: WorkerPool,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    max_request_bytes: usize,
}

/// Servidor HTTP de la simulación
pub struct Server {
    listener: TcpListener,
    context: ConnectionContext,
    stopping: Arc<AtomicBool>,
}

/// Permite detener un servidor que corre en otro thread
#[derive(Clone)]
pub struct ShutdownHandle {
    stopping: Arc<AtomicBool>,
    address: SocketAddr,
}

impl ShutdownHandle {
    /// Marca el servidor para detenerse y despierta al acceptor
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let _ = TcpStream::connect(self.address);
    }
}

impl Server {
    /// Arma la tabla de rutas, el pool y abre el socket
    pub fn bind(config: &Config, engine: Arc<dyn Engine>) -> anyhow::Result<Self> {
        let resolver = PathResolver::new(&config.root)
            .with_context(|| format!("document root {} is not usable", config.root.display()))?;
        info!(root = %resolver.root().display(), "serving static files");

        let metrics = MetricsCollector::new();
        let router = Self::build_router(
            StaticFiles::new(resolver),
            engine,
            metrics.clone(),
            config.echo_fitness,
        )
        .context("invalid route pattern")?;

        let pool = WorkerPool::new(config.workers).context("failed to start worker pool")?;

        let listener = TcpListener::bind(config.address())
            .with_context(|| format!("failed to bind {}", config.address()))?;

        Ok(Self {
            listener,
            context: ConnectionContext {
                router: Arc::new(router),
                streamer: ChunkedFileStreamer::new(metrics.clone()),
                metrics,
                pool,
                read_timeout: config.read_timeout(),
                write_timeout: config.stream_timeout(),
                max_request_bytes: config.max_request_bytes,
            },
            stopping: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Tabla de rutas de la aplicación
    ///
    /// | Método | Ruta           | Handler                    |
    /// |--------|----------------|----------------------------|
    /// | POST   | `/fitness`     | siguiente generación (o eco) |
    /// | GET    | `/init_brains` | población inicial          |
    /// | GET    | `/metrics`     | métricas del servidor      |
    /// | GET    | (resto)        | archivos estáticos         |
    pub fn build_router(
        static_files: StaticFiles,
        engine: Arc<dyn Engine>,
        metrics: MetricsCollector,
        echo_fitness: bool,
    ) -> Result<Router, regex::Error> {
        let mut router = Router::new();

        if echo_fitness {
            router.register(Method::POST, "/fitness", |req: &Request| {
                handlers::echo_fitness_handler(req).into()
            })?;
        } else {
            let engine = Arc::clone(&engine);
            router.register(Method::POST, "/fitness", move |req: &Request| {
                handlers::fitness_handler(req, engine.as_ref()).into()
            })?;
        }

        router.register(Method::GET, "/init_brains", move |req: &Request| {
            handlers::init_brains_handler(req, engine.as_ref()).into()
        })?;

        router.register(Method::GET, "/metrics", move |_req: &Request| {
            handlers::metrics_handler(&metrics).into()
        })?;

        router.set_default(move |req: &Request| static_files.serve(req));

        Ok(router)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.context.metrics
    }

    pub fn shutdown_handle(&self) -> io::Result<ShutdownHandle> {
        Ok(ShutdownHandle {
            stopping: Arc::clone(&self.stopping),
            address: self.local_addr()?,
        })
    }

    /// Acepta conexiones hasta que se pida el shutdown
    pub fn run(&self) -> io::Result<()> {
        info!(
            address = %self.local_addr()?,
            workers = self.context.pool.size(),
            "server listening"
        );

        for stream in self.listener.incoming() {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }

            match stream {
                Ok(stream) => {
                    let context = self.context.clone();
                    let job = Box::new(move || Self::handle_connection(stream, &context));
                    if self.context.pool.execute(job).is_err() {
                        warn!("connection dropped: worker pool is shut down");
                    }
                }
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                }
            }
        }

        info!("server stopping");
        self.context.pool.shutdown();
        Ok(())
    }

    fn handle_connection(mut stream: TcpStream, context: &ConnectionContext) {
        let start = Instant::now();
        let request_id = format!("{:016x}", rand::random::<u64>());
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        if let Err(e) = stream.set_read_timeout(context.read_timeout) {
            warn!(peer = %peer, error = %e, "failed to configure socket");
            return;
        }

        let mut reply = match read_request(&mut stream, context.max_request_bytes) {
            Ok(Some(raw)) => match Request::parse(&raw) {
                Ok(request) => {
                    info!(
                        peer = %peer,
                        request_id = %request_id,
                        method = request.method().as_str(),
                        path = request.path(),
                        "request"
                    );
                    context.router.dispatch(&request)
                }
                Err(e) => {
                    debug!(peer = %peer, error = %e, "parse error");
                    Self::rejection(StatusCode::BadRequest, &format!("Invalid request: {}", e))
                }
            },
            Ok(None) => {
                debug!(peer = %peer, "connection closed without a request");
                return;
            }
            Err(e @ ReadError::TooLarge { .. }) => {
                Self::rejection(StatusCode::PayloadTooLarge, &e.to_string())
            }
            Err(e @ ReadError::InvalidContentLength(_)) => {
                Self::rejection(StatusCode::BadRequest, &e.to_string())
            }
            Err(ReadError::Io(e)) => {
                debug!(peer = %peer, error = %e, "failed to read request");
                return;
            }
        };

        reply.head_mut().add_header("X-Request-Id", &request_id);

        let status = reply.status();
        context.metrics.record_request(status.as_u16(), start.elapsed());
        debug!(
            peer = %peer,
            request_id = %request_id,
            status = status.as_u16(),
            "dispatched"
        );

        let sink = match TcpResponse::new(stream, peer.clone(), context.pool.clone(), context.write_timeout) {
            Ok(sink) => Box::new(sink),
            Err(e) => {
                warn!(peer = %peer, error = %e, "failed to configure socket");
                return;
            }
        };

        match reply {
            Reply::Full(response) => {
                let mut sink = sink;
                sink.write(&response.to_bytes());
                if let Err(e) = sink.finish() {
                    warn!(peer = %peer, error = %e, "Connection interrupted");
                }
            }
            Reply::Stream { head, file } => context.streamer.stream(sink, &head, file),
        }
    }

    /// Respuesta para requests que ni siquiera llegan al router
    fn rejection(status: StatusCode, message: &str) -> Reply {
        let mut response = Response::error(status, message);
        Router::add_common_headers(&mut response);
        Reply::Full(response)
    }
}

/// `ResponseSink` sobre un socket TCP. `send` encola el flush en el pool y
/// retorna de inmediato; la continuación corre en el worker que lo hizo.
pub struct TcpResponse {
    stream: TcpStream,
    buffer: Vec<u8>,
    peer: String,
    pool: WorkerPool,
}

impl TcpResponse {
    /// Un cliente que deja de leer más de `write_timeout` aborta la respuesta
    pub fn new(
        stream: TcpStream,
        peer: String,
        pool: WorkerPool,
        write_timeout: Option<Duration>,
    ) -> io::Result<Self> {
        stream.set_write_timeout(write_timeout)?;
        Ok(Self {
            stream,
            buffer: Vec::new(),
            peer,
            pool,
        })
    }

    fn flush_buffer(&mut self) -> Result<(), TransportError> {
        self.stream.write_all(&self.buffer)?;
        self.buffer.clear();
        self.stream.flush()?;
        Ok(())
    }
}

impl ResponseSink for TcpResponse {
    fn write(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    fn send(self: Box<Self>, then: Continuation) {
        let pool = self.pool.clone();

        // Si el pool rechaza el job, el sink y la continuación siguen acá
        let pending = Arc::new(Mutex::new(Some((self, then))));
        let queued = Arc::clone(&pending);

        let job = Box::new(move || {
            let taken = queued.lock().map(|mut slot| slot.take()).unwrap_or(None);
            if let Some((mut sink, then)) = taken {
                let result = sink.flush_buffer();
                then(sink, result);
            }
        });

        if pool.execute(job).is_err() {
            let taken = pending.lock().map(|mut slot| slot.take()).unwrap_or(None);
            if let Some((sink, then)) = taken {
                then(sink, Err(TransportError::PoolClosed));
            }
        }
    }

    fn finish(mut self: Box<Self>) -> Result<(), TransportError> {
        self.flush_buffer()?;
        if let Err(e) = self.stream.shutdown(Shutdown::Write) {
            debug!(peer = %self.peer, error = %e, "shutdown after response");
        }
        Ok(())
    }

    fn peer(&self) -> &str {
        &self.peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineSettings, SeededEngine};
    use std::fs;
    use std::io::Read;
    use std::thread;
    use tempfile::TempDir;

    fn ephemeral_listener() -> TcpListener {
        TcpListener::bind("127.0.0.1:0").expect("bind")
    }

    fn context(root: &TempDir, pool: WorkerPool) -> ConnectionContext {
        let metrics = MetricsCollector::new();
        let engine: Arc<dyn Engine> = Arc::new(SeededEngine::new(EngineSettings {
            population_size: 2,
            seed: Some(9),
            ..EngineSettings::default()
        }));
        let static_files = StaticFiles::new(PathResolver::new(root.path()).unwrap());
        let router = Server::build_router(static_files, engine, metrics.clone(), false).unwrap();

        ConnectionContext {
            router: Arc::new(router),
            streamer: ChunkedFileStreamer::with_chunk_size(1024, metrics.clone()),
            metrics,
            pool,
            read_timeout: Some(Duration::from_secs(5)),
            write_timeout: Some(Duration::from_secs(5)),
            max_request_bytes: 4096,
        }
    }

    /// Atiende una conexión en otro thread y retorna lo que recibió el cliente
    fn roundtrip(context: ConnectionContext, raw: &[u8]) -> String {
        let listener = ephemeral_listener();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            Server::handle_connection(stream, &context);
        });

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(raw).unwrap();

        let mut buf = Vec::new();
        client.read_to_end(&mut buf).unwrap();
        server.join().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    #[test]
    fn test_handle_connection_static_file() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("index.html"), "<h1>bots</h1>").unwrap();
        let pool = WorkerPool::new(1).unwrap();

        let text = roundtrip(context(&root, pool.clone()), b"GET / HTTP/1.1\r\n\r\n");

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: text/html"));
        assert!(text.contains("X-Request-Id:"));
        assert!(text.ends_with("\r\n\r\n<h1>bots</h1>"));
        pool.shutdown();
    }

    #[test]
    fn test_handle_connection_streams_through_pool() {
        let root = TempDir::new().unwrap();
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(root.path().join("big.bin"), &data).unwrap();
        let pool = WorkerPool::new(1).unwrap();

        let text = roundtrip(context(&root, pool.clone()), b"GET /big.bin HTTP/1.1\r\n\r\n");

        assert!(text.contains("Content-Length: 10000"));
        pool.shutdown();
    }

    #[test]
    fn test_handle_connection_missing_file() {
        let root = TempDir::new().unwrap();
        let pool = WorkerPool::new(1).unwrap();

        let text = roundtrip(context(&root, pool.clone()), b"GET /nonexistent HTTP/1.1\r\n\r\n");

        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("/nonexistent"));
        assert!(text.contains("Connection: close"));
        pool.shutdown();
    }

    #[test]
    fn test_handle_connection_parse_error() {
        let root = TempDir::new().unwrap();
        let pool = WorkerPool::new(1).unwrap();

        let text = roundtrip(context(&root, pool.clone()), b"\x00\x01garbage\r\n\r\n");

        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("Invalid request:"));
        pool.shutdown();
    }

    #[test]
    fn test_handle_connection_too_large() {
        let root = TempDir::new().unwrap();
        let pool = WorkerPool::new(1).unwrap();
        // Solo la cabecera: el rechazo ocurre antes de leer el body
        let raw = b"POST /fitness HTTP/1.1\r\nContent-Length: 8000\r\n\r\n";

        let text = roundtrip(context(&root, pool.clone()), raw);

        assert!(text.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
        pool.shutdown();
    }

    #[test]
    fn test_handle_connection_content_length_overflow() {
        let root = TempDir::new().unwrap();
        let pool = WorkerPool::new(1).unwrap();
        let raw = b"POST /fitness HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\n";

        let text = roundtrip(context(&root, pool.clone()), raw);

        assert!(text.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
        pool.shutdown();
    }

    #[test]
    fn test_handle_connection_bad_content_length() {
        let root = TempDir::new().unwrap();
        let pool = WorkerPool::new(1).unwrap();
        let raw = b"POST /fitness HTTP/1.1\r\nContent-Length: ten\r\n\r\n";

        let text = roundtrip(context(&root, pool.clone()), raw);

        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("invalid Content-Length: ten"));
        pool.shutdown();
    }

    #[test]
    fn test_handle_connection_peer_closed_immediately() {
        let root = TempDir::new().unwrap();
        let pool = WorkerPool::new(1).unwrap();
        let context = context(&root, pool.clone());
        let listener = ephemeral_listener();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            Server::handle_connection(stream, &context);
        });

        drop(TcpStream::connect(addr).unwrap());
        server.join().unwrap();
        pool.shutdown();
    }

    #[test]
    fn test_send_after_pool_shutdown_reports_error() {
        let listener = ephemeral_listener();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).unwrap();
        let (stream, _) = listener.accept().unwrap();

        let pool = WorkerPool::new(1).unwrap();
        pool.shutdown();

        let sink = Box::new(TcpResponse::new(stream, "test".to_string(), pool, None).unwrap());
        let (tx, rx) = std::sync::mpsc::channel();
        sink.send(Box::new(move |_sink: Box<dyn ResponseSink>, result: Result<(), TransportError>| {
            tx.send(matches!(result, Err(TransportError::PoolClosed))).unwrap();
        }));

        assert!(rx.recv_timeout(Duration::from_secs(1)).unwrap());
    }
}
