//! # Streaming de Archivos por Chunks
//! src/static_files/streamer.rs
//!
//! Envía un archivo al cliente en chunks de tamaño fijo (128 KiB) sin
//! bloquear un worker por stream. Cada stream es una máquina de estados que
//! avanza con las continuaciones del sink:
//!
//! ```text
//! start ─▶ write(cabecera) ─▶ leer chunk
//!            ┌───────────────────┘
//!            ├─ 0 bytes        ─▶ finish            (Complete)
//!            ├─ < chunk_size   ─▶ write ─▶ finish   (Complete)
//!            └─ chunk completo ─▶ write ─▶ send ──▶ Ok  ─▶ leer chunk
//!                                                └─▶ Err ─▶ log     (Aborted)
//! ```
//!
//! El siguiente chunk solo se lee cuando llega la continuación del anterior,
//! así que por stream hay a lo sumo un envío en vuelo y los bytes salen en
//! el orden del archivo. El buffer vive dentro del [`StreamState`] de cada
//! stream; ningún otro stream lo ve.

use crate::error::ServeError;
use crate::http::{Response, ResponseSink, StatusCode, TransportError};
use crate::metrics::MetricsCollector;
use crate::static_files::resolver::ResolvedPath;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, warn};

/// Tamaño de cada chunk: 128 KiB
pub const CHUNK_SIZE: usize = 128 * 1024;

/// Archivo ya abierto y medido, listo para hacer streaming
///
/// Abrir antes de escribir cualquier byte permite que una falla de apertura
/// todavía se convierta en una respuesta de error completa.
#[derive(Debug)]
pub struct StaticFile {
    file: File,
    length: u64,
    display: String,
}

impl StaticFile {
    /// Abre el archivo en modo binario y mide su largo
    ///
    /// El largo se obtiene posicionándose al final y volviendo al inicio.
    pub fn open(resolved: &ResolvedPath) -> Result<Self, ServeError> {
        let path = resolved.as_path();
        let mut file = File::open(path).map_err(ServeError::FileOpenFailure)?;

        let length = file
            .seek(SeekFrom::End(0))
            .and_then(|length| file.seek(SeekFrom::Start(0)).map(|_| length))
            .map_err(ServeError::FileOpenFailure)?;

        Ok(Self {
            file,
            length,
            display: path.display().to_string(),
        })
    }

    /// Largo total en bytes (lo que se anuncia en `Content-Length`)
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Cabecera `200 OK` para este archivo, con caché deshabilitada
    pub fn response_head(&self) -> Response {
        Response::new(StatusCode::Ok)
            .with_header("Content-Type", content_type(Path::new(&self.display)))
            .with_header("Content-Length", &self.length.to_string())
            .with_header("Cache-Control", "no-cache, no-store, must-revalidate")
            .with_header("Pragma", "no-cache")
            .with_header("Expires", "0")
    }
}

/// Content-Type según la extensión
fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
        .as_str()
    {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}

/// Estado de un stream en curso: archivo, cursor y buffer propio
pub struct StreamState {
    file: StaticFile,
    buffer: Box<[u8]>,
    sent: u64,
    started: Instant,
}

impl StreamState {
    /// Cada stream reserva su propio buffer
    fn new(file: StaticFile, chunk_size: usize) -> Self {
        Self {
            file,
            buffer: vec![0u8; chunk_size].into_boxed_slice(),
            sent: 0,
            started: Instant::now(),
        }
    }

    /// Llena el buffer hasta `chunk_size` o hasta EOF
    ///
    /// Nunca lee más allá del largo anunciado: si el archivo creció después
    /// de medirlo, los bytes extra no se envían.
    fn read_chunk(&mut self) -> io::Result<usize> {
        let remaining = self.file.length.saturating_sub(self.sent);
        let want = (self.buffer.len() as u64).min(remaining) as usize;

        let mut filled = 0;
        while filled < want {
            match self.file.file.read(&mut self.buffer[filled..want]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

/// Motor de streaming. Es barato de clonar: cada continuación se lleva una copia.
#[derive(Clone)]
pub struct ChunkedFileStreamer {
    chunk_size: usize,
    metrics: MetricsCollector,
}

impl ChunkedFileStreamer {
    pub fn new(metrics: MetricsCollector) -> Self {
        Self::with_chunk_size(CHUNK_SIZE, metrics)
    }

    /// Streamer con otro tamaño de chunk (los tests usan chunks chicos)
    pub fn with_chunk_size(chunk_size: usize, metrics: MetricsCollector) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            metrics,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Escribe la cabecera y arranca el stream. Retorna de inmediato; el
    /// resto avanza con las continuaciones del sink.
    pub fn stream(&self, mut sink: Box<dyn ResponseSink>, head: &Response, file: StaticFile) {
        debug!(
            peer = sink.peer(),
            file = %file.display,
            bytes = file.length,
            "starting stream"
        );

        sink.write(&head.head_bytes());
        self.metrics.record_stream_started();

        let state = StreamState::new(file, self.chunk_size);
        self.clone().pump(sink, state);
    }

    /// Un paso de la máquina de estados: leer, escribir y decidir
    fn pump(self, mut sink: Box<dyn ResponseSink>, mut state: StreamState) {
        let read = match state.read_chunk() {
            Ok(read) => read,
            Err(err) => {
                // La cabecera ya prometió un largo: solo queda cortar la conexión
                warn!(
                    peer = sink.peer(),
                    file = %state.file.display,
                    error = %err,
                    "read failed mid-stream"
                );
                self.metrics.record_stream_aborted(state.sent);
                return;
            }
        };

        if read == 0 {
            return self.complete(sink, state);
        }

        sink.write(&state.buffer[..read]);
        state.sent += read as u64;

        if read < state.buffer.len() {
            // Lectura corta: era el último chunk
            return self.complete(sink, state);
        }

        sink.send(Box::new(
            move |sink: Box<dyn ResponseSink>, result: Result<(), TransportError>| match result {
                Ok(()) => self.pump(sink, state),
                Err(err) => self.abort(sink.as_ref(), &state, &err),
            },
        ));
    }

    fn complete(&self, sink: Box<dyn ResponseSink>, state: StreamState) {
        let peer = sink.peer().to_string();

        match sink.finish() {
            Ok(()) => {
                debug!(
                    peer = %peer,
                    file = %state.file.display,
                    bytes = state.sent,
                    elapsed_ms = state.started.elapsed().as_millis() as u64,
                    "stream complete"
                );
                self.metrics.record_stream_completed(state.sent);
            }
            Err(err) => self.abort_with_peer(&peer, &state, &err),
        }
    }

    fn abort(&self, sink: &dyn ResponseSink, state: &StreamState, err: &TransportError) {
        self.abort_with_peer(sink.peer(), state, err);
    }

    /// Sin reintentos: una entrega parcial a un cliente caído no se recupera
    fn abort_with_peer(&self, peer: &str, state: &StreamState, err: &TransportError) {
        warn!(
            peer,
            file = %state.file.display,
            sent = state.sent,
            total = state.file.length,
            error = %err,
            "Connection interrupted"
        );
        self.metrics.record_stream_aborted(state.sent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Continuation;
    use crate::static_files::resolver::PathResolver;
    use std::collections::VecDeque;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Lo que observó un sink de prueba
    #[derive(Default)]
    struct SinkLog {
        /// Cada llamada a `write`, en orden (la primera es la cabecera)
        writes: Vec<Vec<u8>>,
        /// Bytes que efectivamente salieron (por `send` o `finish`)
        delivered: Vec<u8>,
        sends: usize,
        in_flight: usize,
        max_in_flight: usize,
        finished: bool,
    }

    impl SinkLog {
        fn body(&self) -> &[u8] {
            let head_len = self.writes[0].len();
            &self.delivered[head_len..]
        }

        fn chunk_sizes(&self) -> Vec<usize> {
            self.writes[1..].iter().map(|w| w.len()).collect()
        }
    }

    type Pending = (Box<ScriptedSink>, Continuation);

    /// Cola de completions: simula el event loop del transporte
    #[derive(Clone, Default)]
    struct CompletionQueue(Arc<Mutex<VecDeque<Pending>>>);

    impl CompletionQueue {
        /// Entrega completions en orden FIFO hasta que no quede nada
        fn run_until_idle(&self) {
            loop {
                let next = self.0.lock().unwrap().pop_front();
                let Some((mut sink, then)) = next else { break };

                let result = sink.complete_send();
                then(sink, result);
            }
        }
    }

    /// Sink que no toca la red: registra todo y encola las completions
    struct ScriptedSink {
        log: Arc<Mutex<SinkLog>>,
        pending: Vec<u8>,
        queue: CompletionQueue,
        /// Falla el envío número N (1-based) con BrokenPipe
        fail_on_send: Option<usize>,
    }

    impl ScriptedSink {
        fn new(queue: &CompletionQueue) -> (Box<Self>, Arc<Mutex<SinkLog>>) {
            let log = Arc::new(Mutex::new(SinkLog::default()));
            let sink = Box::new(Self {
                log: Arc::clone(&log),
                pending: Vec::new(),
                queue: queue.clone(),
                fail_on_send: None,
            });
            (sink, log)
        }

        fn complete_send(&mut self) -> Result<(), TransportError> {
            let mut log = self.log.lock().unwrap();
            log.in_flight -= 1;

            if self.fail_on_send == Some(log.sends) {
                self.pending.clear();
                return Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "client went away",
                )));
            }
            log.delivered.extend(self.pending.drain(..));
            Ok(())
        }
    }

    impl ResponseSink for ScriptedSink {
        fn write(&mut self, bytes: &[u8]) {
            self.log.lock().unwrap().writes.push(bytes.to_vec());
            self.pending.extend_from_slice(bytes);
        }

        fn send(self: Box<Self>, then: Continuation) {
            {
                let mut log = self.log.lock().unwrap();
                log.sends += 1;
                log.in_flight += 1;
                log.max_in_flight = log.max_in_flight.max(log.in_flight);
            }
            let queue = self.queue.clone();
            queue.0.lock().unwrap().push_back((self, then));
        }

        fn finish(mut self: Box<Self>) -> Result<(), TransportError> {
            let mut log = self.log.lock().unwrap();
            log.delivered.extend(self.pending.drain(..));
            log.finished = true;
            Ok(())
        }

        fn peer(&self) -> &str {
            "scripted"
        }
    }

    /// Archivo con contenido no periódico para detectar cruces y desorden
    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len)
            .map(|i| (i as u32).wrapping_mul(31).wrapping_add(seed as u32 * 7) as u8 ^ (i >> 8) as u8)
            .collect()
    }

    fn open_fixture(tmp: &TempDir, name: &str, contents: &[u8]) -> StaticFile {
        fs::write(tmp.path().join(name), contents).unwrap();
        let resolver = PathResolver::new(tmp.path()).unwrap();
        StaticFile::open(&resolver.resolve(name).unwrap()).unwrap()
    }

    fn stream_file(contents: &[u8], chunk_size: usize) -> (Arc<Mutex<SinkLog>>, MetricsCollector) {
        let tmp = TempDir::new().unwrap();
        let file = open_fixture(&tmp, "data.bin", contents);
        let metrics = MetricsCollector::new();
        let streamer = ChunkedFileStreamer::with_chunk_size(chunk_size, metrics.clone());
        let queue = CompletionQueue::default();
        let (sink, log) = ScriptedSink::new(&queue);

        let head = file.response_head();
        streamer.stream(sink, &head, file);
        queue.run_until_idle();

        (log, metrics)
    }

    fn header_value(head: &[u8], name: &str) -> Option<String> {
        String::from_utf8_lossy(head)
            .split("\r\n")
            .filter_map(|line| line.split_once(": "))
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.to_string())
    }

    #[test]
    fn test_open_measures_length() {
        let tmp = TempDir::new().unwrap();
        let file = open_fixture(&tmp, "a.js", b"console.log(1)");

        assert_eq!(file.len(), 14);
        let head = file.response_head();
        assert_eq!(head.header("Content-Length"), Some("14"));
        assert_eq!(head.header("Content-Type"), Some("application/javascript"));
    }

    #[test]
    fn test_head_disables_caching() {
        let tmp = TempDir::new().unwrap();
        let head = open_fixture(&tmp, "index.html", b"<p>").response_head();

        assert_eq!(head.status(), StatusCode::Ok);
        assert_eq!(
            head.header("Cache-Control"),
            Some("no-cache, no-store, must-revalidate")
        );
        assert_eq!(head.header("Pragma"), Some("no-cache"));
        assert_eq!(head.header("Expires"), Some("0"));
    }

    #[test]
    fn test_open_failure_after_resolution() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("gone.txt"), b"x").unwrap();
        let resolver = PathResolver::new(tmp.path()).unwrap();
        let resolved = resolver.resolve("/gone.txt").unwrap();

        fs::remove_file(tmp.path().join("gone.txt")).unwrap();

        assert!(matches!(
            StaticFile::open(&resolved),
            Err(ServeError::FileOpenFailure(_))
        ));
    }

    #[test]
    fn test_small_file_is_one_short_chunk() {
        let contents = pattern(1000, 1);
        let (log, metrics) = stream_file(&contents, 4096);
        let log = log.lock().unwrap();

        assert_eq!(log.chunk_sizes(), vec![1000]);
        assert_eq!(log.sends, 0);
        assert!(log.finished);
        assert_eq!(log.body(), &contents[..]);
        assert_eq!(metrics.get_snapshot().streams_completed, 1);
    }

    #[test]
    fn test_exact_multiple_needs_no_extra_send() {
        let contents = pattern(4 * 1024, 2);
        let (log, _) = stream_file(&contents, 1024);
        let log = log.lock().unwrap();

        assert_eq!(log.chunk_sizes(), vec![1024; 4]);
        // Un send por chunk completo; el "chunk" final de 0 bytes no envía nada
        assert_eq!(log.sends, 4);
        assert!(log.finished);
        assert_eq!(log.body(), &contents[..]);
    }

    #[test]
    fn test_bytes_sum_matches_content_length() {
        for len in [0usize, 1, 1023, 1024, 1025, 10 * 1024 + 17] {
            let contents = pattern(len, 3);
            let (log, metrics) = stream_file(&contents, 1024);
            let log = log.lock().unwrap();

            let declared: usize = header_value(&log.writes[0], "Content-Length")
                .unwrap()
                .parse()
                .unwrap();
            assert_eq!(declared, len);
            assert_eq!(log.chunk_sizes().iter().sum::<usize>(), len);
            assert_eq!(log.body(), &contents[..], "len {}", len);
            assert_eq!(metrics.get_snapshot().bytes_streamed, len as u64);
        }
    }

    #[test]
    fn test_empty_file_sends_headers_only() {
        let (log, _) = stream_file(b"", 1024);
        let log = log.lock().unwrap();

        assert!(log.chunk_sizes().is_empty());
        assert_eq!(log.sends, 0);
        assert!(log.finished);
        assert!(log.body().is_empty());
        assert_eq!(header_value(&log.writes[0], "Content-Length").as_deref(), Some("0"));
    }

    #[test]
    fn test_default_chunk_size_is_128k() {
        let contents = pattern(CHUNK_SIZE * 2 + 5, 4);
        let (log, _) = stream_file(&contents, CHUNK_SIZE);
        let log = log.lock().unwrap();

        assert_eq!(log.chunk_sizes(), vec![CHUNK_SIZE, CHUNK_SIZE, 5]);
        assert_eq!(log.body(), &contents[..]);
    }

    #[test]
    fn test_one_send_in_flight_per_stream() {
        let contents = pattern(64 * 1024 + 3, 5);
        let (log, _) = stream_file(&contents, 512);
        let log = log.lock().unwrap();

        assert_eq!(log.max_in_flight, 1);
        assert_eq!(log.sends, 128);
    }

    #[test]
    fn test_transport_error_aborts_stream() {
        let tmp = TempDir::new().unwrap();
        let contents = pattern(10 * 1024, 6);
        let file = open_fixture(&tmp, "big.bin", &contents);
        let metrics = MetricsCollector::new();
        let streamer = ChunkedFileStreamer::with_chunk_size(1024, metrics.clone());
        let queue = CompletionQueue::default();
        let (mut sink, log) = ScriptedSink::new(&queue);
        sink.fail_on_send = Some(3);

        let head = file.response_head();
        streamer.stream(sink, &head, file);
        queue.run_until_idle();

        let log = log.lock().unwrap();
        // No hay más lecturas ni envíos después del error
        assert_eq!(log.sends, 3);
        assert_eq!(log.chunk_sizes(), vec![1024; 3]);
        assert!(!log.finished);

        let snapshot = metrics.get_snapshot();
        assert_eq!(snapshot.streams_aborted, 1);
        assert_eq!(snapshot.streams_completed, 0);
    }

    #[test]
    fn test_interleaved_streams_do_not_cross() {
        let tmp = TempDir::new().unwrap();
        let first = pattern(200 * 1024 + 11, 7);
        let second = pattern(150 * 1024 + 3, 8);
        let file_a = open_fixture(&tmp, "a.bin", &first);
        let file_b = open_fixture(&tmp, "b.bin", &second);

        let metrics = MetricsCollector::new();
        let streamer = ChunkedFileStreamer::with_chunk_size(4096, metrics.clone());
        let queue = CompletionQueue::default();
        let (sink_a, log_a) = ScriptedSink::new(&queue);
        let (sink_b, log_b) = ScriptedSink::new(&queue);

        // Ambos streams comparten la misma cola: las completions se alternan
        let head_a = file_a.response_head();
        let head_b = file_b.response_head();
        streamer.stream(sink_a, &head_a, file_a);
        streamer.stream(sink_b, &head_b, file_b);
        queue.run_until_idle();

        assert_eq!(log_a.lock().unwrap().body(), &first[..]);
        assert_eq!(log_b.lock().unwrap().body(), &second[..]);
        assert_eq!(metrics.get_snapshot().streams_completed, 2);
    }

    #[test]
    fn test_content_type_guess() {
        assert_eq!(content_type(Path::new("a/index.HTML")), "text/html; charset=utf-8");
        assert_eq!(content_type(Path::new("style.css")), "text/css");
        assert_eq!(content_type(Path::new("blob")), "application/octet-stream");
    }
}
