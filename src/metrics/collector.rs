//! # Collector de Métricas
//! src/metrics/collector.rs
//!
//! Recolecta contadores de requests y de streams en tiempo real.
//!
//! Es el único estado compartido entre requests, y no participa en el
//! streaming: los chunks de una respuesta nunca pasan por aquí, solo los
//! totales cuando un stream arranca o termina.

use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Máximo de latencias a guardar para los percentiles
const MAX_LATENCIES: usize = 10_000;

/// Collector de métricas thread-safe
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsData>>,
    start_time: Instant,
}

/// Datos internos de métricas
#[derive(Default)]
struct MetricsData {
    /// Contador total de requests despachados
    total_requests: u64,

    /// Requests por código de estado
    status_codes: HashMap<u16, u64>,

    /// Últimas latencias de despacho (en microsegundos)
    latencies: VecDeque<u64>,

    /// Streams de archivos iniciados
    streams_started: u64,

    /// Streams que llegaron a EOF y cerraron bien
    streams_completed: u64,

    /// Streams cortados por error de transporte o de lectura
    streams_aborted: u64,

    /// Bytes de archivo escritos por todos los streams
    bytes_streamed: u64,
}

impl MetricsCollector {
    /// Crea un nuevo collector de métricas
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsData {
                latencies: VecDeque::with_capacity(MAX_LATENCIES),
                ..MetricsData::default()
            })),
            start_time: Instant::now(),
        }
    }

    /// Un collector envenenado no debe tumbar el servidor: los datos siguen
    /// siendo contadores válidos.
    fn data(&self) -> MutexGuard<'_, MetricsData> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registra un request despachado
    pub fn record_request(&self, status_code: u16, latency: Duration) {
        let mut data = self.data();

        data.total_requests += 1;
        *data.status_codes.entry(status_code).or_insert(0) += 1;

        if data.latencies.len() >= MAX_LATENCIES {
            data.latencies.pop_front();
        }
        data.latencies.push_back(latency.as_micros() as u64);
    }

    pub fn record_stream_started(&self) {
        self.data().streams_started += 1;
    }

    pub fn record_stream_completed(&self, bytes: u64) {
        let mut data = self.data();
        data.streams_completed += 1;
        data.bytes_streamed += bytes;
    }

    pub fn record_stream_aborted(&self, bytes: u64) {
        let mut data = self.data();
        data.streams_aborted += 1;
        data.bytes_streamed += bytes;
    }

    /// Obtiene las métricas actuales como documento JSON
    pub fn to_json(&self) -> Value {
        let snapshot = self.get_snapshot();
        let data = self.data();

        let status_codes: serde_json::Map<String, Value> = data
            .status_codes
            .iter()
            .map(|(code, count)| (code.to_string(), json!(count)))
            .collect();

        json!({
            "server": {
                "uptime_seconds": snapshot.uptime_secs,
            },
            "requests": {
                "total": snapshot.total_requests,
                "status_codes": status_codes,
            },
            "latency_us": {
                "p50": snapshot.latency_p50_us,
                "p95": snapshot.latency_p95_us,
                "p99": snapshot.latency_p99_us,
                "avg": snapshot.latency_avg_us,
                "samples": data.latencies.len(),
            },
            "streams": {
                "started": snapshot.streams_started,
                "completed": snapshot.streams_completed,
                "aborted": snapshot.streams_aborted,
                "in_flight": snapshot.streams_in_flight(),
                "bytes": snapshot.bytes_streamed,
            },
        })
    }

    /// Calcula percentiles de latencia: (p50, p95, p99, avg)
    fn calculate_percentiles(latencies: &VecDeque<u64>) -> (u64, u64, u64, u64) {
        if latencies.is_empty() {
            return (0, 0, 0, 0);
        }

        let mut sorted: Vec<u64> = latencies.iter().copied().collect();
        sorted.sort_unstable();

        let len = sorted.len();
        let p50 = sorted[len * 50 / 100];
        let p95 = sorted[len * 95 / 100];
        let p99 = sorted[len * 99 / 100];
        let avg = sorted.iter().sum::<u64>() / len as u64;

        (p50, p95, p99, avg)
    }

    /// Obtiene un snapshot de las métricas
    pub fn get_snapshot(&self) -> MetricsSnapshot {
        let data = self.data();
        let (p50, p95, p99, avg) = Self::calculate_percentiles(&data.latencies);

        MetricsSnapshot {
            total_requests: data.total_requests,
            uptime_secs: self.start_time.elapsed().as_secs(),
            latency_p50_us: p50,
            latency_p95_us: p95,
            latency_p99_us: p99,
            latency_avg_us: avg,
            streams_started: data.streams_started,
            streams_completed: data.streams_completed,
            streams_aborted: data.streams_aborted,
            bytes_streamed: data.bytes_streamed,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot de métricas (para uso externo)
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub uptime_secs: u64,
    pub latency_p50_us: u64,
    pub latency_p95_us: u64,
    pub latency_p99_us: u64,
    pub latency_avg_us: u64,
    pub streams_started: u64,
    pub streams_completed: u64,
    pub streams_aborted: u64,
    pub bytes_streamed: u64,
}

impl MetricsSnapshot {
    /// Streams iniciados que todavía no terminaron
    pub fn streams_in_flight(&self) -> u64 {
        self.streams_started
            .saturating_sub(self.streams_completed + self.streams_aborted)
    }
}
