//! # Sistema de Métricas
//! src/metrics/mod.rs
//!
//! Recolección de métricas del servidor, expuestas en `GET /metrics`:
//! - Contadores de requests por código de estado
//! - Latencias de despacho (p50, p95, p99)
//! - Streams iniciados, completados y abortados

pub mod collector;

pub use collector::{MetricsCollector, MetricsSnapshot};
