//! # Pool de Workers
//! src/server/pool.rs
//!
//! Cola FIFO thread-safe + N threads que la drenan. Atender una conexión y
//! cada envío asíncrono de un stream son jobs del pool, así que un worker
//! nunca queda tomado por un mismo stream entre chunks: los chunks de
//! streams distintos se intercalan en la cola.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error};

/// Trabajo encolado
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// El pool ya no acepta trabajos
#[derive(Debug, Error)]
#[error("worker pool is shut down")]
pub struct PoolClosed;

struct PoolQueue {
    jobs: VecDeque<Job>,
    closed: bool,
}

struct Shared {
    queue: Mutex<PoolQueue>,
    /// Notifica a los workers cuando hay trabajo nuevo o el pool se cierra
    condvar: Condvar,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, PoolQueue> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Pool de tamaño fijo. Clonarlo comparte el mismo pool.
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
    size: usize,
}

impl WorkerPool {
    /// Crea el pool y arranca `size` workers (mínimo 1)
    pub fn new(size: usize) -> std::io::Result<Self> {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(PoolQueue {
                jobs: VecDeque::new(),
                closed: false,
            }),
            condvar: Condvar::new(),
        });

        let mut handles = Vec::with_capacity(size);
        for i in 0..size {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("worker-{}", i))
                .spawn(move || Self::worker_loop(shared))?;
            handles.push(handle);
        }
        debug!(workers = size, "worker pool started");

        Ok(Self {
            shared,
            handles: Arc::new(Mutex::new(handles)),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Encola un trabajo. Falla si el pool ya se apagó.
    pub fn execute(&self, job: Job) -> Result<(), PoolClosed> {
        let mut queue = self.shared.queue();
        if queue.closed {
            return Err(PoolClosed);
        }
        queue.jobs.push_back(job);
        drop(queue);

        self.shared.condvar.notify_one();
        Ok(())
    }

    /// Trabajos esperando un worker
    pub fn pending(&self) -> usize {
        self.shared.queue().jobs.len()
    }

    /// Cierra la cola, deja que los workers terminen lo encolado y los espera
    pub fn shutdown(&self) {
        self.shared.queue().closed = true;
        self.shared.condvar.notify_all();

        let handles: Vec<JoinHandle<()>> = {
            let mut handles = self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            handles.drain(..).collect()
        };
        let current = thread::current().id();
        for handle in handles {
            // Un worker no puede esperarse a sí mismo
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!("worker panicked during shutdown");
            }
        }
    }

    fn worker_loop(shared: Arc<Shared>) {
        loop {
            let job = {
                let mut queue = shared.queue();
                loop {
                    if let Some(job) = queue.jobs.pop_front() {
                        break job;
                    }
                    if queue.closed {
                        return;
                    }
                    queue = shared
                        .condvar
                        .wait(queue)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
            };

            // Un job que entra en pánico termina solo su request; el worker sigue
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                error!(
                    worker = thread::current().name().unwrap_or("worker"),
                    "job panicked"
                );
            }
        }
    }
}
