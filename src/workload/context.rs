use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;
use crate::core::error::{Error, Result};
use crate::store::{GeoSession, GeoStore};

/// Everything one worker owns for its lifetime: its backend session and
/// its random source. The session is released when the context drops.
pub struct WorkerContext {
    id: usize,
    session: Box<dyn GeoSession>,
    rng: StdRng,
}

impl WorkerContext {
    pub fn new(id: usize, session: Box<dyn GeoSession>) -> Self {
        WorkerContext {
            id,
            session,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic random source, for tests and reproducible runs.
    pub fn with_seed(id: usize, session: Box<dyn GeoSession>, seed: u64) -> Self {
        WorkerContext {
            id,
            session,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn open(id: usize, store: &dyn GeoStore) -> Result<Self> {
        let session = store
            .open_session()
            .map_err(|e| Error::backend(format!("worker {} could not open a {} session: {}", id, store.name(), e)))?;
        debug!(worker = id, backend = store.name(), "session opened");
        Ok(WorkerContext::new(id, session))
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn session(&mut self) -> &mut dyn GeoSession {
        self.session.as_mut()
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Both halves at once, for calls that draw and query together.
    pub fn parts(&mut self) -> (&mut dyn GeoSession, &mut StdRng) {
        (self.session.as_mut(), &mut self.rng)
    }
}

impl Drop for WorkerContext {
    fn drop(&mut self) {
        debug!(worker = self.id, "session released");
    }
}
