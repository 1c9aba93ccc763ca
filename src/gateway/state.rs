use crate::cache::Caches;
use crate::engine::Engine;
use crate::provider::TextProvider;
use crate::semantic::Embedder;

/// Shared state for the HTTP handlers.
pub struct HandlerState<P: TextProvider + ?Sized + 'static, E: Embedder + ?Sized + 'static> {
    pub engine: Engine<P, E>,
    pub caches: Caches,
}

impl<P: TextProvider + ?Sized, E: Embedder + ?Sized> Clone for HandlerState<P, E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            caches: self.caches.clone(),
        }
    }
}

impl<P: TextProvider + ?Sized + 'static, E: Embedder + ?Sized + 'static> HandlerState<P, E> {
    pub fn new(engine: Engine<P, E>, caches: Caches) -> Self {
        Self { engine, caches }
    }
}
