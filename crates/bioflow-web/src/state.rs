//! Shared application state, cloned into every handler. Grounded on
//! `ferrumdeck::gateway::state::AppState` (a cheap-to-clone bundle of
//! pool/config handles), narrowed to the one collaborator handlers need:
//! the engine façade.

use std::path::PathBuf;
use std::sync::Arc;

use bioflow_core::Engine;
use bioflow_store::StateRepository;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub store: Arc<dyn StateRepository>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, store: Arc<dyn StateRepository>) -> Self {
        Self { engine, store }
    }

    pub fn base_cwd(&self) -> PathBuf {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }
}
