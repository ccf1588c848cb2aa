// =============================================================================
// Application State — the single lock guarding the engine
// =============================================================================
//
// Every tick and every command takes this lock for its full duration; there
// are no genuine read-only callers besides the ui-data and health endpoints,
// which take the same lock just long enough to clone a snapshot.
// =============================================================================

use parking_lot::Mutex;

use crate::engine::Engine;

pub struct AppState {
    pub engine: Mutex<Engine>,
}

impl AppState {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Mutex::new(engine),
        }
    }
}
