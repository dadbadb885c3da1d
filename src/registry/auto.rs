use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{ApiManager, RegisteredApi};
use crate::store::ObjectStore;
use crate::{Error, Result};

/// A registry change emitted before or after the [`ApiManager`] exists.
pub enum Registration {
    Api(RegisteredApi),
    Store(Arc<dyn ObjectStore>),
    /// Drops the API and store of an `apiBase`, e.g. after its CRD was deleted.
    Unregister(String),
}

impl Registration {
    fn apply(self, manager: &ApiManager) {
        match self {
            Registration::Api(api) => manager.register_api(api),
            Registration::Store(store) => manager.register_store(store),
            Registration::Unregister(api_base) => manager.unregister(&api_base),
        }
    }
}

enum State {
    Uninitialized,
    Buffering(VecDeque<Registration>),
    Initialized(Arc<ApiManager>),
}

/// Two-phase registration: changes emitted before a registry is attached are queued, then
/// replayed in emission order when it is.
pub struct AutoRegistrar {
    state: Mutex<State>,
}

impl Default for AutoRegistrar {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::Uninitialized),
        }
    }
}

impl AutoRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, registration: Registration) {
        let mut state = self.state.lock();
        match &mut *state {
            State::Uninitialized => {
                *state = State::Buffering(VecDeque::from([registration]));
            }
            State::Buffering(queue) => queue.push_back(registration),
            State::Initialized(manager) => registration.apply(manager),
        }
    }

    /// Attaches the registry and drains the queue into it. Can only happen once.
    pub fn attach(&self, manager: Arc<ApiManager>) -> Result<()> {
        let mut state = self.state.lock();
        let queued = match mem::replace(&mut *state, State::Uninitialized) {
            State::Uninitialized => VecDeque::new(),
            State::Buffering(queue) => queue,
            initialized @ State::Initialized(_) => {
                *state = initialized;
                return Err(Error::AlreadyInitialized);
            }
        };

        log::debug!("applying {} buffered registration(s)", queued.len());
        for registration in queued {
            registration.apply(&manager);
        }
        *state = State::Initialized(manager);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        matches!(*self.state.lock(), State::Initialized(_))
    }

    /// Number of registrations waiting for a registry.
    pub fn buffered(&self) -> usize {
        match &*self.state.lock() {
            State::Buffering(queue) => queue.len(),
            _ => 0,
        }
    }
}
