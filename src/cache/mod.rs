//! Get-or-create caches with single-flight semantics.
//!
//! For each key the creation closure runs at most once at a time. Callers
//! arriving while it runs block until it finishes and then observe the same
//! `Arc` or the same error. Successes stay cached; a failure is handed to
//! everyone who waited on it and then forgotten, so a later call retries.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace, warn};

use crate::compiler::{CompiledProgram, ShaderCompiler};
use crate::error::{Error, Result};
use crate::identity::KernelIdentity;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Single flight ─────────────────────────────────────────────────

enum State<V: ?Sized> {
    Pending,
    Done(Result<Arc<V>>),
}

struct Flight<V: ?Sized> {
    state: Mutex<State<V>>,
    ready: Condvar,
}

impl<V: ?Sized> Flight<V> {
    fn new() -> Self {
        Self {
            state: Mutex::new(State::Pending),
            ready: Condvar::new(),
        }
    }

    fn wait(&self) -> Result<Arc<V>> {
        let mut state = lock(&self.state);
        loop {
            match &*state {
                State::Done(result) => return result.clone(),
                State::Pending => {
                    state = self.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    fn complete(&self, result: Result<Arc<V>>) {
        *lock(&self.state) = State::Done(result);
        self.ready.notify_all();
    }

    fn succeeded(&self) -> Option<Arc<V>> {
        match &*lock(&self.state) {
            State::Done(Ok(value)) => Some(Arc::clone(value)),
            _ => None,
        }
    }
}

/// Map from key to a lazily created, shared value.
pub struct SingleFlight<K, V: ?Sized> {
    what: &'static str,
    flights: Mutex<HashMap<K, Arc<Flight<V>>>>,
}

impl<K, V: ?Sized> fmt::Debug for SingleFlight<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("what", &self.what)
            .field("entries", &lock(&self.flights).len())
            .finish()
    }
}

/// Finishes the leader's flight even if the creation closure panics.
struct Leader<'a, K: Hash + Eq + fmt::Debug, V: ?Sized> {
    cache: &'a SingleFlight<K, V>,
    key: &'a K,
    flight: &'a Arc<Flight<V>>,
    done: bool,
}

impl<K: Hash + Eq + fmt::Debug, V: ?Sized> Leader<'_, K, V> {
    fn finish(mut self, result: Result<Arc<V>>) -> Result<Arc<V>> {
        self.done = true;
        if result.is_err() {
            self.cache.forget(self.key, self.flight);
        }
        self.flight.complete(result.clone());
        result
    }
}

impl<K: Hash + Eq + fmt::Debug, V: ?Sized> Drop for Leader<'_, K, V> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.cache.forget(self.key, self.flight);
        self.flight.complete(Err(Error::Poisoned {
            what: format!("{} {:?}", self.cache.what, self.key),
        }));
    }
}

impl<K: Hash + Eq + Clone + fmt::Debug, V: ?Sized> SingleFlight<K, V> {
    /// `what` names the cached values in errors (`"shader"`, `"shape"`).
    pub fn new(what: &'static str) -> Self {
        Self {
            what,
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// The value for `key`, running `create` if nobody has produced one.
    pub fn get_or_create(&self, key: &K, create: impl FnOnce() -> Result<Arc<V>>) -> Result<Arc<V>> {
        let (flight, leader) = {
            let mut flights = lock(&self.flights);
            match flights.get(key) {
                Some(flight) => (Arc::clone(flight), false),
                None => {
                    let flight = Arc::new(Flight::new());
                    flights.insert(key.clone(), Arc::clone(&flight));
                    (flight, true)
                }
            }
        };
        if !leader {
            return flight.wait();
        }
        let guard = Leader {
            cache: self,
            key,
            flight: &flight,
            done: false,
        };
        let result = create();
        guard.finish(result)
    }
}

impl<K: Hash + Eq, V: ?Sized> SingleFlight<K, V> {
    /// The value for `key` if one was successfully created.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let flight = lock(&self.flights).get(key).cloned()?;
        flight.succeeded()
    }

    /// Keys with a value or a creation underway.
    pub fn len(&self) -> usize {
        lock(&self.flights).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop `key` only if it still maps to `flight`.
    fn forget(&self, key: &K, flight: &Arc<Flight<V>>) {
        let mut flights = lock(&self.flights);
        if flights.get(key).is_some_and(|current| Arc::ptr_eq(current, flight)) {
            flights.remove(key);
        }
    }
}

// ─── Shader cache ──────────────────────────────────────────────────

/// Compiled programs by kernel identity.
pub struct ShaderCache {
    programs: SingleFlight<KernelIdentity, CompiledProgram>,
    compiler: Arc<dyn ShaderCompiler>,
}

impl fmt::Debug for ShaderCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderCache")
            .field("compiler", &self.compiler.name())
            .field("programs", &self.programs.len())
            .finish()
    }
}

impl ShaderCache {
    pub fn new(compiler: Arc<dyn ShaderCompiler>) -> Self {
        Self {
            programs: SingleFlight::new("shader"),
            compiler,
        }
    }

    pub fn compiler(&self) -> &Arc<dyn ShaderCompiler> {
        &self.compiler
    }

    /// Compile `source` unless `identity` is already cached.
    pub fn get_or_compile(&self, identity: KernelIdentity, source: &str, entry_point: &str) -> Result<Arc<CompiledProgram>> {
        self.get_or_compile_with(identity, entry_point, || Ok(source.to_string()))
    }

    /// Like [`Self::get_or_compile`], but only generates the source on a miss.
    pub fn get_or_compile_with(
        &self,
        identity: KernelIdentity,
        entry_point: &str,
        source: impl FnOnce() -> Result<String>,
    ) -> Result<Arc<CompiledProgram>> {
        let mut compiled = false;
        let result = self.programs.get_or_create(&identity, || {
            compiled = true;
            let text = source()?;
            debug!(
                %identity,
                compiler = self.compiler.name(),
                bytes = text.len(),
                "shader cache miss, compiling"
            );
            match self.compiler.compile(&text, entry_point) {
                Ok(program) => Ok(Arc::new(program)),
                Err(err) => {
                    warn!(%identity, compiler = self.compiler.name(), error = %err, "shader compilation failed");
                    Err(err)
                }
            }
        });
        if !compiled && result.is_ok() {
            trace!(%identity, "shader cache hit");
        }
        result
    }

    pub fn get(&self, identity: KernelIdentity) -> Option<Arc<CompiledProgram>> {
        self.programs.get(&identity)
    }

    /// Cached programs plus compilations underway.
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}
