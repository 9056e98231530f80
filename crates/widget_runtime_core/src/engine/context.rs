//! Dedicated-thread engine implementation.
//!
//! Callers marshal each operation as a command onto one FIFO channel and
//! block on a per-call reply channel. The worker thread owns all logic state.

use crate::bundle::loader::LoadedUnit;
use crate::engine::{EngineError, InstanceId, ModuleInstance, ModuleInstanceHandle};
use crate::logging::describe_panic_payload;
use crate::model::props::PropertySet;
use crate::registry::{FactoryRef, ModuleDescriptor};
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Instant;

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

type Reply<T> = Sender<Result<T, EngineError>>;

enum EngineCommand {
    RegisterModules {
        reply: Reply<Vec<ModuleDescriptor>>,
    },
    Instantiate {
        module: String,
        props: PropertySet,
        reply: Reply<ModuleInstanceHandle>,
    },
    Release {
        instance: InstanceId,
        reply: Reply<()>,
    },
    Teardown {
        reply: Reply<usize>,
    },
}

/// Handle to the engine execution context.
///
/// Cheap to share behind an `Arc`; every method may be called from any
/// thread and is serialized onto the engine thread.
pub struct LogicEngine {
    engine_id: u64,
    commands: Mutex<Option<Sender<EngineCommand>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LogicEngine {
    /// Spawns the execution context and moves `unit` into it.
    ///
    /// # Errors
    /// - `SpawnFailed` when the OS thread cannot be created.
    pub fn start(unit: LoadedUnit, thread_name: &str) -> Result<Self, EngineError> {
        let engine_id = NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed);
        let bundle_id = unit.manifest.bundle_id.clone();
        let (commands, inbox) = mpsc::channel::<EngineCommand>();

        let worker = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || run_worker(EngineState::new(engine_id, unit), inbox))
            .map_err(|err| EngineError::SpawnFailed(err.to_string()))?;

        info!(
            "event=engine_start module=engine status=ok engine_id={} bundle_id={} thread={}",
            engine_id, bundle_id, thread_name
        );

        Ok(Self {
            engine_id,
            commands: Mutex::new(Some(commands)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn engine_id(&self) -> u64 {
        self.engine_id
    }

    /// Extracts one descriptor per declared module.
    pub fn register_modules(&self) -> Result<Vec<ModuleDescriptor>, EngineError> {
        self.call(|reply| EngineCommand::RegisterModules { reply })
    }

    /// Runs `module`'s construction logic on the engine thread.
    ///
    /// # Errors
    /// - `UnknownModule` when the loaded unit declares no such module.
    /// - `ConstructionThrew` when construction returned an error or panicked.
    /// - `EngineTornDown` after teardown.
    pub fn instantiate(
        &self,
        module: &str,
        props: PropertySet,
    ) -> Result<ModuleInstanceHandle, EngineError> {
        let module = module.to_string();
        self.call(move |reply| EngineCommand::Instantiate {
            module,
            props,
            reply,
        })
    }

    /// Disposes one instance and forgets it.
    pub fn release(&self, instance: &ModuleInstanceHandle) -> Result<(), EngineError> {
        if instance.engine_id != self.engine_id {
            return Err(EngineError::UnknownInstance(instance.id));
        }
        let id = instance.id;
        self.call(move |reply| EngineCommand::Release {
            instance: id,
            reply,
        })
    }

    pub fn is_torn_down(&self) -> bool {
        lock(&self.commands).is_none()
    }

    /// Disposes every outstanding instance and stops the execution context.
    ///
    /// Commands queued before teardown complete first. Returns the number of
    /// instances disposed by teardown itself.
    pub fn teardown(&self) -> Result<usize, EngineError> {
        let Some(commands) = lock(&self.commands).take() else {
            return Err(EngineError::EngineTornDown);
        };
        let started_at = Instant::now();

        let (reply, outcome) = mpsc::channel();
        let disposed = match commands.send(EngineCommand::Teardown { reply }) {
            Ok(()) => outcome.recv().ok().and_then(Result::ok).unwrap_or(0),
            Err(_) => 0,
        };
        drop(commands);

        if let Some(worker) = lock(&self.worker).take() {
            if worker.join().is_err() {
                error!(
                    "event=engine_teardown module=engine status=error engine_id={} error_code=worker_panicked",
                    self.engine_id
                );
            }
        }

        info!(
            "event=engine_teardown module=engine status=ok engine_id={} disposed={} duration_ms={}",
            self.engine_id,
            disposed,
            started_at.elapsed().as_millis()
        );
        Ok(disposed)
    }

    fn call<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> EngineCommand,
    ) -> Result<T, EngineError> {
        let commands = lock(&self.commands)
            .as_ref()
            .cloned()
            .ok_or(EngineError::EngineTornDown)?;
        let (reply, outcome) = mpsc::channel();
        commands
            .send(build(reply))
            .map_err(|_| EngineError::EngineTornDown)?;
        outcome.recv().map_err(|_| EngineError::EngineTornDown)?
    }
}

impl Drop for LogicEngine {
    fn drop(&mut self) {
        if !self.is_torn_down() {
            warn!(
                "event=engine_drop module=engine status=warn engine_id={} reason=not_torn_down",
                self.engine_id
            );
            let _ = self.teardown();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct LiveInstance {
    module: String,
    instance: Box<dyn ModuleInstance>,
}

struct EngineState {
    engine_id: u64,
    unit: LoadedUnit,
    slots: BTreeMap<String, usize>,
    instances: BTreeMap<InstanceId, LiveInstance>,
    next_instance: u64,
}

impl EngineState {
    fn new(engine_id: u64, unit: LoadedUnit) -> Self {
        let slots = unit
            .modules
            .iter()
            .enumerate()
            .map(|(slot, linked)| (linked.declaration.name.clone(), slot))
            .collect();
        Self {
            engine_id,
            unit,
            slots,
            instances: BTreeMap::new(),
            next_instance: 1,
        }
    }

    fn register_modules(&self) -> Vec<ModuleDescriptor> {
        self.unit
            .modules
            .iter()
            .enumerate()
            .map(|(slot, linked)| ModuleDescriptor {
                name: linked.declaration.name.clone(),
                entry: linked.declaration.entry.clone(),
                factory: FactoryRef {
                    engine_id: self.engine_id,
                    slot,
                },
            })
            .collect()
    }

    fn instantiate(
        &mut self,
        module: String,
        props: PropertySet,
    ) -> Result<ModuleInstanceHandle, EngineError> {
        let Some(slot) = self.slots.get(module.as_str()).copied() else {
            return Err(EngineError::UnknownModule(module));
        };
        let logic = Arc::clone(&self.unit.modules[slot].logic);

        let constructed = match panic::catch_unwind(AssertUnwindSafe(|| logic.construct(&props))) {
            Ok(Ok(instance)) => instance,
            Ok(Err(err)) => {
                return Err(EngineError::ConstructionThrew {
                    module,
                    message: err.message,
                })
            }
            Err(payload) => {
                return Err(EngineError::ConstructionThrew {
                    module,
                    message: describe_panic_payload(payload.as_ref()),
                })
            }
        };

        let id = InstanceId(self.next_instance);
        self.next_instance += 1;
        debug!(
            "event=engine_instantiate module=engine status=ok engine_id={} instance={} module_name={} prop_keys={}",
            self.engine_id,
            id,
            module,
            props.len()
        );
        self.instances.insert(
            id,
            LiveInstance {
                module: module.clone(),
                instance: constructed,
            },
        );
        Ok(ModuleInstanceHandle {
            id,
            module,
            engine_id: self.engine_id,
        })
    }

    fn release(&mut self, id: InstanceId) -> Result<(), EngineError> {
        let live = self
            .instances
            .remove(&id)
            .ok_or(EngineError::UnknownInstance(id))?;
        dispose(self.engine_id, id, live);
        Ok(())
    }

    fn teardown(&mut self) -> usize {
        let live = std::mem::take(&mut self.instances);
        let count = live.len();
        for (id, instance) in live.into_iter().rev() {
            dispose(self.engine_id, id, instance);
        }
        count
    }
}

fn dispose(engine_id: u64, id: InstanceId, mut live: LiveInstance) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| live.instance.dispose()));
    if let Err(payload) = outcome {
        warn!(
            "event=engine_dispose module=engine status=error engine_id={} instance={} module_name={} error_code=dispose_panicked error={}",
            engine_id,
            id,
            live.module,
            describe_panic_payload(payload.as_ref())
        );
    }
}

fn run_worker(mut state: EngineState, inbox: Receiver<EngineCommand>) {
    while let Ok(command) = inbox.recv() {
        match command {
            EngineCommand::RegisterModules { reply } => {
                let _ = reply.send(Ok(state.register_modules()));
            }
            EngineCommand::Instantiate {
                module,
                props,
                reply,
            } => {
                let _ = reply.send(state.instantiate(module, props));
            }
            EngineCommand::Release { instance, reply } => {
                let _ = reply.send(state.release(instance));
            }
            EngineCommand::Teardown { reply } => {
                let disposed = state.teardown();
                let _ = reply.send(Ok(disposed));
                break;
            }
        }
    }
    // Remaining queued commands are dropped with `inbox`; their callers observe
    // a closed reply channel and report `EngineTornDown`.
}
