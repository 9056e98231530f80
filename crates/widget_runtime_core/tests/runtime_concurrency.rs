use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use widget_runtime_core::{
    BundleLoader, BundleLocation, ConstructionError, HeadlessPresenter, InMemoryBundleSource,
    LogicCatalog, ModuleInstance, ModuleLogic, PropertySet, RuntimeConfig, RuntimeController,
    RuntimeError, RuntimeState,
};

const BUNDLE: &str = r#"{
    "format_version": 1,
    "bundle_id": "demo.race",
    "version": "0.1.0",
    "modules": [{"name": "Counter", "entry": "demo.counter"}]
}"#;

#[derive(Default)]
struct Tally {
    constructed: AtomicUsize,
    disposed: AtomicUsize,
}

struct Counter {
    tally: Arc<Tally>,
}

impl ModuleInstance for Counter {
    fn dispose(&mut self) {
        self.tally.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

struct CounterLogic {
    tally: Arc<Tally>,
}

impl ModuleLogic for CounterLogic {
    fn construct(&self, _props: &PropertySet) -> Result<Box<dyn ModuleInstance>, ConstructionError> {
        self.tally.constructed.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Counter {
            tally: Arc::clone(&self.tally),
        }))
    }
}

fn setup() -> (Arc<RuntimeController>, Arc<HeadlessPresenter>, Arc<Tally>) {
    let source = InMemoryBundleSource::new();
    source.insert("race", BUNDLE.as_bytes().to_vec());
    let tally = Arc::new(Tally::default());
    let catalog = LogicCatalog::new()
        .with(
            "demo.counter",
            CounterLogic {
                tally: Arc::clone(&tally),
            },
        )
        .unwrap();
    let presenter = Arc::new(HeadlessPresenter::new());
    let runtime = RuntimeController::new(
        BundleLocation::memory("race"),
        BundleLoader::new(Arc::new(source), catalog),
        presenter.clone(),
        RuntimeConfig::default(),
    );
    (Arc::new(runtime), presenter, tally)
}

#[test]
fn concurrent_start_runs_one_load() {
    let (runtime, _presenter, _tally) = setup();
    let barrier = Arc::new(Barrier::new(6));
    let workers: Vec<_> = (0..6)
        .map(|_| {
            let runtime = Arc::clone(&runtime);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                runtime.start()
            })
        })
        .collect();

    for worker in workers {
        assert_eq!(worker.join().unwrap(), Ok(()));
    }
    assert_eq!(runtime.state(), RuntimeState::Running);
    assert_eq!(runtime.load_receipt().unwrap().module_count, 1);
}

#[test]
fn invalidate_racing_creation_leaves_nothing_behind() {
    let (runtime, presenter, tally) = setup();
    runtime.start().unwrap();

    let creators = 4;
    let barrier = Arc::new(Barrier::new(creators + 1));
    let workers: Vec<_> = (0..creators)
        .map(|_| {
            let runtime = Arc::clone(&runtime);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut kept = Vec::new();
                for _ in 0..25 {
                    match runtime.create_surface("Counter", PropertySet::new()) {
                        Ok(handle) => kept.push(handle),
                        Err(RuntimeError::InvalidState { .. }) => break,
                        Err(other) => panic!("unexpected failure: {other}"),
                    }
                }
                kept
            })
        })
        .collect();

    barrier.wait();
    runtime.invalidate();

    let handles: Vec<_> = workers
        .into_iter()
        .flat_map(|worker| worker.join().unwrap())
        .collect();

    assert_eq!(runtime.state(), RuntimeState::Invalidated);
    assert_eq!(runtime.live_surface_count(), 0);
    assert_eq!(presenter.live_count(), 0);
    assert!(handles.iter().all(|handle| !handle.is_live()));

    let constructed = tally.constructed.load(Ordering::SeqCst);
    assert_eq!(tally.disposed.load(Ordering::SeqCst), constructed);
    assert_eq!(presenter.released_total() as usize, constructed);
}

#[test]
fn concurrent_release_and_invalidate_destroy_each_surface_once() {
    let (runtime, presenter, tally) = setup();
    runtime.start().unwrap();
    let handles: Vec<_> = (0..32)
        .map(|_| runtime.create_surface("Counter", PropertySet::new()).unwrap())
        .collect();

    let barrier = Arc::new(Barrier::new(2));
    let releaser = {
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            handles
                .iter()
                .filter(|handle| handle.invalidate().unwrap_or(false))
                .count()
        })
    };

    barrier.wait();
    runtime.invalidate();
    let released_by_handles = releaser.join().unwrap();

    assert!(released_by_handles <= 32);
    assert_eq!(presenter.live_count(), 0);
    assert_eq!(presenter.released_total(), 32);
    assert_eq!(tally.disposed.load(Ordering::SeqCst), 32);
}
