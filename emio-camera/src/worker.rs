use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam_channel::{RecvTimeoutError, Sender};
use emio_core::DeviceFactory;

use crate::{
    session::Session, CameraHarness, DeviceRegistry, HarnessCfg, HarnessError, SharedCamera,
};

/// What a worker thread is started with. The device itself is built on
/// the worker.
struct WorkerSpec {
    generation: u64,
    camera: Option<String>,
    cfg: HarnessCfg,
    factory: Arc<dyn DeviceFactory>,
    registry: Option<DeviceRegistry>,
    shared: SharedCamera,
    ready: Sender<Result<(), HarnessError>>,
    // dropped when the worker returns, which is how `close` sees it exit
    _alive: Sender<()>,
}

struct WorkerHandle {
    generation: u64,
    join: JoinHandle<()>,
    exited: crossbeam_channel::Receiver<()>,
}

/// Acquisition on a dedicated thread that keeps the shared state fresh
/// until [`CameraHarness::close`].
pub struct WorkerCamera {
    cfg: HarnessCfg,
    factory: Arc<dyn DeviceFactory>,
    registry: Option<DeviceRegistry>,
    shared: SharedCamera,
    worker: Option<WorkerHandle>,
}

impl WorkerCamera {
    pub fn new(cfg: HarnessCfg, factory: Arc<dyn DeviceFactory>) -> Self {
        let shared = SharedCamera::new(cfg.toggles(), cfg.parameters);
        Self {
            cfg,
            factory,
            registry: None,
            shared,
            worker: None,
        }
    }

    pub fn with_registry(mut self, registry: DeviceRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn try_open(&mut self, camera: Option<&str>) -> Result<(), HarnessError> {
        self.close();

        let generation = {
            let mut state = self.shared.lock();
            state.generation += 1;
            state.running = false;
            state.generation
        };
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (alive_tx, alive_rx) = crossbeam_channel::bounded(0);
        let spec = WorkerSpec {
            generation,
            camera: camera.or(self.cfg.camera.as_deref()).map(str::to_owned),
            cfg: self.cfg.clone(),
            factory: self.factory.clone(),
            registry: self.registry.clone(),
            shared: self.shared.clone(),
            ready: ready_tx,
            _alive: alive_tx,
        };
        let join = thread::Builder::new()
            .name(format!("camera-worker-{generation}"))
            .spawn(move || run(spec))
            .map_err(|e| HarnessError::DeviceUnavailable(e.into()))?;
        let handle = WorkerHandle {
            generation,
            join,
            exited: alive_rx,
        };

        let timeout = self.cfg.startup_timeout();
        match ready_rx.recv_timeout(timeout) {
            Ok(Ok(())) => {
                log::info!("acquisition worker {generation} running");
                self.worker = Some(handle);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join.join();
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                // the late worker may have started already; it sees a newer
                // generation and shuts down without touching `running`
                self.abandon_worker();
                log::warn!("acquisition worker {generation} abandoned after {timeout:?}");
                Err(HarnessError::StartupTimeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join.join();
                Err(HarnessError::WorkerExited)
            }
        }
    }
}

impl WorkerCamera {
    /// Retires the current generation. Both fields change under one lock so
    /// a worker that got in just before cannot leave `running` set.
    fn abandon_worker(&self) {
        let mut state = self.shared.lock();
        state.generation += 1;
        state.running = false;
    }
}

impl CameraHarness for WorkerCamera {
    fn open(&mut self, camera: Option<&str>) -> bool {
        match self.try_open(camera) {
            Ok(()) => true,
            Err(e) => {
                log::error!("failed to open camera: {e}");
                false
            }
        }
    }

    /// Threads cannot be killed: a worker stuck in a device call past the
    /// shutdown timeout is detached and exits on its own later.
    fn close(&mut self) {
        self.shared.lock().running = false;
        let Some(worker) = self.worker.take() else {
            return;
        };

        match worker.exited.recv_timeout(self.cfg.shutdown_timeout()) {
            Err(RecvTimeoutError::Disconnected) | Ok(()) => {
                if worker.join.join().is_err() {
                    log::warn!("acquisition worker {} panicked", worker.generation);
                }
                log::info!("acquisition worker {} stopped", worker.generation);
            }
            Err(RecvTimeoutError::Timeout) => {
                self.abandon_worker();
                log::warn!(
                    "acquisition worker {} did not stop within {:?}, detaching it",
                    worker.generation,
                    self.cfg.shutdown_timeout()
                );
            }
        }
    }

    fn state(&self) -> &SharedCamera {
        &self.shared
    }
}

impl Drop for WorkerCamera {
    fn drop(&mut self) {
        self.close();
    }
}

fn run(spec: WorkerSpec) {
    let WorkerSpec {
        generation,
        camera,
        cfg,
        factory,
        registry,
        shared,
        ready,
        _alive,
    } = spec;

    let parameters = shared.parameters();
    let mut session = match Session::start(
        &cfg,
        factory.as_ref(),
        registry.as_ref(),
        camera.as_deref(),
        parameters,
    ) {
        Ok(session) => session,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    {
        let mut state = shared.lock();
        if state.generation != generation {
            log::debug!("acquisition worker {generation} superseded before start");
            return;
        }
        state.running = true;
    }
    let _ = ready.send(Ok(()));

    loop {
        let (toggles, parameters) = {
            let state = shared.lock();
            if !state.running || state.generation != generation {
                break;
            }
            (state.toggles, state.parameters)
        };

        let results = match session.acquire(toggles, parameters) {
            Ok(results) => results,
            Err(e) => {
                log::error!("acquisition worker {generation} lost the camera: {e:#}");
                break;
            }
        };

        let mut state = shared.lock();
        if state.generation != generation {
            break;
        }
        state.publish(results);
    }

    drop(session);
    let mut state = shared.lock();
    if state.generation == generation {
        state.running = false;
    }
}
