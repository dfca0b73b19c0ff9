use crate::config::Config;
use crate::game_store::interface::GameStore;
use crate::library::logger::interface::Logger;
use crate::library::task::{self, TaskHandle};
use crate::pose_game::core::{Effect, Event, FrameReadout, SessionId, Snapshot};
use crate::pose_library::interface::{probability_of, PoseModel, Webcam};
use crate::pose_library::readiness::{LibraryReadiness, SharedPoseLibrary};
use crate::snapshot::encode_png_data_url;
use image::DynamicImage;
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};

type EffectError = Box<dyn std::error::Error + Send + Sync>;

/// External handles owned by the running session.
#[derive(Default)]
struct SessionResources {
    active: Option<SessionId>,
    library: Option<SharedPoseLibrary>,
    model: Option<Arc<dyn PoseModel + Send + Sync>>,
    webcam: Option<Arc<dyn Webcam + Send + Sync>>,
}

#[derive(Default)]
struct SessionTasks {
    countdown: Option<TaskHandle>,
    frame: Option<TaskHandle>,
    dwell: Option<TaskHandle>,
}

impl SessionTasks {
    fn cancel_all(&mut self) {
        for handle in [self.countdown.take(), self.frame.take(), self.dwell.take()]
            .into_iter()
            .flatten()
        {
            handle.cancel();
        }
    }
}

/// Latest camera frame, shared with the renderer.
pub type Preview = Arc<Mutex<Option<DynamicImage>>>;

type StoreJob = (Effect, Sender<Event>);

#[derive(Clone)]
pub struct RunEffect {
    config: Config,
    logger: Arc<dyn Logger + Send + Sync>,
    readiness: Arc<LibraryReadiness>,
    store_jobs: Sender<StoreJob>,
    resources: Arc<Mutex<SessionResources>>,
    tasks: Arc<Mutex<SessionTasks>>,
    preview: Preview,
}

impl RunEffect {
    pub fn new(
        config: Config,
        logger: Arc<dyn Logger + Send + Sync>,
        store: Arc<dyn GameStore + Send + Sync>,
        readiness: Arc<LibraryReadiness>,
        preview: Preview,
    ) -> Self {
        let logger = logger.with_namespace("run_effect");
        let store_jobs = spawn_store_worker(store, logger.clone());
        Self {
            config,
            logger,
            readiness,
            store_jobs,
            resources: Arc::new(Mutex::new(SessionResources::default())),
            tasks: Arc::new(Mutex::new(SessionTasks::default())),
            preview,
        }
    }

    /// Called on the state machine's loop thread in emission order. Store
    /// writes are queued to the store worker, timers are registered here and
    /// anything that blocks runs on its own thread.
    pub fn run_effect(&self, effect: Effect, event_sender: Sender<Event>) {
        let _ = self
            .logger
            .info(&format!("Running effect: {}", effect.to_display_string()));

        match effect {
            Effect::ResetStore { .. }
            | Effect::ClearStore
            | Effect::PersistPatch(_)
            | Effect::FinishSession { .. } => {
                if self.store_jobs.send((effect, event_sender)).is_err() {
                    let _ = self.logger.error("Store worker has stopped");
                }
            }
            Effect::StartCountdown { session } => {
                let handle = task::spawn_repeating(self.config.tick_rate, move || {
                    event_sender.send(Event::Tick { session }).is_ok()
                });
                self.replace_task(session, |tasks| &mut tasks.countdown, handle);
            }
            Effect::TrackSelection {
                session,
                selection,
                label,
            } => {
                let this = self.clone();
                let handle = task::spawn_repeating(self.config.frame_interval, move || {
                    let result = this.analyze_frame(&label);
                    event_sender
                        .send(Event::FrameAnalyzed {
                            session,
                            selection,
                            result,
                        })
                        .is_ok()
                });
                self.replace_task(session, |tasks| &mut tasks.frame, handle);
            }
            Effect::StopTracking => {
                if let Ok(mut tasks) = self.tasks.lock() {
                    if let Some(handle) = tasks.frame.take() {
                        handle.cancel();
                    }
                }
            }
            Effect::StartDwell { session, selection } => {
                let handle = task::spawn_delayed(self.config.capture_dwell, move || {
                    let _ = event_sender.send(Event::DwellElapsed { session, selection });
                });
                self.replace_task(session, |tasks| &mut tasks.dwell, handle);
            }
            Effect::ReleaseSession => self.release(),
            effect => {
                let this = self.clone();
                std::thread::spawn(move || this.run_blocking(effect, event_sender));
            }
        }
    }

    fn run_blocking(&self, effect: Effect, event_sender: Sender<Event>) {
        match effect {
            Effect::WaitForLibrary { session } => {
                self.activate(session);
                let result = self
                    .readiness
                    .wait(self.config.library_timeout)
                    .and_then(|library| self.with_active(session, |r| r.library = Some(library)));
                log_failure(&*self.logger, "wait for pose library", &result);
                let _ = event_sender.send(Event::LibraryReady { session, result });
            }
            Effect::LoadModel { session, endpoints } => {
                let result = self.load_model(session, &endpoints.model_url, &endpoints.metadata_url);
                log_failure(&*self.logger, "load model", &result);
                let _ = event_sender.send(Event::ModelLoaded { session, result });
            }
            Effect::StartCamera { session } => {
                let result = self.start_camera(session);
                log_failure(&*self.logger, "start camera", &result);
                let _ = event_sender.send(Event::CameraStarted { session, result });
            }
            Effect::CaptureSnapshot { session, selection } => {
                let result = self.take_snapshot();
                log_failure(&*self.logger, "capture snapshot", &result);
                let _ = event_sender.send(Event::SnapshotTaken {
                    session,
                    selection,
                    result,
                });
            }
            effect => {
                let _ = self.logger.error(&format!(
                    "Effect cannot run on a worker thread: {}",
                    effect.to_display_string()
                ));
            }
        }
    }

    /// Stores `handle` as the session's task in `slot`, cancelling whatever was
    /// there. A handle for a session that is no longer active is cancelled.
    fn replace_task(
        &self,
        session: SessionId,
        slot: impl FnOnce(&mut SessionTasks) -> &mut Option<TaskHandle>,
        handle: TaskHandle,
    ) {
        let mut tasks = match self.tasks.lock() {
            Ok(tasks) => tasks,
            Err(_) => return handle.cancel(),
        };
        if self.with_active(session, |_| ()).is_err() {
            return handle.cancel();
        }
        if let Some(previous) = slot(&mut *tasks).replace(handle) {
            previous.cancel();
        }
    }

    /// Makes `session` the owner of the resources, releasing anything a
    /// previous session left behind.
    fn activate(&self, session: SessionId) {
        self.release();
        if let Ok(mut resources) = self.resources.lock() {
            resources.active = Some(session);
        }
    }

    fn with_active<T>(
        &self,
        session: SessionId,
        f: impl FnOnce(&mut SessionResources) -> T,
    ) -> Result<T, EffectError> {
        let mut resources = self
            .resources
            .lock()
            .map_err(|_| "session resources lock poisoned")?;
        if resources.active != Some(session) {
            return Err(format!("session {} is no longer active", session).into());
        }
        Ok(f(&mut resources))
    }

    fn load_model(
        &self,
        session: SessionId,
        model_url: &str,
        metadata_url: &str,
    ) -> Result<Vec<String>, EffectError> {
        let library = self
            .with_active(session, |r| r.library.clone())?
            .ok_or("pose library is not loaded")?;
        let model = library.load(model_url, metadata_url)?;
        let labels = model.class_labels();
        self.with_active(session, |r| r.model = Some(model))?;
        Ok(labels)
    }

    fn start_camera(&self, session: SessionId) -> Result<(), EffectError> {
        let library = self
            .with_active(session, |r| r.library.clone())?
            .ok_or("pose library is not loaded")?;
        let webcam = library.create_webcam(
            self.config.webcam.width,
            self.config.webcam.height,
            self.config.webcam.flip,
        );
        webcam.setup()?;
        webcam.play()?;

        let stored = self.with_active(session, |r| r.webcam = Some(webcam.clone()));
        if stored.is_err() {
            // Released while we were starting; do not leak the camera.
            webcam.stop()?;
        }
        stored
    }

    fn handles(
        &self,
    ) -> Result<(Arc<dyn PoseModel + Send + Sync>, Arc<dyn Webcam + Send + Sync>), EffectError>
    {
        let resources = self
            .resources
            .lock()
            .map_err(|_| "session resources lock poisoned")?;
        match (&resources.model, &resources.webcam) {
            (Some(model), Some(webcam)) => Ok((model.clone(), webcam.clone())),
            _ => Err("session has no model or camera".into()),
        }
    }

    fn analyze_frame(&self, label: &str) -> Result<FrameReadout, EffectError> {
        let (model, webcam) = self.handles()?;

        webcam.update()?;
        let frame = webcam.canvas()?;
        let estimate = model.estimate_pose(&frame)?;
        let predictions = model.predict(&estimate.output)?;

        if let Ok(mut preview) = self.preview.lock() {
            *preview = Some(frame);
        }

        Ok(FrameReadout {
            probability: probability_of(&predictions, label),
            pose: estimate.pose,
        })
    }

    fn take_snapshot(&self) -> Result<Snapshot, EffectError> {
        let (_, webcam) = self.handles()?;
        let frame = webcam.canvas()?;
        Ok(Snapshot {
            image_data: encode_png_data_url(&frame)?,
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Resources are dropped before tasks are cancelled so a task registered
    /// concurrently either sees the session inactive or gets cancelled here.
    fn release(&self) {
        let webcam = match self.resources.lock() {
            Ok(mut resources) => {
                let webcam = resources.webcam.take();
                *resources = SessionResources::default();
                webcam
            }
            Err(_) => None,
        };

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.cancel_all();
        }

        if let Some(webcam) = webcam {
            if let Err(e) = webcam.stop() {
                let _ = self.logger.error(&format!("Failed to stop camera: {}", e));
            }
        }

        if let Ok(mut preview) = self.preview.lock() {
            *preview = None;
        }
    }
}

fn log_failure<T>(logger: &dyn Logger, what: &str, result: &Result<T, EffectError>) {
    if let Err(e) = result {
        let _ = logger.error(&format!("Failed to {}: {}", what, e));
    }
}

/// Applies store effects one at a time in the order they were queued, so a
/// later write can never land before an earlier one.
fn spawn_store_worker(
    store: Arc<dyn GameStore + Send + Sync>,
    logger: Arc<dyn Logger + Send + Sync>,
) -> Sender<StoreJob> {
    let (store_jobs, jobs) = channel::<StoreJob>();
    let logger = logger.with_namespace("store");

    std::thread::spawn(move || {
        for (effect, event_sender) in jobs {
            match effect {
                Effect::ResetStore { session, state } => {
                    let result = store.clear().and_then(|()| store.merge_write(state.into()));
                    log_failure(&*logger, "reset store", &result);
                    let _ = event_sender.send(Event::StoreReset { session, result });
                }
                Effect::ClearStore => {
                    let result = store.clear();
                    log_failure(&*logger, "clear store", &result);
                }
                Effect::PersistPatch(patch) => {
                    let result = store.merge_write(patch);
                    log_failure(&*logger, "persist", &result);
                }
                Effect::FinishSession { session, result } => {
                    let written = store.merge_write(result.clone().into());
                    log_failure(&*logger, "persist final score", &written);
                    let _ = event_sender.send(Event::SummaryLoaded {
                        session,
                        result: written.unwrap_or(result),
                    });
                }
                effect => {
                    let _ = logger.error(&format!(
                        "Not a store effect: {}",
                        effect.to_display_string()
                    ));
                }
            }
        }
    });

    store_jobs
}
