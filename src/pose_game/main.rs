use crate::config::Config;
use crate::game_store::interface::GameStore;
use crate::library::logger::interface::Logger;
use crate::library::state_machine::{RunResult, StateMachine};
use crate::pose_game::core::{init, transition, Event, Screen, State};
use crate::pose_game::run_effect::{Preview, RunEffect};
use crate::pose_library::readiness::LibraryReadiness;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

pub struct PoseGame {
    pub config: Config,
    pub logger: Arc<dyn Logger + Send + Sync>,
    pub store: Arc<dyn GameStore + Send + Sync>,
    pub readiness: Arc<LibraryReadiness>,
}

/// Handles to a running game.
pub struct Running {
    pub event_sender: Sender<Event>,
    pub state: Arc<Mutex<State>>,
    pub preview: Preview,
    pub handle: JoinHandle<RunResult>,
}

impl PoseGame {
    pub fn new(
        config: Config,
        logger: Arc<dyn Logger + Send + Sync>,
        store: Arc<dyn GameStore + Send + Sync>,
        readiness: Arc<LibraryReadiness>,
    ) -> Self {
        Self {
            config,
            logger: logger.with_namespace("pose_game"),
            store,
            readiness,
        }
    }

    pub fn start(&self) -> Running {
        let initial = init();
        let state = Arc::new(Mutex::new(initial.0.clone()));
        let preview: Preview = Arc::new(Mutex::new(None));

        let run_effect = RunEffect::new(
            self.config.clone(),
            self.logger.clone(),
            self.store.clone(),
            self.readiness.clone(),
            preview.clone(),
        );

        let config = self.config.clone();
        let logger = self.logger.clone();
        let published = state.clone();

        let machine = StateMachine::new(
            initial,
            move |current: State, event: Event| {
                let quiet = event.is_frame_traffic();
                if !quiet {
                    let _ = logger.info(&format!("event: {}", event.to_display_string()));
                }
                let (new_state, effects) = transition(&config, current, event);
                if !effects.is_empty() && !quiet {
                    let _ = logger.info(&format!(
                        "effects: {:?}",
                        effects
                            .iter()
                            .map(|effect| effect.to_display_string())
                            .collect::<Vec<_>>()
                    ));
                }
                (new_state, effects)
            },
            move |new_state: &State| {
                if let Ok(mut state) = published.lock() {
                    *state = new_state.clone();
                }
            },
            move |effect, event_sender| run_effect.run_effect(effect, event_sender),
            |state: &State| matches!(state.screen, Screen::Closed),
        );

        let (event_sender, handle) = machine.spawn();

        Running {
            event_sender,
            state,
            preview,
            handle,
        }
    }
}
