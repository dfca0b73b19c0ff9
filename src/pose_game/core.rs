use crate::config::Config;
use crate::game_store::game_state::{GameState, GameStatePatch};
use crate::model_url::{self, ModelEndpoints};
use crate::pose_library::interface::Pose;

pub type SessionId = u64;
pub type SelectionId = u64;

pub const LOAD_FAILED_MESSAGE: &str = "Failed to load model. Please check the URL and try again.";
pub const LIBRARY_UNAVAILABLE_MESSAGE: &str =
    "The pose library is not available. Please go back and try again.";
pub const STORE_FAILED_MESSAGE: &str = "Could not save the game. Please go back and try again.";

#[derive(Debug, Clone, PartialEq)]
pub enum LoadingStage {
    PreparingStore,
    WaitingForLibrary,
    LoadingModel,
    StartingCamera,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Idle,
    Tracking {
        label: String,
        selection: SelectionId,
        probability: f32,
    },
    /// Threshold crossed, snapshot in flight.
    Capturing {
        label: String,
        selection: SelectionId,
        probability: f32,
    },
    /// Snapshot recorded and on display until the dwell elapses.
    Captured {
        label: String,
        selection: SelectionId,
        image_data: String,
    },
}

impl Phase {
    pub fn selected_label(&self) -> Option<&str> {
        match self {
            Phase::Idle => None,
            Phase::Tracking { label, .. }
            | Phase::Capturing { label, .. }
            | Phase::Captured { label, .. } => Some(label.as_str()),
        }
    }

    pub fn probability(&self) -> f32 {
        match self {
            Phase::Tracking { probability, .. } | Phase::Capturing { probability, .. } => {
                *probability
            }
            Phase::Captured { .. } => 1.0,
            Phase::Idle => 0.0,
        }
    }

    pub fn is_capture_pending(&self) -> bool {
        matches!(self, Phase::Capturing { .. } | Phase::Captured { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub data: GameState,
    pub remaining_secs: u32,
    pub phase: Phase,
    pub pose: Option<Pose>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    Entry {
        input: String,
        error: Option<String>,
    },
    Loading {
        session: SessionId,
        data: GameState,
        stage: LoadingStage,
    },
    Error {
        message: String,
    },
    Playing(Session),
    Finishing {
        session: SessionId,
        result: GameState,
    },
    Summary {
        result: GameState,
    },
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub next_id: u64,
    pub screen: Screen,
}

impl State {
    fn issue_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn with_screen(self, screen: Screen) -> Self {
        Self { screen, ..self }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameReadout {
    /// `None` when the model did not report the selected label this frame.
    pub probability: Option<f32>,
    pub pose: Option<Pose>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub image_data: String,
    pub timestamp: i64,
}

type EffectResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug)]
pub enum Event {
    InputChanged(String),
    StartRequested,
    LabelSelected(String),
    PlayAgainRequested,
    NewModelRequested,
    ReturnToEntryRequested,
    CloseRequested,
    StoreReset {
        session: SessionId,
        result: EffectResult<GameState>,
    },
    LibraryReady {
        session: SessionId,
        result: EffectResult<()>,
    },
    ModelLoaded {
        session: SessionId,
        result: EffectResult<Vec<String>>,
    },
    CameraStarted {
        session: SessionId,
        result: EffectResult<()>,
    },
    Tick {
        session: SessionId,
    },
    FrameAnalyzed {
        session: SessionId,
        selection: SelectionId,
        result: EffectResult<FrameReadout>,
    },
    SnapshotTaken {
        session: SessionId,
        selection: SelectionId,
        result: EffectResult<Snapshot>,
    },
    DwellElapsed {
        session: SessionId,
        selection: SelectionId,
    },
    SummaryLoaded {
        session: SessionId,
        result: GameState,
    },
}

impl Event {
    pub fn to_display_string(&self) -> String {
        match self {
            Event::SnapshotTaken {
                session,
                selection,
                result: Ok(snapshot),
            } => format!(
                "SnapshotTaken {{ session: {}, selection: {}, bytes: {}, timestamp: {} }}",
                session,
                selection,
                snapshot.image_data.len(),
                snapshot.timestamp
            ),
            Event::FrameAnalyzed {
                session,
                selection,
                result: Ok(readout),
            } => format!(
                "FrameAnalyzed {{ session: {}, selection: {}, probability: {:?} }}",
                session, selection, readout.probability
            ),
            Event::SummaryLoaded { session, result } => format!(
                "SummaryLoaded {{ session: {}, score: {}, captures: {} }}",
                session,
                result.score,
                result.captures.len()
            ),
            event => format!("{:?}", event),
        }
    }

    /// Frame traffic is too chatty to log every time.
    pub fn is_frame_traffic(&self) -> bool {
        matches!(
            self,
            Event::FrameAnalyzed {
                result: Ok(FrameReadout {
                    probability: Some(_),
                    ..
                }),
                ..
            }
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    ResetStore {
        session: SessionId,
        state: GameState,
    },
    ClearStore,
    PersistPatch(GameStatePatch),
    WaitForLibrary {
        session: SessionId,
    },
    LoadModel {
        session: SessionId,
        endpoints: ModelEndpoints,
    },
    StartCamera {
        session: SessionId,
    },
    StartCountdown {
        session: SessionId,
    },
    /// Analyzes a camera frame every `frame_interval` for the selection until
    /// another selection replaces it or tracking stops.
    TrackSelection {
        session: SessionId,
        selection: SelectionId,
        label: String,
    },
    StopTracking,
    CaptureSnapshot {
        session: SessionId,
        selection: SelectionId,
    },
    StartDwell {
        session: SessionId,
        selection: SelectionId,
    },
    /// Cancels the session's timers and frame loop and releases the camera.
    ReleaseSession,
    /// Writes the whole final record, then reports it back for the summary.
    FinishSession {
        session: SessionId,
        result: GameState,
    },
}

impl Effect {
    pub fn to_display_string(&self) -> String {
        match self {
            Effect::PersistPatch(patch) => format!(
                "PersistPatch {{ score: {:?}, captures: {:?}, labels: {:?}, used_labels: {:?} }}",
                patch.score,
                patch.captures.as_ref().map(|c| c.len()),
                patch.labels,
                patch.used_labels
            ),
            Effect::FinishSession { session, result } => format!(
                "FinishSession {{ session: {}, score: {}, time_bonus: {}, captures: {} }}",
                session,
                result.score,
                result.time_bonus,
                result.captures.len()
            ),
            effect => format!("{:?}", effect),
        }
    }
}

/// `floor(remaining / 10) * 0.1`
pub fn time_bonus(remaining_secs: u32) -> f64 {
    (remaining_secs / 10) as f64 * 0.1
}

pub fn init() -> (State, Vec<Effect>) {
    (
        State {
            next_id: 1,
            screen: Screen::Entry {
                input: String::new(),
                error: None,
            },
        },
        vec![],
    )
}

pub fn transition(config: &Config, state: State, event: Event) -> (State, Vec<Effect>) {
    match (state.screen.clone(), event) {
        (_, Event::CloseRequested) => (state.with_screen(Screen::Closed), vec![Effect::ReleaseSession]),

        // Entry
        (Screen::Entry { .. }, Event::InputChanged(input)) => (
            state.with_screen(Screen::Entry { input, error: None }),
            vec![],
        ),
        (Screen::Entry { input, .. }, Event::StartRequested) => {
            match model_url::validate(&input, &config.model_host) {
                Ok(model_source) => {
                    begin_session(state, GameState::with_model_source(&model_source))
                }
                Err(e) => (
                    state.with_screen(Screen::Entry {
                        input,
                        error: Some(e.to_string()),
                    }),
                    vec![],
                ),
            }
        }

        // Loading
        (
            Screen::Loading {
                session,
                stage: LoadingStage::PreparingStore,
                ..
            },
            Event::StoreReset {
                session: event_session,
                result,
            },
        ) if session == event_session => match result {
            Ok(data) if data.model_source.is_empty() => (
                state.with_screen(Screen::Entry {
                    input: String::new(),
                    error: None,
                }),
                vec![],
            ),
            Ok(data) => (
                state.with_screen(Screen::Loading {
                    session,
                    data,
                    stage: LoadingStage::WaitingForLibrary,
                }),
                vec![Effect::WaitForLibrary { session }],
            ),
            Err(_) => fail(state, STORE_FAILED_MESSAGE),
        },
        (
            Screen::Loading {
                session,
                data,
                stage: LoadingStage::WaitingForLibrary,
            },
            Event::LibraryReady {
                session: event_session,
                result,
            },
        ) if session == event_session => match result {
            Ok(()) => {
                let endpoints = model_url::endpoints(&data.model_source);
                (
                    state.with_screen(Screen::Loading {
                        session,
                        data,
                        stage: LoadingStage::LoadingModel,
                    }),
                    vec![Effect::LoadModel { session, endpoints }],
                )
            }
            Err(_) => fail(state, LIBRARY_UNAVAILABLE_MESSAGE),
        },
        (
            Screen::Loading {
                session,
                mut data,
                stage: LoadingStage::LoadingModel,
            },
            Event::ModelLoaded {
                session: event_session,
                result,
            },
        ) if session == event_session => match result {
            Ok(labels) => {
                data.labels = labels.clone();
                (
                    state.with_screen(Screen::Loading {
                        session,
                        data,
                        stage: LoadingStage::StartingCamera,
                    }),
                    vec![
                        Effect::PersistPatch(GameStatePatch {
                            labels: Some(labels),
                            ..GameStatePatch::default()
                        }),
                        Effect::StartCamera { session },
                    ],
                )
            }
            Err(_) => fail(state, LOAD_FAILED_MESSAGE),
        },
        (
            Screen::Loading {
                session,
                data,
                stage: LoadingStage::StartingCamera,
            },
            Event::CameraStarted {
                session: event_session,
                result,
            },
        ) if session == event_session => match result {
            Ok(()) => (
                state.with_screen(Screen::Playing(Session {
                    id: session,
                    data,
                    remaining_secs: config.session_duration_secs,
                    phase: Phase::Idle,
                    pose: None,
                })),
                vec![Effect::StartCountdown { session }],
            ),
            Err(_) => fail(state, LOAD_FAILED_MESSAGE),
        },

        // Error
        (Screen::Error { .. }, Event::ReturnToEntryRequested) => (
            state.with_screen(Screen::Entry {
                input: String::new(),
                error: None,
            }),
            vec![],
        ),

        // Playing
        (Screen::Playing(mut session), Event::Tick { session: event_session })
            if session.id == event_session =>
        {
            session.remaining_secs = session.remaining_secs.saturating_sub(1);
            if session.remaining_secs == 0 {
                end_session(state, session)
            } else {
                (state.with_screen(Screen::Playing(session)), vec![])
            }
        }
        (Screen::Playing(mut session), Event::LabelSelected(label)) => {
            if session.phase.is_capture_pending() || !session.data.is_label_available(&label) {
                return (state, vec![]);
            }
            let mut state = state;
            let selection = state.issue_id();
            session.phase = Phase::Tracking {
                label: label.clone(),
                selection,
                probability: 0.0,
            };
            let effects = vec![Effect::TrackSelection {
                session: session.id,
                selection,
                label,
            }];
            (state.with_screen(Screen::Playing(session)), effects)
        }
        (
            Screen::Playing(mut session),
            Event::FrameAnalyzed {
                session: event_session,
                selection: event_selection,
                result,
            },
        ) if session.id == event_session => {
            let (label, selection) = match &session.phase {
                Phase::Tracking {
                    label, selection, ..
                } if *selection == event_selection => (label.clone(), *selection),
                _ => return (state, vec![]),
            };

            // Failed or incomplete frames are skipped.
            let readout = match result {
                Ok(readout) => readout,
                Err(_) => return (state, vec![]),
            };
            if readout.pose.is_some() {
                session.pose = readout.pose;
            }
            let probability = match readout.probability {
                Some(probability) => probability,
                None => return (state.with_screen(Screen::Playing(session)), vec![]),
            };

            if probability >= config.capture_threshold {
                session.phase = Phase::Capturing {
                    label,
                    selection,
                    probability,
                };
                let effects = vec![
                    Effect::StopTracking,
                    Effect::CaptureSnapshot {
                        session: session.id,
                        selection,
                    },
                ];
                (state.with_screen(Screen::Playing(session)), effects)
            } else {
                session.phase = Phase::Tracking {
                    label,
                    selection,
                    probability,
                };
                (state.with_screen(Screen::Playing(session)), vec![])
            }
        }
        (
            Screen::Playing(mut session),
            Event::SnapshotTaken {
                session: event_session,
                selection: event_selection,
                result,
            },
        ) if session.id == event_session => {
            let (label, selection, probability) = match &session.phase {
                Phase::Capturing {
                    label,
                    selection,
                    probability,
                } if *selection == event_selection => (label.clone(), *selection, *probability),
                _ => return (state, vec![]),
            };

            match result {
                Ok(snapshot) => {
                    let recorded = session.data.add_capture(
                        &label,
                        snapshot.image_data.clone(),
                        snapshot.timestamp,
                    );
                    if !recorded {
                        session.phase = Phase::Idle;
                        return (state.with_screen(Screen::Playing(session)), vec![]);
                    }
                    session.phase = Phase::Captured {
                        label,
                        selection,
                        image_data: snapshot.image_data,
                    };
                    let effects = vec![
                        Effect::PersistPatch(session.data.capture_patch()),
                        Effect::StartDwell {
                            session: session.id,
                            selection,
                        },
                    ];
                    (state.with_screen(Screen::Playing(session)), effects)
                }
                Err(_) => {
                    session.phase = Phase::Tracking {
                        label: label.clone(),
                        selection,
                        probability,
                    };
                    let effects = vec![Effect::TrackSelection {
                        session: session.id,
                        selection,
                        label,
                    }];
                    (state.with_screen(Screen::Playing(session)), effects)
                }
            }
        }
        (
            Screen::Playing(mut session),
            Event::DwellElapsed {
                session: event_session,
                selection: event_selection,
            },
        ) if session.id == event_session => {
            match &session.phase {
                Phase::Captured { selection, .. } if *selection == event_selection => {}
                _ => return (state, vec![]),
            }
            if session.data.all_labels_used() {
                end_session(state, session)
            } else {
                session.phase = Phase::Idle;
                (state.with_screen(Screen::Playing(session)), vec![])
            }
        }

        // Finishing
        (
            Screen::Finishing { session, .. },
            Event::SummaryLoaded {
                session: event_session,
                result,
            },
        ) if session == event_session => (state.with_screen(Screen::Summary { result }), vec![]),

        // Summary
        (Screen::Summary { result }, Event::PlayAgainRequested) => {
            begin_session(state, result.reset_session())
        }
        (Screen::Summary { .. }, Event::NewModelRequested) => (
            state.with_screen(Screen::Entry {
                input: String::new(),
                error: None,
            }),
            vec![Effect::ClearStore],
        ),

        // Stale continuations and input that does not apply to the screen.
        _ => (state, vec![]),
    }
}

fn begin_session(mut state: State, data: GameState) -> (State, Vec<Effect>) {
    let session = state.issue_id();
    (
        state.with_screen(Screen::Loading {
            session,
            data: data.clone(),
            stage: LoadingStage::PreparingStore,
        }),
        vec![Effect::ResetStore {
            session,
            state: data,
        }],
    )
}

fn fail(state: State, message: &str) -> (State, Vec<Effect>) {
    (
        state.with_screen(Screen::Error {
            message: message.to_string(),
        }),
        vec![Effect::ReleaseSession],
    )
}

/// Leaves `Playing`, so a second trigger for the same session finds nothing
/// to match and the bonus lands once.
fn end_session(state: State, mut session: Session) -> (State, Vec<Effect>) {
    let bonus = time_bonus(session.remaining_secs);
    session.data.time_bonus = bonus;
    session.data.score += bonus;

    (
        state.with_screen(Screen::Finishing {
            session: session.id,
            result: session.data.clone(),
        }),
        vec![
            Effect::ReleaseSession,
            Effect::FinishSession {
                session: session.id,
                result: session.data,
            },
        ],
    )
}
