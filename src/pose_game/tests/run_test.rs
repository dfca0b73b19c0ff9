#[cfg(test)]
mod run_test {
    use crate::game_store::game_state::GameState;
    use crate::game_store::interface::GameStore;
    use crate::library::logger::{impl_console::LoggerConsole, interface::Logger};
    use crate::game_store::impl_memory::GameStoreMemory;
    use crate::model_url::endpoints;
    use crate::pose_game::core::{
        Effect, Event, Phase, Screen, State, LIBRARY_UNAVAILABLE_MESSAGE, LOAD_FAILED_MESSAGE,
    };
    use crate::pose_game::main::Running;
    use crate::pose_game::run_effect::RunEffect;
    use crate::pose_game::tests::fixture::{fast_config, wait_for, Fixture};
    use crate::pose_library::impl_fake::{PoseLibraryFake, PoseLibraryFakeConfig};
    use crate::pose_library::readiness::{self, LibraryReadiness};
    use std::sync::mpsc::channel;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const MODEL: &str = "https://teachablemachine.withgoogle.com/models/AbC123/";
    const TIMEOUT: Duration = Duration::from_secs(10);

    fn start_session(running: &Running) {
        running
            .event_sender
            .send(Event::InputChanged(MODEL.to_string()))
            .unwrap();
        running.event_sender.send(Event::StartRequested).unwrap();
    }

    fn is_playing(state: &State) -> bool {
        matches!(state.screen, Screen::Playing(_))
    }

    fn error_message(state: &State) -> Option<String> {
        match &state.screen {
            Screen::Error { message } => Some(message.clone()),
            _ => None,
        }
    }

    fn close(running: Running) {
        running.event_sender.send(Event::CloseRequested).unwrap();
        assert!(running.handle.join().unwrap().is_ok());
    }

    #[test]
    fn test_matching_every_label_ends_session() {
        let fixture = Fixture::new(fast_config());
        let running = fixture.game.start();

        start_session(&running);
        let state = wait_for(&running.state, TIMEOUT, is_playing).expect("session never started");
        let labels = match &state.screen {
            Screen::Playing(session) => session.data.labels.clone(),
            _ => unreachable!(),
        };
        assert_eq!(labels, PoseLibraryFakeConfig::default().class_labels);

        for label in &labels {
            wait_for(&running.state, TIMEOUT, |state| match &state.screen {
                Screen::Playing(session) => session.phase == Phase::Idle,
                _ => false,
            })
            .expect("never returned to idle");

            running
                .event_sender
                .send(Event::LabelSelected(label.clone()))
                .unwrap();

            wait_for(&running.state, TIMEOUT, |state| match &state.screen {
                Screen::Playing(session) => session.data.is_label_used(label),
                Screen::Finishing { .. } | Screen::Summary { .. } => true,
                _ => false,
            })
            .expect("label was never captured");
        }

        let state = wait_for(&running.state, TIMEOUT, |state| {
            matches!(state.screen, Screen::Summary { .. })
        })
        .expect("summary never shown");

        let result = match state.screen {
            Screen::Summary { result } => result,
            _ => unreachable!(),
        };
        assert_eq!(result.used_labels, labels);
        assert_eq!(result.captures.len(), labels.len());
        assert!(result.time_bonus >= 1.5 && result.time_bonus <= 1.8 + 1e-9);
        assert!((result.score - (labels.len() as f64 + result.time_bonus)).abs() < 1e-9);
        assert!(result
            .captures
            .iter()
            .all(|capture| capture.image_data.starts_with("data:image/png;base64,")));

        let persisted = GameState::from_json(&fixture.store.raw().unwrap());
        assert_eq!(persisted, result);
        assert_eq!(persisted.model_source, MODEL);

        close(running);
    }

    #[test]
    fn test_countdown_ends_session_and_play_again_keeps_model() {
        let config = crate::config::Config {
            tick_rate: Duration::from_millis(5),
            session_duration_secs: 2,
            ..fast_config()
        };
        let fixture = Fixture::new(config);
        let running = fixture.game.start();

        start_session(&running);
        let state = wait_for(&running.state, TIMEOUT, |state| {
            matches!(state.screen, Screen::Summary { .. })
        })
        .expect("countdown never ended the session");

        match &state.screen {
            Screen::Summary { result } => {
                assert_eq!(result.score, 0.0);
                assert_eq!(result.time_bonus, 0.0);
                assert!(result.captures.is_empty());
            }
            _ => unreachable!(),
        }

        running
            .event_sender
            .send(Event::PlayAgainRequested)
            .unwrap();
        let state = wait_for(&running.state, TIMEOUT, |state| {
            matches!(state.screen, Screen::Playing(_) | Screen::Summary { .. })
                && state.next_id > 2
        })
        .expect("second session never started");

        let data = match &state.screen {
            Screen::Playing(session) => session.data.clone(),
            Screen::Summary { result } => result.clone(),
            _ => unreachable!(),
        };
        assert_eq!(data.model_source, MODEL);
        assert!(data.captures.is_empty());
        assert!(data.used_labels.is_empty());
        assert_eq!(fixture.store.read().model_source, MODEL);

        close(running);
    }

    #[test]
    fn test_new_model_clears_store() {
        let config = crate::config::Config {
            tick_rate: Duration::from_millis(5),
            session_duration_secs: 1,
            ..fast_config()
        };
        let fixture = Fixture::new(config);
        let running = fixture.game.start();

        start_session(&running);
        wait_for(&running.state, TIMEOUT, |state| {
            matches!(state.screen, Screen::Summary { .. })
        })
        .expect("summary never shown");

        running.event_sender.send(Event::NewModelRequested).unwrap();
        wait_for(&running.state, TIMEOUT, |state| {
            matches!(state.screen, Screen::Entry { .. })
        })
        .expect("never returned to entry");

        let started = std::time::Instant::now();
        while fixture.store.raw().is_some() && started.elapsed() < TIMEOUT {
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(fixture.store.raw(), None);
        assert_eq!(fixture.store.read(), GameState::default());

        close(running);
    }

    #[test]
    fn test_invalid_url_persists_nothing() {
        let fixture = Fixture::new(fast_config());
        let running = fixture.game.start();

        running
            .event_sender
            .send(Event::InputChanged("https://example.com/model".to_string()))
            .unwrap();
        running.event_sender.send(Event::StartRequested).unwrap();

        let state = wait_for(&running.state, TIMEOUT, |state| {
            matches!(state.screen, Screen::Entry { error: Some(_), .. })
        })
        .expect("validation error never shown");

        assert!(matches!(state.screen, Screen::Entry { .. }));
        assert_eq!(fixture.store.raw(), None);

        close(running);
    }

    #[test]
    fn test_model_load_failure_is_terminal() {
        let fixture = Fixture::with_library(
            fast_config(),
            PoseLibraryFakeConfig {
                fail_load: true,
                ..PoseLibraryFakeConfig::instant()
            },
        );
        let running = fixture.game.start();

        start_session(&running);
        let state = wait_for(&running.state, TIMEOUT, |state| {
            error_message(state).is_some()
        })
        .expect("error never shown");

        assert_eq!(error_message(&state), Some(LOAD_FAILED_MESSAGE.to_string()));

        close(running);
    }

    #[test]
    fn test_camera_failure_is_terminal() {
        let fixture = Fixture::with_library(
            fast_config(),
            PoseLibraryFakeConfig {
                fail_camera: true,
                ..PoseLibraryFakeConfig::instant()
            },
        );
        let running = fixture.game.start();

        start_session(&running);
        let state = wait_for(&running.state, TIMEOUT, |state| {
            error_message(state).is_some()
        })
        .expect("error never shown");

        assert_eq!(error_message(&state), Some(LOAD_FAILED_MESSAGE.to_string()));

        running
            .event_sender
            .send(Event::ReturnToEntryRequested)
            .unwrap();
        wait_for(&running.state, TIMEOUT, |state| {
            matches!(state.screen, Screen::Entry { .. })
        })
        .expect("never returned to entry");

        close(running);
    }

    #[test]
    fn test_library_that_never_arrives_times_out() {
        let config = crate::config::Config {
            library_timeout: Duration::from_millis(50),
            ..fast_config()
        };
        let logger: Arc<dyn Logger + Send + Sync> =
            Arc::new(LoggerConsole::new(config.logger_timezone));
        // Held so the wait times out instead of seeing a disconnect.
        let (_signal, readiness) = readiness::channel();
        let fixture = Fixture::with_readiness(config, logger, readiness);
        let running = fixture.game.start();

        start_session(&running);
        let state = wait_for(&running.state, TIMEOUT, |state| {
            error_message(state).is_some()
        })
        .expect("error never shown");

        assert_eq!(
            error_message(&state),
            Some(LIBRARY_UNAVAILABLE_MESSAGE.to_string())
        );

        close(running);
    }

    fn effect_runner(store: Arc<GameStoreMemory>) -> RunEffect {
        let config = fast_config();
        let logger: Arc<dyn Logger + Send + Sync> =
            Arc::new(LoggerConsole::new(config.logger_timezone));
        let library = Arc::new(PoseLibraryFake::new(
            PoseLibraryFakeConfig::instant(),
            logger.clone(),
        ));
        RunEffect::new(
            config,
            logger,
            store,
            Arc::new(LibraryReadiness::resolved(library)),
            Arc::new(Mutex::new(None)),
        )
    }

    fn captured_record() -> GameState {
        let mut data = GameState::with_model_source(MODEL);
        data.labels = vec!["Wave".to_string(), "Squat".to_string()];
        data.add_capture("Wave", "data:image/png;base64,AAAA".to_string(), 1);
        data
    }

    #[test]
    fn test_final_write_follows_capture_write() {
        for _ in 0..200 {
            let store = Arc::new(GameStoreMemory::new());
            let run_effect = effect_runner(store.clone());
            let (sender, receiver) = channel();
            let data = captured_record();

            run_effect.run_effect(Effect::PersistPatch(data.capture_patch()), sender.clone());
            run_effect.run_effect(
                Effect::FinishSession {
                    session: 1,
                    result: data.clone(),
                },
                sender,
            );

            let result = match receiver.recv_timeout(TIMEOUT).unwrap() {
                Event::SummaryLoaded { result, .. } => result,
                other => panic!("Unexpected event {:?}", other),
            };
            assert_eq!(result.score, 1.0);
            assert_eq!(result.captures.len(), 1);
            assert_eq!(result.used_labels, vec!["Wave".to_string()]);
            assert_eq!(store.read(), result);
        }
    }

    #[test]
    fn test_store_writes_apply_in_emission_order() {
        for _ in 0..200 {
            let store = Arc::new(GameStoreMemory::new());
            let run_effect = effect_runner(store.clone());
            let (sender, receiver) = channel();
            let data = captured_record();
            let next =
                GameState::with_model_source("https://teachablemachine.withgoogle.com/models/Next/");

            run_effect.run_effect(
                Effect::ResetStore {
                    session: 1,
                    state: GameState::with_model_source(MODEL),
                },
                sender.clone(),
            );
            run_effect.run_effect(Effect::PersistPatch(data.capture_patch()), sender.clone());
            run_effect.run_effect(Effect::ClearStore, sender.clone());
            run_effect.run_effect(
                Effect::ResetStore {
                    session: 2,
                    state: next.clone(),
                },
                sender,
            );

            let mut sessions = Vec::new();
            while sessions.len() < 2 {
                match receiver.recv_timeout(TIMEOUT).unwrap() {
                    Event::StoreReset { session, result } => {
                        assert!(result.is_ok());
                        sessions.push(session);
                    }
                    other => panic!("Unexpected event {:?}", other),
                }
            }
            assert_eq!(sessions, vec![1, 2]);
            assert_eq!(store.read(), next);
        }
    }

    #[test]
    fn test_one_selection_drives_repeated_frames_until_stopped() {
        let run_effect = effect_runner(Arc::new(GameStoreMemory::new()));
        let (sender, receiver) = channel();

        run_effect.run_effect(Effect::WaitForLibrary { session: 1 }, sender.clone());
        assert!(matches!(
            receiver.recv_timeout(TIMEOUT).unwrap(),
            Event::LibraryReady { result: Ok(()), .. }
        ));
        run_effect.run_effect(
            Effect::LoadModel {
                session: 1,
                endpoints: endpoints(MODEL),
            },
            sender.clone(),
        );
        assert!(matches!(
            receiver.recv_timeout(TIMEOUT).unwrap(),
            Event::ModelLoaded { result: Ok(_), .. }
        ));
        run_effect.run_effect(Effect::StartCamera { session: 1 }, sender.clone());
        assert!(matches!(
            receiver.recv_timeout(TIMEOUT).unwrap(),
            Event::CameraStarted { result: Ok(()), .. }
        ));

        run_effect.run_effect(
            Effect::TrackSelection {
                session: 1,
                selection: 4,
                label: "Wave".to_string(),
            },
            sender.clone(),
        );
        for _ in 0..3 {
            match receiver.recv_timeout(TIMEOUT).unwrap() {
                Event::FrameAnalyzed {
                    session: 1,
                    selection: 4,
                    result: Ok(readout),
                } => assert!(readout.probability.is_some()),
                other => panic!("Unexpected event {:?}", other),
            }
        }

        run_effect.run_effect(Effect::StopTracking, sender.clone());
        // A frame already in flight may still arrive.
        for _ in 0..5 {
            if receiver.recv_timeout(Duration::from_millis(50)).is_err() {
                break;
            }
        }
        assert!(receiver.recv_timeout(Duration::from_millis(50)).is_err());

        run_effect.run_effect(Effect::ReleaseSession, sender);
    }
}
