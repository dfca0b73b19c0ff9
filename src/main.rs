use config::Config;
use game_store::impl_file::GameStoreFile;
use library::logger::{impl_console::LoggerConsole, interface::Logger};
use pose_game::main::PoseGame;
use pose_game::render::Render;
use pose_library::impl_fake::{PoseLibraryFake, PoseLibraryFakeConfig};
use std::sync::Arc;

mod config;
mod game_store;
mod library;
mod model_url;
mod pose_game;
mod pose_library;
mod snapshot;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();

    let logger: Arc<dyn Logger + Send + Sync> =
        Arc::new(LoggerConsole::new(config.logger_timezone));

    let store = Arc::new(GameStoreFile::new(config.state_path.clone(), logger.clone()));

    let readiness = Arc::new(PoseLibraryFake::spawn_ready(
        PoseLibraryFakeConfig::default(),
        logger.clone(),
    ));

    let game = PoseGame::new(config.clone(), logger.clone(), store, readiness);

    let running = game.start();

    let render = Render::new(
        config,
        running.state.clone(),
        running.preview.clone(),
        running.event_sender.clone(),
    );

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Pose Challenge")
            .with_inner_size([900.0, 900.0]),
        ..Default::default()
    };

    let window = eframe::run_native("Pose Challenge", options, Box::new(|_cc| Box::new(render)))
        .map_err(|e| format!("Failed to open window: {}", e));

    let _ = running.event_sender.send(pose_game::core::Event::CloseRequested);
    running
        .handle
        .join()
        .map_err(|_| "pose game loop panicked")?
        .map_err(|e| e.to_string())?;

    window?;

    let _ = logger.info("Goodbye");

    Ok(())
}
