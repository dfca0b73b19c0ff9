use crate::game_store::game_state::{GameState, GameStatePatch};
use crate::game_store::interface::GameStore;
use crate::library::logger::interface::Logger;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Persists the record as a JSON file.
pub struct GameStoreFile {
    path: PathBuf,
    logger: Arc<dyn Logger + Send + Sync>,
    write_lock: Mutex<()>,
}

impl GameStoreFile {
    pub fn new(path: PathBuf, logger: Arc<dyn Logger + Send + Sync>) -> Self {
        Self {
            path,
            logger: logger.with_namespace("game_store").with_namespace("file"),
            write_lock: Mutex::new(()),
        }
    }

    fn read_record(&self) -> GameState {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => GameState::from_json(&contents),
            Err(e) if e.kind() == ErrorKind::NotFound => GameState::default(),
            Err(e) => {
                let _ = self.logger.error(&format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                ));
                GameState::default()
            }
        }
    }
}

impl GameStore for GameStoreFile {
    fn read(&self) -> GameState {
        self.read_record()
    }

    fn merge_write(
        &self,
        patch: GameStatePatch,
    ) -> Result<GameState, Box<dyn std::error::Error + Send + Sync>> {
        let _guard = self.write_lock.lock().map_err(|_| "game store lock poisoned")?;
        let merged = self.read_record().merged(patch);
        std::fs::write(&self.path, merged.to_json()?)?;
        Ok(merged)
    }

    fn clear(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let _guard = self.write_lock.lock().map_err(|_| "game store lock poisoned")?;
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                self.logger
                    .info(&format!("Cleared {}", self.path.display()))?;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
