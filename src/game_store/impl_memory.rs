use crate::game_store::game_state::{GameState, GameStatePatch};
use crate::game_store::interface::GameStore;
use std::sync::Mutex;

/// Keeps the serialized record in memory.
pub struct GameStoreMemory {
    record: Mutex<Option<String>>,
}

impl GameStoreMemory {
    pub fn new() -> Self {
        Self {
            record: Mutex::new(None),
        }
    }

    #[allow(dead_code)]
    pub fn with_raw(raw: &str) -> Self {
        Self {
            record: Mutex::new(Some(raw.to_string())),
        }
    }

    #[allow(dead_code)]
    pub fn raw(&self) -> Option<String> {
        self.record.lock().ok().and_then(|record| record.clone())
    }
}

impl GameStore for GameStoreMemory {
    fn read(&self) -> GameState {
        match self.record.lock() {
            Ok(record) => record
                .as_deref()
                .map(GameState::from_json)
                .unwrap_or_default(),
            Err(_) => GameState::default(),
        }
    }

    fn merge_write(
        &self,
        patch: GameStatePatch,
    ) -> Result<GameState, Box<dyn std::error::Error + Send + Sync>> {
        let mut record = self
            .record
            .lock()
            .map_err(|_| "game store lock poisoned")?;
        let existing = record
            .as_deref()
            .map(GameState::from_json)
            .unwrap_or_default();
        let merged = existing.merged(patch);
        *record = Some(merged.to_json()?);
        Ok(merged)
    }

    fn clear(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut record = self
            .record
            .lock()
            .map_err(|_| "game store lock poisoned")?;
        *record = None;
        Ok(())
    }
}
