use crate::game_store::game_state::{GameState, GameStatePatch};

/// Storage for the single game record.
pub trait GameStore: Send + Sync {
    /// Never fails: a missing or unreadable record reads as the default.
    fn read(&self) -> GameState;
    /// Shallow-merges `patch` into the persisted record and returns the result.
    fn merge_write(
        &self,
        patch: GameStatePatch,
    ) -> Result<GameState, Box<dyn std::error::Error + Send + Sync>>;
    fn clear(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
