pub mod game_state;
pub mod impl_file;
pub mod impl_memory;
pub mod interface;
