//! Session state managers
//!
//! All session state is owned by the single logic task, so the managers are
//! plain structs with no interior locking; serializing every mutation through
//! one task is what keeps the snapshot-then-notify ordering honest.

mod library;
mod playlist;

pub use library::LibraryManager;
pub use playlist::PlaylistManager;
