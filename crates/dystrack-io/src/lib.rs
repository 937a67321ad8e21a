//! dystrack-io: IO boundary of the DySTrack manager.
//! Lists the watched tree, delivers coordinates to the microscope macro,
//! runs external analysis programs and tails the coordinate file.
//! No business logic, only IO.

pub mod callback;
pub mod command;
pub mod error;
pub mod kv_store;
pub mod listing;
pub mod stability;
pub mod tail;
pub mod text_file;
pub mod transmit;

pub use callback::CallbackTransmitter;
pub use command::{CommandPipeline, CommandTransmitter, ProcessRunner, SystemRunner};
pub use error::{CommandError, ListingError, TransmitError};
pub use kv_store::{
    DirectoryStore, KeyValueStore, KeyValueTransmitter, MemoryStore, REGISTRY_NAMESPACE,
};
pub use listing::{ensure_target_dir, snapshot_dir};
pub use stability::{FileStability, wait_for_stable_file};
pub use tail::{CoordinateRow, CoordsTail, TailOutcome};
pub use text_file::{COORDS_FILE_NAME, TextFileTransmitter};
pub use transmit::Transmitter;
