pub mod handle;
pub mod manager;
pub mod types;

pub use handle::{
    CancelToken,
    TaskHandle,
};
pub use manager::{
    poll_updates,
    DeckJob,
    TaskManager,
};
pub use types::{
    DeckJobUpdate,
    DeckProgress,
};
