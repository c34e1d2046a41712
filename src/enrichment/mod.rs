pub mod audio;
pub mod orchestrator;

pub use audio::{
    AudioKind,
    AudioService,
    GoogleTts,
};
pub use orchestrator::{
    BatchOutcome,
    EnrichedField,
    EnrichmentOrchestrator,
    ProgressFn,
    RowOutcome,
    UnenrichedRow,
};
