pub mod anki;
pub mod core;
pub mod dictionary;
pub mod enrichment;
pub mod mapping;
pub mod parser;
pub mod persistence;

pub use crate::core::{
    DeckPipeline,
    DeckRequest,
    DeckResult,
    KotoError,
    Settings,
};
