pub mod collection;
pub mod errors;
pub mod http;
pub mod models;
pub mod pipeline;
pub mod settings;
pub mod tasks;
pub mod utils;

pub use errors::KotoError;
pub use pipeline::{
    AnalyzeResult,
    DeckPipeline,
    DeckRequest,
    DeckResult,
};
pub use settings::Settings;
