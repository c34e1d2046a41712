pub mod apkg;
pub mod assembler;
pub mod package;
pub mod templates;

pub use assembler::CardAssembler;
pub use package::{
    package_filename,
    MissingMediaPolicy,
    DEFAULT_DECK_NAME,
    Package,
    PackageExporter,
};
pub use templates::{
    CardTemplate,
    NoteType,
};
