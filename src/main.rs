use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::Arc,
};

use clap::{
    Args,
    Parser,
    Subcommand,
    ValueEnum,
};
use kotodeck::{
    anki::MissingMediaPolicy,
    core::{
        models::EnrichmentOptions,
        tasks::{
            DeckJobUpdate,
            TaskManager,
        },
    },
    mapping::{
        CanonicalField,
        FieldMapping,
    },
    parser::{
        CsvFormat,
        HeaderMode,
        ParseOptions,
    },
    DeckPipeline,
    DeckRequest,
    KotoError,
    Settings,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kotodeck")]
#[command(about = "Turn Japanese vocabulary CSV files into flashcard packages")]
#[command(version)]
struct Cli {
    /// Settings file to use instead of the one in the app data directory
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show headers, sample rows and the suggested column mapping
    Analyze {
        file: PathBuf,

        #[command(flatten)]
        input: InputArgs,
    },

    /// Build a deck package
    Build {
        file: PathBuf,

        /// Output file (defaults to the deck name)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Abort when an audio reference has no media file
        #[arg(long)]
        strict_media: bool,

        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        deck: DeckArgs,
    },

    /// Print the first few cards without building a package
    Preview {
        file: PathBuf,

        /// Number of entries to preview
        #[arg(short, long)]
        count: Option<usize>,

        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        deck: DeckArgs,
    },

    /// Look up a word in the dictionary
    Lookup {
        word: String,

        /// Sense indices to keep (defaults to the first sense)
        #[arg(short, long, value_delimiter = ',')]
        senses: Vec<usize>,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Input dialect (sniffed when omitted)
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Whether the first row is a header row
    #[arg(long, value_enum, default_value = "detect")]
    headers: HeadersArg,
}

#[derive(Args)]
struct DeckArgs {
    /// Deck name (defaults to the file's #deck: directive)
    #[arg(short, long)]
    deck_name: Option<String>,

    /// Fill missing readings and meanings from the dictionary
    #[arg(long)]
    enrich: bool,

    /// Add word audio (needs --enrich)
    #[arg(long)]
    audio: bool,

    /// Add example sentences (needs --enrich)
    #[arg(long)]
    examples: bool,

    /// Add example sentence audio (needs --examples)
    #[arg(long)]
    example_audio: bool,

    /// Make recognition and production cards for each word
    #[arg(long)]
    core2000: bool,

    /// Column mapping as field=column, e.g. --map japanese=Term
    #[arg(long = "map", value_parser = parse_mapping_pair)]
    mapping: Vec<(CanonicalField, String)>,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Comma,
    Anki,
}

#[derive(Clone, Copy, ValueEnum)]
enum HeadersArg {
    Present,
    Absent,
    Detect,
}

impl InputArgs {
    fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            format: self.format.map(|f| match f {
                FormatArg::Comma => CsvFormat::Comma,
                FormatArg::Anki => CsvFormat::AnkiDirective,
            }),
            headers: match self.headers {
                HeadersArg::Present => HeaderMode::Present,
                HeadersArg::Absent => HeaderMode::Absent,
                HeadersArg::Detect => HeaderMode::Detect,
            },
        }
    }
}

impl DeckArgs {
    fn request(&self) -> DeckRequest {
        let options = EnrichmentOptions {
            enrich_cards: self.enrich,
            include_audio: self.audio,
            include_examples: self.examples,
            include_example_audio: self.example_audio,
            use_core2000: self.core2000,
        };

        let mut request = DeckRequest::new(self.deck_name.clone().unwrap_or_default(), options);
        if !self.mapping.is_empty() {
            let mut mapping = FieldMapping::new();
            for (field, column) in &self.mapping {
                mapping.set(*field, column.clone());
            }
            request = request.with_mapping(mapping);
        }
        request
    }
}

fn parse_mapping_pair(raw: &str) -> Result<(CanonicalField, String), String> {
    let (field, column) =
        raw.split_once('=').ok_or_else(|| format!("expected field=column, got '{}'", raw))?;
    let field: CanonicalField = field.trim().parse().map_err(|e: KotoError| e.to_string())?;
    Ok((field, column.trim().to_string()))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), KotoError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_settings(path: Option<&Path>) -> Result<Settings, KotoError> {
    match path {
        Some(path) => Settings::load_from(path),
        None => Ok(Settings::load()),
    }
}

async fn build(
    pipeline: Arc<DeckPipeline>,
    file: &Path,
    output: Option<PathBuf>,
    input: &InputArgs,
    deck: &DeckArgs,
) -> Result<(), KotoError> {
    let bytes = fs::read(file)?;
    let analysis = pipeline.analyze(&bytes, &input.parse_options()).await?;

    let manager = TaskManager::current()?;
    let (handle, mut updates) =
        manager.spawn_create_deck(pipeline, analysis.session_id, deck.request());

    let result = loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(DeckJobUpdate::Progress(progress)) => {
                    tracing::info!(
                        "Enriched {}/{} ({:.0}%)",
                        progress.completed,
                        progress.total,
                        progress.percent()
                    );
                }
                Some(DeckJobUpdate::Complete(Ok(deck))) => break deck,
                Some(DeckJobUpdate::Complete(Err(e))) => return Err(KotoError::Custom(e)),
                Some(DeckJobUpdate::Cancelled) | None => return Err(KotoError::Cancelled),
            },
            _ = tokio::signal::ctrl_c(), if !handle.is_cancelled() => {
                tracing::warn!("Interrupted, stopping after the current rows");
                handle.cancel();
            }
        }
    };
    handle.join().await;

    let output = output.unwrap_or_else(|| PathBuf::from(&result.package.filename));
    fs::write(&output, &result.package.bytes)?;

    tracing::info!(
        "Wrote {} ({} notes, {} cards, {} skipped rows, {} rows not fully enriched)",
        output.display(),
        result.note_count,
        result.card_count,
        result.skipped_rows,
        result.unenriched_rows.len()
    );
    print_json(&result)
}

async fn run(cli: Cli) -> Result<(), KotoError> {
    let mut settings = load_settings(cli.settings.as_deref())?;
    if let Commands::Build { strict_media: true, .. } = &cli.command {
        settings.missing_media = MissingMediaPolicy::Fail;
    }
    let pipeline = Arc::new(DeckPipeline::with_http_services(settings)?);

    match cli.command {
        Commands::Analyze { file, input } => {
            let bytes = fs::read(&file)?;
            let analysis = pipeline.analyze(&bytes, &input.parse_options()).await?;
            print_json(&analysis)
        }
        Commands::Build { file, output, input, deck, .. } => {
            build(pipeline, &file, output, &input, &deck).await
        }
        Commands::Preview { file, count, input, deck } => {
            let bytes = fs::read(&file)?;
            let analysis = pipeline.analyze(&bytes, &input.parse_options()).await?;
            let cards = pipeline.preview_cards(&analysis.session_id, &deck.request(), count).await?;
            print_json(&cards)
        }
        Commands::Lookup { word, senses } => {
            let lookup = pipeline.lookup_word(&word).await?;
            let selection = (!senses.is_empty()).then_some(senses.as_slice());
            let selected = pipeline.select_senses(&lookup.result, selection);
            print_json(&serde_json::json!({
                "lookup": lookup,
                "selected": selected,
            }))
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
