use std::{fmt::Write as _, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use storage::{Catalog, Storage, StoredChoice, MAX_PAGES};

#[derive(Parser, Debug)]
#[command(name = "survey-tools", about = "Operator helpers for the thumbnail survey")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a metadata file and print its page sequence.
    CheckCatalog {
        #[arg(long, default_value = "video_metadata.json")]
        metadata: PathBuf,
        #[arg(long, default_value_t = MAX_PAGES)]
        max_pages: usize,
    },
    /// Print choices recorded by the SQLite sink.
    ListChoices {
        #[arg(long, default_value = "sqlite://./data/choices.db")]
        database_url: String,
        #[arg(long)]
        participant: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::CheckCatalog {
            metadata,
            max_pages,
        } => {
            let catalog = Catalog::load(&metadata, max_pages)
                .with_context(|| format!("failed to load {}", metadata.display()))?;
            print!("{}", describe_catalog(&catalog));
            if catalog.is_empty() {
                bail!("{} defines no pages", metadata.display());
            }
        }
        Command::ListChoices {
            database_url,
            participant,
        } => {
            let storage = Storage::new(&database_url).await?;
            let choices = storage.list_choices(participant.as_deref()).await?;
            for choice in &choices {
                println!("{}", format_choice(choice));
            }
            println!("{} row(s)", choices.len());
        }
    }

    Ok(())
}

fn describe_catalog(catalog: &Catalog) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} page(s), {} video(s)",
        catalog.pages().len(),
        catalog.item_count()
    );
    for page in catalog.pages() {
        let ids: Vec<&str> = catalog.items_on(*page).iter().map(|i| i.id.as_str()).collect();
        let _ = writeln!(out, "  page {page}: {} video(s) [{}]", ids.len(), ids.join(", "));
    }
    for warning in catalog.warnings() {
        let _ = writeln!(out, "warning: {warning}");
    }
    out
}

fn format_choice(choice: &StoredChoice) -> String {
    let record = &choice.record;
    let optional = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
    format!(
        "#{} {} pid={} page={} chose={} ({}) control={} treated={} image={} text={}",
        choice.row_id,
        record.timestamp_et,
        record.participant_id,
        record.page,
        record.chosen_internal_id,
        record.chosen_vid_id,
        optional(record.control_internal_id.as_ref().map(ToString::to_string)),
        optional(record.treated_internal_id.as_ref().map(ToString::to_string)),
        optional(record.treated_image_congruency.map(|c| c.as_str().to_string())),
        optional(record.treated_text_congruency.map(|c| c.as_str().to_string())),
    )
}
