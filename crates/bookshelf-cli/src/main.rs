use std::path::PathBuf;

use anyhow::{Context, Result};
use bookshelf_api::{BookDraft, BookId, BookshelfApi};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "bk")]
#[command(about = "Bookshelf CLI")]
struct Cli {
    #[arg(long, default_value = "./books.csv")]
    data: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    List,
    Get(IdArgs),
    Create(DraftArgs),
    Update(UpdateArgs),
    Delete(IdArgs),
}

#[derive(Debug, Args)]
struct IdArgs {
    #[arg(long)]
    id: u64,
}

#[derive(Debug, Args)]
struct DraftArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    author: String,
    #[arg(long, allow_negative_numbers = true)]
    year: i64,
}

impl DraftArgs {
    fn into_draft(self) -> BookDraft {
        BookDraft::new(self.name, self.author, self.year)
    }
}

#[derive(Debug, Args)]
struct UpdateArgs {
    #[arg(long)]
    id: u64,
    #[command(flatten)]
    draft: DraftArgs,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let api = BookshelfApi::open(&cli.data);
    let data = cli.data.display();

    match cli.command {
        Command::List => {
            let books = api.list().with_context(|| format!("failed to list books in {data}"))?;
            emit_json(serde_json::json!({ "books": books }))
        }
        Command::Get(args) => {
            let id = BookId(args.id);
            let book = api.get(id).with_context(|| format!("failed to read book {id}"))?;
            match book {
                Some(book) => emit_json(serde_json::json!({ "found": true, "book": book })),
                None => emit_json(serde_json::json!({ "found": false, "id": id })),
            }
        }
        Command::Create(args) => {
            let book = api
                .create(args.into_draft())
                .with_context(|| format!("failed to create book in {data}"))?;
            emit_json(serde_json::json!({ "book": book }))
        }
        Command::Update(args) => {
            let id = BookId(args.id);
            let replaced = api
                .update(id, args.draft.into_draft())
                .with_context(|| format!("failed to update book {id}"))?;
            emit_json(serde_json::json!({ "id": id, "replaced": replaced }))
        }
        Command::Delete(args) => {
            let id = BookId(args.id);
            let removed = api.delete(id).with_context(|| format!("failed to delete book {id}"))?;
            emit_json(serde_json::json!({ "id": id, "removed": removed }))
        }
    }
}
