//! kindred-client - command line access to a Kindred server
//!
//! Keeps the people snapshot in a local JSON file, like the dashboard does
//! in browser storage.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kindred::client::{Directory, LocalStore, PeopleClient};
use kindred::people::Person;

#[derive(Parser, Debug)]
#[command(name = "kindred-client")]
#[command(about = "Browse and edit a Kindred people directory")]
struct Cli {
    /// Server base URL
    #[arg(long, env = "KINDRED_URL", default_value = "http://localhost:8080")]
    url: String,

    /// Bearer token
    #[arg(long, env = "KINDRED_TOKEN")]
    token: Option<String>,

    /// Local snapshot file
    #[arg(long, env = "KINDRED_CACHE", default_value = ".kindred-cache.json")]
    cache: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List everyone (from the local snapshot when present)
    List,
    /// Show one person with their relationships
    Show { id: String },
    /// Delete a person
    Delete { id: String },
    /// Upload a profile picture
    Upload {
        id: String,
        file: PathBuf,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Drop the local snapshot and fetch it again
    Refresh,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kindred=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let client = PeopleClient::new(&cli.url).with_token(cli.token.clone());
    let directory = Directory::new(client, LocalStore::new(&cli.cache));

    match cli.command {
        Command::List => {
            for person in directory.fetch_people().await? {
                print_summary(&person);
            }
        }
        Command::Show { id } => {
            let person = directory
                .find(&id)
                .await?
                .with_context(|| format!("Person {} not found", id))?;
            print_detail(&person);
        }
        Command::Delete { id } => {
            let report = directory.delete(&id).await?;
            println!(
                "Deleted {} ({} related record(s) updated, {} failed)",
                id,
                report.updated.len(),
                report.failed.len()
            );
        }
        Command::Upload {
            id,
            file,
            content_type,
        } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());
            let url = directory
                .upload_profile_pic(&id, &name, bytes, content_type.as_deref())
                .await?;
            println!("{}", url);
        }
        Command::Refresh => {
            let people = directory.refresh().await?;
            println!("Cached {} people in {}", people.len(), cli.cache.display());
        }
    }

    Ok(())
}

fn print_summary(person: &Person) {
    let r = &person.record;
    println!(
        "{}  {}{}  {}",
        person.id,
        person.name(),
        r.name_chi
            .as_deref()
            .map(|n| format!(" ({})", n))
            .unwrap_or_default(),
        r.district.as_deref().unwrap_or("-")
    );
}

fn print_detail(person: &Person) {
    let r = &person.record;
    println!("{} [{}]", person.name(), person.id);
    for (label, value) in [
        ("NameChi", &r.name_chi),
        ("Contact", &r.contact),
        ("District", &r.district),
        ("Address", &r.address),
        ("ProfilePic", &r.profile_pic),
    ] {
        if let Some(value) = value {
            println!("  {:<12} {}", label, value);
        }
    }
    for (key, value) in r.custom_fields() {
        println!("  {:<12} {}", key, value);
    }
    for (_, edge) in r.relationships() {
        println!(
            "  -> {} is my {} (I am their {})",
            edge.value,
            edge.value2,
            if edge.value3.is_empty() { "?" } else { edge.value3.as_str() }
        );
    }
}
