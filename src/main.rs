use clap::{Parser, Subcommand};
use color_eyre::Result;
use docbridge::remote::memory::MemoryStore;
use docbridge::remote::{Direction, DocumentRef, Fields, WriteBatch};
use docbridge::{Config, DataService, QuerySpec};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "docbridge")]
#[command(about = "Exercise the document access layer against an in-memory store")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/docbridge/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Batch-write records, then page through them
  Paginate {
    /// Number of records to write
    #[arg(long, default_value_t = 1200)]
    count: usize,
    /// Items per page (default: query.default_page_size)
    #[arg(long)]
    page_size: Option<usize>,
  },
  /// Watch one document while it changes
  Watch {
    /// Number of changes to apply
    #[arg(long, default_value_t = 3)]
    updates: u32,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = docbridge::logging::init(&config.logging)?;

  let store = Arc::new(MemoryStore::new());
  let service = DataService::new(store.clone(), &config)?;

  match args.command {
    Command::Paginate { count, page_size } => {
      let page_size = page_size.unwrap_or(service.default_page_size());
      paginate(&service, count, page_size).await?
    }
    Command::Watch { updates } => watch(&service, &store, updates).await?,
  }

  service.cancel_all_subscriptions();
  Ok(())
}

fn stage_reading(batch: &mut WriteBatch, seq: &usize, target: &DocumentRef) {
  let mut fields = Fields::new();
  fields.insert("seq".to_string(), json!(seq));
  batch.set(target, fields);
}

async fn paginate(service: &DataService, count: usize, page_size: usize) -> Result<()> {
  let items: Vec<usize> = (0..count).collect();
  let report = service
    .batch_write_tracked(&items, stage_reading, "readings")
    .await;
  println!(
    "wrote {} items in {} chunks ({} failed)",
    count,
    report.total_chunks(),
    report.failed_chunks()
  );
  report.into_result()?;

  let query = QuerySpec::new().order_by("seq", Direction::Ascending);
  let mut page = service.query("readings", &query, page_size).await?;
  let mut pages = 1;
  let mut seen = page.len();
  while let Some(next) = service.load_more(&page).await? {
    page = next;
    pages += 1;
    seen += page.len();
  }
  println!(
    "read {} items over {} pages of {} (last page has_more = {})",
    seen, pages, page_size, page.has_more
  );

  let again = service
    .fetch_page(docbridge::PageRequest::new("readings", query, page_size))
    .await?;
  println!("first page again: served from {:?}", again.source);
  Ok(())
}

async fn watch(service: &DataService, store: &MemoryStore, updates: u32) -> Result<()> {
  let mut fields = Fields::new();
  fields.insert("status".to_string(), json!("open"));
  let id = service.add_document("tasks", fields).await?;

  let subscription = service.subscribe("tasks", &id, |doc| {
    println!("snapshot {}: {}", doc.id, serde_json::Value::Object(doc.fields));
  });

  for revision in 1..=updates {
    let mut change = Fields::new();
    change.insert("revision".to_string(), json!(revision));
    service.update_document("tasks", &id, change).await?;
  }

  subscription.cancel();
  println!(
    "cancelled; {} listener(s) left on tasks/{}",
    store.listener_count("tasks", &id),
    id
  );
  Ok(())
}
