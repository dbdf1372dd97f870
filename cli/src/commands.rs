use std::path::PathBuf;
use std::process::ExitCode;

use chrono::DateTime;
use chrono::Local;
use chrono::Utc;
use clap::Parser;
use lectern_core::ChatError;
use lectern_core::Companion;
use lectern_core::Config;
use lectern_core::ImportOutcome;
use lectern_core::chat::HttpChatTransport;
use lectern_core::chat::RetryingClient;
use lectern_core::chat::context::NoPages;
use lectern_core::chat::context::PageDir;
use lectern_core::chat::context::PageTextSource;
use lectern_core::config::find_lectern_home;
use lectern_core::outline::Outline;
use lectern_store::factory;
use lectern_store::factory::Backend;
use tokio_util::sync::CancellationToken;

use crate::surface::ArgPicker;
use crate::surface::TerminalSurface;
use crate::surface::confirm;

/// Reading companion: learning status, chat transcripts and an AI tutor.
#[derive(Debug, Parser)]
#[command(name = "lectern", version)]
pub struct LecternCli {
    /// Data directory (default `$LECTERN_HOME` or `~/.lectern`).
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Folder to keep durable copies in for this run.
    #[arg(long, global = true)]
    pub folder: Option<PathBuf>,

    /// Force a key/value backend instead of probing.
    #[arg(long, value_enum, global = true)]
    pub backend: Option<BackendArg>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum BackendArg {
    Flat,
    Sqlite,
}

impl From<BackendArg> for Backend {
    fn from(b: BackendArg) -> Self {
        match b {
            BackendArg::Flat => Backend::Flat,
            BackendArg::Sqlite => Backend::Sqlite,
        }
    }
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Learning status of outline items.
    Status {
        #[command(subcommand)]
        cmd: StatusCommand,
    },
    /// Learned and mastered counts over the outline.
    Progress,
    /// List outline items, optionally filtered by id or title.
    Outline {
        #[arg(long)]
        filter: Option<String>,
    },
    /// Chat transcripts: show, export, import and folder snapshots.
    History {
        #[command(subcommand)]
        cmd: HistoryCommand,
    },
    /// Ask the tutor about an item.
    Ask {
        id: String,
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },
    /// Manage the API key.
    Key {
        #[command(subcommand)]
        cmd: KeyCommand,
    },
    /// Last visited page.
    Page {
        #[command(subcommand)]
        cmd: PageCommand,
    },
    /// Report the legacy learned-list migration run at startup.
    Migrate,
    /// Folder grant information.
    Folder {
        #[command(subcommand)]
        cmd: FolderCommand,
    },
}

#[derive(Debug, clap::Subcommand)]
pub enum StatusCommand {
    Get { id: String },
    /// Move to the next status: unlearned, learned, mastered, unlearned.
    Advance { id: String },
    List,
}

#[derive(Debug, clap::Subcommand)]
pub enum HistoryCommand {
    Show {
        id: String,
    },
    /// Write the export document to a file or stdout.
    Export {
        id: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Merge an export document into the item's transcript.
    Import {
        id: String,
        file: PathBuf,
        /// Merge even when the document belongs to another item.
        #[arg(long)]
        yes: bool,
    },
    /// Save a snapshot file to the folder.
    Save {
        id: String,
    },
    /// List the item's snapshot files, newest first.
    Snapshots {
        id: String,
    },
    /// Merge a snapshot file back into the item's transcript.
    Restore {
        id: String,
        filename: String,
    },
}

#[derive(Debug, clap::Subcommand)]
pub enum KeyCommand {
    Set { key: String },
    Show,
}

#[derive(Debug, clap::Subcommand)]
pub enum PageCommand {
    Get,
    Set { page: u32 },
}

#[derive(Debug, clap::Subcommand)]
pub enum FolderCommand {
    Info,
}

/// Execute one command against a freshly booted companion.
pub async fn run(cli: LecternCli) -> anyhow::Result<ExitCode> {
    let mut companion = boot(&cli)?;
    let code = dispatch(&mut companion, cli.cmd).await;
    for notice in companion.take_notices() {
        eprintln!("warning: {notice}");
    }
    code
}

fn boot(cli: &LecternCli) -> anyhow::Result<Companion> {
    let home = match &cli.home {
        Some(home) => home.clone(),
        None => find_lectern_home()?,
    };
    std::fs::create_dir_all(&home)?;
    let config = Config::load(&home)?;
    let outline = match &config.outline {
        Some(path) => Outline::load(path)?,
        None => Outline::default(),
    };
    let pages: Box<dyn PageTextSource + Send + Sync> = match &config.pages_dir {
        Some(dir) => Box::new(PageDir::new(dir)),
        None => Box::new(NoPages),
    };
    let kv = factory::open_store(&home, cli.backend.map(Backend::from));
    tracing::debug!("kv backend: {}", kv.backend_name());

    let mut companion = Companion::boot(config, kv, outline, pages);
    if cli.folder.is_some() && !companion.grant_folder(&ArgPicker(cli.folder.clone()))? {
        eprintln!("warning: no folder granted");
    }
    Ok(companion)
}

async fn dispatch(companion: &mut Companion, cmd: Command) -> anyhow::Result<ExitCode> {
    match cmd {
        Command::Status { cmd } => match cmd {
            StatusCommand::Get { id } => println!("{}", companion.status(&id)),
            StatusCommand::Advance { id } => println!("{}", companion.advance_status(&id)),
            StatusCommand::List => {
                for (id, status) in companion.statuses() {
                    println!("{id}\t{status}");
                }
            }
        },
        Command::Progress => {
            let p = companion.progress();
            println!(
                "{} learned, {} mastered, {} total ({}%)",
                p.learned,
                p.mastered,
                p.total,
                p.percent()
            );
        }
        Command::Outline { filter } => {
            let items = companion.outline().filter(filter.as_deref().unwrap_or_default());
            for item in items {
                println!(
                    "{}\t{}\t{}\t{}",
                    item.id,
                    item.kind,
                    companion.status(&item.id),
                    item.title
                );
            }
        }
        Command::History { cmd } => history(companion, cmd)?,
        Command::Ask { id, message } => return ask(companion, &id, &message.join(" ")).await,
        Command::Key { cmd } => match cmd {
            KeyCommand::Set { key } => {
                if !companion.save_credential(key.trim()).is_lost() {
                    println!("API key saved");
                }
            }
            KeyCommand::Show => match companion.credential() {
                Some(key) => println!("{}", mask(&key)),
                None => println!("no API key configured"),
            },
        },
        Command::Page { cmd } => match cmd {
            PageCommand::Get => match companion.last_page() {
                Some(page) => println!("{page}"),
                None => println!("no page recorded"),
            },
            PageCommand::Set { page } => {
                companion.set_last_page(page);
            }
        },
        Command::Migrate => {
            let report = companion.migration();
            println!(
                "Migrated {} of {} legacy learned items",
                report.migrated, report.legacy
            );
        }
        Command::Folder { cmd } => match cmd {
            FolderCommand::Info => {
                match companion.folder() {
                    Some(folder) => println!("granted: {}", folder.root().display()),
                    None => println!("no folder granted this session"),
                }
                if let Some(meta) = companion.last_folder_meta() {
                    println!("last grant: {} at {}", meta.name, format_time(meta.granted_at));
                }
            }
        },
    }
    Ok(ExitCode::SUCCESS)
}

fn history(companion: &mut Companion, cmd: HistoryCommand) -> anyhow::Result<()> {
    match cmd {
        HistoryCommand::Show { id } => {
            for m in companion.history(&id) {
                let marker = if m.imported { " (imported)" } else { "" };
                println!(
                    "[{}] {}{marker}: {}",
                    format_time(m.time),
                    m.role.as_str(),
                    m.content
                );
            }
        }
        HistoryCommand::Export { id, out } => {
            let doc = companion.export_history(&id);
            let text = serde_json::to_string_pretty(&doc)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, text)?;
                    println!("Exported {} messages to {}", doc.messages.len(), path.display());
                }
                None => println!("{text}"),
            }
        }
        HistoryCommand::Import { id, file, yes } => {
            let text = std::fs::read_to_string(&file)?;
            let outcome = companion.import_history(&id, &text, |from, to| {
                yes || confirm(&format!("This history belongs to {from}. Import it into {to}?"))
            })?;
            match outcome {
                ImportOutcome::Merged { added } => println!("Merged {added} messages into {id}"),
                ImportOutcome::Declined { object_id } => {
                    println!("Import declined: history belongs to {object_id}")
                }
            }
        }
        HistoryCommand::Save { id } => {
            let filename = companion.save_snapshot(&id)?;
            println!("Saved {filename}");
        }
        HistoryCommand::Snapshots { id } => {
            for s in companion.snapshots(&id)? {
                println!(
                    "{}\t{} messages\t{}",
                    s.filename,
                    s.message_count,
                    format_time(s.saved_at)
                );
            }
        }
        HistoryCommand::Restore { id, filename } => {
            let added = companion.restore_snapshot(&id, &filename)?;
            println!("Merged {added} messages into {id}");
        }
    }
    Ok(())
}

async fn ask(companion: &mut Companion, id: &str, question: &str) -> anyhow::Result<ExitCode> {
    let key = companion.credential().ok_or(ChatError::MissingCredential)?;
    let transport = HttpChatTransport::new(companion.config().api_url.clone(), key);
    let client = RetryingClient::new(transport);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut surface = TerminalSurface::default();
    let result = companion
        .ask(&client, id, question, &mut surface, &cancel)
        .await;
    watcher.abort();

    match result {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(
            e @ (ChatError::EmptyMessage | ChatError::Cancelled | ChatError::MissingCredential),
        ) => Err(e.into()),
        // Everything else was already reported through the surface.
        Err(_) => Ok(ExitCode::FAILURE),
    }
}

fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

fn format_time(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}
