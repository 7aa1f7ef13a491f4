mod display;

use std::io::Read;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tenderscope_ai::{LlmSecrets, RuntimeConfigCache, RuntimeLlm, process_pending};
use tenderscope_api::AppState;
use tenderscope_core::{
    ExportRow, QueryIntent, build_expert_query, normalize_notice, parse_markdown_table,
    rows_to_csv,
};
use tenderscope_store::Repository;
use tenderscope_sync::http::DEFAULT_TED_URL;
use tenderscope_sync::{Mailer, PullOptions, TedClient, pull_tenders, run_digest};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tenderscope", version, about = "EU and Italian public tender search")]
struct Cli {
    /// Base URL of the TED search API
    #[arg(long, env = "TED_API_URL", default_value = DEFAULT_TED_URL, global = true)]
    ted_url: String,

    /// DuckDB file for persistent storage; in-memory when omitted
    #[arg(long, env = "TENDERSCOPE_DB", global = true)]
    db: Option<PathBuf>,

    #[command(flatten)]
    llm: LlmArgs,

    #[command(flatten)]
    mail: MailArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LlmArgs {
    #[arg(long, env = "GOOGLE_GENAI_API_KEY", hide_env_values = true, global = true)]
    gemini_key: Option<String>,

    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true, global = true)]
    openrouter_key: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    openai_key: Option<String>,

    /// Model name, overriding the provider default
    #[arg(long, env = "LLM_MODEL", global = true)]
    model: Option<String>,
}

#[derive(Args)]
struct MailArgs {
    /// Without a key, digests are previewed in the log instead of sent
    #[arg(long, env = "SENDGRID_API_KEY", hide_env_values = true, global = true)]
    sendgrid_key: Option<String>,

    #[arg(long, env = "DIGEST_FROM_EMAIL", global = true)]
    from_email: Option<String>,

    /// Web app URL linked from digest mails
    #[arg(long, env = "APP_PUBLIC_URL", global = true)]
    public_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(long, env = "TENDERSCOPE_ADDR", default_value = "0.0.0.0:8080")]
        addr: SocketAddr,
    },
    /// Search TED directly and print the results
    Search {
        /// ISO 3166-1 alpha-3 country code
        #[arg(long, default_value = tenderscope_core::query::DEFAULT_COUNTRY)]
        country: String,
        #[arg(long, default_value_t = tenderscope_core::query::DEFAULT_DAYS_BACK)]
        days_back: u32,
        /// CPV code, repeatable
        #[arg(long = "cpv")]
        cpv: Vec<String>,
        /// Free text matched against title and description
        #[arg(long)]
        text: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Print CSV instead of a table
        #[arg(long)]
        csv: bool,
        /// Print every notice as a card
        #[arg(long, conflicts_with = "csv")]
        full: bool,
    },
    /// Pull recent notices into the tender store
    Pull {
        /// Expert query to run instead of the default window
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Summarise unprocessed tenders with the LLM
    Process,
    /// Send the daily digest to every opted-in profile
    Digest,
    /// Extract tender rows from an assistant reply (file or stdin)
    ParseTable {
        file: Option<PathBuf>,
        /// Print JSON instead of cards
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("tenderscope=info".parse()?))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!("tenderscope v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve { addr } => {
            let repo = open_repo(cli.db.as_deref())?;
            let state = app_state(repo, &cli.ted_url, cli.llm, cli.mail);
            cmd_serve(state, addr).await
        }
        Commands::Search {
            country,
            days_back,
            cpv,
            text,
            limit,
            csv,
            full,
        } => {
            let intent = QueryIntent {
                country,
                days_back,
                cpv: (!cpv.is_empty()).then_some(cpv),
                text,
            };
            cmd_search(&cli.ted_url, intent, limit, csv, full).await
        }
        Commands::Pull { query, limit } => {
            let repo = open_repo(cli.db.as_deref())?;
            let ted = TedClient::new(cli.ted_url);
            let report = pull_tenders(&ted, &repo, PullOptions { query, limit }, Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Process => {
            let repo = open_repo(cli.db.as_deref())?;
            let llm = runtime_llm(&repo, cli.llm);
            let report = process_pending(&llm, &repo, Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Digest => {
            let repo = open_repo(cli.db.as_deref())?;
            let ted = TedClient::new(cli.ted_url);
            let mailer = Mailer::new(cli.mail.sendgrid_key, cli.mail.from_email);
            if !mailer.is_live() {
                warn!("SENDGRID_API_KEY not set; digests will only be previewed");
            }
            let report = run_digest(
                &ted,
                &repo,
                &mailer,
                cli.mail.public_url.as_deref(),
                Utc::now().date_naive(),
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::ParseTable { file, json } => cmd_parse_table(file.as_deref(), json),
    }
}

// ── Wiring ──

fn open_repo(db: Option<&Path>) -> anyhow::Result<Repository> {
    match db {
        #[cfg(feature = "duckdb")]
        Some(path) => {
            let store = tenderscope_store::DuckStore::open_persistent(path)
                .with_context(|| format!("opening store at {}", path.display()))?;
            Ok(Repository::new(Arc::new(store)))
        }
        #[cfg(not(feature = "duckdb"))]
        Some(_) => anyhow::bail!("--db requires the duckdb feature"),
        None => {
            warn!("no --db given; data lives in memory for this process only");
            Ok(Repository::in_memory())
        }
    }
}

fn runtime_llm(repo: &Repository, args: LlmArgs) -> RuntimeLlm {
    let secrets = LlmSecrets {
        google_genai_api_key: args.gemini_key,
        openrouter_api_key: args.openrouter_key,
        openai_api_key: args.openai_key,
        model: args.model,
    };
    RuntimeLlm::new(secrets, Arc::new(RuntimeConfigCache::new(repo.clone())))
}

fn app_state(repo: Repository, ted_url: &str, llm: LlmArgs, mail: MailArgs) -> AppState {
    AppState {
        llm: Arc::new(runtime_llm(&repo, llm)),
        search: Arc::new(TedClient::new(ted_url.to_string())),
        mailer: Arc::new(Mailer::new(mail.sendgrid_key, mail.from_email)),
        public_url: mail.public_url,
        repo,
    }
}

// ── Commands ──

async fn cmd_serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = tenderscope_api::router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

async fn cmd_search(
    ted_url: &str,
    intent: QueryIntent,
    limit: u32,
    csv: bool,
    full: bool,
) -> anyhow::Result<()> {
    intent.validate()?;
    let query = build_expert_query(&intent);
    info!(%query, "searching");

    let client = TedClient::new(ted_url.to_string());
    let notices: Vec<_> = client
        .search_notices(&query, limit)
        .await?
        .iter()
        .map(normalize_notice)
        .collect();

    if csv {
        let rows: Vec<ExportRow> = notices.iter().map(ExportRow::from).collect();
        print!("{}", rows_to_csv(&rows)?);
    } else if full {
        for n in &notices {
            display::print_notice_card(n);
        }
    } else {
        display::print_notice_table(&notices);
    }
    eprintln!("{} notice(s)", notices.len());
    Ok(())
}

fn cmd_parse_table(file: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let text = match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
            buf
        }
    };

    let rows = parse_markdown_table(&text);
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        display::print_parsed_rows(&rows);
    }
    Ok(())
}
