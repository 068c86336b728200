use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;

use briefly::api::{self, AppState};
use briefly::cache::ResultCache;
use briefly::config::BrieflyConfig;
use briefly::llm::{LlmProvider, create_provider};
use briefly::pipeline::{CalendarBriefer, Learner, TopicDeepener, TriagePipeline};
use briefly::search::{GoogleSearchClient, HttpPageFetcher};
use briefly::sources::{GoogleSourceFactory, SourceFactory};

/// Daily email and calendar briefings.
#[derive(Parser)]
#[command(name = "briefly", about = "Daily email and calendar briefings", version)]
struct Cli {
    /// Enable debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (the default).
    Serve {
        /// Overrides BRIEFLY_PORT.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Triage the last day of mail and print the result as JSON.
    Emails {
        /// Google access token; defaults to GOOGLE_ACCESS_TOKEN.
        #[arg(long)]
        token: Option<String>,
    },
    /// Brief the calendar window and print the result as JSON.
    Calendar {
        #[arg(long)]
        token: Option<String>,
    },
    /// Research a topic on the web and print the synthesis.
    Deepen {
        /// Topic snippet, e.g. one line of a newsletter summary.
        topic: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so the one-shot commands can pipe JSON.
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = BrieflyConfig::from_env().context("failed to load configuration")?;

    let client = reqwest::Client::builder()
        .user_agent(concat!("briefly/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;
    let llm = create_provider(&config.llm, client.clone())?;
    let sources = GoogleSourceFactory::new(client.clone());

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => serve(config, client, llm, sources, port).await,
        Command::Emails { token } => {
            let token = google_token(&config, token)?;
            let outcome = TriagePipeline::new(sources.mail(token), llm)
                .run_email_triage()
                .await?;
            if !outcome.excluded.is_empty() {
                eprintln!("Unclassified: {}", outcome.excluded.join(", "));
            }
            eprintln!("LLM cost: ${}", outcome.cost);
            println!("{}", serde_json::to_string_pretty(&outcome.result)?);
            Ok(())
        }
        Command::Calendar { token } => {
            let token = google_token(&config, token)?;
            let briefer = CalendarBriefer::new(
                sources.calendar(token.clone()),
                sources.mail(token),
                llm,
                config.briefing.clone(),
            );
            let (briefing, cost) = briefer
                .run_calendar_briefing(config.briefing.self_email.as_deref())
                .await?;
            eprintln!("LLM cost: ${cost}");
            println!("{}", serde_json::to_string_pretty(&briefing)?);
            Ok(())
        }
        Command::Deepen { topic } => {
            let deepener = build_deepener(&config, &client, llm).context(
                "topic deepening needs GOOGLE_SEARCH_API_KEY and GOOGLE_SEARCH_CSE_ID",
            )?;
            let (summary, cost) = deepener.deepen_topic(&topic).await?;
            eprintln!("LLM cost: ${cost}");
            println!("{summary}");
            Ok(())
        }
    }
}

async fn serve(
    config: BrieflyConfig,
    client: reqwest::Client,
    llm: Arc<dyn LlmProvider>,
    sources: GoogleSourceFactory,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let deepener = build_deepener(&config, &client, llm.clone());
    if deepener.is_none() {
        tracing::warn!("Search credentials not set; topic deepening is disabled");
    }

    let state = AppState {
        llm: llm.clone(),
        sources: Arc::new(sources),
        learner: Arc::new(Learner::new(llm, deepener)),
        cache: Arc::new(ResultCache::new(config.server.cache_ttl)),
        briefing: config.briefing.clone(),
        fallback_token: config.google.access_token.clone(),
    };
    let app = api::router(state, &config.server.api_tokens);

    let port = port.unwrap_or(config.server.port);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    tracing::info!(port, model = %config.llm.model, "briefly API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}

/// `None` when search credentials are absent.
fn build_deepener(
    config: &BrieflyConfig,
    client: &reqwest::Client,
    llm: Arc<dyn LlmProvider>,
) -> Option<TopicDeepener> {
    let search = config.search.as_ref()?;
    Some(TopicDeepener::new(
        llm,
        Arc::new(GoogleSearchClient::new(client.clone(), search)),
        Arc::new(HttpPageFetcher::new(client.clone())),
        config.deepen.clone(),
    ))
}

fn google_token(config: &BrieflyConfig, flag: Option<String>) -> anyhow::Result<SecretString> {
    flag.map(SecretString::from)
        .or_else(|| config.google.access_token.clone())
        .context("pass --token or set GOOGLE_ACCESS_TOKEN")
}
