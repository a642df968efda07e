use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hub_core::{
    bounded::{FetchMethod, RequestOptions},
    http::HttpFetch,
    hub_document::{HubDocumentLoader, HubSource},
    modes::ModeCatalog,
    surface::embedding_refused,
    BoundedExecutor, OperationRequest, RetryPolicy,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hubctl", about = "One-shot checks for hub documents and addresses")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetches and parses a hub document.
    Validate {
        #[arg(default_value = "./hubData.json")]
        location: String,
    },
    /// Fetches an address through the bounded executor.
    Fetch {
        url: String,
        #[arg(long)]
        head: bool,
        #[arg(long, default_value_t = 3)]
        attempts: u32,
        #[arg(long, default_value_t = 15_000)]
        timeout_ms: u64,
    },
    /// Lists the built-in visual modes.
    Modes,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let cli = Cli::parse();
    debug!(command = ?cli.command, "hubctl: running");

    match cli.command {
        Command::Validate { location } => {
            let source = HubSource::parse(&location);
            info!(source = %source, "hubctl: validating hub document");
            let document = HubDocumentLoader::new(HttpFetch::default())
                .fetch(&source)
                .await
                .context("hub document is not usable")?;
            println!(
                "ok: {} categories, {} links",
                document.categories.len(),
                document.link_count()
            );
            for category in &document.categories {
                println!(
                    "  {} ({}): {} links",
                    category.id,
                    category.label.as_deref().unwrap_or("Select"),
                    category.links.len()
                );
            }
            if let Some(home) = &document.default_home {
                println!("default home: {home}");
            }
            if let Some(blacklist) = &document.blacklisted_domains {
                println!("blacklisted domains: {}", blacklist.join(", "));
            }
        }
        Command::Fetch {
            url,
            head,
            attempts,
            timeout_ms,
        } => {
            let policy = RetryPolicy::new(attempts, Duration::from_millis(timeout_ms))?;
            info!(url = %url, attempts, timeout_ms, head, "hubctl: fetching");
            let request = OperationRequest::new(url, policy).with_options(RequestOptions {
                method: if head { FetchMethod::Head } else { FetchMethod::Get },
                ..RequestOptions::default()
            });
            let fetched = BoundedExecutor::new()
                .execute(&request, &HttpFetch::default())
                .await
                .with_context(|| format!("fetch of {} failed", request.target()))?;
            println!(
                "status={} final_url={} bytes={}",
                fetched.status.as_u16(),
                fetched.final_url,
                fetched.body.len()
            );
            if embedding_refused(&fetched.headers) {
                warn!(url = %fetched.final_url, "hubctl: site refuses to be embedded");
                println!("embedding refused by the site's framing headers");
            }
        }
        Command::Modes => {
            for mode in ModeCatalog::builtin().modes() {
                let effects = if mode.has_effects() { "effects" } else { "static" };
                println!("{:<10} {:<10} {effects}", mode.id, mode.presentation.label);
            }
        }
    }

    Ok(())
}
