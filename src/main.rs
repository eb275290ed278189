use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::redirect::Policy;
use std::path::PathBuf;
use std::sync::Arc;

use newsline::api::{Article, FeedClient};
use newsline::config::Config;
use newsline::feed::{FeedComposer, ListItem, ListingTab, LoadState};
use newsline::storage::{ArticleCache, Database, DatabaseError, ListKind, SavedLists};
use newsline::util::single_line;

/// Columns used for one printed row
const LINE_WIDTH: usize = 100;

/// Get the config directory path (~/.config/newsline/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("newsline"))
}

/// Follow at most 3 redirects and never leave the original host, so the
/// Authorization header stays with the API.
fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let same_host = attempt
            .previous()
            .first()
            .is_some_and(|first| first.host_str() == attempt.url().host_str());
        if !same_host {
            return attempt.error("Redirect to a different host refused");
        }

        tracing::debug!(to = %attempt.url(), hop = attempt.previous().len(), "Following redirect");
        attempt.follow()
    })
}

#[derive(Parser, Debug)]
#[command(name = "newsline", about = "News feed client with offline cache and saved lists")]
struct Args {
    /// Reset database (delete and recreate)
    #[arg(long)]
    reset_db: bool,

    /// Config file to use instead of ~/.config/newsline/config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch and print the feed
    Feed {
        /// all, favorites or blocked (defaults to `default_tab` from the config)
        #[arg(long)]
        tab: Option<ListingTab>,

        /// Number of pages to load on the "all" tab
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// Toggle an article in the favorites list
    Favorite { id: String },
    /// Toggle an article in the blocked list
    Block { id: String },
    /// Print a saved list as stored locally
    Saved { list: ListKind },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        println!("Created config directory: {}", config_dir.display());
    }

    // User-only access: the database holds the reading history of saved lists
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(&config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    tracing::debug!(?config, "Effective configuration");

    let db_path = config_dir.join("newsline.db");
    if args.reset_db && db_path.exists() {
        std::fs::remove_file(&db_path).context("Failed to delete database")?;
        println!("Database reset.");
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: {}", DatabaseError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    let result = run(&args.command, &config, db.clone()).await;
    db.close().await;
    result
}

async fn run(command: &Command, config: &Config, db: Database) -> Result<()> {
    let saved = SavedLists::new(db.clone());

    // Listing saved entries needs neither the network nor an API key
    if let Command::Saved { list } = command {
        let articles = saved
            .articles_for(*list)
            .await
            .context("Failed to read saved list")?;
        if articles.is_empty() {
            println!("No {list} articles.");
        }
        for article in &articles {
            println!("{}", article_line(article));
        }
        return Ok(());
    }

    let http = reqwest::Client::builder()
        .redirect(create_redirect_policy())
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(std::time::Duration::from_secs(30))
        .tcp_keepalive(std::time::Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")?;
    let client = FeedClient::new(http, config.base_url()?, config.api_key()?)
        .with_timeout(config.request_timeout());

    let cache = ArticleCache::new(db);
    let mut composer = FeedComposer::new(Arc::new(client), cache, saved)
        .await
        .with_cache_max_age(config.cache_max_age());

    match command {
        Command::Feed { tab, pages } => {
            composer.select_tab(tab.unwrap_or(config.default_tab));
            composer.load_initial_data().await;
            for _ in 1..*pages {
                if !composer.pagination().has_more_pages() {
                    break;
                }
                composer.load_more().await;
                if composer.state() == LoadState::Error {
                    break;
                }
            }
            print_feed(&composer).await;
        }
        Command::Favorite { id } => {
            let article = locate(&mut composer, id).await?;
            match composer.toggle_favorite(&article).await {
                Some(true) => println!("Added to favorites: {}", article_line(&article)),
                Some(false) => println!("Removed from favorites: {}", article_line(&article)),
                None => anyhow::bail!("Failed to update favorites"),
            }
        }
        Command::Block { id } => {
            let article = locate(&mut composer, id).await?;
            match composer.toggle_blocked(&article).await {
                Some(true) => println!("Blocked: {}", article_line(&article)),
                Some(false) => println!("Unblocked: {}", article_line(&article)),
                None => anyhow::bail!("Failed to update blocked list"),
            }
        }
        Command::Saved { .. } => {}
    }

    Ok(())
}

/// Find an article locally first, fetching the first page only if needed.
async fn locate(composer: &mut FeedComposer, id: &str) -> Result<Article> {
    if let Some(article) = composer.find_article(id) {
        return Ok(article);
    }
    composer.load_initial_data().await;
    composer
        .find_article(id)
        .ok_or_else(|| anyhow::anyhow!("No article with id '{id}' in the feed, cache or saved lists"))
}

async fn print_feed(composer: &FeedComposer) {
    match composer.state() {
        LoadState::Offline => {
            eprintln!("Offline: showing cached articles.");
            if !composer.cache_is_fresh().await {
                eprintln!("Cached articles may be out of date.");
            }
        }
        LoadState::Error => {
            if let Some(message) = composer.error_message() {
                eprintln!("Error: {message}");
            }
        }
        _ => {}
    }

    if composer.is_empty() {
        println!("No {} articles.", composer.active_tab());
        return;
    }

    for item in composer.list_items() {
        match item {
            ListItem::Article(article) => println!("{}", article_line(&article)),
            ListItem::Navigation(block) => {
                let line = format!("  >> {} [{}]", block.title, block.button_title);
                println!("{}", single_line(&line, LINE_WIDTH));
            }
        }
    }

    let page = composer.pagination();
    if composer.active_tab() == ListingTab::All && page.has_more_pages() {
        println!("(page {} of {})", page.current_page, page.total_pages);
    }
}

fn article_line(article: &Article) -> String {
    let date = article
        .published_at()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown date".to_string());
    let line = format!(
        "{}  {}  ({}, {})",
        article.id, article.web_title, article.section_name, date
    );
    single_line(&line, LINE_WIDTH)
}
