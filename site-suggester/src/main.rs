use anyhow::{bail, Context, Result};
use clap::Parser;
use site_suggester::{
    AgentConfig, DiscussionBoard, GitHubDiscussions, InMemoryBoard, OpenAiCompatibleGenerator, PageFetcher,
    PipelineBuilder, RunMode,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "site-suggester", about = "Proposes one site improvement per run on GitHub Discussions")]
struct Args {
    /// Path to the YAML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run once and exit
    #[arg(long)]
    once: bool,

    /// Generate and check a suggestion without publishing it (implies --once)
    #[arg(long)]
    dry_run: bool,

    /// Site to review, overrides the config file and SITE_URL
    #[arg(long)]
    url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AgentConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(url) = args.url {
        config.site.url = url;
        config.validate().context("Invalid --url")?;
    }

    let level = Level::from_str(&config.log_level).unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    info!(
        config_path = ?args.config,
        site = %config.site.url,
        repo = %config.github.repo,
        model = %config.llm.model,
        github_token_set = !config.github.token.is_empty(),
        once = args.once,
        dry_run = args.dry_run,
        "Starting site suggester"
    );

    let board: Arc<dyn DiscussionBoard> = if config.github.token.is_empty() {
        if !args.dry_run {
            bail!("GITHUB_TOKEN is not set; export it or use --dry-run");
        }
        warn!("No GITHUB_TOKEN, dry run reads an empty in-memory board");
        Arc::new(InMemoryBoard::new(&[config.github.category.as_str()]))
    } else {
        let mut labels = config.thresholds.coverage.rejection_labels.clone();
        for label in &config.thresholds.duplicate.rejection_labels {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }
        Arc::new(GitHubDiscussions::new(&config.github, labels).context("Failed to set up GitHub client")?)
    };

    let source = Arc::new(PageFetcher::new(config.site.clone()).context("Failed to set up page fetcher")?);
    let generator = Arc::new(
        OpenAiCompatibleGenerator::new(&config.llm)
            .context("Failed to set up generation client")?
            .with_app_name("site-suggester"),
    );

    let pipeline = PipelineBuilder::new(source, generator, board)
        .with_config(&config)
        .dry_run(args.dry_run)
        .build()
        .context("Failed to build pipeline")?;
    info!(topics = pipeline.roster().len(), "Pipeline ready");

    let mode = if args.once || args.dry_run {
        RunMode::Once
    } else {
        RunMode::Every(config.schedule_interval())
    };

    pipeline.run(mode).await?;
    info!("Site suggester finished");
    Ok(())
}
