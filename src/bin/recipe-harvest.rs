//! CLI binary for recipe-harvest.
//!
//! A thin shim over the library crate: settings file plus flags in, harvest
//! runs, recipe listings, meal plans and shopping lists out.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use recipe_harvest::output::FileOutcome;
use recipe_harvest::settings::export_credentials;
use recipe_harvest::{
    build_shopping_list, generate_plan, select_provider, ChunkError, EdgequakeProvider,
    ExtractionProvider, FileStatus, HarvestConfig, HarvestProgressCallback, Harvester, MealPlan,
    MealPlanStore, MealType, PdfiumPageSource, PlanRequest, ProcessingLedger, ProgressCallback,
    ProviderSettings, RecipeStore, RunSummary, Settings, SqliteStore,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar over the files of the run, with a log line per chunk.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Harvesting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl HarvestProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Harvesting {total_files} file(s)…"))
        ));
    }

    fn on_file_start(&self, file_num: usize, total_files: usize, filename: &str) {
        self.bar.set_message(filename.to_string());
        self.bar.println(format!(
            "{} [{file_num}/{total_files}] {}",
            cyan("▸"),
            bold(filename)
        ));
    }

    fn on_file_skipped(&self, _file_num: usize, _total_files: usize, filename: &str) {
        self.bar
            .println(format!("{} {}  {}", dim("↷"), filename, dim("already processed")));
    }

    fn on_chunk_complete(&self, chunk: usize, total_chunks: usize, recipes: usize) {
        self.bar.println(format!(
            "    {} chunk {:>2}/{:<2}  {}",
            green("✓"),
            chunk + 1,
            total_chunks,
            dim(&format!("{recipes} recipe(s)"))
        ));
    }

    fn on_chunk_error(&self, chunk: usize, total_chunks: usize, error: &ChunkError) {
        let msg = error.to_string();
        let msg = if msg.chars().count() > 80 {
            format!("{}…", msg.chars().take(79).collect::<String>())
        } else {
            msg
        };
        self.bar.println(format!(
            "    {} chunk {:>2}/{:<2}  {}",
            red("✗"),
            chunk + 1,
            total_chunks,
            red(&msg)
        ));
    }

    fn on_file_complete(&self, outcome: &FileOutcome) {
        match outcome.status {
            FileStatus::Processed => self.bar.println(format!(
                "  {} {}  {} saved",
                green("✔"),
                outcome.filename,
                bold(&outcome.recipes_saved.to_string())
            )),
            FileStatus::Incomplete => self.bar.println(format!(
                "  {} {}  incomplete, will be retried",
                yellow("⚠"),
                outcome.filename
            )),
            FileStatus::Failed => self.bar.println(format!(
                "  {} {}  {}",
                red("✘"),
                outcome.filename,
                red(outcome.errors.first().map(String::as_str).unwrap_or("failed"))
            )),
            FileStatus::Skipped => {}
        }
        self.bar.inc(1);
    }

    fn on_run_complete(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Create a settings file and the database
  recipe-harvest init

  # Harvest every PDF under a directory
  recipe-harvest run diet-plans/

  # Use Anthropic with 5 pages per request, sending PDF slices
  recipe-harvest run --provider anthropic --max-pages 5 --direct-pdf diet-plans/

  # What has been processed, and force one file again
  recipe-harvest ledger
  recipe-harvest forget "week-03.pdf"

  # Browse recipes
  recipe-harvest recipes --meal-type breakfast

  # A reproducible 7-day plan and its shopping list
  recipe-harvest plan generate --days 7 --seed 42 --name "Tydzień 1"
  recipe-harvest shopping <PLAN_ID>

MEAL TYPES:
  breakfast, lunch, dinner, dessert, drink
  (Polish labels such as Śniadanie, Obiad, Kolacja, Deser and Napój are
  recognised in model output and mapped to these.)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  MISTRAL_API_KEY         Mistral API key
  RECIPE_HARVEST_CONFIG   Settings file (default: recipe-harvest.toml)
  RECIPE_HARVEST_DB       Database path, overrides the settings file
  PDFIUM_LIB_PATH         Directory holding libpdfium
  RUST_LOG                Log filter, e.g. recipe_harvest=debug
"#;

/// Extract recipes from diet-plan PDFs and plan meals with them.
#[derive(Parser, Debug)]
#[command(
    name = "recipe-harvest",
    version,
    about = "Extract recipes from diet-plan PDFs with LLMs, then plan meals and shopping lists",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Settings file. Missing file means defaults.
    #[arg(
        short,
        long,
        global = true,
        env = "RECIPE_HARVEST_CONFIG",
        default_value = "recipe-harvest.toml"
    )]
    config: PathBuf,

    /// SQLite database path. Overrides `[database] path`.
    #[arg(long, global = true, env = "RECIPE_HARVEST_DB")]
    db: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "RECIPE_HARVEST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "RECIPE_HARVEST_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a starter settings file and create the database.
    Init {
        /// Overwrite an existing settings file.
        #[arg(long)]
        force: bool,
    },

    /// Harvest recipes from every PDF under a directory.
    Run(RunArgs),

    /// List processed files.
    Ledger {
        #[arg(long)]
        json: bool,
    },

    /// Drop a file from the ledger so the next run processes it again.
    Forget {
        /// Ledger filename, as shown by `ledger`.
        filename: String,
    },

    /// List stored recipes.
    Recipes {
        /// Only recipes of this primary meal type.
        #[arg(short, long)]
        meal_type: Option<MealType>,
        #[arg(long)]
        json: bool,
    },

    /// Generate and manage meal plans.
    Plan {
        #[command(subcommand)]
        command: PlanCommand,
    },

    /// Derive, store and print the shopping list of a plan.
    Shopping {
        plan_id: Uuid,
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Directory to scan. Defaults to `[input] dir`.
    dir: Option<PathBuf>,

    /// Provider name (openai, anthropic, gemini, mistral, ollama, …).
    #[arg(long, env = "RECIPE_HARVEST_PROVIDER")]
    provider: Option<String>,

    /// Model ID for the provider.
    #[arg(long, env = "RECIPE_HARVEST_MODEL")]
    model: Option<String>,

    /// Pages per provider request.
    #[arg(long, env = "RECIPE_HARVEST_MAX_PAGES")]
    max_pages: Option<usize>,

    /// Send PDF slices instead of page images.
    #[arg(long)]
    direct_pdf: bool,

    /// Retries per chunk on transport failure.
    #[arg(long, env = "RECIPE_HARVEST_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Delay between provider calls in milliseconds.
    #[arg(long, env = "RECIPE_HARVEST_CALL_DELAY_MS")]
    call_delay_ms: Option<u64>,

    /// Category for recipes without a recognised meal label.
    #[arg(long)]
    default_meal_type: Option<MealType>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "RECIPE_HARVEST_PDF_PASSWORD")]
    password: Option<String>,

    /// Path to a text file with a custom extraction instruction.
    #[arg(long)]
    system_prompt: Option<PathBuf>,

    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "RECIPE_HARVEST_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum PlanCommand {
    /// Generate a plan from the stored recipes and save it.
    Generate {
        #[arg(short, long, default_value_t = 7)]
        days: u32,
        /// Meal slots of each day, comma separated.
        #[arg(long, value_delimiter = ',', default_value = "breakfast,lunch,dinner")]
        slots: Vec<MealType>,
        /// Seed for a reproducible plan.
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List saved plans, newest first.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Print one plan.
    Show {
        id: Uuid,
        #[arg(long)]
        json: bool,
    },
    /// Delete a plan.
    Delete { id: Uuid },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = match &cli.command {
        Command::Run(args) => !cli.quiet && !args.no_progress && !args.json,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Settings ─────────────────────────────────────────────────────────
    let mut settings = if cli.config.exists() {
        Settings::load(&cli.config)
            .with_context(|| format!("Failed to load settings from {}", cli.config.display()))?
    } else {
        debug!("{} not found, using defaults", cli.config.display());
        Settings::default()
    };
    if let Some(db) = &cli.db {
        settings.database.path = db.clone();
    }

    // Environment changes must happen before the runtime starts its threads.
    for var in export_credentials(&settings.providers) {
        debug!("Exported {var} from settings");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(dispatch(cli, settings, show_progress))
}

async fn dispatch(cli: Cli, settings: Settings, show_progress: bool) -> Result<()> {
    match cli.command {
        Command::Init { force } => init(&cli.config, &settings, force, cli.quiet).await,
        Command::Run(args) => run(args, &settings, show_progress, cli.quiet).await,
        Command::Ledger { json } => ledger(&settings, json).await,
        Command::Forget { filename } => {
            let store = open_store(&settings).await?;
            if store.forget(&filename).await? {
                if !cli.quiet {
                    eprintln!("{} {} will be processed on the next run", green("✔"), filename);
                }
                Ok(())
            } else {
                bail!("'{filename}' is not in the ledger")
            }
        }
        Command::Recipes { meal_type, json } => recipes(&settings, meal_type, json).await,
        Command::Plan { command } => plan(&settings, command, cli.quiet).await,
        Command::Shopping { plan_id, json } => shopping(&settings, plan_id, json).await,
    }
}

async fn open_store(settings: &Settings) -> Result<SqliteStore> {
    SqliteStore::open(&settings.database.path)
        .await
        .with_context(|| format!("Failed to open database {}", settings.database.path.display()))
}

// ── init ─────────────────────────────────────────────────────────────────

async fn init(config_path: &Path, settings: &Settings, force: bool, quiet: bool) -> Result<()> {
    if config_path.exists() && !force {
        if !quiet {
            eprintln!(
                "{} {} exists, leaving it alone (use --force to overwrite)",
                dim("·"),
                config_path.display()
            );
        }
    } else {
        std::fs::write(config_path, Settings::template())
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        if !quiet {
            eprintln!("{} wrote {}", green("✔"), config_path.display());
        }
    }

    open_store(settings).await?;
    if !quiet {
        eprintln!(
            "{} database ready at {}",
            green("✔"),
            settings.database.path.display()
        );
    }
    Ok(())
}

// ── run ──────────────────────────────────────────────────────────────────

async fn run(args: RunArgs, settings: &Settings, show_progress: bool, quiet: bool) -> Result<()> {
    let dir = args
        .dir
        .clone()
        .or_else(|| settings.input.dir.clone())
        .context("No input directory: pass one or set [input] dir in the settings file")?;

    let config = build_config(&args, settings, show_progress).await?;
    let (provider_settings, provider) = build_provider(&args, settings, &config)?;
    debug!("Provider settings: {:?}", provider_settings);

    let pages = PdfiumPageSource::from_env();
    pages.probe().context("PDF engine unavailable")?;

    let store = Arc::new(open_store(settings).await?);
    let harvester = Harvester::with_store(config, provider_settings, provider, Arc::new(pages), store);

    // Ctrl-C finishes the current file, then stops.
    let status = harvester.status();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted: stopping after the current file");
            status.request_cancel();
        }
    });

    let summary = harvester
        .run_dir(&dir)
        .await
        .with_context(|| format!("Harvest of {} failed", dir.display()))?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !quiet {
        print_summary(&summary);
    }
    Ok(())
}

/// Map settings and CLI args to `HarvestConfig`; flags win.
async fn build_config(args: &RunArgs, settings: &Settings, show_progress: bool) -> Result<HarvestConfig> {
    let mut config = settings.to_harvest_config().context("Invalid configuration")?;

    if let Some(ref path) = args.system_prompt {
        config.system_prompt = Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        );
    }
    if let Some(n) = args.max_retries {
        config.max_retries = n;
    }
    if let Some(ms) = args.call_delay_ms {
        config.call_delay_ms = ms;
    }
    if let Some(m) = args.default_meal_type {
        config.default_meal_type = m;
    }
    config.password = args.password.clone();

    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new();
        config.progress_callback = Some(cb);
    }
    Ok(config)
}

fn build_provider(
    args: &RunArgs,
    settings: &Settings,
    config: &HarvestConfig,
) -> Result<(ProviderSettings, Arc<dyn ExtractionProvider>)> {
    let mut chosen = match &args.provider {
        Some(name) => settings
            .providers
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .cloned()
            .unwrap_or_else(|| ProviderSettings::new(name.clone())),
        None if settings.providers.is_empty() => ProviderSettings::new("auto"),
        None => select_provider(&settings.providers)
            .context("Invalid provider configuration")?
            .clone(),
    };

    if let Some(model) = &args.model {
        chosen.model = Some(model.clone());
    }
    if let Some(n) = args.max_pages {
        chosen.max_pages_per_chunk = n;
    }
    if args.direct_pdf {
        chosen.supports_direct_pdf = true;
    }
    if chosen.max_pages_per_chunk == 0 {
        bail!("--max-pages must be at least 1");
    }

    let provider = if chosen.name == "auto" {
        EdgequakeProvider::from_env(config)?
    } else {
        EdgequakeProvider::from_name(&chosen.name, chosen.model.as_deref(), config)?
    };
    Ok((chosen, Arc::new(provider)))
}

fn print_summary(summary: &RunSummary) {
    let mark = if summary.errors == 0 && !summary.cancelled {
        green("✔")
    } else if summary.files_processed == 0 && summary.files_skipped == 0 {
        red("✘")
    } else {
        yellow("⚠")
    };
    eprintln!(
        "{}  {} processed, {} skipped, {} incomplete, {} failed  {}",
        mark,
        bold(&summary.files_processed.to_string()),
        summary.files_skipped,
        summary.files_incomplete,
        summary.files_failed,
        dim(&format!("{}ms", summary.duration.as_millis()))
    );
    eprintln!(
        "   {} recipe(s) extracted, {} saved, {} already known, from {} chunk(s); {} error(s)",
        summary.recipes_extracted,
        bold(&summary.recipes_saved.to_string()),
        summary.recipes_merged,
        summary.chunks_attempted,
        if summary.errors == 0 {
            summary.errors.to_string()
        } else {
            red(&summary.errors.to_string())
        }
    );
    if summary.cancelled {
        eprintln!("   {}", yellow("cancelled; remaining files untouched"));
    }
}

// ── ledger / recipes ─────────────────────────────────────────────────────

async fn ledger(settings: &Settings, json: bool) -> Result<()> {
    let store = open_store(settings).await?;
    let records = store.list_processed().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        eprintln!("{}", dim("No files processed yet."));
    }
    for r in records {
        println!(
            "{}  {:>4} recipe(s)  {}  {}",
            r.processed_at.format("%Y-%m-%d %H:%M"),
            r.recipes_extracted,
            dim(&r.checksum[..r.checksum.len().min(12)]),
            r.filename
        );
    }
    Ok(())
}

async fn recipes(settings: &Settings, meal_type: Option<MealType>, json: bool) -> Result<()> {
    let store = open_store(settings).await?;
    let recipes = store.list_by_meal_type(meal_type).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
        return Ok(());
    }
    for r in &recipes {
        let alt = r
            .alternate_meal_type
            .map(|m| format!("/{m}"))
            .unwrap_or_default();
        println!(
            "{}  {:<10} {:>5} kcal  B {:>5.1}  W {:>5.1}  T {:>5.1}  {}",
            dim(&r.id.to_string()[..8]),
            format!("{}{}", r.meal_type, alt),
            r.calories,
            r.protein,
            r.carbs,
            r.fat,
            r.name
        );
    }
    eprintln!("{}", dim(&format!("{} recipe(s)", recipes.len())));
    Ok(())
}

// ── plans / shopping ─────────────────────────────────────────────────────

async fn plan(settings: &Settings, command: PlanCommand, quiet: bool) -> Result<()> {
    let store = open_store(settings).await?;
    match command {
        PlanCommand::Generate {
            days,
            slots,
            seed,
            name,
            json,
        } => {
            let recipes = store.list_by_meal_type(None).await?;
            if recipes.is_empty() {
                bail!("No recipes stored yet; run `recipe-harvest run` first");
            }
            let request = PlanRequest {
                name,
                days,
                slots,
                seed,
            };
            let outcome = generate_plan(&recipes, &request).context("Invalid plan request")?;
            store.save_plan(&outcome.plan).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.plan)?);
            } else {
                print_plan(&outcome.plan);
                for empty in &outcome.empty_slots {
                    eprintln!(
                        "{} day {}: no {} recipe available",
                        yellow("⚠"),
                        empty.day_number,
                        empty.slot
                    );
                }
                if !quiet {
                    eprintln!("{} saved plan {}", green("✔"), outcome.plan.id);
                }
            }
        }
        PlanCommand::List { json } => {
            let plans = store.list_plans().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plans)?);
            } else {
                for p in plans {
                    println!(
                        "{}  {}  {:>2} day(s)  {:>3} meal(s)  {}",
                        p.id,
                        p.created_at.format("%Y-%m-%d"),
                        p.days,
                        p.entries,
                        p.name
                    );
                }
            }
        }
        PlanCommand::Show { id, json } => {
            let plan = store
                .get_plan(id)
                .await?
                .with_context(|| format!("No plan with id {id}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print_plan(&plan);
            }
        }
        PlanCommand::Delete { id } => {
            if !store.delete_plan(id).await? {
                bail!("No plan with id {id}");
            }
            if !quiet {
                eprintln!("{} deleted plan {}", green("✔"), id);
            }
        }
    }
    Ok(())
}

fn print_plan(plan: &MealPlan) {
    println!("{}  {}", bold(&plan.name), dim(&plan.id.to_string()));
    for day in &plan.days {
        println!("{}", cyan(&format!("Day {}", day.day_number)));
        for entry in &day.entries {
            println!("  {:<10} {}", entry.slot.to_string(), entry.recipe_name);
        }
    }
}

async fn shopping(settings: &Settings, plan_id: Uuid, json: bool) -> Result<()> {
    let store = open_store(settings).await?;
    let plan = store
        .get_plan(plan_id)
        .await?
        .with_context(|| format!("No plan with id {plan_id}"))?;
    let recipes = store.list_by_meal_type(None).await?;

    let items = build_shopping_list(&plan, &recipes);
    store.save_shopping_list(plan_id, &items).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    let mut current = None;
    for item in &items {
        if current != Some(item.category) {
            println!("{}", cyan(&item.category.to_string()));
            current = Some(item.category);
        }
        if item.quantity.is_empty() {
            println!("  {}", item.name);
        } else {
            println!("  {:<32} {}", item.name, dim(&item.quantity));
        }
    }
    Ok(())
}
