use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use smaipa_report::db::{self, PgSource};
use smaipa_report::models::Subject;
use smaipa_report::report::render_markdown;
use smaipa_report::source::SnapshotSource;
use smaipa_report::{ReportFilter, ReportResult, ReportService};

#[derive(Parser)]
#[command(name = "smaipa-report")]
#[command(about = "Descriptor performance reports for SMAIPA assessments", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    #[arg(long, env = "SMAIPA_MAX_CONNECTIONS", default_value_t = 5, global = true)]
    max_connections: u32,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct ScopeArgs {
    #[arg(long)]
    escola: Option<Uuid>,
    #[arg(long)]
    turma: Option<Uuid>,
    /// portugues or matematica
    #[arg(long)]
    componente: Option<Subject>,
    #[arg(long)]
    avaliacao: Option<Uuid>,
    #[arg(long)]
    aluno: Option<Uuid>,
    /// Read input from an exported JSON snapshot instead of Postgres
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

impl ScopeArgs {
    fn filter(&self) -> ReportFilter {
        ReportFilter {
            school_id: self.escola,
            class_id: self.turma,
            subject: self.componente,
            assessment_id: self.avaliacao,
            student_id: self.aluno,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Markdown,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Compute the full report
    Report {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the descriptor breakdown
    Descriptors {
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Compute one report per filter, sharing a single cache
    Batch {
        /// JSON array of filters (escolaId, turmaId, componente, avaliacaoId, alunoId)
        #[arg(long)]
        filters: PathBuf,
        /// Read input from an exported JSON snapshot instead of Postgres
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

async fn connect(cli: &Cli) -> anyhow::Result<PgPool> {
    let database_url = cli
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(cli.max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn compute_all(
    cli: &Cli,
    snapshot: Option<&Path>,
    filters: &[ReportFilter],
) -> anyhow::Result<Vec<ReportResult>> {
    match snapshot {
        Some(path) => {
            let service = ReportService::new(SnapshotSource::from_path(path).await?);
            service.compute_batch(filters).await
        }
        None => {
            let service = ReportService::new(PgSource::new(connect(cli).await?));
            service.compute_batch(filters).await
        }
    }
}

async fn compute(cli: &Cli, scope: &ScopeArgs) -> anyhow::Result<ReportResult> {
    compute_all(cli, scope.snapshot.as_deref(), &[scope.filter()])
        .await?
        .pop()
        .context("no report computed")
}

fn read_filters(path: &Path) -> anyhow::Result<Vec<ReportFilter>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("invalid filter list {}", path.display()))
}

fn emit(out: Option<&Path>, rendered: String, what: &str) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("{what} written to {}.", path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn scope_label(scope: &ScopeArgs) -> Option<String> {
    scope
        .avaliacao
        .map(|id| format!("avaliação {id}"))
        .or_else(|| scope.turma.map(|id| format!("turma {id}")))
        .or_else(|| scope.escola.map(|id| format!("escola {id}")))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match &cli.command {
        Commands::InitDb => {
            let pool = connect(&cli).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&cli).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Report { scope, format, out } => {
            let result = compute(&cli, scope).await?;
            let rendered = match format {
                OutputFormat::Json => serde_json::to_string_pretty(&result)?,
                OutputFormat::Markdown => render_markdown(&result, scope_label(scope).as_deref()),
            };
            emit(out.as_deref(), rendered, "Report")?;
        }
        Commands::Batch {
            filters,
            snapshot,
            out,
        } => {
            let filters = read_filters(filters)?;
            let results = compute_all(&cli, snapshot.as_deref(), &filters).await?;
            emit(out.as_deref(), serde_json::to_string_pretty(&results)?, "Reports")?;
        }
        Commands::Descriptors { scope } => {
            let result = compute(&cli, scope).await?;

            if result.desempenho_descritores.is_empty() {
                println!("No descriptor data for this filter.");
                return Ok(());
            }

            println!("Descriptor performance:");
            for descriptor in &result.desempenho_descritores {
                println!(
                    "- {} [{}] {:.1}% ({}/{}) {}",
                    descriptor.codigo,
                    descriptor.componente.key(),
                    descriptor.percentual,
                    descriptor.acertos,
                    descriptor.total,
                    descriptor.nome
                );
            }
            if result.diagnostico.itens_orfaos > 0 {
                println!(
                    "{} response items did not match any answer key question.",
                    result.diagnostico.itens_orfaos
                );
            }
        }
    }

    Ok(())
}
