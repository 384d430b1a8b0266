mod config;
mod db;
mod error;
mod model;
mod output;
mod parser;
mod pipeline;
mod resolve;
mod seed;
mod source;
mod utils;
mod validate;

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Settings;
use crate::model::EntityKind;
use crate::parser::rules::Rules;
use crate::pipeline::Run;
use crate::source::FileSource;

#[derive(Parser)]
#[command(name = "rulebook_extract", about = "Rulebook text to validated game-data seeds")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write entities, seeds, report and audit
    Extract {
        /// Rulebook document (.txt, .md or .docx)
        input: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = "out")]
        out: PathBuf,
        /// Settings file overriding the built-in defaults
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Extra catalog entries (JSON array) for reference resolution
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Exit non-zero when validation reports errors
        #[arg(long)]
        strict: bool,
    },
    /// Print the normalized document with page hints
    Dump {
        input: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Load seed scripts into a SQLite database
    Apply {
        /// Directory holding the <kind>_seed.sql scripts
        #[arg(default_value = "out/seeds")]
        seeds_dir: PathBuf,
        #[arg(long, default_value = db::DEFAULT_DB_PATH)]
        db: PathBuf,
    },
    /// Row count of every core table
    Stats {
        #[arg(long, default_value = db::DEFAULT_DB_PATH)]
        db: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Extract {
            input,
            out,
            config,
            catalog,
            strict,
        } => extract(&input, &out, config.as_deref(), catalog.as_deref(), strict),
        Commands::Dump { input, config } => {
            let settings = Settings::load(config.as_deref())?;
            let rules = Rules::compile(&settings)?;
            let doc = pipeline::load_document(&FileSource, &input, &rules)?;
            for (idx, line) in doc.lines.iter().enumerate() {
                let page = doc.page(idx).map(|p| p.to_string()).unwrap_or_else(|| "-".into());
                println!("{:>4} | {}", page, line);
            }
            for fix in &doc.fixes {
                eprintln!("fix {:?} -> {:?}: {}", fix.from, fix.to, fix.count);
            }
            Ok(())
        }
        Commands::Apply { seeds_dir, db } => {
            let conn = db::connect(&db)?;
            db::init_schema(&conn)?;
            let applied = db::apply_seeds(&conn, &seeds_dir)?;
            println!("Applied {} seed scripts to {}", applied, db.display());
            Ok(())
        }
        Commands::Stats { db } => {
            let conn = db::connect(&db)?;
            db::init_schema(&conn)?;
            for (table, rows) in db::table_counts(&conn)? {
                println!("{:<18} {:>6}", table, rows);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn extract(
    input: &Path,
    out: &Path,
    config: Option<&Path>,
    catalog: Option<&Path>,
    strict: bool,
) -> anyhow::Result<()> {
    let settings = Settings::load(config)?;

    let pb = ProgressBar::new(EntityKind::ALL.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );
    let run = pipeline::run(&FileSource, input, &settings, catalog, |_| pb.inc(1));
    pb.finish_and_clear();
    let run = run?;

    run.write(out)?;
    ExtractCounts::from(&run).print();
    println!("Output written to {}", out.display());

    if strict && !run.report.valid {
        anyhow::bail!("validation reported {} errors", run.report.errors.len());
    }
    Ok(())
}

struct ExtractCounts {
    lines: usize,
    fixes: usize,
    per_kind: Vec<(EntityKind, usize)>,
    failures: usize,
    catalog: usize,
    emitted: usize,
    blocked: usize,
    errors: usize,
    warnings: usize,
    references: usize,
    unresolved: usize,
    audited: usize,
}

impl From<&Run> for ExtractCounts {
    fn from(run: &Run) -> Self {
        let stats = &run.report.stats;
        ExtractCounts {
            lines: run.lines,
            fixes: run.fixes.iter().map(|f| f.count).sum(),
            per_kind: EntityKind::ALL.iter().map(|&k| (k, run.count(k))).collect(),
            failures: run.failures.len(),
            catalog: run.catalog_size,
            emitted: run.emitted(),
            blocked: run.report.blocked.len(),
            errors: run.report.errors.len(),
            warnings: run.report.warnings.len(),
            references: stats.total_references,
            unresolved: stats.invalid_references,
            audited: run.audit.len(),
        }
    }
}

impl ExtractCounts {
    fn print(&self) {
        println!("Normalized {} lines ({} encoding fixes).", self.lines, self.fixes);
        let kinds: Vec<String> = self
            .per_kind
            .iter()
            .map(|(kind, n)| format!("{} {}", n, kind))
            .collect();
        println!("Extracted {} ({} unparsable blocks).", kinds.join(", "), self.failures);
        println!(
            "Resolved {}/{} references against {} catalog entries ({} audited).",
            self.references - self.unresolved,
            self.references,
            self.catalog,
            self.audited,
        );
        println!(
            "Emitted {} records, {} blocked. {} errors, {} warnings.",
            self.emitted, self.blocked, self.errors, self.warnings,
        );
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
