use std::path::PathBuf;
use std::time::Instant;

use anyhow::anyhow;
use clap::Parser as ClapParser;
use indexmap::IndexSet;
use sqlineage::{
    config::LineageConfig,
    frontend::{Dialect, SqlParserFrontEnd},
    lineage::{Catalog, CatalogIndex, LineageLevel, ScriptLineage, Table},
};

#[derive(clap::Parser)]
#[command(name = "sqlineage")]
#[command(about = "SQL table and column lineage extractor", long_about = None)]
struct Cli {
    /// Path to the SQL file to analyze.
    #[arg(value_name = "SQL_FILE", required_unless_present = "sql")]
    file: Option<PathBuf>,
    /// SQL text to analyze, instead of a file.
    #[arg(short = 'e', long, conflicts_with = "file")]
    sql: Option<String>,
    /// SQL dialect used to parse the input (overrides the config file).
    #[arg(short, long)]
    dialect: Option<Dialect>,
    /// Lineage level to report: `table` or `column`.
    #[arg(short, long, default_value_t = LineageLevel::Table)]
    level: LineageLevel,
    /// Path to a JSON file containing schema objects.
    #[arg(long)]
    catalog: Option<PathBuf>,
    /// Path to a TOML lineage config file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output the lineage as JSON.
    #[arg(long)]
    json: bool,
    /// Pretty-print the JSON output.
    #[arg(long, requires = "json")]
    pretty: bool,
}

fn read_sql(cli: &Cli) -> anyhow::Result<String> {
    match (&cli.sql, &cli.file) {
        (Some(sql), _) => Ok(sql.clone()),
        (None, Some(file)) => std::fs::read_to_string(file)
            .map_err(|_| anyhow!("Failed to read sql file {}", file.display())),
        (None, None) => Err(anyhow!("Either a SQL file or `--sql` must be given.")),
    }
}

fn read_catalog(cli: &Cli, config: &LineageConfig) -> anyhow::Result<CatalogIndex> {
    let Some(path) = &cli.catalog else {
        return Ok(CatalogIndex::default());
    };
    let content = std::fs::read_to_string(path)
        .map_err(|_| anyhow!("Failed to read catalog file: {}", path.display()))?;
    let catalog = Catalog::from_json_str(&content)
        .map_err(|err| anyhow!("Invalid catalog in file {}: {}", path.display(), err))?;
    catalog.index(config.case_insensitive)
}

fn print_summary(lineage: &ScriptLineage, level: LineageLevel) {
    let print_tables = |title: &str, tables: Vec<String>| {
        println!("{}:", title);
        for table in tables {
            println!("    {}", table);
        }
    };
    let names = |tables: IndexSet<Table>| -> Vec<String> {
        tables.iter().map(ToString::to_string).collect()
    };

    println!("Statements(#): {}", lineage.reports().len());
    print_tables("Source Tables", names(lineage.source_tables()));
    print_tables("Target Tables", names(lineage.target_tables()));
    print_tables("Intermediate Tables", names(lineage.intermediate_tables()));

    if level == LineageLevel::Column {
        println!("Column Lineage:");
        for path in lineage.column_paths() {
            let path: Vec<String> = path.iter().rev().map(ToString::to_string).collect();
            println!("    {}", path.join(" <- "));
        }
    }

    for report in lineage.reports() {
        if let Some(err) = &report.error {
            eprintln!("Statement {} failed: {}", report.index, err);
        }
        for warning in &report.warnings {
            eprintln!("Statement {}: {}", report.index, warning);
        }
    }
}

fn main() -> anyhow::Result<()> {
    let now = Instant::now();

    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => LineageConfig::from_file(path)?,
        None => LineageConfig::default(),
    };
    if let Some(dialect) = cli.dialect {
        config.dialect = dialect;
    }

    let sql = read_sql(&cli)?;
    let catalog = read_catalog(&cli, &config)?;
    let front_end = SqlParserFrontEnd::from_config(&config);
    let lineage = ScriptLineage::from_sql(&sql, &front_end, &catalog, &config);

    if cli.json {
        let report = lineage.report(cli.level);
        let out_str = if cli.pretty {
            serde_json::to_string_pretty(&report)?
        } else {
            serde_json::to_string(&report)?
        };
        println!("{}", out_str);
    } else {
        print_summary(&lineage, cli.level);
    }

    let elapsed = now.elapsed();
    log::info!("Elapsed: {:.2?}", elapsed);

    let failed = lineage.failures().count();
    if failed > 0 && failed == lineage.reports().len() {
        return Err(anyhow!(
            "Could not extract lineage from any of the {} statement(s).",
            failed
        ));
    }
    Ok(())
}
