//! quantlab CLI
//!
//! Serve the HTTP API, or run one-off analyses against a local file.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::data::{load_path, Dataset};
use crate::stats::{self, CorrelationMethod};
use crate::training::{self, FitRequest, FitResult, DEFAULT_TEST_SPLIT};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString { s.truecolor(100, 210, 120) }

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |x| format!("{:.4}", x))
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "quantlab")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tabular analysis backend: statistics, correlations, models and finance")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server (default)
    Serve {
        /// Bind address, overrides API_HOST
        #[arg(long)]
        host: Option<String>,

        /// Port, overrides API_PORT
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show shape and column kinds of a file
    Info {
        /// CSV or spreadsheet file
        file: PathBuf,
    },

    /// Descriptive statistics
    Stats {
        file: PathBuf,

        /// Comma-separated columns (default: all)
        #[arg(short, long, value_delimiter = ',')]
        columns: Option<Vec<String>>,
    },

    /// Pairwise correlation of numeric columns
    Correlate {
        file: PathBuf,

        /// Comma-separated numeric columns (default: all numeric)
        #[arg(short, long, value_delimiter = ',')]
        columns: Option<Vec<String>>,

        /// pearson, spearman or kendall
        #[arg(short, long, default_value = "pearson")]
        method: String,
    },

    /// Fit a classifier or clustering model
    Fit {
        file: PathBuf,

        /// Comma-separated feature columns
        #[arg(short, long, value_delimiter = ',', required = true)]
        x: Vec<String>,

        /// Target column (supervised models)
        #[arg(short, long)]
        y: Option<String>,

        /// Model identifier, e.g. random_forest or kmeans
        #[arg(short, long)]
        model: String,

        /// Model parameters as a JSON object
        #[arg(long)]
        params: Option<String>,

        /// Held-out fraction for supervised models
        #[arg(long, default_value_t = DEFAULT_TEST_SPLIT)]
        test_split: f64,
    },
}

fn load(file: &Path) -> anyhow::Result<Dataset> {
    step_run(&format!("Loading {}", file.display()));
    let start = Instant::now();
    let dataset = load_path(file)?;
    step_done(&format!(
        "{} rows × {} columns in {:.0?}",
        dataset.height(),
        dataset.width(),
        start.elapsed()
    ));
    Ok(dataset)
}

// ─── Info ──────────────────────────────────────────────────────────────────────

pub fn cmd_info(file: &Path) -> anyhow::Result<()> {
    section("Data Info");
    let dataset = load(file)?;
    println!();
    println!("  {:<12} {}", muted("File"), file.display());
    println!("  {:<12} {}", muted("Rows"), dataset.height());
    println!("  {:<12} {}", muted("Columns"), dataset.width());
    println!();
    println!("  {:<24} {:<12}", muted("Column"), muted("Kind"));
    println!("  {}", dim(&"─".repeat(40)));
    for (name, kind) in dataset.headers().iter().zip(dataset.kinds()) {
        println!("  {:<24} {}", name, kind.as_str().truecolor(140, 140, 140));
    }
    println!();
    Ok(())
}

// ─── Stats ─────────────────────────────────────────────────────────────────────

pub fn cmd_stats(file: &Path, columns: Option<&[String]>) -> anyhow::Result<()> {
    section("Statistics");
    let dataset = load(file)?;
    let summary = stats::summarize(&dataset, columns)?;

    if !summary.numeric_stats.is_empty() {
        println!();
        println!(
            "  {:<16} {:>7} {:>6} {:>11} {:>11} {:>11} {:>11}",
            muted("Column"), muted("Count"), muted("Nulls"), muted("Mean"), muted("Std"), muted("Min"), muted("Max")
        );
        println!("  {}", dim(&"─".repeat(80)));
        for (name, s) in &summary.numeric_stats {
            println!(
                "  {:<16} {:>7} {:>6} {:>11} {:>11} {:>11} {:>11}",
                name, s.count, s.null_count, fmt_opt(s.mean), fmt_opt(s.std), fmt_opt(s.min), fmt_opt(s.max)
            );
        }
    }

    if !summary.categorical_stats.is_empty() {
        println!();
        println!(
            "  {:<16} {:<12} {:>7} {:>9} {:<20}",
            muted("Column"), muted("Kind"), muted("Count"), muted("Distinct"), muted("Most frequent")
        );
        println!("  {}", dim(&"─".repeat(70)));
        for (name, s) in &summary.categorical_stats {
            println!(
                "  {:<16} {:<12} {:>7} {:>9} {:<20}",
                name,
                s.kind.as_str(),
                s.count,
                s.distinct_count,
                s.most_frequent.as_deref().unwrap_or("-")
            );
        }
    }
    println!();
    Ok(())
}

// ─── Correlate ─────────────────────────────────────────────────────────────────

pub fn cmd_correlate(file: &Path, columns: Option<&[String]>, method: &str) -> anyhow::Result<()> {
    let method: CorrelationMethod = method.parse()?;
    section(&format!("Correlation ({:?})", method).to_lowercase());
    let dataset = load(file)?;
    let result = stats::correlate(&dataset, columns, method)?;

    println!();
    println!(
        "  {:<16} {:<16} {:>9} {:>6}  {}",
        muted("Column A"), muted("Column B"), muted("r"), muted("n"), muted("Strength")
    );
    println!("  {}", dim(&"─".repeat(64)));
    for pair in &result.pairs {
        println!(
            "  {:<16} {:<16} {:>9} {:>6}  {}",
            pair.column_a,
            pair.column_b,
            fmt_opt(pair.correlation),
            pair.observations,
            pair.strength.unwrap_or("undefined")
        );
    }
    println!();
    Ok(())
}

// ─── Fit ───────────────────────────────────────────────────────────────────────

pub fn cmd_fit(
    file: &Path,
    x: Vec<String>,
    y: Option<String>,
    model: &str,
    params: Option<&str>,
    test_split: f64,
) -> anyhow::Result<()> {
    section("Model Fit");
    let dataset = load(file)?;

    let mut request = FitRequest::new(x, y, model).with_test_split(test_split);
    if let Some(raw) = params {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| anyhow::anyhow!("--params is not valid JSON: {}", e))?;
        request = request.with_params(value);
    }

    step_run(&format!("Fitting {}", model));
    let result = training::fit(&dataset, &request)?;
    match &result {
        FitResult::Supervised(fit) => {
            step_done(&format!("{} ms", fit.training_time_ms));
            println!();
            println!("  {:<16} {}", muted("Train / test"), format!("{} / {}", fit.train_size, fit.test_size));
            println!("  {:<16} {}", muted("Classes"), fit.classes.len());
            println!("  {:<16} {}", muted("Accuracy"), format!("{:.4}", fit.metrics.accuracy).white().bold());
            println!("  {:<16} {:.4}", muted("Precision"), fit.metrics.precision);
            println!("  {:<16} {:.4}", muted("Recall"), fit.metrics.recall);
            println!("  {:<16} {:.4}", muted("F1"), fit.metrics.f1);
            if let Some(importance) = &fit.feature_importance {
                println!();
                println!("  {:<24} {:>10}", muted("Feature"), muted("Importance"));
                println!("  {}", dim(&"─".repeat(36)));
                for fi in importance {
                    println!("  {:<24} {:>10.4}", fi.feature, fi.importance);
                }
            }
            for warning in &fit.warnings {
                println!("  {} {}", "!".yellow(), warning);
            }
        }
        FitResult::Clustering(fit) => {
            step_done(&format!("{} ms", fit.training_time_ms));
            println!();
            println!("  {:<16} {}", muted("Samples"), fit.n_samples);
            println!("  {:<16} {}", muted("Clusters"), fit.n_clusters.to_string().white().bold());
            if let Some(inertia) = fit.inertia {
                println!("  {:<16} {:.4}", muted("Inertia"), inertia);
            }
            if let Some(noise) = fit.noise_points {
                println!("  {:<16} {}", muted("Noise points"), noise);
            }
            for (label, size) in &fit.cluster_sizes {
                println!("  {:<16} {}", muted(&format!("Cluster {}", label)), size);
            }
            for warning in &fit.warnings {
                println!("  {} {}", "!".yellow(), warning);
            }
        }
    }
    println!();
    Ok(())
}

// ─── Serve ─────────────────────────────────────────────────────────────────────

pub async fn cmd_serve(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    use crate::server::{run_server, ServerConfig};

    let mut config = ServerConfig::from_env();
    if let Some(host) = host {
        config = config.with_host(host);
    }
    if let Some(port) = port {
        config = config.with_port(port);
    }

    section(&format!("quantlab v{}", env!("CARGO_PKG_VERSION")));
    println!("  {:<8} http://{}:{}/api", muted("API"), config.host, config.port);
    println!("  {:<8} http://{}:{}/api/health", muted("Health"), config.host, config.port);
    println!("  {}", dim("ctrl+c to stop"));
    println!();

    run_server(config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fit_command() {
        let cli = Cli::try_parse_from([
            "quantlab", "fit", "data.csv", "--x", "a,b", "--y", "label", "--model", "decision_tree",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Fit { x, y, model, test_split, .. }) => {
                assert_eq!(x, vec!["a", "b"]);
                assert_eq!(y.as_deref(), Some("label"));
                assert_eq!(model, "decision_tree");
                assert_eq!(test_split, 0.2);
            }
            _ => panic!("expected fit command"),
        }
    }

    #[test]
    fn test_no_subcommand_defaults_to_none() {
        let cli = Cli::try_parse_from(["quantlab"]).unwrap();
        assert!(cli.command.is_none());
    }
}
