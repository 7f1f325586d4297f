//main.rs
use std::fs::File;
use std::io::{self, Write};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use log::info;
use mall_segments::server::{self, ServerConfig};
use mall_segments::{
    optimal_k, segment, Algorithm, Dataset, ModelSettings, OptimalKConfig, RecommendRule,
    SegmentationStore,
};

#[derive(Parser)]
#[clap(
    version,
    author = "Stefan L. <stefan.lang@med.lu.se>",
    about = "Mall customer segmentation with K-means"
)]
struct Opts {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the JSON API
    Serve {
        #[clap(long, env = "SEGMENTS_HOST", default_value = "127.0.0.1")]
        host: String,

        #[clap(short, long, env = "SEGMENTS_PORT", default_value_t = 5000)]
        port: u16,
    },
    /// Cluster a CSV file and write the segmentation result as JSON
    Run {
        #[clap(short, long)]
        file: String,

        #[clap(flatten)]
        model: ModelOpts,

        /// JSON output path; stdout when omitted
        #[clap(short, long)]
        outfile: Option<String>,
    },
    /// Elbow and silhouette search over a K range
    OptimalK {
        #[clap(short, long)]
        file: String,

        #[clap(long, default_value_t = 2)]
        min_k: usize,

        #[clap(long, default_value_t = 10)]
        max_k: usize,

        #[clap(long, value_enum, default_value = "silhouette")]
        rule: RuleOpt,
    },
    /// Cluster a CSV file and write customers with their cluster ids
    Export {
        #[clap(short, long)]
        file: String,

        #[clap(flatten)]
        model: ModelOpts,

        #[clap(short, long)]
        outfile: String,
    },
}

#[derive(Args)]
struct ModelOpts {
    #[clap(short, long, default_value_t = 5)]
    k: usize,

    #[clap(long, default_value_t = 300)]
    max_iterations: usize,

    #[clap(long, default_value = "auto")]
    algorithm: String,

    #[clap(long, default_value_t = 42)]
    random_state: u64,

    /// Cluster on raw values instead of standardized ones
    #[clap(long)]
    no_normalize: bool,

    #[clap(long, value_delimiter = ',', default_value = "annual_income,spending_score")]
    features: Vec<String>,
}

impl ModelOpts {
    fn settings(&self) -> anyhow::Result<ModelSettings> {
        Ok(ModelSettings {
            clusters: self.k,
            max_iterations: self.max_iterations,
            algorithm: self.algorithm.parse::<Algorithm>()?,
            random_state: self.random_state,
            normalize: !self.no_normalize,
            features: self.features.clone(),
        })
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum RuleOpt {
    Silhouette,
    Elbow,
    Mean,
}

impl From<RuleOpt> for RecommendRule {
    fn from(rule: RuleOpt) -> Self {
        match rule {
            RuleOpt::Silhouette => RecommendRule::Silhouette,
            RuleOpt::Elbow => RecommendRule::Elbow,
            RuleOpt::Mean => RecommendRule::Mean,
        }
    }
}

fn writer(path: Option<&str>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match path {
        Some(p) => Box::new(File::create(p)?),
        None => Box::new(io::stdout()),
    })
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opts = Opts::parse();

    match opts.command {
        Command::Serve { host, port } => {
            let runtime = tokio::runtime::Runtime::new()?;
            let config = ServerConfig { host, port };
            runtime.block_on(server::serve(&config, Arc::new(SegmentationStore::new())))?;
        }
        Command::Run { file, model, outfile } => {
            let ds = Dataset::from_csv_path(&file)?;
            let result = segment(&ds, &model.settings()?)?;
            info!(
                "Assigned {} customers into {} clusters",
                result.customers.len(),
                result.model_info.k
            );
            let mut out = writer(outfile.as_deref())?;
            serde_json::to_writer_pretty(&mut out, &result)?;
            writeln!(out)?;
        }
        Command::OptimalK { file, min_k, max_k, rule } => {
            let ds = Dataset::from_csv_path(&file)?;
            let config = OptimalKConfig {
                min_k,
                max_k,
                rule: rule.into(),
                ..Default::default()
            };
            let report = optimal_k::search(&ds, &config)?;
            serde_json::to_writer_pretty(io::stdout(), &report)?;
            println!();
        }
        Command::Export { file, model, outfile } => {
            let ds = Dataset::from_csv_path(&file)?;
            let result = segment(&ds, &model.settings()?)?;
            result.write_csv(File::create(&outfile)?)?;
            info!("Wrote {} customers to {}", ds.len(), outfile);
        }
    }

    Ok(())
}
