#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::process;

use desenlace::artifact::StageArtifacts;
use desenlace::data::{FeatureRecord, load_record_batch};
use desenlace::estimate::{OutcomeDistribution, TwoStageEstimator};

#[derive(Parser)]
#[command(
    name = "desenlace",
    about = "Estimate outcome probabilities for missing-person case records",
    long_about = "Loads the two fitted stage artifacts (resolution and outcome) and composes \
                  their scores into a three-way probability distribution: case remains \
                  unresolved, found alive, found deceased."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ArtifactPaths {
    /// Path to the resolution-stage artifact (.toml)
    #[arg(long)]
    resolution: String,

    /// Path to the outcome-stage artifact (.toml)
    #[arg(long)]
    outcome: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a single case record given on the command line
    #[command(about = "Score one case record and print the distribution")]
    Infer {
        #[command(flatten)]
        artifacts: ArtifactPaths,

        /// Sex as recorded in the case file (e.g. MUJER, HOMBRE)
        #[arg(long)]
        sex: String,

        /// Province where the person was reported missing
        #[arg(long)]
        province: String,

        /// Nationality as recorded in the case file
        #[arg(long)]
        nationality: String,

        /// Ethnicity as recorded in the case file
        #[arg(long)]
        ethnicity: String,

        /// Approximate age in whole years
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        age: u8,
    },

    /// Score a CSV of case records and write a TSV of distributions
    #[command(about = "Score a batch of records (outputs: predictions.tsv)")]
    Batch {
        /// Path to CSV file with sex,province,nationality,approximate_age,ethnicity columns
        records: String,

        #[command(flatten)]
        artifacts: ArtifactPaths,

        /// Path for the TSV output
        #[arg(long, default_value = "predictions.tsv")]
        output: String,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Infer {
            artifacts,
            sex,
            province,
            nationality,
            ethnicity,
            age,
        } => infer_command(
            &artifacts,
            FeatureRecord {
                sex,
                province,
                nationality,
                ethnicity,
                approximate_age: age,
            },
        ),
        Commands::Batch {
            records,
            artifacts,
            output,
        } => batch_command(&artifacts, &records, &output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load_estimator(paths: &ArtifactPaths) -> Result<TwoStageEstimator, Box<dyn std::error::Error>> {
    let resolution = StageArtifacts::load(&paths.resolution)?;
    let outcome = StageArtifacts::load(&paths.outcome)?;
    Ok(TwoStageEstimator::new(resolution, outcome)?)
}

fn infer_command(
    paths: &ArtifactPaths,
    record: FeatureRecord,
) -> Result<(), Box<dyn std::error::Error>> {
    let estimator = load_estimator(paths)?;
    let dist = estimator.estimate(&record)?;

    println!(
        "Case: {} / {} / {} / {} / age {}",
        record.sex, record.province, record.nationality, record.ethnicity, record.approximate_age
    );
    println!();
    println!("Probability the case is resolved:      {:>7.2}%", dist.p_resolved * 100.0);
    println!("Probability of remaining missing:      {:>7.2}%", dist.p_missing * 100.0);
    println!("Probability of being found alive:      {:>7.2}%", dist.p_alive * 100.0);
    println!("Probability of being found deceased:   {:>7.2}%", dist.p_deceased * 100.0);
    println!();
    println!(
        "These probabilities are statistical estimates from historical data; they do not \
         determine the real outcome of an individual case."
    );
    Ok(())
}

fn batch_command(
    paths: &ArtifactPaths,
    records_path: &str,
    output_path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let estimator = load_estimator(paths)?;

    println!("Loading case records from: {}", records_path);
    let records = load_record_batch(records_path)?;
    println!("Loaded {} records", records.len());

    let mut distributions: Vec<OutcomeDistribution> = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        let dist = estimator
            .estimate(record)
            .map_err(|e| format!("row {}: {}", i + 1, e))?;
        distributions.push(dist);
    }

    let mut writer = BufWriter::new(File::create(output_path)?);
    writeln!(
        writer,
        "p_missing\tp_alive\tp_deceased\tp_resolved\tp_alive_given_resolved"
    )?;
    for dist in &distributions {
        writeln!(
            writer,
            "{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}",
            dist.p_missing, dist.p_alive, dist.p_deceased, dist.p_resolved, dist.p_alive_given_resolved
        )?;
    }
    writer.flush()?;

    println!("Wrote {} predictions to: {}", distributions.len(), output_path);
    Ok(())
}
