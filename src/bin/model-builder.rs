use clap::{Arg, ArgAction, ArgMatches, Command};
use model_builder::document::sentinel_filter;
use model_builder::store::{read_json_documents, DocumentStore};
use model_builder::{
    init_logging, BuildRequest, BuilderConfig, BuilderService, ClassifierSuite, Error,
    EvaluationSource, JobState, LocalEngine, MemoryStore, Result, TransformRegistry,
    VectorAssembler, METRICS,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Model Builder CLI
///
/// Imports a train and a test dataset, trains the requested classifier
/// variants on them and prints every job's metadata record.

const TRANSFORM_NAME: &str = "vector-assembler";

#[tokio::main]
async fn main() {
    let matches = create_cli().get_matches();

    match run(matches).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn create_cli() -> Command {
    Command::new("model-builder")
        .about("Train classifier variants on a train/test dataset pair")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("train")
                .help("JSON array of training rows")
                .long("train")
                .required(true),
        )
        .arg(
            Arg::new("test")
                .help("JSON array of rows to predict")
                .long("test")
                .required(true),
        )
        .arg(
            Arg::new("train-name")
                .help("Collection name for the training dataset")
                .long("train-name")
                .default_value("train"),
        )
        .arg(
            Arg::new("test-name")
                .help("Collection name for the test dataset")
                .long("test-name")
                .default_value("test"),
        )
        .arg(
            Arg::new("variants")
                .help("Comma separated classifier tags")
                .short('v')
                .long("variants")
                .default_value("LR,DT,RF,GB,NB"),
        )
        .arg(
            Arg::new("label")
                .help("Label column")
                .long("label")
                .default_value("label"),
        )
        .arg(
            Arg::new("holdout")
                .help("Hold out every n-th training row for evaluation")
                .long("holdout")
                .value_parser(clap::value_parser!(usize))
                .conflicts_with("evaluate-on-test"),
        )
        .arg(
            Arg::new("evaluate-on-test")
                .help("Evaluate on the labelled test dataset")
                .long("evaluate-on-test")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .help("JSON configuration file")
                .short('c')
                .long("config"),
        )
        .arg(
            Arg::new("workers")
                .help("Variants allowed to train at once")
                .short('w')
                .long("workers")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("log-level")
                .help("Log level")
                .long("log-level")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("json")
                .help("Emit logs as JSON")
                .long("json")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("output-dir")
                .help("Export every output collection to this directory")
                .short('o')
                .long("output-dir"),
        )
        .arg(
            Arg::new("metrics")
                .help("Print Prometheus metrics after the run")
                .long("metrics")
                .action(ArgAction::SetTrue),
        )
}

fn load_config(matches: &ArgMatches) -> Result<BuilderConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => BuilderConfig::from_file(Path::new(path))?,
        None => BuilderConfig::default(),
    }
    .from_env()?;

    if let Some(workers) = matches.get_one::<usize>("workers") {
        config.worker_threads = *workers;
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.log_level = level.clone();
    }
    if matches.get_flag("json") {
        config.log_json = true;
    }
    config.validate()?;
    Ok(config)
}

fn assembler(matches: &ArgMatches) -> VectorAssembler {
    let label = matches
        .get_one::<String>("label")
        .cloned()
        .unwrap_or_else(|| "label".to_string());
    let evaluation = if matches.get_flag("evaluate-on-test") {
        EvaluationSource::Testing
    } else if let Some(every) = matches.get_one::<usize>("holdout") {
        EvaluationSource::Holdout { every: *every }
    } else {
        EvaluationSource::None
    };
    VectorAssembler::new(TRANSFORM_NAME, label).with_evaluation(evaluation)
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a String> {
    matches
        .get_one::<String>(name)
        .ok_or_else(|| Error::Config(format!("missing --{}", name)))
}

async fn run(matches: ArgMatches) -> Result<bool> {
    let config = load_config(&matches)?;
    let level = model_builder::logging::parse_level(&config.log_level)
        .ok_or_else(|| Error::Config(format!("Unknown log level {}", config.log_level)))?;
    init_logging(level, config.log_json);

    let train_name = required(&matches, "train-name")?.clone();
    let test_name = required(&matches, "test-name")?.clone();

    let store = Arc::new(MemoryStore::new());
    let train_rows = read_json_documents(Path::new(required(&matches, "train")?))?;
    let test_rows = read_json_documents(Path::new(required(&matches, "test")?))?;
    store.import_dataset(&train_name, train_rows)?;
    store.import_dataset(&test_name, test_rows)?;

    let transforms = Arc::new(TransformRegistry::new());
    transforms.register(Arc::new(assembler(&matches)))?;
    let engine = Arc::new(LocalEngine::new(store.clone(), ClassifierSuite::default()));
    let service = BuilderService::new(config, store.clone(), engine, transforms)?;

    let variants = required(&matches, "variants")?
        .split(',')
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect();
    let accepted = service
        .submit(BuildRequest {
            variants,
            train_dataset_name: train_name,
            test_dataset_name: test_name,
            transform: TRANSFORM_NAME.to_string(),
        })
        .await?;
    service.shutdown().await?;

    let mut all_finished = true;
    let mut reports = Vec::with_capacity(accepted.jobs.len());
    for job in &accepted.jobs {
        let state = service.job_status(&job.output_name).await?;
        all_finished &= state == JobState::Finished;
        let metadata = store.find_one(&job.output_name, &sentinel_filter()).await?;
        reports.push(serde_json::json!({
            "outputName": job.output_name,
            "resultUri": job.result_uri,
            "status": state,
            "metadata": metadata,
        }));
    }
    println!("{}", serde_json::to_string_pretty(&reports)?);

    if let Some(dir) = matches.get_one::<String>("output-dir") {
        let dir = PathBuf::from(dir);
        std::fs::create_dir_all(&dir)?;
        for job in &accepted.jobs {
            let path = dir.join(format!("{}.json", job.output_name));
            let rows = store.export_json_file(&job.output_name, &path)?;
            eprintln!("Exported {} documents to {}", rows, path.display());
        }
    }

    if matches.get_flag("metrics") {
        println!("{}", METRICS.read().export()?);
    }

    Ok(all_finished)
}
