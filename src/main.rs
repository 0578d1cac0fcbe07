use clap::{Arg, Command};
use eserv_courier::pipeline::{Pipeline, UploadStatus};
use eserv_courier::remote::{FsCatalog, FsUploader};
use eserv_courier::transport::ReqwestTransport;
use eserv_courier::Config;
use log::LevelFilter;
use std::process;

#[tokio::main]
async fn main() {
    let matches = Command::new("eserv-courier")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Routes court e-filing notifications into a document store")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("eserv-courier.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Test configuration validity")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("process")
                .long("process")
                .value_name("FILE")
                .help("Process a saved notification email (HTML file)")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("match-case")
                .long("match-case")
                .value_name("CASE NAME")
                .help("Dry-run folder resolution for a case name")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        match Config::default().to_file(generate_path) {
            Ok(()) => {
                println!("Generated default configuration at {generate_path}");
                return;
            }
            Err(e) => {
                eprintln!("Failed to generate configuration: {e}");
                process::exit(1);
            }
        }
    }

    let config_path = matches.get_one::<String>("config").unwrap();
    let config = match Config::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("could not load {config_path} ({e}), using built-in defaults");
            Config::default()
        }
    };

    if matches.get_flag("test-config") {
        println!("Configuration OK:");
        println!("  verification email: {}", config.verification_email);
        println!("  minimum match score: {}", config.min_match_score);
        println!("  cache TTL: {}h", config.cache_ttl_hours);
        println!("  service dir: {}", config.service_dir.display());
        println!(
            "  manual review folder: {}",
            config.manual_review_folder
        );
        return;
    }

    let transport = match ReqwestTransport::new(config.http_timeout_seconds) {
        Ok(transport) => transport,
        Err(e) => {
            eprintln!("Failed to build HTTP client: {e}");
            process::exit(1);
        }
    };
    let catalog = Box::new(FsCatalog::new(config.remote_mirror_dir.clone()));
    let uploader = Box::new(FsUploader::new(config.remote_mirror_dir.clone()));
    let pipeline = match Pipeline::new(config, transport, catalog, uploader) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("Failed to initialize pipeline: {e}");
            process::exit(1);
        }
    };

    if let Some(case_name) = matches.get_one::<String>("match-case") {
        match pipeline.resolve_case(case_name).await {
            Ok(Some(found)) => {
                println!(
                    "Matched '{}' -> {} (score {:.1}, via '{}')",
                    case_name, found.folder_path, found.score, found.matched_on
                );
            }
            Ok(None) => println!("No folder match for '{case_name}' (manual review)"),
            Err(e) => {
                eprintln!("Folder resolution failed: {e}");
                process::exit(1);
            }
        }
        return;
    }

    if let Some(email_path) = matches.get_one::<String>("process") {
        let html = match std::fs::read_to_string(email_path) {
            Ok(html) => html,
            Err(e) => {
                eprintln!("Failed to read {email_path}: {e}");
                process::exit(1);
            }
        };

        let result = pipeline.process(&html).await;
        match result.status {
            UploadStatus::Success => {
                println!(
                    "Uploaded {} file(s) to {}",
                    result.uploaded_files.len(),
                    result.folder_path.as_deref().unwrap_or("?")
                );
            }
            UploadStatus::ManualReview => {
                println!(
                    "No folder match; {} file(s) sent to manual review",
                    result.uploaded_files.len()
                );
            }
            UploadStatus::NoWork => println!("Nothing to do"),
            UploadStatus::Error => {
                eprintln!(
                    "Processing failed: {}",
                    result.error.as_deref().unwrap_or("unknown error")
                );
                process::exit(1);
            }
        }
        return;
    }

    eprintln!("Nothing to do: pass --process, --match-case, or --test-config");
    process::exit(2);
}
