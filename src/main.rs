use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use robinhood_analyzer::export::{
    write_details_csv, write_municipalities_csv, write_workbook, DETAILS_FILE, MUNICIPALITIES_FILE, WORKBOOK_FILE,
};
use robinhood_analyzer::{plottable, Advisor, Config, Pipeline, PipelineOutput};
use std::fs;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr; stdout carries the report
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "robinhood_analyzer=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Parse command line arguments
    let matches = Command::new("robinhood-analyzer")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Ranks municipalities by confiscated properties versus available social services")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml")
                .global(true),
        )
        .subcommand(
            Command::new("advise")
                .about("Suggest social reuses for a single property")
                .arg(Arg::new("type").value_name("TYPE").required(true).help("Property type, e.g. \"Appartamento\""))
                .arg(Arg::new("size").value_name("SIZE").default_value("0").help("Size in square metres")),
        )
        .get_matches();

    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.toml");

    match matches.subcommand() {
        Some(("advise", args)) => advise(config_file, args),
        _ => run(config_file).await,
    }
}

fn advise(config_file: &str, args: &ArgMatches) -> Result<()> {
    // The advisor only needs the threshold, so a missing config is not an error
    let threshold = if Path::new(config_file).exists() {
        Config::load_from_file(config_file)?.residential_size_threshold
    } else {
        Config::default().residential_size_threshold
    };
    let property_type = args.get_one::<String>("type").map(String::as_str).unwrap_or("");
    let size = args.get_one::<String>("size").map(String::as_str).unwrap_or("0");

    let advisor = Advisor::new(threshold);
    println!("🤖 {} ({}): {:?}", property_type, size, advisor.classify(property_type));
    for (i, suggestion) in advisor.suggest(property_type, size).iter().enumerate() {
        println!("   {}. {}", i + 1, suggestion);
    }
    Ok(())
}

async fn run(config_file: &str) -> Result<()> {
    // Load or create configuration
    let config = if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)?
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        Config::default().save_to_file(config_file)?;
        println!("⚠️  Please review {} (data sources, province), then run the program again.", config_file);
        return Ok(());
    };

    // Create output directory if it doesn't exist
    let output_dir = config.output_directory.as_deref().unwrap_or("output");
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir))?;

    // Show where the data comes from
    println!("🌐 Social services: {}", config.services_source);
    println!("🔒 Confiscated properties: {}", config.properties_source);
    match &config.province_filter {
        Some(province) => println!("🎯 Province: {}", province),
        None => println!("🎯 Province: ALL"),
    }

    // Load both datasets, aggregate and score; any load failure aborts here
    let pipeline = Pipeline::from_config(&config)?;
    let output = pipeline.run().await.context("Pipeline aborted, nothing was exported")?;

    // Export the ranked municipalities and the per-property detail view
    write_municipalities_csv(&output.municipalities, Path::new(output_dir))?;
    write_details_csv(&output.details, Path::new(output_dir))?;
    write_workbook(&output.details, &output.municipalities, Path::new(output_dir))?;

    // Print summary
    print_summary(&output);

    println!("\n✅ Analysis complete!");
    println!("📂 {}/{}", output_dir, MUNICIPALITIES_FILE);
    println!("📂 {}/{}", output_dir, DETAILS_FILE);
    println!("📂 {}/{}", output_dir, WORKBOOK_FILE);
    Ok(())
}

fn print_summary(output: &PipelineOutput) {
    let summary = output.summary();

    println!("\n📊 SUMMARY");
    println!("==========\n");
    println!("🏛️  Confiscated properties: {}", summary.total_assets);
    println!("🤝 Social services monitored: {}", summary.total_services);
    if let (Some(city), Some(score)) = (&summary.top_city, summary.top_score) {
        println!("🚨 Most urgent municipality: {} (score {:.1})", city, score);
    }

    println!("\n🏆 Top 3 municipalities by opportunity:");
    for (i, municipality) in output.municipalities.iter().take(3).enumerate() {
        println!(
            "   {}. {:<20} score {:>6.1}  properties {:>3}  services {:>3}",
            i + 1,
            municipality.city_key,
            municipality.score,
            municipality.num_beni,
            municipality.num_servizi
        );
    }

    // Municipalities without coordinates are left off the map
    let on_map = plottable(&output.municipalities).count();
    let unresolved = output.municipalities.len() - on_map;
    println!("\n📍 Municipalities on map: {} ({} without coordinates)", on_map, unresolved);

    if output.properties_skipped > 0 || output.services_skipped > 0 {
        println!(
            "⚠️  Skipped malformed rows: {} properties, {} services",
            output.properties_skipped, output.services_skipped
        );
    }
}
