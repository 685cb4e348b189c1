//! Telegram capture decoder
//! Replays a recorded P1 capture and prints each reading as JSON

use p1_meter::{
    logging, JsonLinesSink, MeterConfig, MeterService, ReplaySource, TelegramFramer,
};
use std::env;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <capture.txt> [dialect]", args[0]);
        eprintln!("\nExamples:");
        eprintln!("  {} p1_dump.txt           # Detect dialect per telegram", args[0]);
        eprintln!("  {} p1_dump.txt kaifa     # Force the Kaifa layout", args[0]);
        eprintln!("\nAvailable dialects:");
        for dialect in p1_meter::list_dialects() {
            eprintln!("  {:<12} {}", dialect.name, dialect.description);
        }
        std::process::exit(1);
    }

    let mut config = MeterConfig::load(None)?;
    if let Some(dialect) = args.get(2) {
        config.dialect = dialect.clone();
        config.validate()?;
    }
    logging::init(&config.log_level);

    let source = ReplaySource::from_file(&args[1])?;
    tracing::info!("Loaded {} lines from {}", source.remaining(), args[1]);

    let selection = config.dialect_selection()?;
    let mut service = MeterService::new(
        source,
        JsonLinesSink::new(std::io::stdout()),
        TelegramFramer::new(config.framer_config(&selection)),
        config.assembler()?,
        selection,
    );

    // Nothing stops a replay early; it ends with the file
    let (_stop_tx, stop_rx) = watch::channel(false);
    service.run(stop_rx).await?;

    let (source, _, stats) = service.into_parts();
    if source.remaining() > 0 {
        tracing::warn!("{} lines left unread", source.remaining());
    }
    eprintln!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
