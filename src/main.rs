// p1-meter service entry point
// Reads telegrams from the P1 port and writes readings to stdout

use p1_meter::reading::Reading;
use p1_meter::serial::list_ports;
use p1_meter::{
    channel, logging, InfluxLineSink, JsonLinesSink, MeterConfig, MeterService, OutputFormat,
    SerialPort, Sink, TelegramFramer,
};
use std::env;
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};

/// Move readings from the queue to the output until the producer is gone
async fn drain<K: Sink>(rx: &mut mpsc::Receiver<Reading>, mut sink: K) {
    while let Some(reading) = rx.recv().await {
        if let Err(e) = sink.publish(reading).await {
            tracing::warn!("Failed to write reading: {}", e);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional JSON config file; environment overrides it
    let config_path = env::args().nth(1).map(PathBuf::from);
    let config = MeterConfig::load(config_path.as_deref())?;

    logging::init(&config.log_level);
    tracing::info!("p1-meter {}", p1_meter::VERSION);

    let selection = config.dialect_selection()?;
    let port = match SerialPort::open(&config.port, config.serial_config()?) {
        Ok(port) => port,
        Err(e) => {
            if let Ok(ports) = list_ports() {
                tracing::error!("Available ports: {:?}", ports);
            }
            return Err(anyhow::anyhow!("Cannot open {}: {}", config.port, e));
        }
    };

    let (sink, mut rx) = channel(config.queue_capacity);
    let mut service = MeterService::new(
        port,
        sink,
        TelegramFramer::new(config.framer_config(&selection)),
        config.assembler()?,
        selection,
    )
    .with_read_timeout(config.read_timeout())
    .with_max_transport_failures(config.max_transport_failures);

    let (stop_tx, stop_rx) = watch::channel(false);

    let decode = async move {
        let result = service.run(stop_rx).await;
        // Dropping the service closes the queue and ends the publisher
        let (_, _, stats) = service.into_parts();
        result.map(|()| stats)
    };

    let publish = async {
        match config.output {
            OutputFormat::Json => drain(&mut rx, JsonLinesSink::new(std::io::stdout())).await,
            OutputFormat::Influx => drain(&mut rx, InfluxLineSink::new(std::io::stdout())).await,
        }
    };

    let signal = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping after the current telegram");
                let _ = stop_tx.send(true);
            }
            _ = stop_tx.closed() => {}
        }
    };

    let (result, (), ()) = tokio::join!(decode, publish, signal);
    let stats = result?;
    tracing::info!("Statistics: {}", serde_json::to_string(&stats)?);

    Ok(())
}
