//! P1 capture utility
//! Records raw lines from the meter's P1 port to a text file for replay

use p1_meter::{logging, MeterConfig, SerialPort, TransportError};
use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 || args.len() > 4 {
        eprintln!("Usage: {} <port> <output.txt> [telegrams]", args[0]);
        eprintln!("Example: {} /dev/ttyUSB0 p1_dump.txt 10", args[0]);
        eprintln!("\nSerial settings come from BAUD_RATE, P1_DATA_BITS and P1_PARITY.");
        eprintln!("Without a telegram count, recording runs until Ctrl-C.");
        std::process::exit(1);
    }

    let mut config = MeterConfig::load(None)?;
    config.port = args[1].clone();
    logging::init(&config.log_level);

    let wanted: Option<usize> = match args.get(3) {
        Some(n) => Some(n.parse()?),
        None => None,
    };

    let mut port = SerialPort::open(&config.port, config.serial_config()?)?;
    port.clear_input()?;

    let mut out = BufWriter::new(File::create(&args[2])?);
    let mut lines = 0usize;
    let mut telegrams = 0usize;
    let timeout = config.read_timeout();

    tracing::info!("Recording {} to {}", config.port, args[2]);

    loop {
        if wanted.is_some_and(|n| telegrams >= n) {
            break;
        }

        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = port.read_line(timeout) => line,
        };

        match line {
            Ok(line) => {
                writeln!(out, "{}", line)?;
                lines += 1;
                if line.starts_with('!') {
                    telegrams += 1;
                    out.flush()?;
                    tracing::info!("Telegram {} recorded", telegrams);
                }
            }
            Err(TransportError::Timeout(t)) => {
                tracing::warn!("No data for {:?}; is the P1 cable connected?", t);
            }
            Err(e) if e.is_terminal() => return Err(e.into()),
            Err(e) => tracing::warn!("Read error: {}", e),
        }
    }

    out.flush()?;
    port.close()?;

    println!("Recorded {} lines ({} telegrams) to {}", lines, telegrams, args[2]);
    Ok(())
}
