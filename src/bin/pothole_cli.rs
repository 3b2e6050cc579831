use std::{
    error::Error,
    io::{self, Write},
    process,
    sync::Arc,
    time::Duration,
};

use clap::{Parser, ValueEnum};
use log::info;
use pothole::{
    ClientConfig, Command, PotholeClient,
    client::{DEFAULT_THRESHOLD, DEFAULT_TIMEOUT},
    prompt,
    protocol::ListFormat,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// `{"potholes": [...]}` on a single line
    Envelope,
    /// `lat;lon;severity` lines
    Delimited,
}

impl From<Format> for ListFormat {
    fn from(value: Format) -> Self {
        match value {
            Format::Envelope => ListFormat::Envelope,
            Format::Delimited => ListFormat::Delimited,
        }
    }
}

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server host name or address
    host: String,
    /// Server port
    port: u16,
    /// Read timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_millis() as u64)]
    timeout_ms: u64,
    /// Threshold reported when the server does not provide one
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    default_threshold: f64,
    /// Shape of `HOLE_LIST` responses
    #[arg(long, value_enum, default_value_t = Format::Envelope)]
    list_format: Format,
    /// Username announced after connecting
    #[arg(long)]
    username: Option<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    let config = ClientConfig {
        address: format!("{}:{}", cli.host, cli.port),
        timeout: Duration::from_millis(cli.timeout_ms),
        default_threshold: cli.default_threshold,
        list_format: cli.list_format.into(),
    };

    let client = Arc::new(PotholeClient::new(config));
    client.connect()?;

    let handle = Arc::clone(&client);
    ctrlc::set_handler(move || {
        if let Err(e) = handle.disconnect() {
            eprintln!("failed to close connection. error: {e}");
        }
        process::exit(130);
    })?;

    if let Some(name) = &cli.username {
        client.set_username(name)?;
    }

    let stdio = io::stdin();
    let stdout = io::stdout();

    loop {
        let cmd = match prompt(stdio.lock(), stdout.lock()) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        if let Command::Exit = cmd {
            break;
        }

        if let Err(e) = execute(&client, cmd, &mut stdout.lock()) {
            eprintln!("error: {e}");
            if !client.is_connected() {
                break;
            }
        }
    }

    info!("closing session");
    client.disconnect()?;
    Ok(())
}

fn execute<W: Write>(
    client: &PotholeClient,
    cmd: Command,
    out: &mut W,
) -> Result<(), Box<dyn Error>> {
    match cmd {
        Command::ListAll => {
            for record in client.list_all()? {
                writeln!(out, "{record}")?;
            }
        }
        Command::ListByRange {
            latitude,
            longitude,
            range,
        } => {
            for record in client.list_by_range(latitude, longitude, range)? {
                writeln!(out, "{record}")?;
            }
        }
        Command::Threshold => writeln!(out, "{}", client.threshold()?)?,
        Command::Submit(record) => client.submit(&record)?,
        Command::Username(name) => client.set_username(&name)?,
        Command::Status => {
            let state = if client.is_connected() {
                "connected"
            } else {
                "disconnected"
            };
            writeln!(out, "{state} ({})", client.config().address)?;
        }
        Command::Exit | Command::Nothing => {}
    }
    Ok(())
}
