//! loggen — print `<prefix>_<i>` lines for the logging-driver harness.

use clap::Parser;
use std::time::Duration;

use harness::generator::{generate, GeneratorArgs};

#[derive(Parser, Debug)]
#[command(name = "loggen", version, about = "Create logs for integration testing")]
struct Args {
    /// Number of lines to print
    #[arg(short, long, default_value_t = 1000)]
    iterations: u64,

    /// Prefix of all messages
    #[arg(short, long, default_value = "pre")]
    prefix: String,

    /// Seconds to sleep between lines
    #[arg(short, long = "time", default_value_t = 0)]
    time: u64,
}

fn main() -> std::io::Result<()> {
    let args = Args::parse();
    let stdout = std::io::stdout();
    generate(
        &GeneratorArgs {
            iterations: args.iterations,
            prefix: args.prefix,
            delay: Duration::from_secs(args.time),
        },
        stdout.lock(),
    )?;
    Ok(())
}
