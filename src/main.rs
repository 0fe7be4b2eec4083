use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;

use fleet_place::core::config::EngineConfig;
use fleet_place::core::requests::RequestReader;
use fleet_place::engine::PlacementEngine;

#[derive(Parser)]
struct Args {
    /// Path to the request stream (stdin when omitted).
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Path to a .yaml engine config to overwrite default parameters.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Save committed placements to this CSV file.
    #[arg(short, long)]
    placement_log: Option<PathBuf>,
}

fn init_logger() {
    use env_logger::Builder;
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();
}

fn main() -> io::Result<()> {
    init_logger();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path.to_str().expect("config path is valid utf-8")),
        None => EngineConfig::default(),
    };

    let input: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let mut reader = RequestReader::new(input);

    let stdout = io::stdout();
    let mut output = BufWriter::new(stdout.lock());

    let mut engine = PlacementEngine::from_reader(&mut reader, config);
    engine.run(&mut reader, &mut output)?;

    if let Some(path) = &args.placement_log {
        engine
            .placement_log()
            .save(path.to_str().expect("placement log path is valid utf-8"))?;
    }
    Ok(())
}
