use std::process;

use clap::Parser;
use intcode::cli::{self, Cli};
use log::LevelFilter;

fn main() {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if cli.debug {
        logger.filter_module("vmm", LevelFilter::Debug);
    }
    logger.init();

    match cli::execute(&cli) {
        Ok(report) => println!("{}", report),
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    }
}
