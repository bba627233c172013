use intcode::repl::Repl;
use log::LevelFilter;
use vmm::RuntimeConfig;

fn main() {
    let config = RuntimeConfig::from_env();
    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if config.debug {
        logger.filter_module("vmm", LevelFilter::Debug);
    }
    logger.init();

    let mut repl = Repl::new(config);
    repl.run();
}
