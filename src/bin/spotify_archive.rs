use std::env;
use std::process;
use spotify_archive::config::Config;

pub fn main() -> () {
    let mut logger = pretty_env_logger::formatted_builder();
    logger.filter_level(log::LevelFilter::Info);
    if let Ok(filters) = env::var("RUST_LOG") {
        logger.parse_filters(&filters);
    }
    logger.init();

    let args: Vec<String> = env::args().collect();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            log::error!("could not load config: {}", err);
            process::exit(1);
        }
    };

    log::debug!("using config: {}", config);

    let force_auth = args.len() == 2 && args[1] == "auth";

    if let Err(err) = spotify_archive::cli::cli(&config, force_auth) {
        log::error!("{}", err);
        process::exit(1);
    }
}
