use cacheproxy::{Config, Engine};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_args();
    log::info!("listening on {}", config.listen_addr);

    let mut engine = match Engine::new(&config) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("failed to start: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = engine.run() {
        log::error!("engine exited with error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
