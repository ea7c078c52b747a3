mod config;
mod line_buffer;
mod multiplexer;
mod rewrite;
mod session;
mod signals;

use config::SupervisorConfig;

/// Environment variable holding the `env_logger` filter.
const LOG_ENV: &str = "HANDOFF_LOG";

fn main() {
    // Logs go to stderr; the default filter keeps them off the user's screen.
    let env = env_logger::Env::new().filter_or(LOG_ENV, "warn");
    env_logger::Builder::from_env(env).init();

    let config = match SupervisorConfig::from_args(std::env::args()) {
        Ok(config) => config,
        Err(e) => e.exit(),
    };

    match session::run(&config) {
        Ok(exit) => std::process::exit(exit.code()),
        Err(e) => {
            eprintln!("handoff-supervisor: {e}");
            std::process::exit(1);
        }
    }
}
