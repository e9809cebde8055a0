//! 资格规则引擎命令行入口

use anyhow::Result;
use clap::Parser;
use eligibility_shared::config::AppConfig;
use eligibility_shared::observability;
use rule_engine::cli::{Cli, CommandRunner};
use tracing::debug;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load("rule-engine").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });
    observability::init(&config.service_name, &config.observability)?;

    let mut engine_config = config.engine.clone();
    engine_config.short_circuit |= cli.short_circuit;
    engine_config.trace_enabled |= cli.trace;
    debug!(?engine_config, "Engine configured");

    let runner = CommandRunner::new(engine_config);
    let output = runner.run(&cli.command)?;
    println!("{}", output);

    Ok(())
}
