//! Config command - show the effective configuration.

use grove_core::Config;

/// Run the config command.
pub fn run(config: Config, path_only: bool) -> anyhow::Result<()> {
    if path_only {
        println!("{}", Config::default_config_path()?.display());
        return Ok(());
    }

    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
