use anyhow::Result;
use phase_pipeline::config;
use std::path::PathBuf;

use super::Command;

pub struct ConfigCommand {
    pub output: Option<PathBuf>,
}

impl ConfigCommand {
    pub fn new(output: Option<PathBuf>) -> Self {
        Self { output }
    }
}

impl Command for ConfigCommand {
    async fn execute(&self) -> Result<()> {
        let config = config()?;
        println!("{}", toml::to_string_pretty(config)?);

        if let Some(path) = &self.output {
            config.save_to_file(path)?;
            println!("✅ Configuration written to {}", path.display());
        }
        Ok(())
    }
}
