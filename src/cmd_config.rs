use anyhow::{Context, Result};
use console::style;
use oxiwatch::clienv;
use oxiwatch::config::Settings;
use oxiwatch::notifier::TelegramNotifier;

use crate::args::ConfigCommands;

pub(crate) async fn cmd_config(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Validate => cmd_config_validate(),
        ConfigCommands::Show => cmd_config_show(),
    }
}

fn cmd_config_validate() -> Result<()> {
    let settings = Settings::load().context("failed to load config")?;
    settings.validate().context("validation failed")?;
    println!("{} Configuration is valid", style("✓").green());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let path = clienv::config_path();
    let settings = Settings::load().context("failed to load config")?;

    let source = if path.exists() {
        style(path.display().to_string()).dim()
    } else {
        style(format!("{} (not found, using defaults)", path.display())).yellow()
    };
    println!("# {source}");
    print!("{}", settings.masked().to_toml()?);
    Ok(())
}

pub(crate) async fn cmd_send_test() -> Result<()> {
    let settings = Settings::load().context("failed to load config")?;
    settings.validate().context("invalid config")?;

    let telegram = TelegramNotifier::new(
        &settings.telegram_bot_token,
        &settings.telegram_chat_id,
        &settings.server_name,
    )?;
    telegram
        .send_test_message()
        .await
        .context("failed to send test message")?;

    println!("{} Test message sent successfully", style("✓").green());
    Ok(())
}
