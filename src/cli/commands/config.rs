//! Config command - show or initialize configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::cli::CommandContext;
use crate::config::{Config, ConfigManager};
use crate::error::PcacheResult;
use crate::ui::{self, UiContext};

/// Execute the config command
pub async fn execute(args: ConfigArgs, ctx: &CommandContext) -> PcacheResult<()> {
    let manager = ConfigManager::with_path(ctx.config_path.clone());

    match args.action {
        None | Some(ConfigAction::Show) => show_config(ctx)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(&manager, force).await?,
    }

    Ok(())
}

fn show_config(ctx: &CommandContext) -> PcacheResult<()> {
    // Show the effective roots, including flag and default overrides
    let mut effective = ctx.config.clone();
    effective.cache.root = Some(ctx.cache_root.clone());
    effective.source.root = ctx.source.clone();

    print!("{}", toml::to_string_pretty(&effective)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> PcacheResult<()> {
    let ui_ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ui_ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok_detail(
        &ui_ctx,
        "Configuration initialized",
        &path.display().to_string(),
    );
    Ok(())
}
