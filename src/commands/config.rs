//! Config command handler: show effective configuration.

use anyhow::Result;

use crate::app::runtime::AppContext;
use crate::app_config::LoadedConfig;

pub fn run_config_show_command(loaded: &LoadedConfig, ctx: &AppContext) -> Result<()> {
    let resolved_path = loaded.path.as_ref().map_or_else(
        || "<unresolved>".to_string(),
        |path| path.display().to_string(),
    );
    println!("# config_path = {resolved_path}");
    println!(
        "# config_file = {}",
        if loaded.loaded_from_file {
            "loaded"
        } else {
            "not found (using defaults)"
        }
    );
    println!("# database = {}", ctx.database_path.display());
    println!();
    print!("{}", ctx.config.to_toml()?);
    Ok(())
}
