use anyhow::Result;

use crate::cli::InitConfigArgs;
use crate::config::generate_config;

/// Write the default config file and exit
pub fn cmd_init_config(args: InitConfigArgs) -> Result<()> {
    let config_path = generate_config(args.force)?;
    println!("Generated config at: {}", config_path.display());
    println!("\nCustomize the config file, then run:");
    println!("  sudo k3s-provision");
    Ok(())
}
