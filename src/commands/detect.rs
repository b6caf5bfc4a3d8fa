use anyhow::Result;

use super::common::local_hostname;
use crate::cli::RunArgs;
use crate::config::load_config;
use crate::host::SystemHost;
use crate::network;

/// Print the detection result as JSON
pub async fn cmd_detect(args: RunArgs) -> Result<()> {
    let loaded = load_config(args.config.as_deref())?;
    let run = args.to_run_config(local_hostname());

    let detection = network::detect(
        &SystemHost,
        &loaded.config.network,
        run.mode_override,
        run.node_ip,
    )
    .await;

    println!("{}", serde_json::to_string_pretty(&detection)?);
    Ok(())
}
