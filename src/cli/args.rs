use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::net::Ipv4Addr;

#[derive(Parser, Debug)]
#[command(
    name = "k3s-provision",
    version,
    about = "Idempotent single-node k3s provisioning for rpm-ostree hosts",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Option<Commands>,

    /// Provisioning options (used when no subcommand is given)
    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the detected network mode and node address
    Detect(RunArgs),
    /// Show which steps would act, without changing anything
    Status(StatusArgs),
    /// Check host requirements
    Preflight,
    /// Write the default config file to ~/.config/k3s-provision/
    InitConfig(InitConfigArgs),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Node IP to advertise (default: source address of the default route)
    pub node_ip: Option<Ipv4Addr>,

    /// Force the network mode instead of detecting it
    #[arg(long, value_enum, ignore_case = true, env = "K3S_NETWORK_MODE")]
    pub mode: Option<ModeOpt>,

    /// Host port forwarded to the API server (NAT mode)
    #[arg(long, default_value_t = 6443, env = "K3S_NAT_PORT")]
    pub nat_port: u16,

    /// Pin the k3s version (e.g. v1.31.4+k3s1)
    #[arg(long, env = "K3S_VERSION")]
    pub version_pin: Option<String>,

    /// Config file (default: lookup chain, then built-in defaults)
    #[arg(long, env = "K3S_PROVISION_CONFIG")]
    pub config: Option<String>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct InitConfigArgs {
    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
pub enum ModeOpt {
    Nat,
    #[value(alias = "bridge")]
    Bridged,
}
