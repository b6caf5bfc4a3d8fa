// Focused CLI parsing tests (tests command-line parsing only, not business logic)

use clap::{CommandFactory, Parser};
use k3s_provision::cli::{Cli, Commands, ModeOpt};
use std::net::Ipv4Addr;

#[test]
fn test_cli_definition_is_consistent() {
    // Catches duplicate argument ids, e.g. a field colliding with --version
    Cli::command().debug_assert();
}

#[test]
fn test_version_flag_and_pin_coexist() {
    let err = Cli::try_parse_from(["k3s-provision", "--version"]).unwrap_err();
    assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);

    let cli = Cli::try_parse_from(["k3s-provision", "--version-pin", "v1.30.8+k3s1"]).unwrap();
    assert_eq!(cli.run.version_pin.as_deref(), Some("v1.30.8+k3s1"));
}

#[test]
fn test_all_commands_parse() {
    let test_cases = vec![
        vec!["k3s-provision"],
        vec!["k3s-provision", "192.168.1.50"],
        vec!["k3s-provision", "--mode", "nat", "--nat-port", "16443"],
        vec!["k3s-provision", "detect"],
        vec!["k3s-provision", "detect", "10.0.2.15", "--mode", "bridged"],
        vec!["k3s-provision", "status", "--json"],
        vec!["k3s-provision", "preflight"],
        vec!["k3s-provision", "init-config", "--force"],
        vec!["k3s-provision", "completions", "bash"],
    ];

    for args in test_cases {
        Cli::try_parse_from(&args).expect(&format!("Failed to parse: {:?}", args));
    }
}

#[test]
fn test_default_invocation_provisions() {
    let cli = Cli::try_parse_from([
        "k3s-provision",
        "192.168.1.50",
        "--version-pin",
        "v1.31.4+k3s1",
    ])
    .unwrap();

    assert!(cli.cmd.is_none());
    assert_eq!(cli.run.node_ip, Some(Ipv4Addr::new(192, 168, 1, 50)));
    assert_eq!(cli.run.version_pin.as_deref(), Some("v1.31.4+k3s1"));
}

#[test]
fn test_mode_is_case_insensitive() {
    for value in ["NAT", "Nat", "nat"] {
        let cli = Cli::try_parse_from(["k3s-provision", "--mode", value]).unwrap();
        assert_eq!(cli.run.mode, Some(ModeOpt::Nat));
    }
    let cli = Cli::try_parse_from(["k3s-provision", "--mode", "bridge"]).unwrap();
    assert_eq!(cli.run.mode, Some(ModeOpt::Bridged));
}

#[test]
fn test_invalid_values_rejected() {
    assert!(Cli::try_parse_from(["k3s-provision", "not-an-ip"]).is_err());
    assert!(Cli::try_parse_from(["k3s-provision", "--mode", "host"]).is_err());
    assert!(Cli::try_parse_from(["k3s-provision", "--nat-port", "70000"]).is_err());
}

#[test]
fn test_status_carries_run_args() {
    let cli = Cli::try_parse_from(["k3s-provision", "status", "10.0.2.15", "--json"]).unwrap();
    match cli.cmd {
        Some(Commands::Status(s)) => {
            assert!(s.json);
            assert_eq!(s.run.node_ip, Some(Ipv4Addr::new(10, 0, 2, 15)));
        }
        _ => panic!("Expected Status command"),
    }
}
