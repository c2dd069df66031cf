//! CLI parse tests.

use super::{Cli, CliCommand};
use clap::Parser;

pub(super) fn parse(args: &[&str]) -> CliCommand {
    let cli = Cli::try_parse_from(args).unwrap();
    cli.command
}

#[test]
fn demo_uses_defaults() {
    match parse(&["pullwatch", "demo", "docker.io/library/alpine:3.20"]) {
        CliCommand::Demo {
            reference,
            layers,
            layer_size,
            fail,
        } => {
            assert_eq!(reference, "docker.io/library/alpine:3.20");
            assert_eq!(layers, 4);
            assert_eq!(layer_size, 4 * 1024 * 1024);
            assert!(!fail);
        }
        other => panic!("expected Demo, got {:?}", other),
    }
}

#[test]
fn demo_accepts_flags() {
    match parse(&[
        "pullwatch",
        "demo",
        "img:1",
        "--layers",
        "7",
        "--layer-size",
        "1000",
        "--fail",
    ]) {
        CliCommand::Demo {
            layers,
            layer_size,
            fail,
            ..
        } => {
            assert_eq!(layers, 7);
            assert_eq!(layer_size, 1000);
            assert!(fail);
        }
        other => panic!("expected Demo, got {:?}", other),
    }
}

#[test]
fn demo_requires_reference() {
    assert!(Cli::try_parse_from(["pullwatch", "demo"]).is_err());
}

#[test]
fn config_takes_no_arguments() {
    assert!(matches!(parse(&["pullwatch", "config"]), CliCommand::Config));
    assert!(Cli::try_parse_from(["pullwatch", "config", "extra"]).is_err());
}
