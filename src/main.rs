use std::process::ExitCode;

use clap::Parser;

use evfleet::api::cli::{self, Cli};
use evfleet::common::{log, AppCfg};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let cfg = cli.apply(AppCfg::load());
    log::init(&cfg);
    cli::run(&cli, &cfg)
}
