// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

use clap::ArgAction;
use clap_derive::{Args as ClapArgs, Parser};

/// A round-based scoring engine for red vs. blue competitions
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// The path to the competition configuration file
    #[arg(env, default_value = "config.toml", value_name = "CONFIG_FILE")]
    pub config_file: String,

    #[command(flatten, next_help_heading = "Component selection options")]
    pub components: Components,

    #[command(flatten, next_help_heading = "Engine configuration options")]
    pub engine: dommer_engine::config::Config,
}

/// Components
#[derive(ClapArgs, Debug)]
#[group()]
pub struct Components {
    /// Enable the scoring engine component
    #[arg(env, long, action = ArgAction::Set, default_value_t = true)]
    pub enable_engine: bool,
}
