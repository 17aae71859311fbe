// SPDX-License-Identifier: AGPL-3.0-only
// Copyright Authors of dommer

use clap_derive::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about)]
#[group(skip)]
pub struct Config {
    /// Start scoring as soon as the engine comes up
    #[arg(env, long, default_value_t = false)]
    pub engine_autostart: bool,

    /// Rounds to run before stopping automatically, 0 means unbounded
    #[arg(env, long, default_value_t = 0)]
    pub engine_rounds: u32,

    /// Directory to write per-team score breakdown CSVs into
    #[arg(env, long)]
    pub engine_export_dir: Option<PathBuf>,
}
