//! # evcurve 命令行入口
//!
//! ## 子命令
//! - `scan` - 各向同性能量-体积扫描（单文件或目录批量）

use clap::Parser;
use evcurve::cli::Cli;
use evcurve::{commands, utils};

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();

    if let Err(e) = commands::run(cli.command) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}
