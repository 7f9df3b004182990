use clap::Parser;

use locale_sweep::app::{
    cli,
    config::{validate_args, Args},
};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {e}");
        std::process::exit(2);
    }

    cli::run_cli(args)
}
