use clap::Parser;
use log::{debug, warn};
use snafu::ErrorCompat;

mod args;
mod forecast;

fn main() {
    let args = args::Args::parse();

    if args.verbose {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }
    debug!("args: {:?}", args);

    let res = forecast::run_forecast(&args.config, args.out, args.reference, args.cutoff_year);

    if let Err(e) = res {
        warn!("Error occured {:?}", e);
        eprintln!("An error occured: {}", e);
        if let Some(source) = std::error::Error::source(&e) {
            eprintln!("caused by: {}", source);
        }
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
