use clap::Parser;

/// Predicts which state legislature candidacies get elected, from the
/// records of the electoral court.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON configuration of the run. It describes where the
    /// five record streams are and how the models are set up.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path) A reference report in JSON format. If provided, candforecast
    /// checks that the computed report matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the report is written in JSON
    /// format to the given location. Setting this option overrides the output
    /// directory of the configuration.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (year) Overrides the last election year used for training.
    #[clap(long, value_parser)]
    pub cutoff_year: Option<i32>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
