use clap::Parser;

/// P1 Reader - reads delivered/returned power from a DSMR smart meter
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Options {
    /// Config file to read
    #[clap(short = 'c', long = "config", default_value = "config.yaml")]
    pub config_file: String,

    /// Optional runtime limit in seconds
    #[clap(short = 't', long = "time")]
    pub runtime: Option<u64>,

    /// Print the most recent stored readings as JSON and exit
    #[clap(long = "recent")]
    pub recent: bool,
}

impl Options {
    pub fn new() -> Self {
        Self::parse()
    }
}
