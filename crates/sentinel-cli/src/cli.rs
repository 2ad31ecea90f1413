use clap::Parser;

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(about = "Supervises a set of Kubernetes port-forwards with automatic reconnect")]
#[command(version)]
pub struct Cli {
    #[arg(
        short = 'c',
        long,
        help = "Path to the YAML configuration file",
        value_name = "PATH",
        default_value = "sentinel.yaml"
    )]
    pub config: String,

    #[arg(short = 'v', long, help = "Enable debug-level logging")]
    pub verbose: bool,

    #[arg(
        short = 'l',
        long,
        help = "Append logs to this file in addition to stderr",
        value_name = "PATH"
    )]
    pub log: Option<String>,
}
