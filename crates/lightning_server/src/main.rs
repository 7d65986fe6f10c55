use std::path::PathBuf;

use clap::{Arg, Command, value_parser};
use lightning_core::SequencerConfig;
use lightning_server::{ServerConfig, run_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let defaults = ServerConfig::default();

    let matches = Command::new("lightningd")
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Network-controlled sample step sequencer")
        .arg(
            Arg::new("bind")
                .long("bind")
                .short('b')
                .value_name("ADDR")
                .default_value("localhost:3428")
                .num_args(1),
        )
        .arg(
            Arg::new("www")
                .long("www")
                .value_name("DIR")
                .help(format!("Static file root [default: {}]", defaults.web_root.display()))
                .value_parser(value_parser!(PathBuf))
                .num_args(1),
        )
        .arg(
            Arg::new("audio")
                .long("audio")
                .value_name("DIR")
                .help(format!("Sample directory [default: {}]", defaults.audio_root.display()))
                .value_parser(value_parser!(PathBuf))
                .num_args(1),
        )
        .arg(
            Arg::new("pattern")
                .long("pattern")
                .short('p')
                .value_name("FILE")
                .help("Pattern snapshot to load at startup")
                .value_parser(value_parser!(PathBuf))
                .num_args(1),
        )
        .arg(
            Arg::new("length")
                .long("length")
                .short('l')
                .value_name("STEPS")
                .default_value("4096")
                .value_parser(value_parser!(usize))
                .num_args(1),
        )
        .arg(
            Arg::new("tempo")
                .long("tempo")
                .short('t')
                .value_name("BPM")
                .default_value("120")
                .value_parser(value_parser!(f64))
                .num_args(1),
        )
        .arg(
            Arg::new("div")
                .long("div")
                .short('d')
                .value_name("1/D")
                .default_value("1/4")
                .num_args(1),
        )
        .arg(
            Arg::new("position-buffer")
                .long("position-buffer")
                .value_name("N")
                .default_value("64")
                .value_parser(value_parser!(usize))
                .num_args(1),
        )
        .arg(
            Arg::new("error-buffer")
                .long("error-buffer")
                .value_name("N")
                .default_value("4")
                .value_parser(value_parser!(usize))
                .num_args(1),
        )
        .get_matches();

    let seq_defaults = SequencerConfig::default();
    let config = ServerConfig {
        bind: matches
            .get_one::<String>("bind")
            .cloned()
            .unwrap_or(defaults.bind),
        web_root: matches
            .get_one::<PathBuf>("www")
            .cloned()
            .unwrap_or(defaults.web_root),
        audio_root: matches
            .get_one::<PathBuf>("audio")
            .cloned()
            .unwrap_or(defaults.audio_root),
        pattern_file: matches.get_one::<PathBuf>("pattern").cloned(),
        sequencer: SequencerConfig {
            length: matches
                .get_one::<usize>("length")
                .copied()
                .unwrap_or(seq_defaults.length),
            tempo: matches
                .get_one::<f64>("tempo")
                .copied()
                .unwrap_or(seq_defaults.tempo),
            bardiv: matches
                .get_one::<String>("div")
                .cloned()
                .unwrap_or(seq_defaults.bardiv),
            position_buffer: matches
                .get_one::<usize>("position-buffer")
                .copied()
                .unwrap_or(seq_defaults.position_buffer),
            error_buffer: matches
                .get_one::<usize>("error-buffer")
                .copied()
                .unwrap_or(seq_defaults.error_buffer),
        },
    };

    run_server(config).await
}
