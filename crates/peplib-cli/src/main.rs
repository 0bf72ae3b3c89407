use clap::{value_parser, Arg, Command, ValueHint};
use peplib_cli::input::Input;
use peplib_cli::runner::Runner;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("PEPLIB_LOG", "error,peplib=info"))
        .init();

    let matches = Command::new("peplib")
        .version(clap::crate_version!())
        .about("Digest FASTA files into a decoy-augmented theoretical spectral library")
        .arg(
            Arg::new("parameters")
                .required(true)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to configuration parameters (JSON file)")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("fasta_paths")
                .num_args(1..)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Paths to FASTA files to digest. Overrides FASTA files listed in the \
                     configuration file.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Directory where the database will be written. \
                     Overrides the path specified in the configuration file.",
                )
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("workers")
                .long("workers")
                .value_parser(value_parser!(u16).range(1..))
                .help("Number of worker threads used for digestion (default = # of CPUs)")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("write-tsv")
                .long("write-tsv")
                .action(clap::ArgAction::SetTrue)
                .help("Also write a tab-separated peptide table next to the database"),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    let input = Input::from_arguments(matches)?;
    let summary = input.build().map(Runner::new)?.run()?;
    println!("{}", summary);

    Ok(())
}
