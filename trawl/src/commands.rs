use clap::arg;

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("trawl")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("trawl")
        .about("Map every page reachable on a single site and the links between them")
        .styles(CLAP_STYLING)
        .arg(
            arg!(<domain>)
                .value_name("DOMAIN")
                .help("The seed URL; its host bounds the crawl (http:// is assumed when no scheme is given)"),
        )
        .arg(
            arg!(-v --"verbose")
                .required(false)
                .help("Log every fetch and crawl round to stderr")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            arg!(-q --"quiet")
                .required(false)
                .help("Suppress the banner, progress spinner and status lines")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            arg!(-t --"threads" <NUM_WORKERS>)
                .required(false)
                .help("The number of async workers fetching pages within a round")
                .value_parser(clap::value_parser!(usize))
                .default_value("10"),
        )
        .arg(
            arg!(--"max-depth" <ROUNDS>)
                .required(false)
                .help("Stop after this many rounds past the seed page (default: no limit)")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            arg!(--"timeout" <SECONDS>)
                .required(false)
                .help("Per-request timeout in seconds")
                .value_parser(clap::value_parser!(u64).range(1..))
                .default_value("10"),
        )
        .arg(
            arg!(--"deadline" <SECONDS>)
                .required(false)
                .help("Stop the whole crawl after this many seconds and report what was mapped")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            arg!(-f --"format" <FORMAT>)
                .required(false)
                .help("Report format: text, json")
                .value_parser(["text", "json"])
                .default_value("text"),
        )
        .arg(
            arg!(-o --"output" <PATH>)
                .required(false)
                .help("Save report to file (default: display to screen)"),
        )
}
