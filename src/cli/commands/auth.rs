use clap::{Arg, Command};

pub const ARG_BCRYPT_COST: &str = "bcrypt-cost";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_BCRYPT_COST)
            .long("bcrypt-cost")
            .help("bcrypt work factor for new password hashes")
            .env("PASSKEEP_BCRYPT_COST")
            .default_value("10")
            .value_parser(clap::value_parser!(u32).range(4..=31)),
    )
}
