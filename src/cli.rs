//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use consearch_core::{InputType, WorkKind};

/// Resolve book and paper identifiers against external metadata providers.
///
/// Accepts ISBNs, DOIs, arXiv ids, PubMed ids, URLs, citations or plain titles
/// and prints the matching records as JSON.
#[derive(Parser, Debug)]
#[command(name = "consearch")]
#[command(author, version, about)]
pub struct Args {
    /// Identifier, URL, citation or title to resolve (multiple words are joined)
    #[arg(required = true, num_args = 1..)]
    pub query: Vec<String>,

    /// Skip detection and treat the query as this input type
    #[arg(short = 't', long = "type", value_parser = parse_input_type)]
    pub input_type: Option<InputType>,

    /// Only query book or paper sources instead of routing by input type
    #[arg(short = 'k', long, value_enum)]
    pub kind: Option<KindArg>,

    /// Print detection candidates without contacting any provider
    #[arg(long)]
    pub detect_only: bool,

    /// Query every eligible source instead of stopping at the first hit
    #[arg(short = 'a', long)]
    pub all_sources: bool,

    /// Query sources concurrently (implies --all-sources)
    #[arg(short = 'p', long)]
    pub parallel: bool,

    /// Deadline for the whole lookup in seconds (1-600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=600))]
    pub timeout: Option<u64>,

    /// Skip sources whose reliability score is below this value (0.0-1.0)
    #[arg(long, value_parser = parse_unit_interval)]
    pub min_reliability: Option<f64>,

    /// Read configuration from this file instead of the default location
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    /// Query words joined into one string.
    #[must_use]
    pub fn query_text(&self) -> String {
        self.query.join(" ")
    }

    /// Default log filter for the verbosity flags.
    #[must_use]
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Work kind selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Book,
    Paper,
}

impl From<KindArg> for WorkKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Book => Self::Book,
            KindArg::Paper => Self::Paper,
        }
    }
}

fn parse_input_type(value: &str) -> Result<InputType, String> {
    value.parse()
}

fn parse_unit_interval(value: &str) -> Result<f64, String> {
    let parsed: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    if (0.0..=1.0).contains(&parsed) {
        Ok(parsed)
    } else {
        Err(format!("{parsed} is outside 0.0..=1.0"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_query_words_are_joined() {
        let args = Args::try_parse_from(["consearch", "Deep", "Learning"]).unwrap();
        assert_eq!(args.query_text(), "Deep Learning");
        assert!(args.input_type.is_none());
        assert!(args.kind.is_none());
        assert!(!args.detect_only);
    }

    #[test]
    fn test_cli_query_is_required() {
        let err = Args::try_parse_from(["consearch"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_type_flag_parses_input_type() {
        let args = Args::try_parse_from(["consearch", "--type", "isbn13", "x"]).unwrap();
        assert_eq!(args.input_type, Some(InputType::Isbn13));

        let args = Args::try_parse_from(["consearch", "-t", "doi", "x"]).unwrap();
        assert_eq!(args.input_type, Some(InputType::Doi));
    }

    #[test]
    fn test_cli_type_flag_rejects_unknown_type() {
        let err = Args::try_parse_from(["consearch", "--type", "barcode", "x"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_kind_flag() {
        let args = Args::try_parse_from(["consearch", "--kind", "paper", "x"]).unwrap();
        assert_eq!(args.kind, Some(KindArg::Paper));
        assert_eq!(WorkKind::from(KindArg::Book), WorkKind::Book);
    }

    #[test]
    fn test_cli_timeout_range() {
        let args = Args::try_parse_from(["consearch", "--timeout", "600", "x"]).unwrap();
        assert_eq!(args.timeout, Some(600));

        let err = Args::try_parse_from(["consearch", "--timeout", "0", "x"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_min_reliability_range() {
        let args = Args::try_parse_from(["consearch", "--min-reliability", "0.8", "x"]).unwrap();
        assert_eq!(args.min_reliability, Some(0.8));

        let err =
            Args::try_parse_from(["consearch", "--min-reliability", "1.2", "x"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_log_level_from_flags() {
        let args = Args::try_parse_from(["consearch", "x"]).unwrap();
        assert_eq!(args.log_level(), "warn");

        let args = Args::try_parse_from(["consearch", "-vv", "x"]).unwrap();
        assert_eq!(args.log_level(), "debug");

        let args = Args::try_parse_from(["consearch", "-q", "x"]).unwrap();
        assert_eq!(args.log_level(), "error");
    }

    #[test]
    fn test_cli_quiet_conflicts_with_verbose() {
        let err = Args::try_parse_from(["consearch", "-q", "-v", "x"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["consearch", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
