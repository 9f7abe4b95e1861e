use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Outbound call dispatcher for an Asterisk switch
#[derive(Parser, Debug)]
#[command(
    name = "outdial",
    about = "Outbound call dispatcher for an Asterisk switch",
    version,
    long_about = "outdial places outbound calls through Asterisk, giving every call a unique, \
                  monotonically increasing call-id and keeping at most a fixed number of calls \
                  in flight. Call-ids come from a store file that is safe to share between \
                  concurrent outdial processes."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Call-id store (overrides OUTDIAL_STORE_PATH)"
    )]
    pub store: Option<PathBuf>,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - only log errors"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Dispatch calls to a list of numbers",
        long_about = "Calls every number in order, keeping at most --max-concurrent calls in \
                      flight, and waits until each call's completion marker appears.\n\n\
                      Examples:\n  \
                      outdial run 0546844668 0542325811 --source 0534540615\n  \
                      outdial run --numbers-file campaign.txt --max-concurrent 4\n  \
                      outdial run --numbers-file campaign.txt --deadline-secs 600 --format json"
    )]
    Run(RunArgs),

    #[command(
        about = "Originate a single call with a given call-id",
        long_about = "Places one call without touching the call-id store.\n\n\
                      Examples:\n  \
                      outdial call 0546844668 0534540615 17"
    )]
    Call(CallArgs),

    #[command(about = "Inspect or administer the call-id store")]
    Id {
        #[command(subcommand)]
        command: IdCommand,
    },

    #[command(about = "Normalize a target number to the local dialing format")]
    Normalize {
        #[arg(value_name = "NUMBER")]
        number: String,
    },

    #[command(about = "Show the effective configuration")]
    Config {
        #[arg(short = 'f', long, value_enum, default_value = "human")]
        format: OutputFormatArg,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum IdCommand {
    #[command(about = "Allocate and print the next call-id")]
    Next,

    #[command(about = "Print the last issued call-id")]
    Peek,

    #[command(about = "Overwrite the stored call-id")]
    Reset {
        #[arg(value_name = "VALUE", allow_negative_numbers = true)]
        value: i64,
    },
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[arg(value_name = "NUMBER", help = "Numbers to call, in order")]
    pub numbers: Vec<String>,

    #[arg(
        long,
        value_name = "FILE",
        help = "Read numbers from a file, one per line ('#' starts a comment)"
    )]
    pub numbers_file: Option<PathBuf>,

    #[arg(
        short = 's',
        long,
        value_name = "NUMBER",
        help = "Number to call from (overrides OUTDIAL_SOURCE_NUMBER)"
    )]
    pub source: Option<String>,

    #[arg(short = 'c', long, value_name = "N", help = "Maximum calls in flight")]
    pub max_concurrent: Option<usize>,

    #[arg(long, value_name = "MS", help = "Completion polling interval")]
    pub poll_interval_ms: Option<u64>,

    #[arg(
        long,
        value_name = "SECONDS",
        help = "Stop waiting for a call after this long (0 waits forever)"
    )]
    pub deadline_secs: Option<u64>,

    #[arg(long, value_name = "DIR", help = "Completion marker directory")]
    pub answers_dir: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Report format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct CallArgs {
    #[arg(value_name = "NUMBER", help = "Number to call")]
    pub number: String,

    #[arg(value_name = "SOURCE", help = "Number to call from")]
    pub source: String,

    #[arg(
        value_name = "CALL_ID",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Call-id to tag the call with"
    )]
    pub call_id: u64,

    #[arg(long, help = "Keep existing artifacts of this call-id")]
    pub keep_artifacts: bool,

    #[arg(long, value_name = "DIR", help = "Completion marker directory")]
    pub answers_dir: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_run_with_numbers() {
        let args = CliArgs::parse_from([
            "outdial",
            "run",
            "0546844668",
            "0542325811",
            "--source",
            "0534540615",
            "-c",
            "1",
        ]);
        match args.command {
            Commands::Run(run) => {
                assert_eq!(run.numbers, vec!["0546844668", "0542325811"]);
                assert_eq!(run.source.as_deref(), Some("0534540615"));
                assert_eq!(run.max_concurrent, Some(1));
                assert_eq!(run.format, OutputFormatArg::Human);
                assert!(run.numbers_file.is_none());
                assert!(run.deadline_secs.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_with_file_and_json() {
        let args = CliArgs::parse_from([
            "outdial",
            "run",
            "--numbers-file",
            "campaign.txt",
            "--format",
            "json",
            "--deadline-secs",
            "600",
        ]);
        match args.command {
            Commands::Run(run) => {
                assert!(run.numbers.is_empty());
                assert_eq!(run.numbers_file, Some(PathBuf::from("campaign.txt")));
                assert_eq!(run.format, OutputFormatArg::Json);
                assert_eq!(run.deadline_secs, Some(600));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_global_store_flag() {
        let args = CliArgs::parse_from(["outdial", "id", "peek", "--store", "/tmp/ids"]);
        assert_eq!(args.store, Some(PathBuf::from("/tmp/ids")));
        match args.command {
            Commands::Id { command } => assert_eq!(command, IdCommand::Peek),
            _ => panic!("Expected Id command"),
        }
    }

    #[test]
    fn test_reset_accepts_negative_value() {
        // Rejection happens in the allocator, not the parser
        let args = CliArgs::parse_from(["outdial", "id", "reset", "-1"]);
        match args.command {
            Commands::Id { command } => assert_eq!(command, IdCommand::Reset { value: -1 }),
            _ => panic!("Expected Id command"),
        }
    }

    #[test]
    fn test_call_requires_positive_call_id() {
        let result = CliArgs::try_parse_from(["outdial", "call", "0546844668", "0534540615", "0"]);
        assert!(result.is_err());

        let args =
            CliArgs::try_parse_from(["outdial", "call", "0546844668", "0534540615", "5"]).unwrap();
        match args.command {
            Commands::Call(call) => {
                assert_eq!(call.call_id, 5);
                assert!(!call.keep_artifacts);
            }
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_call_rejects_missing_arguments() {
        assert!(CliArgs::try_parse_from(["outdial", "call", "0546844668"]).is_err());
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(CliArgs::try_parse_from(["outdial", "-v", "-q", "id", "peek"]).is_err());
    }
}
