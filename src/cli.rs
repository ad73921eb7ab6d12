use clap::{ArgAction, Args, Parser, Subcommand};
use patcher_common::SettingsOverrides;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "patcher")]
#[command(
    version,
    about = "Trace Hadoop-ecosystem wrapper scripts down to the binary they exec",
    long_about = None
)]
pub struct Cli {
    /// Debug-level logging (PATCHER_LOG still wins when set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file to use instead of $PATCHER_HOME/config.yaml
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub sub: SubCommands,
}

#[derive(Subcommand, Debug)]
pub enum SubCommands {
    /// Trace a command's exec chain (or the built-in Hadoop presets)
    Trace(TraceArgs),
    /// Dump javap signatures of every class in a JAR to JSON
    JarDump(JarDumpArgs),
    /// Report classes and members removed between two signature dumps
    JarDiff(JarDiffArgs),
}

#[derive(Args, Debug)]
pub struct TraceArgs {
    /// Directory for patcher_results-<command> files
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Result format: yaml or json
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Kill a traced command after this many seconds (0 disables)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Buffer trace output instead of echoing it
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_stream: bool,

    /// Leave synthesized debug scripts on disk
    #[arg(long, action = ArgAction::SetTrue)]
    pub keep_scripts: bool,

    /// Command and its arguments; omit to trace the presets
    #[arg(value_name = "COMMAND", trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl TraceArgs {
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            output_dir: self.output_dir.clone(),
            format: self.format.clone(),
            timeout_secs: self.timeout,
            stream: self.no_stream.then_some(false),
            keep_scripts: self.keep_scripts.then_some(true),
            ..SettingsOverrides::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct JarDumpArgs {
    pub jar: PathBuf,

    /// Where to write the dump (default: <jar name>.data in the current directory)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct JarDiffArgs {
    /// Dump of the jar that was built against
    pub a: PathBuf,
    /// Dump of the candidate replacement
    pub b: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_keeps_command_arguments_verbatim() {
        let cli = Cli::parse_from(["patcher", "trace", "--no-stream", "hive", "-e", "show tables"]);
        let SubCommands::Trace(args) = cli.sub else {
            panic!("expected trace");
        };
        assert_eq!(args.command, ["hive", "-e", "show tables"]);
        let overrides = args.overrides();
        assert_eq!(overrides.stream, Some(false));
        assert_eq!(overrides.keep_scripts, None);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["patcher", "jar-diff", "a.data", "b.data", "--verbose"]);
        assert!(cli.verbose);
        assert!(matches!(cli.sub, SubCommands::JarDiff(_)));
    }

    #[test]
    fn test_trace_without_command() {
        let cli = Cli::parse_from(["patcher", "trace", "--format", "json"]);
        let SubCommands::Trace(args) = cli.sub else {
            panic!("expected trace");
        };
        assert!(args.command.is_empty());
        assert_eq!(args.overrides().format.as_deref(), Some("json"));
    }
}
