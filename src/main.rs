use outdial::cli::commands::{CallArgs, CliArgs, Commands, IdCommand, OutputFormatArg, RunArgs};
use outdial::cli::output::OutputFormatter;
use outdial::cli::worklist;
use outdial::phone::PhoneNumber;
use outdial::telephony::{
    AsteriskOriginator, CallOriginator, CallRequest, CompletionSource, MarkerDirectory,
};
use outdial::util::logging::{init_logging, parse_level, LogFormat, LoggingConfig};
use outdial::{CallDispatcher, CallIdAllocator, DispatchError, OutdialConfig, NAME, VERSION};

use anyhow::{Context, Result};
use clap::Parser;
use std::process;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    let mut config = OutdialConfig::default();
    init_logging_from_args(&args, &config);

    debug!("{} v{} starting", NAME, VERSION);
    debug!("Arguments: {:?}", args);

    if let Some(ref store) = args.store {
        config.store_path = store.clone();
    }

    let result = match &args.command {
        Commands::Run(run_args) => handle_run(run_args, config).await,
        Commands::Call(call_args) => handle_call(call_args, config).await,
        Commands::Id { command } => handle_id(command, &config).await,
        Commands::Normalize { number } => handle_normalize(number),
        Commands::Config { format } => handle_config(*format, &config),
    };

    let exit_code = match result {
        Ok(()) => 0,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    };

    process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs, config: &OutdialConfig) {
    let level = if let Some(level_str) = &args.log_level {
        parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        parse_level(&config.log_level)
    };

    init_logging(LoggingConfig {
        level,
        format: LogFormat::from_env(),
        ..Default::default()
    });
}

async fn handle_run(args: &RunArgs, mut config: OutdialConfig) -> Result<()> {
    if let Some(ref source) = args.source {
        config.source_number = Some(source.clone());
    }
    if let Some(max_concurrent) = args.max_concurrent {
        config.max_concurrent = max_concurrent;
    }
    if let Some(poll_interval_ms) = args.poll_interval_ms {
        config.poll_interval_ms = poll_interval_ms;
    }
    if let Some(deadline_secs) = args.deadline_secs {
        config.call_deadline_secs = deadline_secs;
    }
    if let Some(ref answers_dir) = args.answers_dir {
        config.answers_dir = answers_dir.clone();
    }

    config.validate().context("Configuration error")?;
    let options = config.dispatch_options()?;

    let numbers = worklist::collect_numbers(&args.numbers, args.numbers_file.as_deref())?;
    if numbers.is_empty() {
        warn!("No numbers to call. Pass numbers as arguments or use --numbers-file");
    }

    let markers = MarkerDirectory::new(&config.answers_dir);
    markers.ensure_exists().with_context(|| {
        format!(
            "Failed to create answers directory {}",
            config.answers_dir.display()
        )
    })?;

    info!(
        numbers = numbers.len(),
        max_concurrent = options.max_concurrent,
        "Starting dispatch run"
    );

    let dispatcher = CallDispatcher::new(
        CallIdAllocator::new(&config.store_path),
        Arc::new(AsteriskOriginator::new(config.asterisk_settings())),
        Arc::new(markers),
    );
    let formatter = OutputFormatter::new(args.format.into());

    match dispatcher.run(&numbers, &options).await {
        Ok(report) => {
            println!("{}", formatter.format_report(&report)?);
            Ok(())
        }
        Err(DispatchError::Interrupted { source, report }) => {
            println!("{}", formatter.format_report(&report)?);
            Err(source).context("Dispatch stopped before all numbers were called")
        }
        Err(e) => Err(e.into()),
    }
}

async fn handle_call(args: &CallArgs, mut config: OutdialConfig) -> Result<()> {
    if let Some(ref answers_dir) = args.answers_dir {
        config.answers_dir = answers_dir.clone();
    }
    config.validate().context("Configuration error")?;

    let target = PhoneNumber::parse_target(&args.number).context("Invalid target number")?;
    let source = PhoneNumber::parse_source(&args.source).context("Invalid source number")?;

    if !args.keep_artifacts {
        let markers = MarkerDirectory::new(&config.answers_dir);
        match markers.clear_stale(args.call_id) {
            Ok(removed) if removed > 0 => debug!(removed, "Cleared stale call artifacts"),
            Ok(_) => {}
            Err(e) => warn!("Failed to clear stale call artifacts: {}", e),
        }
    }

    let request = CallRequest {
        call_id: args.call_id,
        target,
        source,
    };
    let originator = AsteriskOriginator::new(config.asterisk_settings());
    let outcome = originator
        .originate(&request)
        .await
        .context("Failed to originate call")?;

    println!(
        "Call {} to {} originated via {}",
        request.call_id, request.target, request.source
    );
    if !outcome.output.is_empty() {
        println!("{}", outcome.output);
    }
    Ok(())
}

async fn handle_id(command: &IdCommand, config: &OutdialConfig) -> Result<()> {
    let allocator = CallIdAllocator::new(&config.store_path);
    let command = command.clone();

    let line = tokio::task::spawn_blocking(move || -> Result<String> {
        Ok(match command {
            IdCommand::Next => allocator.allocate()?.to_string(),
            IdCommand::Peek => allocator.peek()?.to_string(),
            IdCommand::Reset { value } => {
                allocator.reset(value)?;
                format!("Call-id store reset to {}", value)
            }
        })
    })
    .await
    .context("Call-id task failed")??;

    println!("{}", line);
    Ok(())
}

fn handle_normalize(number: &str) -> Result<()> {
    let normalized = PhoneNumber::parse_target(number)?;
    println!("{}", normalized);
    Ok(())
}

fn handle_config(format: OutputFormatArg, config: &OutdialConfig) -> Result<()> {
    if let Err(e) = config.validate() {
        warn!("{}", e);
    }
    let formatter = OutputFormatter::new(format.into());
    println!("{}", formatter.format_config(config)?.trim_end());
    Ok(())
}
