use std::path::Path;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use jdists_cli::JdistsCli;
use jdists_core::BuildOptions;
use jdists_core::BuildSession;
use jdists_core::JdistsConfig;
use jdists_core::JdistsError;
use jdists_core::split_list;
use jdists_core::text;
use owo_colors::OwoColorize;
use owo_colors::Stream;

fn main() {
	let args = JdistsCli::parse();

	// Respect NO_COLOR env var and --no-color flag.
	let use_color = !args.no_color && std::env::var_os("NO_COLOR").is_none();
	if !use_color {
		owo_colors::set_override(false);
	}

	// Install miette's fancy handler for rich error diagnostics.
	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		tracing_subscriber::EnvFilter::new(if args.verbose { "debug" } else { "warn" })
	});
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.without_time()
		.init();

	if let Err(e) = run(&args) {
		// Render through miette for rich diagnostics with help text and
		// error codes.
		match e.downcast::<JdistsError>() {
			Ok(build_error) => {
				let report: miette::Report = (*build_error).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!(
					"{} {e}",
					"error:".if_supports_color(Stream::Stderr, |text| text.red())
				);
			}
		}
		process::exit(2);
	}
}

fn run(args: &JdistsCli) -> Result<(), Box<dyn std::error::Error>> {
	let mut options = BuildOptions::default();
	if let Some(config) = JdistsConfig::load(&config_dir(&args.input))? {
		config.apply(&mut options);
	}
	if let Some(trigger) = &args.trigger {
		options.trigger.clone_from(trigger);
	}
	if let Some(remove) = &args.remove {
		options.remove = split_list(remove);
	}
	if args.no_clean {
		options.clean = false;
	}

	let mut session = BuildSession::new(options);
	let output = session.build(&args.input)?;

	match &args.output {
		Some(path) => {
			text::force_dir(path)?;
			std::fs::write(path, &output)?;
			eprintln!(
				"{} {} -> {}",
				"built".if_supports_color(Stream::Stderr, |text| text.green()),
				args.input.display(),
				path.display()
			);
		}
		None => println!("{output}"),
	}

	Ok(())
}

/// Directory whose `jdists.toml` configures this build.
fn config_dir(input: &Path) -> PathBuf {
	input
		.parent()
		.filter(|parent| !parent.as_os_str().is_empty())
		.map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}
