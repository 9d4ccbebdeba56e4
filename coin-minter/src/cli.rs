use anyhow::Context;
use clap::ArgAction;
use serde_yaml::{Mapping, Value};

use crate::config::CoinMinterConfig;

const GENERATE_ARG_ID: &str = "generate";
const CONFIG_ARG_ID: &str = "config";
const ONCE_ARG_ID: &str = "once";

const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Prefix of environment overrides, `COIN_MINTER__WORKER__RUN_ON_START=false`
/// sets `worker.run_on_start`. Overrides of string settings are always taken
/// as strings, anything else that should stay a string must be quoted.
pub const ENV_PREFIX: &str = "COIN_MINTER__";

#[derive(Debug, Clone)]
pub struct Matches {
	pub config: CoinMinterConfig,
	/// Process a single job and exit
	pub once: bool,
}

pub fn command() -> clap::Command {
	clap::Command::new(env!("CARGO_PKG_NAME"))
		.version(env!("CARGO_PKG_VERSION"))
		.about(env!("CARGO_PKG_DESCRIPTION"))
		.arg(
			clap::Arg::new(CONFIG_ARG_ID)
				.long(CONFIG_ARG_ID)
				.short('c')
				.help("The configuration file to use, later files override earlier ones")
				.value_name("FILE")
				.action(ArgAction::Append),
		)
		.arg(
			clap::Arg::new(GENERATE_ARG_ID)
				.long(GENERATE_ARG_ID)
				.help("Generate a configuration file")
				.value_name("FILE")
				.action(ArgAction::Set)
				.num_args(0..=1)
				.default_missing_value("./config.yaml"),
		)
		.arg(
			clap::Arg::new(ONCE_ARG_ID)
				.long(ONCE_ARG_ID)
				.help("Process one job and exit")
				.action(ArgAction::SetTrue),
		)
}

pub fn parse() -> anyhow::Result<Matches> {
	let args = command().get_matches();

	if let Some(file) = args.get_one::<String>(GENERATE_ARG_ID) {
		let settings = serde_yaml::to_string(&CoinMinterConfig::default()).context("failed to serialize settings")?;
		std::fs::write(file, settings).with_context(|| format!("Error writing configuration file: {file}"))?;
		println!("Generated configuration file: {file}");
		std::process::exit(0);
	}

	let mut files = if let Some(files) = args.get_many::<String>(CONFIG_ARG_ID) {
		files.cloned().map(|file| (file, false)).collect::<Vec<_>>()
	} else {
		vec![]
	};

	if files.is_empty() {
		files.push((DEFAULT_CONFIG_FILE.to_string(), true));
	}

	Ok(Matches {
		config: load(&files, std::env::vars())?,
		once: args.get_flag(ONCE_ARG_ID),
	})
}

fn load_file(file: &str, optional: bool) -> anyhow::Result<Option<Value>> {
	let contents = match std::fs::read_to_string(file) {
		Ok(contents) => contents,
		Err(err) => {
			if optional && err.kind() == std::io::ErrorKind::NotFound {
				return Ok(None);
			}

			return Err(err).with_context(|| format!("Error reading configuration file: {file}"));
		}
	};

	let incoming = serde_yaml::from_str(&contents).with_context(|| format!("Error parsing configuration file: {file}"))?;

	Ok(Some(incoming))
}

/// Layers the defaults, each `(file, optional)` in order and finally the
/// environment overrides.
pub fn load(files: &[(String, bool)], env: impl IntoIterator<Item = (String, String)>) -> anyhow::Result<CoinMinterConfig> {
	let mut root = serde_yaml::to_value(CoinMinterConfig::default()).context("failed to serialize defaults")?;

	for (file, optional) in files {
		if let Some(value) = load_file(file, *optional)? {
			root = merge(root, value);
		}
	}

	let overrides = env_overrides(&root, env);
	root = merge(root, overrides);

	serde_yaml::from_value(root).context("failed to parse settings")
}

/// Deep merges `incoming` into `root`. Maps merge key by key, everything else
/// is replaced. A map switching its `kind` tag replaces the old map, since the
/// old variant's fields mean nothing to the new one.
pub fn merge(root: Value, incoming: Value) -> Value {
	match (root, incoming) {
		(Value::Mapping(mut root), Value::Mapping(incoming)) => {
			let kind = Value::String("kind".into());
			if let (Some(old), Some(new)) = (root.get(&kind), incoming.get(&kind)) {
				if old != new {
					return Value::Mapping(incoming);
				}
			}

			for (key, value) in incoming {
				let value = match root.remove(&key) {
					Some(existing) => merge(existing, value),
					None => value,
				};
				root.insert(key, value);
			}

			Value::Mapping(root)
		}
		(_, incoming) => incoming,
	}
}

/// Turns `COIN_MINTER__A__B=value` pairs into a nested map `{a: {b: value}}`.
/// A value replacing a string in `current` stays a string, so an all-digit
/// key is not turned into a number. Other values are parsed as YAML, so
/// `false` is a boolean and `'123'` a string. Empty values and values that do
/// not parse are kept as plain strings.
pub fn env_overrides(current: &Value, env: impl IntoIterator<Item = (String, String)>) -> Value {
	let mut root = Value::Mapping(Mapping::new());

	for (key, raw) in env {
		let Some(path) = key.strip_prefix(ENV_PREFIX) else {
			continue;
		};

		let segments = path
			.split("__")
			.filter(|segment| !segment.is_empty())
			.map(str::to_lowercase)
			.collect::<Vec<_>>();

		if segments.is_empty() {
			continue;
		}

		let parsed = serde_yaml::from_str::<Value>(&raw);
		let value = match (lookup(current, &segments), parsed) {
			(Some(Value::String(_)), Ok(Value::String(value))) => Value::String(value),
			(Some(Value::String(_)), _) => Value::String(raw),
			(_, Ok(Value::Null | Value::Tagged(_)) | Err(_)) => Value::String(raw),
			(_, Ok(value)) => value,
		};

		let nested = segments
			.into_iter()
			.rev()
			.fold(value, |value, segment| {
				let mut map = Mapping::new();
				map.insert(Value::String(segment), value);
				Value::Mapping(map)
			});

		root = merge(root, nested);
	}

	root
}

fn lookup<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
	segments.iter().try_fold(root, |value, segment| value.get(segment.as_str()))
}
