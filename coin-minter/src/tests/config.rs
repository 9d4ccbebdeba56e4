use std::io::Write;
use std::time::Duration;

use chrono::NaiveTime;

use crate::cli::{env_overrides, load, merge};
use crate::config::{
	base_url, validate_table, BackoffKind, CoinMinterConfig, ConfigError, DiscordNotifierConfig, EmptyQueuePolicy,
	ImageProviderConfig, NotifierConfig, NotifyOn, StoreConfig, UploaderConfig,
};
use crate::deployer::{Address, Currency};
use crate::logging::Mode;
use crate::tests::utils::PAYOUT;
use crate::worker::retry::{Backoff, RetryPolicy};

fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
	let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().expect("tempfile");
	file.write_all(contents.as_bytes()).expect("write");
	file
}

fn path(file: &tempfile::NamedTempFile) -> String {
	file.path().to_string_lossy().into_owned()
}

fn valid_config() -> CoinMinterConfig {
	let mut config = CoinMinterConfig::default();

	if let StoreConfig::Postgrest(store) = &mut config.store {
		store.api_key = "service-key".into();
	}
	if let ImageProviderConfig::Replicate(provider) = &mut config.image_provider {
		provider.api_key = "r8_key".into();
	}
	let crate::config::UploaderConfig::Pinata(uploader) = &mut config.uploader;
	uploader.jwt = "jwt".into();
	config.coin.payout_recipient = PAYOUT.into();

	config
}

#[test]
fn defaults() {
	let config = CoinMinterConfig::default();

	assert_eq!(config.logging.level, "info");
	assert_eq!(config.logging.mode, Mode::Default);
	assert!(config.worker.run_on_start);
	assert_eq!(config.worker.daily_at, NaiveTime::from_hms_opt(0, 5, 0).expect("time"));
	assert_eq!(config.worker.empty_queue, EmptyQueuePolicy::Skip);
	assert_eq!(
		RetryPolicy::from(config.worker.mint_retry),
		RetryPolicy::new(3, Backoff::Linear(Duration::from_secs(2)))
	);
	assert_eq!(config.coin.chain_id, 8453);
	assert_eq!(config.coin.currency, Currency::Eth);
}

#[test]
fn default_config_needs_secrets() {
	assert!(matches!(
		CoinMinterConfig::default().validate(),
		Err(ConfigError::Missing("store.api_key"))
	));
	valid_config().validate().expect("valid config");
}

#[test]
fn payout_recipient_must_be_an_address() {
	let mut config = valid_config();
	config.coin.payout_recipient = "0x1234".into();
	assert!(matches!(config.validate(), Err(ConfigError::InvalidAddress(_))));

	assert!("0xC27d4CcC62E64791c5B321C38E2aF647F091ddf5".parse::<Address>().is_ok());
	assert!("C27d4CcC62E64791c5B321C38E2aF647F091ddf5".parse::<Address>().is_err());
	assert!("0xZ27d4CcC62E64791c5B321C38E2aF647F091ddf5".parse::<Address>().is_err());
}

#[test]
fn notifier_names_are_unique() {
	let notifier = NotifierConfig::Discord(DiscordNotifierConfig {
		name: "chat".into(),
		url: "https://discord.test/api/webhooks/1/abc".parse().expect("url"),
		username: None,
		events: vec![NotifyOn::Success],
		timeout: None,
	});

	let mut config = valid_config();
	config.notifiers = vec![notifier.clone(), notifier];

	assert!(matches!(config.validate(), Err(ConfigError::DuplicateNotifier(name)) if name == "chat"));
}

#[test]
fn table_names_are_identifiers() {
	validate_table("queue").expect("valid");
	validate_table("_jobs_2").expect("valid");
	assert!(validate_table("").is_err());
	assert!(validate_table("2queue").is_err());
	assert!(validate_table("queue; DROP TABLE queue").is_err());
}

#[test]
fn files_are_layered_in_order() {
	let base = yaml_file(
		r#"
store:
  kind: postgrest
  url: https://project.supabase.test/
  api_key: service-key
image_provider:
  kind: fal
  api_key: fal-key
  poll_interval: 2s
  max_polls: 10
uploader:
  kind: pinata
  jwt: pinata-jwt
coin:
  payout_recipient: "0xC27d4CcC62E64791c5B321C38E2aF647F091ddf5"
  symbol: DAILY
notifiers:
  - kind: discord
    name: chat
    url: https://discord.test/api/webhooks/1/abc
    events: [failure]
worker:
  daily_at: "12:30:00"
  empty_queue: synthesize
  mint_retry:
    max_attempts: 5
    backoff: fixed
    delay: 500ms
"#,
	);
	let overlay = yaml_file(
		r#"
logging:
  level: debug
  mode: json
store:
  table: coins
"#,
	);

	let config = load(&[(path(&base), false), (path(&overlay), false)], Vec::new()).expect("config");

	assert_eq!(config.logging.level, "debug");
	assert_eq!(config.logging.mode, Mode::Json);

	let StoreConfig::Postgrest(store) = &config.store else {
		panic!("expected postgrest store");
	};
	assert_eq!(store.url.as_str(), "https://project.supabase.test/");
	assert_eq!(store.api_key, "service-key");
	assert_eq!(store.table, "coins");
	assert_eq!(store.timeout, Some(Duration::from_secs(30)));

	let ImageProviderConfig::Fal(provider) = &config.image_provider else {
		panic!("expected fal provider");
	};
	assert_eq!(provider.api_key, "fal-key");
	assert_eq!(provider.model, "fal-ai/fast-sdxl");
	assert_eq!(provider.polling.poll_interval, Duration::from_secs(2));
	assert_eq!(provider.polling.max_polls, 10);

	assert_eq!(config.coin.symbol.as_deref(), Some("DAILY"));
	assert_eq!(config.notifiers.len(), 1);
	assert_eq!(config.worker.daily_at, NaiveTime::from_hms_opt(12, 30, 0).expect("time"));
	assert_eq!(config.worker.empty_queue, EmptyQueuePolicy::Synthesize);
	assert_eq!(config.worker.mint_retry.max_attempts, 5);
	assert_eq!(config.worker.mint_retry.backoff, BackoffKind::Fixed);
	assert_eq!(config.worker.mint_retry.delay, Duration::from_millis(500));

	config.validate().expect("valid config");
}

#[test]
fn missing_optional_file_is_ignored() {
	let config = load(&[("does-not-exist.yaml".into(), true)], Vec::new()).expect("config");
	assert_eq!(config, CoinMinterConfig::default());

	assert!(load(&[("does-not-exist.yaml".into(), false)], Vec::new()).is_err());
}

#[test]
fn environment_overrides_files() {
	let base = yaml_file(
		r#"
worker:
  run_on_start: true
coin:
  chain_id: 1
"#,
	);

	let env = vec![
		("COIN_MINTER__WORKER__RUN_ON_START".to_string(), "false".to_string()),
		("COIN_MINTER__COIN__CHAIN_ID".to_string(), "84532".to_string()),
		("COIN_MINTER__COIN__PAYOUT_RECIPIENT".to_string(), PAYOUT.to_string()),
		("COIN_MINTER__STORE__API_KEY".to_string(), "12345".to_string()),
		("COIN_MINTER__UPLOADER__JWT".to_string(), "'0042'".to_string()),
		("UNRELATED".to_string(), "1".to_string()),
	];

	let config = load(&[(path(&base), false)], env).expect("config");

	assert!(!config.worker.run_on_start);
	assert_eq!(config.coin.chain_id, 84532);
	assert_eq!(config.coin.payout_recipient, PAYOUT);

	let StoreConfig::Postgrest(store) = &config.store else {
		panic!("expected postgrest store");
	};
	assert_eq!(store.api_key, "12345");

	let UploaderConfig::Pinata(pinata) = &config.uploader;
	assert_eq!(pinata.jwt, "0042");
}

#[test]
fn switching_kind_drops_old_fields() {
	let env = vec![("COIN_MINTER__STORE__KIND".to_string(), "memory".to_string())];

	let config = load(&[], env).expect("config");
	assert_eq!(config.store, StoreConfig::Memory);
}

#[test]
fn maps_merge_and_scalars_replace() {
	let root: serde_yaml::Value = serde_yaml::from_str("{a: {b: 1, c: [1, 2]}, d: x}").expect("yaml");
	let incoming: serde_yaml::Value = serde_yaml::from_str("{a: {c: [3]}, e: y}").expect("yaml");

	let merged = merge(root, incoming);
	let expected: serde_yaml::Value = serde_yaml::from_str("{a: {b: 1, c: [3]}, d: x, e: y}").expect("yaml");

	assert_eq!(merged, expected);
}

#[test]
fn env_values_keep_scalar_types() {
	let current: serde_yaml::Value =
		serde_yaml::from_str("{a: {flag: false, count: 1, key: '', words: x}}").expect("yaml");

	let value = env_overrides(
		&current,
		vec![
			("COIN_MINTER__A__FLAG".to_string(), "true".to_string()),
			("COIN_MINTER__A__COUNT".to_string(), "3".to_string()),
			("COIN_MINTER__A__KEY".to_string(), "007".to_string()),
			("COIN_MINTER__A__WORDS".to_string(), "yes".to_string()),
			("COIN_MINTER__A__EMPTY".to_string(), String::new()),
			("COIN_MINTER__A__NEW".to_string(), "12".to_string()),
		],
	);

	let expected: serde_yaml::Value = serde_yaml::from_str(
		"{a: {flag: true, count: 3, key: '007', words: 'yes', empty: '', new: 12}}",
	)
	.expect("yaml");

	assert_eq!(value, expected);
}

#[test]
fn base_urls_keep_their_last_segment() {
	let url = url::Url::parse("https://api.example.com/v1").expect("url");
	assert_eq!(base_url(&url).join("predictions").expect("join").as_str(), "https://api.example.com/v1/predictions");

	let url = url::Url::parse("https://api.example.com/v1/?x=1").expect("url");
	assert_eq!(base_url(&url).as_str(), "https://api.example.com/v1/?x=1");

	let url = url::Url::parse("https://api.example.com").expect("url");
	assert_eq!(base_url(&url).as_str(), "https://api.example.com/");
}

#[test]
fn generated_config_parses_back() {
	let generated = serde_yaml::to_string(&CoinMinterConfig::default()).expect("serialize");
	let file = yaml_file(&generated);

	let config = load(&[(path(&file), false)], Vec::new()).expect("config");
	assert_eq!(config, CoinMinterConfig::default());
}
