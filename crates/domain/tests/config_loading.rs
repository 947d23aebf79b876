use common::ConfigError;
use domain::config::AnalyzerKind;
use domain::{ImpactScanConfig, Settings};
use rstest::rstest;
use serial_test::serial;
use std::io::Write;

const FULL_CONFIG: &str = r#"
target_dir = "./repo"
include_globs = ["**/*.rs", "**/*.py"]
exclude_globs = ["**/target/**"]

[ripgrep]
context_lines = 4
fixed_strings = false
smart_case = false
threads = 2
include_hidden = true

[preprocess]
analyzer = "heuristics"
drop_comment_lines = false
string_weight_penalty = 0.5
merge_window_lines = 10
max_tokens_file_context = 500
parse_workers = 3

[analysis]
perspectives = ["security", "performance"]
triage_threshold = 0.5
parallelism = 4
rpm_limit = 60
rate_limit_blocking = false

[cache]
enabled = true
dir = ".cache"
ttl_secs = 60

[openai]
enabled = true
model_small = "gpt-4o-mini"
model_large = "gpt-4o"

[output]
dir = "out"
write_summary_md = true
"#;

#[test]
fn test_full_config_round_trip() {
    let config = ImpactScanConfig::from_toml_str(FULL_CONFIG).unwrap();
    assert_eq!(config.include_globs, vec!["**/*.rs", "**/*.py"]);
    assert_eq!(config.ripgrep.threads, 2);
    assert!(config.ripgrep.include_hidden);
    assert_eq!(config.preprocess.analyzer, AnalyzerKind::Heuristics);
    assert_eq!(config.parse_workers(), 3);
    assert_eq!(config.analysis.rpm_limit, Some(60));
    assert_eq!(config.analysis.tpm_limit, Some(1_000_000));
    assert!(!config.analysis.rate_limit_blocking);
    assert_eq!(config.cache.ttl().unwrap().as_secs(), 60);
    assert_eq!(config.openai.base_url, "https://api.openai.com/v1");
    assert!(config.output.write_summary_md);
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FULL_CONFIG.as_bytes()).unwrap();
    let config = ImpactScanConfig::load(file.path()).unwrap();
    assert_eq!(config.analysis.parallelism, 4);

    let missing = ImpactScanConfig::load("/definitely/not/here.toml");
    assert!(matches!(missing, Err(ConfigError::Io { .. })));
}

#[rstest]
#[case("analysis.parallelism", |c: &mut ImpactScanConfig| c.analysis.parallelism = 0)]
#[case("analysis.perspectives", |c: &mut ImpactScanConfig| c.analysis.perspectives.clear())]
#[case("analysis.perspectives", |c: &mut ImpactScanConfig| c.analysis.perspectives = vec!["a".into(), "a".into()])]
#[case("analysis.rpm_limit", |c: &mut ImpactScanConfig| c.analysis.rpm_limit = Some(0))]
#[case("preprocess.string_weight_penalty", |c: &mut ImpactScanConfig| c.preprocess.string_weight_penalty = -0.1)]
#[case("preprocess.merge_window_lines", |c: &mut ImpactScanConfig| c.preprocess.merge_window_lines = 0)]
#[case("preprocess.max_tokens_file_context", |c: &mut ImpactScanConfig| c.preprocess.max_tokens_file_context = 0)]
#[case("target_dir", |c: &mut ImpactScanConfig| c.target_dir = "  ".into())]
#[case("azure_openai.endpoint", |c: &mut ImpactScanConfig| c.azure_openai.enabled = true)]
#[case("openai.model_small", |c: &mut ImpactScanConfig| c.openai.enabled = true)]
fn test_validation_names_offending_field(
    #[case] expected_field: &str,
    #[case] mutate: fn(&mut ImpactScanConfig),
) {
    let mut config = ImpactScanConfig::for_target("./repo");
    mutate(&mut config);
    match config.validated() {
        Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected_field),
        other => panic!("expected invalid {expected_field}, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_settings_prefer_prefixed_variables() {
    let config = ImpactScanConfig::for_target(".");
    std::env::set_var("IMPACTSCAN_OPENAI_API_KEY", "prefixed");
    std::env::set_var("OPENAI_API_KEY", "plain");
    let settings = Settings::load(&config);
    assert_eq!(settings.openai_api_key(), Some("prefixed"));

    std::env::remove_var("IMPACTSCAN_OPENAI_API_KEY");
    let settings = Settings::load(&config);
    assert_eq!(settings.openai_api_key(), Some("plain"));
    std::env::remove_var("OPENAI_API_KEY");
}
