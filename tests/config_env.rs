// tests/config_env.rs
use splint_advisor::config::advisor::{
    ENV_CONFIG_PATH, ENV_CORS_ORIGINS, ENV_DATA_DIR, ENV_MANUFACTURING_URL,
};
use splint_advisor::config::AdvisorConfig;
use splint_advisor::engine::FusionWeights;
use std::path::PathBuf;
use std::{env, fs};

fn clear_env() {
    for key in [ENV_CONFIG_PATH, ENV_CORS_ORIGINS, ENV_DATA_DIR, ENV_MANUFACTURING_URL] {
        env::remove_var(key);
    }
}

#[serial_test::serial]
#[test]
fn file_then_env_overrides() {
    clear_env();
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("advisor.toml");
    fs::write(
        &path,
        r#"
data_dir = "/srv/advisor"
manufacturing_url = "https://file.example/print"
[fusion]
clinical_weight = 0.6
[ai]
enabled = false
"#,
    )
    .unwrap();
    env::set_var(ENV_CONFIG_PATH, path.display().to_string());

    // 1) File values
    let cfg = AdvisorConfig::from_env();
    assert_eq!(cfg.fusion.clinical_weight, 0.6);
    assert!(!cfg.ai.enabled);
    assert_eq!(cfg.data_dir, PathBuf::from("/srv/advisor"));

    // 2) Env beats file
    env::set_var(ENV_DATA_DIR, "  /tmp/cases ");
    env::set_var(ENV_MANUFACTURING_URL, "https://env.example/print");
    env::set_var(ENV_CORS_ORIGINS, "https://app.example, http://localhost:5173");
    let cfg = AdvisorConfig::from_env();
    assert_eq!(cfg.data_dir, PathBuf::from("/tmp/cases"));
    assert_eq!(cfg.manufacturing_url, "https://env.example/print");
    assert_eq!(
        cfg.cors_origins,
        vec!["https://app.example".to_string(), "http://localhost:5173".to_string()]
    );
    assert_eq!(cfg.fusion.clinical_weight, 0.6);

    clear_env();
}

#[serial_test::serial]
#[test]
fn missing_or_broken_file_falls_back_to_defaults() {
    clear_env();
    let tmp = tempfile::tempdir().unwrap();

    env::set_var(ENV_CONFIG_PATH, tmp.path().join("nope.toml").display().to_string());
    let cfg = AdvisorConfig::from_env();
    assert_eq!(cfg.fusion, FusionWeights::default());
    assert_eq!(cfg.evidence.retmax, 5);

    let broken = tmp.path().join("broken.toml");
    fs::write(&broken, "[fusion\nclinical_weight = ").unwrap();
    env::set_var(ENV_CONFIG_PATH, broken.display().to_string());
    let cfg = AdvisorConfig::from_env();
    assert_eq!(cfg.fusion, FusionWeights::default());
    assert_eq!(cfg.data_dir, PathBuf::from("data"));

    // Blank env values do not override.
    env::set_var(ENV_DATA_DIR, "   ");
    assert_eq!(AdvisorConfig::from_env().data_dir, PathBuf::from("data"));

    clear_env();
}
