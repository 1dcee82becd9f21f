use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use live_detect::config::ClientConfig;
use live_detect::FacingMode;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "LIVE_DETECT_CONFIG",
        "LIVE_DETECT_SERVER_URL",
        "LIVE_DETECT_FPS",
        "LIVE_DETECT_CONFIDENCE",
        "LIVE_DETECT_FACING",
        "LIVE_DETECT_TIMEOUT_MS",
        "LIVE_DETECT_SNAPSHOT",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ClientConfig::load().expect("load defaults");
    assert_eq!(cfg.server_url, "http://127.0.0.1:5000");
    assert_eq!(cfg.target_fps, 10);
    assert_eq!(cfg.confidence_threshold, 0.25);
    assert_eq!(cfg.jpeg_quality, 80);
    assert_eq!(cfg.request_timeout, Duration::from_millis(5000));
    assert_eq!(cfg.camera.facing, FacingMode::Environment);
    assert_eq!((cfg.camera.width, cfg.camera.height), (1280, 720));
    assert!(cfg.snapshot_path.is_none());
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "server": { "url": "http://192.168.1.20:5000", "request_timeout_ms": 2500 },
        "detection": { "target_fps": 4, "confidence": 0.5, "jpeg_quality": 70 },
        "camera": {
            "facing": "user",
            "width": 640,
            "height": 480,
            "user_source": "stub://selfie?warmup=2",
            "environment_source": ""
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("LIVE_DETECT_CONFIG", file.path());
    std::env::set_var("LIVE_DETECT_FPS", "15");
    std::env::set_var("LIVE_DETECT_SNAPSHOT", "/tmp/overlay.png");

    let cfg = ClientConfig::load().expect("load config");

    assert_eq!(cfg.server_url, "http://192.168.1.20:5000");
    assert_eq!(cfg.request_timeout, Duration::from_millis(2500));
    assert_eq!(cfg.target_fps, 15);
    assert_eq!(cfg.confidence_threshold, 0.5);
    assert_eq!(cfg.jpeg_quality, 70);
    assert_eq!(cfg.camera.facing, FacingMode::User);
    assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
    assert_eq!(cfg.camera.user_source, "stub://selfie?warmup=2");
    assert_eq!(cfg.camera.environment_source, "");
    assert_eq!(
        cfg.snapshot_path.as_deref(),
        Some(std::path::Path::new("/tmp/overlay.png"))
    );

    clear_env();
}

#[test]
fn loads_toml_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
[server]
url = "https://detector.local"

[detection]
confidence = 0.4

[overlay]
snapshot_path = "frames/last.jpg"
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    let cfg = ClientConfig::load_from(Some(file.path())).expect("load toml");
    assert_eq!(cfg.server_url, "https://detector.local");
    assert_eq!(cfg.confidence_threshold, 0.4);
    assert_eq!(cfg.target_fps, 10);
    assert_eq!(
        cfg.snapshot_path.as_deref(),
        Some(std::path::Path::new("frames/last.jpg"))
    );
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("LIVE_DETECT_FPS", "0");
    assert!(ClientConfig::load().is_err());
    clear_env();

    std::env::set_var("LIVE_DETECT_FPS", "ten");
    assert!(ClientConfig::load().is_err());
    clear_env();

    std::env::set_var("LIVE_DETECT_CONFIDENCE", "1.5");
    assert!(ClientConfig::load().is_err());
    clear_env();

    std::env::set_var("LIVE_DETECT_SERVER_URL", "ftp://host");
    assert!(ClientConfig::load().is_err());
    clear_env();

    std::env::set_var("LIVE_DETECT_TIMEOUT_MS", "0");
    assert!(ClientConfig::load().is_err());
    clear_env();

    std::env::set_var("LIVE_DETECT_FACING", "sideways");
    assert!(ClientConfig::load().is_err());
    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("absent.json");
    let err = ClientConfig::load_from(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
}
