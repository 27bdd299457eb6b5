use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    temp_dir: TempDir,
    home: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            temp_dir,
            home,
            xdg_config,
            xdg_state,
        }
    }

    fn write_config(&self, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join("config.toml");
        fs::write(&path, contents).expect("failed to write config");
        path
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("triagent"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute triagent: {e}"))
}

#[test]
fn help_lists_overrides() {
    let env = CliTestEnv::new();
    let output = run_bin(&env, &["--help"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in ["--depth-limit", "--threshold", "--log-dir", "--docs-dir", "--format"] {
        assert!(stdout.contains(flag), "missing {flag} in help:\n{stdout}");
    }
}

#[test]
fn query_is_required() {
    let env = CliTestEnv::new();
    let output = run_bin(&env, &[]);
    assert!(!output.status.success());
}

#[test]
fn missing_llm_section_is_reported() {
    let env = CliTestEnv::new();
    let output = run_bin(&env, &["find", "last", "week's", "error", "logs"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("no [llm] section configured"),
        "unexpected stderr:\n{stderr}"
    );
}

#[test]
fn zero_depth_limit_is_rejected() {
    let env = CliTestEnv::new();
    let config = env.write_config("[llm]\nprovider = \"ollama\"\nmodel = \"llama3.2\"\n");
    let config = config.to_string_lossy().into_owned();

    let output = run_bin(&env, &["--config", &config, "--depth-limit", "0", "show errors"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("depth_limit"), "unexpected stderr:\n{stderr}");
}

#[test]
fn request_log_is_flushed_on_exit() {
    let env = CliTestEnv::new();
    // nothing listens on the discard port, so triage degrades to a clarification
    let config = env.write_config(
        "[llm]\nprovider = \"ollama\"\nmodel = \"llama3.2\"\nendpoint = \"http://127.0.0.1:9\"\ntimeout_secs = 2\n",
    );
    let config = config.to_string_lossy().into_owned();

    let output = run_bin(&env, &["--config", &config, "show", "errors"]);
    assert!(output.status.success(), "stderr:\n{}", String::from_utf8_lossy(&output.stderr));

    let log_dir = env.xdg_state.join("triagent");
    let logged: String = fs::read_dir(&log_dir)
        .expect("log directory should exist")
        .filter_map(|entry| fs::read_to_string(entry.ok()?.path()).ok())
        .collect();
    assert!(
        logged.contains("triagent starting request"),
        "request not logged:\n{logged}"
    );
    assert!(logged.contains("request_id="), "request span missing:\n{logged}");
}
