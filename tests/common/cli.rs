use assert_cmd::Command;
use std::ffi::OsStr;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};
use tasksync::client::ServiceState;
use tempfile::TempDir;

#[derive(Debug)]
pub struct SyncRun {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
    pub duration: Duration,
    pub log_path: PathBuf,
}

impl SyncRun {
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Temp directory with a config file, two service files and a state dir.
pub struct SyncWorkspace {
    pub temp_dir: TempDir,
    pub root: PathBuf,
    pub log_dir: PathBuf,
}

impl SyncWorkspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let root = temp_dir.path().to_path_buf();
        let log_dir = root.join("logs");
        fs::create_dir_all(&log_dir).expect("log dir");
        let workspace = Self {
            temp_dir,
            root,
            log_dir,
        };
        workspace.write_config("source:\n  path: todoist.json\ntarget:\n  path: gtasks.json\n");
        workspace
    }

    pub fn write_config(&self, yaml: &str) {
        fs::write(self.root.join("tasksync.yaml"), yaml).expect("write config");
    }

    pub fn write_service(&self, name: &str, state: &ServiceState) {
        let json = serde_json::to_string_pretty(state).expect("serialize service");
        fs::write(self.root.join(name), json).expect("write service");
    }

    pub fn read_service(&self, name: &str) -> ServiceState {
        let contents = fs::read_to_string(self.root.join(name)).expect("read service");
        serde_json::from_str(&contents).expect("parse service")
    }

    pub fn state_file(&self, tool: &str) -> PathBuf {
        self.root.join(".tasksync").join(format!("{tool}-mappings.json"))
    }
}

pub fn run_tasksync<I, S>(workspace: &SyncWorkspace, args: I, label: &str) -> SyncRun
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    run_tasksync_with_env(
        workspace,
        args,
        std::iter::empty::<(String, String)>(),
        label,
    )
}

pub fn run_tasksync_with_env<I, S, E, K, V>(
    workspace: &SyncWorkspace,
    args: I,
    env_vars: E,
    label: &str,
) -> SyncRun
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
    E: IntoIterator<Item = (K, V)>,
    K: AsRef<OsStr>,
    V: AsRef<OsStr>,
{
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tasksync"));
    cmd.current_dir(&workspace.root);
    cmd.args(args);
    cmd.env_remove("RUST_LOG");
    cmd.envs(env_vars);
    cmd.env("NO_COLOR", "1");
    cmd.env("RUST_BACKTRACE", "1");
    cmd.env("HOME", &workspace.root);

    let start = Instant::now();
    let output = cmd.output().expect("run tasksync");
    let duration = start.elapsed();

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let log_path = workspace.log_dir.join(format!("{label}.log"));
    let timestamp = SystemTime::now();
    let log_body = format!(
        "label: {label}\nstarted: {:?}\nduration: {:?}\nstatus: {}\nargs: {:?}\ncwd: {}\n\nstdout:\n{}\n\nstderr:\n{}\n",
        timestamp,
        duration,
        output.status,
        cmd.get_args().collect::<Vec<_>>(),
        workspace.root.display(),
        stdout,
        stderr
    );
    fs::write(&log_path, log_body).expect("write log");

    SyncRun {
        stdout,
        stderr,
        status: output.status,
        duration,
        log_path,
    }
}
