//! Container runtime driver: a thin, stateless wrapper around the docker CLI.

use std::{
    collections::{BTreeMap, HashMap},
    env,
    ffi::OsString,
    path::PathBuf,
    time::{Duration, SystemTime},
};

use {
    async_trait::async_trait,
    serde::Deserialize,
    tokio::process::Command,
    tracing::{debug, warn},
};

use crate::{
    error::{Error, Result},
    types::SlotPorts,
};

/// Internal container ports bound by `run`.
pub const INTERNAL_APP_PORT: u16 = 8080;
pub const INTERNAL_DEBUGGER_PORT: u16 = 19222;
pub const INTERNAL_VNC_PORT: u16 = 15900;

const AVAILABILITY_ATTEMPTS: u32 = 50;
const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(5);
const AVAILABILITY_INTERVAL: Duration = Duration::from_secs(5);

/// Host-to-container port bindings for a slot, in `-p HOST:CONTAINER` order.
pub fn port_bindings(ports: &SlotPorts) -> Vec<(u16, u16)> {
    vec![
        (ports.app, INTERNAL_APP_PORT),
        (ports.debugger, INTERNAL_DEBUGGER_PORT),
        (ports.vnc, INTERNAL_VNC_PORT),
    ]
}

/// Parsed metadata for one container, from `inspect`.
#[derive(Debug, Clone, Default)]
pub struct ContainerInfo {
    pub name: String,
    pub labels: HashMap<String, String>,
    pub created: Option<SystemTime>,
    pub running: bool,
    pub ports: Vec<PortBinding>,
}

/// One host binding of a container port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortBinding {
    pub host: u16,
    pub container: u16,
}

/// One line of `ps` output for a pool container.
#[derive(Debug, Clone)]
pub struct PsEntry {
    pub name: String,
    pub image: String,
    pub status: String,
    pub ports: String,
}

/// The seam between the pool and the container runtime. `DockerCli` is the
/// production implementation; tests substitute an in-memory fake.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Block until the runtime answers `info`, or fail after the attempt cap.
    async fn ensure_available(&self) -> Result<()>;

    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Launch a detached, auto-remove container bound to the slot's ports.
    async fn run(
        &self,
        name: &str,
        image: &str,
        envs: &BTreeMap<String, String>,
        ports: &[(u16, u16)],
        extra_args: &BTreeMap<String, String>,
    ) -> Result<()>;

    async fn stop(&self, name: &str) -> Result<()>;

    async fn restart(&self, name: &str) -> Result<()>;

    /// Names of containers whose name starts with `<prefix>-`.
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// `ps` lines (name, image, status, ports) for containers matching the
    /// prefix. Malformed lines are logged and skipped, never an error.
    async fn ps_entries(&self, prefix: &str) -> Result<Vec<PsEntry>>;

    async fn inspect(&self, name: &str) -> Result<ContainerInfo>;
}

/// Shells out to the local docker CLI.
///
/// The binary is `docker` on the assembled PATH, or the `DOCKER_PATH` env var
/// when set. Platform-default install locations are prefixed ahead of the
/// inherited PATH so the CLI is found even under minimal service environments.
pub struct DockerCli {
    binary: PathBuf,
    path_env: OsString,
    forwarded_env: Vec<(String, String)>,
}

/// Env vars forwarded to every CLI invocation when present.
const FORWARDED_VARS: &[&str] = &["DOCKER_HOST", "DOCKER_TLS_VERIFY", "DOCKER_CERT_PATH"];

#[cfg(target_os = "windows")]
const PLATFORM_PATHS: &[&str] = &[
    r"C:\Program Files\Docker\Docker\resources\bin",
    r"C:\Program Files\Docker\Docker\resources",
];

#[cfg(target_os = "macos")]
const PLATFORM_PATHS: &[&str] = &[
    "/usr/local/bin",
    "/opt/homebrew/bin",
    "/Applications/Docker.app/Contents/Resources/bin",
];

#[cfg(all(not(target_os = "windows"), not(target_os = "macos")))]
const PLATFORM_PATHS: &[&str] = &["/usr/bin", "/usr/local/bin", "/snap/bin"];

impl DockerCli {
    pub fn from_env() -> Self {
        let binary = env::var("DOCKER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("docker"));

        let forwarded_env = FORWARDED_VARS
            .iter()
            .filter_map(|k| env::var(k).ok().map(|v| (k.to_string(), v)))
            .collect();

        Self {
            binary,
            path_env: assemble_path(env::var_os("PATH")),
            forwarded_env,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.env("PATH", &self.path_env);
        for (k, v) in &self.forwarded_env {
            cmd.env(k, v);
        }
        cmd.kill_on_drop(true);
        cmd
    }

    async fn output(&self, args: &[&str]) -> Result<std::process::Output> {
        debug!(args = ?args, "docker invocation");
        Ok(self.command().args(args).output().await?)
    }
}

/// Prefix platform-default docker locations ahead of the inherited PATH.
fn assemble_path(inherited: Option<OsString>) -> OsString {
    let mut parts: Vec<PathBuf> = PLATFORM_PATHS.iter().map(PathBuf::from).collect();
    if let Some(path) = inherited {
        parts.extend(env::split_paths(&path));
    }
    env::join_paths(parts).unwrap_or_default()
}

fn stderr_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn ensure_available(&self) -> Result<()> {
        for attempt in 1..=AVAILABILITY_ATTEMPTS {
            match tokio::time::timeout(AVAILABILITY_TIMEOUT, self.output(&["info"])).await {
                Ok(Ok(output)) if output.status.success() => return Ok(()),
                Ok(Ok(output)) => {
                    debug!(attempt, stderr = %stderr_of(&output), "runtime not ready");
                },
                Ok(Err(e)) => {
                    debug!(attempt, error = %e, "runtime probe failed");
                },
                Err(_) => {
                    debug!(attempt, "runtime probe timed out");
                },
            }
            if attempt < AVAILABILITY_ATTEMPTS {
                tokio::time::sleep(AVAILABILITY_INTERVAL).await;
            }
        }
        Err(Error::RuntimeUnavailable { attempts: AVAILABILITY_ATTEMPTS })
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let output = self.output(&["pull", image]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::ImagePullFailed(stderr_of(&output)))
        }
    }

    async fn run(
        &self,
        name: &str,
        image: &str,
        envs: &BTreeMap<String, String>,
        ports: &[(u16, u16)],
        extra_args: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--pull".into(),
            "never".into(),
            "--rm".into(),
        ];
        for (k, v) in extra_args {
            args.push(format!("--{k}={v}"));
        }
        args.push("--name".into());
        args.push(name.to_string());
        for (k, v) in envs {
            args.push("-e".into());
            args.push(format!("{k}={v}"));
        }
        for (host, container) in ports {
            args.push("-p".into());
            args.push(format!("{host}:{container}"));
        }
        args.push(image.to_string());

        let output = self.command().args(&args).output().await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::RunFailed(format!("{name}: {}", stderr_of(&output))))
        }
    }

    async fn stop(&self, name: &str) -> Result<()> {
        let output = self.output(&["stop", name]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::classify_stop(name, &stderr_of(&output)))
        }
    }

    async fn restart(&self, name: &str) -> Result<()> {
        let output = self.output(&["restart", name]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::classify_restart(name, &stderr_of(&output)))
        }
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let output = self.output(&["ps", "--format", "{{.Names}}"]).await?;
        if !output.status.success() {
            return Err(Error::Parse(format!("ps failed: {}", stderr_of(&output))));
        }
        Ok(filter_names(&output.stdout, prefix))
    }

    async fn ps_entries(&self, prefix: &str) -> Result<Vec<PsEntry>> {
        let output = self
            .output(&["ps", "--format", "{{.Names}}\t{{.Image}}\t{{.Status}}\t{{.Ports}}"])
            .await?;
        if !output.status.success() {
            return Err(Error::Parse(format!("ps failed: {}", stderr_of(&output))));
        }
        let name_prefix = format!("{prefix}-");
        let mut entries = Vec::new();
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            if !line.trim_start().starts_with(&name_prefix) {
                continue;
            }
            match parse_ps_line(line) {
                Some(entry) => entries.push(entry),
                None => warn!(line, "skipping malformed ps line"),
            }
        }
        Ok(entries)
    }

    async fn inspect(&self, name: &str) -> Result<ContainerInfo> {
        let output = self.output(&["inspect", name]).await?;
        if !output.status.success() {
            return Err(Error::Parse(format!(
                "inspect {name} failed: {}",
                stderr_of(&output)
            )));
        }
        parse_inspect_output(&output.stdout)
    }
}

fn filter_names(stdout: &[u8], prefix: &str) -> Vec<String> {
    let name_prefix = format!("{prefix}-");
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .filter(|name| name.starts_with(&name_prefix))
        .map(str::to_string)
        .collect()
}

/// Split one `ps` line into its four columns. Lines with fewer fields are
/// rejected so callers can log and skip them.
fn parse_ps_line(line: &str) -> Option<PsEntry> {
    let mut fields = line.split('\t').map(str::trim);
    let name = fields.next()?.to_string();
    let image = fields.next()?.to_string();
    let status = fields.next()?.to_string();
    let ports = fields.next()?.to_string();
    if name.is_empty() || image.is_empty() || status.is_empty() {
        return None;
    }
    Some(PsEntry { name, image, status, ports })
}

/// Map a `ps` ports column onto the slot's three external ports.
///
/// Recognizes `0.0.0.0:EXT->INT/tcp` entries. The internal ports understood
/// here (`5900` vnc, `3000` app, `4444` debugger) intentionally differ from
/// the ports `run` binds; see DESIGN.md before touching either set.
pub fn parse_ports_line(line: &str) -> SlotPorts {
    let mut ports = SlotPorts::default();
    for entry in line.split(',').map(str::trim) {
        let Some((host_part, container_part)) = entry.split_once("->") else {
            continue;
        };
        let Some(ext) = host_part.rsplit(':').next().and_then(|p| p.parse::<u16>().ok()) else {
            continue;
        };
        let internal = container_part
            .split('/')
            .next()
            .and_then(|p| p.parse::<u16>().ok());
        match internal {
            Some(5900) => ports.vnc = ext,
            Some(3000) => ports.app = ext,
            Some(4444) => ports.debugger = ext,
            _ => {},
        }
    }
    ports
}

// ── inspect JSON ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct InspectEntry {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Created", default)]
    created: Option<String>,
    #[serde(rename = "Config", default)]
    config: InspectConfig,
    #[serde(rename = "State", default)]
    state: InspectState,
    #[serde(rename = "NetworkSettings", default)]
    network: InspectNetwork,
}

#[derive(Deserialize, Default)]
struct InspectConfig {
    #[serde(rename = "Labels", default)]
    labels: Option<HashMap<String, String>>,
}

#[derive(Deserialize, Default)]
struct InspectState {
    #[serde(rename = "Running", default)]
    running: bool,
}

#[derive(Deserialize, Default)]
struct InspectNetwork {
    #[serde(rename = "Ports", default)]
    ports: HashMap<String, Option<Vec<InspectHostPort>>>,
}

#[derive(Deserialize)]
struct InspectHostPort {
    #[serde(rename = "HostPort")]
    host_port: String,
}

fn parse_inspect_output(stdout: &[u8]) -> Result<ContainerInfo> {
    let entries: Vec<InspectEntry> = serde_json::from_slice(stdout)
        .map_err(|e| Error::Parse(format!("inspect JSON: {e}")))?;
    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| Error::Parse("inspect returned no entries".into()))?;

    let mut ports = Vec::new();
    for (key, bindings) in &entry.network.ports {
        let Some(container) = key.split('/').next().and_then(|p| p.parse::<u16>().ok()) else {
            continue;
        };
        for binding in bindings.iter().flatten() {
            if let Ok(host) = binding.host_port.parse::<u16>() {
                ports.push(PortBinding { host, container });
            }
        }
    }

    let created = entry
        .created
        .as_deref()
        .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
        .map(SystemTime::from);

    Ok(ContainerInfo {
        name: entry.name.trim_start_matches('/').to_string(),
        labels: entry.config.labels.unwrap_or_default(),
        created,
        running: entry.state.running,
        ports,
    })
}
