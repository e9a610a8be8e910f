//! Pool configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{SlotPorts, Viewport};

/// Configuration for one pool instance.
///
/// `launch_args` and `additional_docker_args` are ordered maps so the emitted
/// `run` command line is deterministic for a given configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Image reference passed to `run`.
    pub image_name: String,
    /// Name prefix for slots and container discovery.
    pub prefix: String,
    /// Pool size `N`.
    pub num_browsers: usize,
    /// Base of the debugger port stride; also the slot-name suffix base.
    pub base_browser_port: u16,
    /// Base of the app (agent) port stride.
    pub base_app_port: u16,
    /// Base of the VNC port stride.
    pub base_vnc_port: u16,
    /// Default viewport and `XVFB_RESOLUTION` for new containers.
    pub resolution: Viewport,
    /// Extra env vars merged into every `run`.
    pub launch_args: BTreeMap<String, String>,
    /// Extra `--key=value` flags passed verbatim to `run`.
    pub additional_docker_args: BTreeMap<String, String>,
    /// Cap on container create and stop retries.
    pub max_retries: u32,
    /// Backoff between retries, in milliseconds.
    pub kill_wait_time_ms: u64,
    /// Overrides the agent connection host when set.
    pub connection_host: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            image_name: default_image_name(),
            prefix: "berth".to_string(),
            num_browsers: 2,
            base_browser_port: 10222,
            base_app_port: 7070,
            base_vnc_port: 15900,
            resolution: Viewport { width: 1280, height: 720 },
            launch_args: BTreeMap::new(),
            additional_docker_args: BTreeMap::new(),
            max_retries: 3,
            kill_wait_time_ms: 2000,
            connection_host: None,
        }
    }
}

fn default_image_name() -> String {
    "berth/browser:latest".to_string()
}

impl PoolConfig {
    /// Stable slot name for a pool index: `<prefix>-<baseBrowserPort + i>`.
    pub fn slot_name(&self, index: usize) -> String {
        format!("{}-{}", self.prefix, self.base_browser_port as usize + index)
    }

    /// The three external ports for a pool index. Disjoint across indices
    /// because each stride advances by one per slot.
    pub fn ports_for(&self, index: usize) -> SlotPorts {
        SlotPorts {
            app: self.base_app_port + index as u16,
            debugger: self.base_browser_port + index as u16,
            vnc: self.base_vnc_port + index as u16,
        }
    }

    /// Build a config from environment variables, starting from defaults.
    /// Unset or unparseable variables keep the default.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("BROWSER_IMAGE_NAME") {
            cfg.image_name = v;
        }
        if let Ok(v) = std::env::var("BROWSER_PREFIX") {
            cfg.prefix = v;
        }
        if let Ok(v) = std::env::var("NUM_BROWSERS")
            && let Ok(n) = v.parse()
        {
            cfg.num_browsers = n;
        }
        if let Ok(v) = std::env::var("BASE_BROWSER_PORT")
            && let Ok(p) = v.parse()
        {
            cfg.base_browser_port = p;
        }
        if let Ok(v) = std::env::var("BASE_APP_PORT")
            && let Ok(p) = v.parse()
        {
            cfg.base_app_port = p;
        }
        if let Ok(v) = std::env::var("BASE_VNC_PORT")
            && let Ok(p) = v.parse()
        {
            cfg.base_vnc_port = p;
        }
        if let Ok(v) = std::env::var("RESOLUTION")
            && let Ok(r) = v.parse()
        {
            cfg.resolution = r;
        }
        if let Ok(v) = std::env::var("LAUNCH_ARGS") {
            cfg.launch_args = parse_kv_list(&v);
        }
        if let Ok(v) = std::env::var("ADDITIONAL_DOCKER_ARGS") {
            cfg.additional_docker_args = parse_kv_list(&v);
        }
        if let Ok(v) = std::env::var("MAX_RETRIES")
            && let Ok(n) = v.parse()
        {
            cfg.max_retries = n;
        }
        if let Ok(v) = std::env::var("KILL_WAIT_TIME")
            && let Ok(ms) = v.parse()
        {
            cfg.kill_wait_time_ms = ms;
        }
        match std::env::var("BROWSER_CONNECTION_HOST") {
            Ok(v) if !v.is_empty() => cfg.connection_host = Some(v),
            // Pod IP is the connection host when running inside a cluster.
            _ => {
                if let Ok(v) = std::env::var("BROWSER_POD_IP")
                    && !v.is_empty()
                {
                    cfg.connection_host = Some(v);
                }
            },
        }
        cfg
    }
}

/// Parse `"K=V,K2=V2"` into an ordered map. Entries without `=` are skipped.
fn parse_kv_list(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|entry| {
            let (k, v) = entry.split_once('=')?;
            let k = k.trim();
            if k.is_empty() {
                return None;
            }
            Some((k.to_string(), v.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_names_follow_browser_port_stride() {
        let cfg = PoolConfig {
            prefix: "bx".into(),
            base_browser_port: 10222,
            ..Default::default()
        };
        assert_eq!(cfg.slot_name(0), "bx-10222");
        assert_eq!(cfg.slot_name(1), "bx-10223");
    }

    #[test]
    fn ports_are_disjoint_across_indices() {
        let cfg = PoolConfig::default();
        let n = 8;
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    assert!(
                        !cfg.ports_for(i).overlaps(&cfg.ports_for(j)),
                        "ports of {i} and {j} overlap"
                    );
                }
            }
        }
    }

    #[test]
    fn kv_list_parsing() {
        let map = parse_kv_list("A=1,B=two, C = 3 ,broken,=empty");
        assert_eq!(map.len(), 3);
        assert_eq!(map["A"], "1");
        assert_eq!(map["B"], "two");
        assert_eq!(map["C"], "3");
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = PoolConfig::default();
        assert!(cfg.num_browsers > 0);
        assert!(cfg.max_retries > 0);
        assert_eq!(cfg.resolution.xvfb_resolution(), "1280x720");
    }
}
