//! NetworkManager-backed link for Raspberry Pi class boards
//!
//! Association is requested through `nmcli` with `--wait 0` so the call
//! returns immediately and the bounded poll in [`super::associate`] owns the
//! waiting. The passphrase is answered on stdin through `--ask` so it never
//! shows up in the process list. Status and signal strength come straight
//! from the kernel.

use std::fs;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::debug;

use super::{LinkError, NetworkLink};
use crate::config::WifiConfig;

const PROC_WIRELESS: &str = "/proc/net/wireless";

pub struct NmcliLink {
    interface: String,
    ssid: String,
    password: Option<String>,
}

impl NmcliLink {
    pub fn new(config: &WifiConfig) -> Self {
        Self {
            interface: config.interface.clone(),
            ssid: config.ssid.clone(),
            password: config.password.clone().filter(|p| !p.is_empty()),
        }
    }

    fn connect_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.password.is_some() {
            args.push("--ask".to_string());
        }
        args.extend(
            ["--wait", "0", "device", "wifi", "connect"]
                .iter()
                .map(|arg| arg.to_string()),
        );
        args.push(self.ssid.clone());
        args.push("ifname".to_string());
        args.push(self.interface.clone());
        args
    }
}

/// Extracts the signal level of `interface` from `/proc/net/wireless`
///
/// Lines look like `wlan0: 0000   54.  -56.  -256  0 0 0 0 0 0`, where the
/// third value after the colon is the level in dBm.
pub(crate) fn parse_wireless_level(contents: &str, interface: &str) -> Option<i32> {
    contents.lines().find_map(|line| {
        let (name, rest) = line.trim().split_once(':')?;
        if name != interface {
            return None;
        }
        let level = rest.split_whitespace().nth(2)?;
        level
            .trim_end_matches('.')
            .parse::<f32>()
            .ok()
            .map(|dbm| dbm.round() as i32)
    })
}

impl NetworkLink for NmcliLink {
    fn network_name(&self) -> &str {
        &self.ssid
    }

    fn is_associated(&self) -> bool {
        let path = format!("/sys/class/net/{}/operstate", self.interface);
        match fs::read_to_string(&path) {
            Ok(state) => state.trim() == "up",
            Err(e) => {
                debug!("Cannot read {}: {}", path, e);
                false
            }
        }
    }

    fn rssi(&mut self) -> i32 {
        fs::read_to_string(PROC_WIRELESS)
            .ok()
            .and_then(|contents| parse_wireless_level(&contents, &self.interface))
            .unwrap_or(0)
    }

    fn begin(&mut self) -> Result<(), LinkError> {
        let mut child = Command::new("nmcli")
            .args(self.connect_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let (Some(password), Some(mut stdin)) = (&self.password, child.stdin.take()) {
            writeln!(stdin, "{}", password)?;
        }
        let output = child.wait_with_output()?;
        if output.status.success() {
            Ok(())
        } else {
            Err(LinkError::Rejected(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}
