use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::{DEFAULT_BATCH_LEN, DEFAULT_MARKER, FrameFormat};

pub const DEFAULT_BAUD_RATE: u32 = 230_400;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThemeKind {
    Dark,
    Light,
}

impl ThemeKind {
    pub fn label(self) -> &'static str {
        match self {
            ThemeKind::Dark => "Dark",
            ThemeKind::Light => "Light",
        }
    }

    pub fn from_key(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "light" => ThemeKind::Light,
            _ => ThemeKind::Dark,
        }
    }

    pub fn as_key(self) -> &'static str {
        match self {
            ThemeKind::Dark => "dark",
            ThemeKind::Light => "light",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppSettings {
    pub theme: ThemeKind,
    pub port: Option<String>,
    pub baud_rate: u32,
    pub marker: u8,
    pub batch_len: usize,
    pub read_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub bin_width_hz: f32,
    pub y_min: f32,
    pub y_max: f32,
    pub smoothing: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: ThemeKind::Dark,
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            marker: DEFAULT_MARKER,
            batch_len: DEFAULT_BATCH_LEN,
            read_timeout_ms: 1_000,
            poll_interval_ms: 10,
            bin_width_hz: 4.0,
            y_min: 0.0,
            y_max: 200.0,
            smoothing: true,
        }
    }
}

impl AppSettings {
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(raw) => Self::parse(&raw),
            Err(_) => AppSettings::default(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        let mut settings = AppSettings::default();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                apply_kv(key.trim(), value.trim(), &mut settings);
            }
        }
        settings
    }

    pub fn save(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Err(err) = fs::write(path, self.to_config_string()) {
            log::warn!("Could not save settings to {}: {err}", path.display());
        }
    }

    pub fn to_config_string(&self) -> String {
        let mut buf = String::new();
        buf.push_str(&format!("theme={}\n", self.theme.as_key()));
        if let Some(port) = &self.port {
            buf.push_str(&format!("port={port}\n"));
        }
        buf.push_str(&format!("baud_rate={}\n", self.baud_rate));
        buf.push_str(&format!("marker=0x{:02X}\n", self.marker));
        buf.push_str(&format!("batch_len={}\n", self.batch_len));
        buf.push_str(&format!("read_timeout_ms={}\n", self.read_timeout_ms));
        buf.push_str(&format!("poll_interval_ms={}\n", self.poll_interval_ms));
        buf.push_str(&format!("bin_width_hz={}\n", self.bin_width_hz));
        buf.push_str(&format!("y_min={}\n", self.y_min));
        buf.push_str(&format!("y_max={}\n", self.y_max));
        buf.push_str(&format!("smoothing={}\n", self.smoothing));
        buf
    }

    pub fn frame_format(&self) -> FrameFormat {
        FrameFormat {
            marker: self.marker,
            batch_len: self.batch_len,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Settings for one run of the app.
///
/// `stored` mirrors the settings file; `effective` adds the command-line
/// overrides on top. Edits made in the UI go into both, and only `stored`
/// is ever written back, so overrides last for a single run.
pub struct RunSettings {
    path: PathBuf,
    stored: AppSettings,
    effective: AppSettings,
}

impl RunSettings {
    pub fn new(path: PathBuf, stored: AppSettings, effective: AppSettings) -> Self {
        Self {
            path,
            stored,
            effective,
        }
    }

    pub fn effective(&self) -> &AppSettings {
        &self.effective
    }

    pub fn set_theme(&mut self, theme: ThemeKind) {
        self.stored.theme = theme;
        self.effective.theme = theme;
    }

    pub fn set_port(&mut self, port: Option<String>) {
        self.stored.port = port.clone();
        self.effective.port = port;
    }

    pub fn set_smoothing(&mut self, smoothing: bool) {
        self.stored.smoothing = smoothing;
        self.effective.smoothing = smoothing;
    }

    pub fn save(&self) {
        self.stored.save(&self.path);
    }
}

pub fn default_settings_path() -> PathBuf {
    config_dir().join("batchscope.cfg")
}

fn apply_kv(key: &str, value: &str, settings: &mut AppSettings) {
    match key {
        "theme" => settings.theme = ThemeKind::from_key(value),
        "port" => {
            settings.port = if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            }
        }
        "baud_rate" => parse_into(value, &mut settings.baud_rate),
        "marker" => {
            if let Some(marker) = parse_marker(value) {
                settings.marker = marker;
            }
        }
        "batch_len" => {
            if let Ok(len) = value.parse::<u16>() {
                if len > 0 {
                    settings.batch_len = len as usize;
                }
            }
        }
        "read_timeout_ms" => parse_into(value, &mut settings.read_timeout_ms),
        "poll_interval_ms" => parse_into(value, &mut settings.poll_interval_ms),
        "bin_width_hz" => {
            if let Ok(width) = value.parse::<f32>() {
                if width.is_finite() && width > 0.0 {
                    settings.bin_width_hz = width;
                }
            }
        }
        "y_min" => parse_into(value, &mut settings.y_min),
        "y_max" => parse_into(value, &mut settings.y_max),
        "smoothing" => parse_into(value, &mut settings.smoothing),
        _ => {}
    }
}

fn parse_into<T: std::str::FromStr>(value: &str, target: &mut T) {
    if let Ok(v) = value.parse::<T>() {
        *target = v;
    }
}

/// Accepts `0xAA`, `0XAA` or plain decimal.
pub fn parse_marker(value: &str) -> Option<u8> {
    let value = value.trim();
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => value.parse::<u8>().ok(),
    }
}

fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(roaming) = std::env::var("APPDATA") {
            return PathBuf::from(roaming).join("BatchScope");
        }
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            return PathBuf::from(local).join("BatchScope");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = home_dir() {
            return home
                .join("Library")
                .join("Application Support")
                .join("BatchScope");
        }
    }

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("batchscope");
    }

    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("batchscope")
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from).or_else(|| {
        #[cfg(target_os = "windows")]
        {
            std::env::var("USERPROFILE").ok().map(PathBuf::from)
        }
        #[cfg(not(target_os = "windows"))]
        {
            None
        }
    })
}
