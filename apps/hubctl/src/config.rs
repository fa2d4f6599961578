use std::{collections::HashMap, fs};

use anyhow::{bail, Context};
use url::Url;

#[derive(Debug)]
pub struct Settings {
    pub hub_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hub_url: "http://192.168.4.1".into(),
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("hubctl.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("hub_url") {
                settings.hub_url = v.clone();
            }
        }
    }

    if let Ok(v) = std::env::var("HUB_URL") {
        settings.hub_url = v;
    }
    if let Ok(v) = std::env::var("APP__HUB_URL") {
        settings.hub_url = v;
    }

    settings
}

/// Validates the hub base URL and strips any trailing slash so endpoint
/// paths can be appended verbatim.
pub fn validate_hub_url(raw: &str) -> anyhow::Result<String> {
    let url = Url::parse(raw).with_context(|| format!("invalid hub url '{raw}'"))?;
    match url.scheme() {
        "http" | "https" => {}
        other => bail!("unsupported hub url scheme '{other}' (use http or https)"),
    }
    Ok(raw.trim_end_matches('/').to_string())
}
