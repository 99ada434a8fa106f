//! Display helpers: file sizes and file type icons

use std::collections::HashMap;

use oa_core::config::IconConfig;

const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Human-readable file size, e.g. `"1.54 KB"`.
///
/// The unit is picked from the number of decimal digits (1-3 digits: B,
/// 4-6: KB, ...) and the value is divided by the matching power of 1000.
/// Counts past the GB range come back as the plain number.
pub fn human_readable_size(bytes: u64) -> String {
    let digits = bytes.to_string().len();
    let bucket = (digits - 1) / 3;

    match SIZE_UNITS.get(bucket) {
        Some(unit) => format!(
            "{:.2} {}",
            bytes as f64 / 1000f64.powi(bucket as i32),
            unit
        ),
        None => bytes.to_string(),
    }
}

/// Extension to icon class lookup
#[derive(Debug, Clone)]
pub struct IconMap {
    default: String,
    icons: HashMap<String, String>,
}

impl IconMap {
    pub fn new(default: impl Into<String>, icons: HashMap<String, String>) -> Self {
        Self {
            default: default.into(),
            icons,
        }
    }

    pub fn from_config(config: &IconConfig) -> Self {
        Self::new(config.default.clone(), config.extensions.clone())
    }

    /// Icon class for an extension, or the default one.
    ///
    /// Keys match exactly; callers pass the lowercase extension.
    pub fn icon_class(&self, extension: Option<&str>) -> &str {
        extension
            .and_then(|ext| self.icons.get(ext))
            .map(String::as_str)
            .unwrap_or(self.default.as_str())
    }

    pub fn default_class(&self) -> &str {
        &self.default
    }
}

impl Default for IconMap {
    fn default() -> Self {
        Self::from_config(&IconConfig::default())
    }
}
