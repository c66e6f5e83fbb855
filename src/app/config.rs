use std::path::PathBuf;

use crate::app::AppError;
use crate::domain::schema::{is_valid_identifier, normalize_namespace};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store_path: String,
    pub namespace: String,
    pub class_name: String,
    pub report_dir: PathBuf,
    pub powercfg_path: String,
    pub generator_timeout_secs: u64,
    pub report_source_file: Option<PathBuf>,
    pub keep_reports: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        // A missing .env file is normal; real deployments set the environment.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_namespace =
            string_or_default(&lookup, "BATTERY_NAMESPACE", "root\\cimv2\\BatteryHealth");
        let namespace = normalize_namespace(&raw_namespace).ok_or_else(|| {
            AppError::config(format!(
                "BATTERY_NAMESPACE must be a backslash-separated path of identifiers, got {raw_namespace:?}"
            ))
        })?;

        let class_name = string_or_default(&lookup, "BATTERY_CLASS", "BatteryHealth");
        if !is_valid_identifier(&class_name) {
            return Err(AppError::config(format!(
                "BATTERY_CLASS must be an identifier, got {class_name:?}"
            )));
        }

        let generator_timeout_secs = parse_or_default(&lookup, "GENERATOR_TIMEOUT_SECS", 120_u64)?;
        if generator_timeout_secs == 0 {
            return Err(AppError::config("GENERATOR_TIMEOUT_SECS must be greater than 0"));
        }

        Ok(Self {
            store_path: string_or_default(&lookup, "BATTERY_STORE_PATH", default_store_path()),
            namespace,
            class_name,
            report_dir: PathBuf::from(string_or_default(
                &lookup,
                "BATTERY_REPORT_DIR",
                default_report_dir(),
            )),
            powercfg_path: string_or_default(&lookup, "POWERCFG_PATH", default_powercfg_path()),
            generator_timeout_secs,
            report_source_file: non_empty(&lookup, "REPORT_SOURCE_FILE").map(PathBuf::from),
            keep_reports: parse_bool_or_default(&lookup, "KEEP_REPORTS", false)?,
        })
    }
}

fn default_store_path() -> &'static str {
    if cfg!(windows) {
        "C:\\ProgramData\\BatteryHealth\\battery.db"
    } else {
        "./data/battery.db"
    }
}

fn default_report_dir() -> &'static str {
    if cfg!(windows) {
        "C:\\Windows\\Temp\\BatteryReport"
    } else {
        "./data/reports"
    }
}

fn default_powercfg_path() -> &'static str {
    if cfg!(windows) {
        "C:\\Windows\\System32\\powercfg.exe"
    } else {
        "powercfg"
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn string_or_default<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key).unwrap_or_else(|| default.to_string())
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}

fn parse_bool_or_default<F>(lookup: &F, key: &str, default: bool) -> Result<bool, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = non_empty(lookup, key) else {
        return Ok(default);
    };

    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::config(format!("{key} must be a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::AppConfig;

    #[test]
    fn applies_defaults_for_optional_fields() {
        let result = AppConfig::from_lookup(|_| None).expect("config should be valid");

        assert_eq!(result.namespace, "root\\cimv2\\BatteryHealth");
        assert_eq!(result.class_name, "BatteryHealth");
        assert_eq!(result.generator_timeout_secs, 120);
        assert_eq!(result.report_source_file, None);
        assert!(!result.keep_reports);
        if cfg!(windows) {
            assert_eq!(result.powercfg_path, "C:\\Windows\\System32\\powercfg.exe");
        } else {
            assert_eq!(result.store_path, "./data/battery.db");
            assert_eq!(result.report_dir, PathBuf::from("./data/reports"));
            assert_eq!(result.powercfg_path, "powercfg");
        }
    }

    #[test]
    fn reads_overrides_and_canonicalizes_namespace() {
        let result = AppConfig::from_lookup(|key| match key {
            "BATTERY_NAMESPACE" => Some("root/Inventory/".to_string()),
            "BATTERY_CLASS" => Some("Battery_V2".to_string()),
            "BATTERY_STORE_PATH" => Some(" /srv/battery.db ".to_string()),
            "REPORT_SOURCE_FILE" => Some("/tmp/captured.xml".to_string()),
            "KEEP_REPORTS" => Some("yes".to_string()),
            "GENERATOR_TIMEOUT_SECS" => Some("30".to_string()),
            _ => None,
        })
        .expect("config should be valid");

        assert_eq!(result.namespace, "root\\Inventory");
        assert_eq!(result.class_name, "Battery_V2");
        assert_eq!(result.store_path, "/srv/battery.db");
        assert_eq!(
            result.report_source_file,
            Some(PathBuf::from("/tmp/captured.xml"))
        );
        assert!(result.keep_reports);
        assert_eq!(result.generator_timeout_secs, 30);
    }

    #[test]
    fn rejects_invalid_numeric_values() {
        let result = AppConfig::from_lookup(|key| match key {
            "GENERATOR_TIMEOUT_SECS" => Some("abc".to_string()),
            _ => None,
        });

        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: GENERATOR_TIMEOUT_SECS must be a valid number"
        );
    }

    #[test]
    fn rejects_zero_timeout() {
        let result = AppConfig::from_lookup(|key| match key {
            "GENERATOR_TIMEOUT_SECS" => Some("0".to_string()),
            _ => None,
        });

        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: GENERATOR_TIMEOUT_SECS must be greater than 0"
        );
    }

    #[test]
    fn rejects_invalid_class_name_and_boolean() {
        let class = AppConfig::from_lookup(|key| match key {
            "BATTERY_CLASS" => Some("Battery Health".to_string()),
            _ => None,
        });
        assert!(class.is_err());

        let keep = AppConfig::from_lookup(|key| match key {
            "KEEP_REPORTS" => Some("maybe".to_string()),
            _ => None,
        });
        assert_eq!(
            keep.unwrap_err().to_string(),
            "invalid configuration: KEEP_REPORTS must be a boolean"
        );
    }
}
