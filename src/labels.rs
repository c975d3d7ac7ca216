use std::{fs, path::Path};

use serde_json::Value;
use tracing::{info, warn};

use crate::error::ServiceError;

pub const DEFAULT_CLASSES: [&str; 2] = ["bad_fruit", "good_fruit"];

pub fn load_class_names(path: &Path) -> Result<Vec<String>, ServiceError> {
    let raw = fs::read_to_string(path)?;
    parse_class_names(&raw)
}

pub fn load_or_default(path: &Path) -> Vec<String> {
    match load_class_names(path) {
        Ok(classes) => {
            info!(path = %path.display(), ?classes, "loaded class names");
            classes
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "cannot read class file, using defaults");
            DEFAULT_CLASSES.iter().map(|s| s.to_string()).collect()
        }
    }
}

pub fn parse_class_names(raw: &str) -> Result<Vec<String>, ServiceError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ServiceError::Labels(e.to_string()))?;

    let entries: Vec<Value> = match value {
        Value::Object(mut map) if matches!(map.get("classes"), Some(Value::Array(_))) => {
            match map.remove("classes") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            }
        }
        Value::Array(items) => items,
        Value::Object(map) => {
            let mut pairs: Vec<(String, Value)> = map.into_iter().collect();
            let all_numeric = pairs.iter().all(|(k, _)| k.parse::<i64>().is_ok());
            if all_numeric {
                pairs.sort_by_key(|(k, _)| k.parse::<i64>().unwrap_or_default());
            } else {
                pairs.sort_by(|a, b| a.0.cmp(&b.0));
            }
            pairs.into_iter().map(|(_, v)| v).collect()
        }
        _ => {
            return Err(ServiceError::Labels(
                "class file must be a list, {\"classes\": [...]} or an index map".into(),
            ));
        }
    };

    let classes = entries
        .into_iter()
        .enumerate()
        .map(|(idx, v)| match v {
            Value::String(s) => Ok(s),
            other => Err(ServiceError::Labels(format!(
                "class entry {idx} is not a string: {other}"
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if classes.len() < 2 {
        return Err(ServiceError::Labels(format!(
            "expected at least two classes, found {}",
            classes.len()
        )));
    }
    Ok(classes)
}

pub fn write_class_names(path: &Path, classes: &[String]) -> Result<(), ServiceError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&serde_json::json!({ "classes": classes }))
        .map_err(|e| ServiceError::Other(e.to_string()))?;
    fs::write(path, json)?;
    Ok(())
}
