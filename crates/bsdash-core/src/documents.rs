//! Documents read from the QC directory: subject list, polled status, run
//! parameters and the optional dashboard config.
//!
//! The dashboard only ever reads these files; the pipeline process owns them.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::DashboardConfig;
use crate::error::Result;

pub const SUBJECTS_FILE: &str = "subjectIDs.json";
pub const STATUS_FILE: &str = "brainsuite_state.json";
pub const RUN_PARAMS_FILE: &str = "brainsuite_run_params.json";
pub const DASHBOARD_CONFIG_FILE: &str = "brainsuite_dashboard_config.json";
pub const DASHBOARD_CONFIG_YAML_FILE: &str = "brainsuite_dashboard_config.yaml";

/// `subjectIDs.json`: defines the index space of every per-subject array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectList {
    pub subjects: Vec<String>,
}

/// `brainsuite_state.json`, rewritten by the pipeline while it runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusDocument {
    /// One status string per subject, aligned with the subject list.
    #[serde(default)]
    pub process_states: Vec<Option<String>>,
    #[serde(default)]
    pub start_time: Option<serde_json::Value>,
    #[serde(default)]
    pub update_time: Option<serde_json::Value>,
    #[serde(default)]
    pub runtime: Option<serde_json::Value>,
    #[serde(default)]
    pub status: Option<serde_json::Value>,
    /// True once the pipeline has concluded.
    #[serde(default)]
    pub end: bool,
}

/// `brainsuite_run_params.json`: free-form metadata shown verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunParameters(pub serde_json::Value);

impl RunParameters {
    pub fn dataset_name(&self) -> Option<&str> {
        self.0
            .get("DATASET DESCRIPTION")?
            .get(0)?
            .get("Dataset Name")?
            .as_str()
    }

    /// Line shown in the dashboard header.
    pub fn describe(params: Option<&RunParameters>) -> String {
        match params.and_then(RunParameters::dataset_name) {
            Some(name) => format!("Dataset Name: {}", name),
            None if params.is_some() => "Dataset Name: (not specified)".to_string(),
            None => "BrainSuite run parameters unavailable.".to_string(),
        }
    }
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

pub fn load_subject_list(qc_dir: &Path) -> Result<SubjectList> {
    load_json(&qc_dir.join(SUBJECTS_FILE))
}

pub fn load_status(qc_dir: &Path) -> Result<StatusDocument> {
    load_json(&qc_dir.join(STATUS_FILE))
}

/// Missing or unreadable run parameters are tolerated.
pub fn load_run_parameters(qc_dir: &Path) -> Option<RunParameters> {
    let path = qc_dir.join(RUN_PARAMS_FILE);
    if !path.exists() {
        debug!("No run parameters at {}", path.display());
        return None;
    }
    match load_json(&path) {
        Ok(params) => Some(params),
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            None
        }
    }
}

/// The JSON document takes precedence over the YAML one. Absent or unreadable
/// documents yield `None` and the built-in catalog is used.
pub fn load_dashboard_config(qc_dir: &Path) -> Option<DashboardConfig> {
    let json_path = qc_dir.join(DASHBOARD_CONFIG_FILE);
    let yaml_path = qc_dir.join(DASHBOARD_CONFIG_YAML_FILE);

    let loaded = if json_path.exists() {
        load_json(&json_path).map_err(|e| (json_path, e))
    } else if yaml_path.exists() {
        load_yaml(&yaml_path).map_err(|e| (yaml_path, e))
    } else {
        debug!("No dashboard config in {}", qc_dir.display());
        return None;
    };

    match loaded {
        Ok(config) => Some(config),
        Err((path, e)) => {
            warn!("Failed to read {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn status_document_tolerates_nulls_and_missing_fields() {
        let doc: StatusDocument =
            serde_json::from_str(r#"{"process_states": ["CCC", null], "end": true}"#).unwrap();
        assert_eq!(doc.process_states, vec![Some("CCC".to_string()), None]);
        assert!(doc.end);
        assert!(doc.start_time.is_none());
    }

    #[test]
    fn run_parameters_dataset_name() {
        let params: RunParameters = serde_json::from_str(
            r#"{"DATASET DESCRIPTION": [{"Dataset Name": "ds001", "BIDSVersion": "1.8"}]}"#,
        )
        .unwrap();
        assert_eq!(params.dataset_name(), Some("ds001"));
        assert_eq!(RunParameters::describe(Some(&params)), "Dataset Name: ds001");
        assert_eq!(
            RunParameters::describe(None),
            "BrainSuite run parameters unavailable."
        );
    }

    #[test]
    fn dashboard_config_json_then_yaml() {
        let tmp = TempDir::new().unwrap();
        assert!(load_dashboard_config(tmp.path()).is_none());

        fs::write(
            tmp.path().join(DASHBOARD_CONFIG_YAML_FILE),
            "GroupNames: [Anatomy]\n",
        )
        .unwrap();
        let config = load_dashboard_config(tmp.path()).unwrap();
        assert_eq!(config.group_names, Some(vec!["Anatomy".to_string()]));

        fs::write(
            tmp.path().join(DASHBOARD_CONFIG_FILE),
            r#"{"GroupNames": ["FromJson"]}"#,
        )
        .unwrap();
        let config = load_dashboard_config(tmp.path()).unwrap();
        assert_eq!(config.group_names, Some(vec!["FromJson".to_string()]));
    }

    #[test]
    fn broken_optional_documents_are_ignored() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(RUN_PARAMS_FILE), "{not json").unwrap();
        fs::write(tmp.path().join(DASHBOARD_CONFIG_FILE), "42").unwrap();
        assert!(load_run_parameters(tmp.path()).is_none());
        assert!(load_dashboard_config(tmp.path()).is_none());
    }
}
