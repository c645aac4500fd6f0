use duet_editor::OperationKind;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SyncError};

pub const DEFAULT_CONFIG_NAME: &str = "duet.config.json";

/// Sync layer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Name of the root XML fragment holding the shared root sequence
    #[serde(default = "default_root_name")]
    pub root_name: String,

    /// Origin tag of ordinary local edits
    #[serde(default = "default_local_origin")]
    pub local_origin: String,

    /// Local origin that the undo manager does not track
    #[serde(default = "default_untracked_origin")]
    pub untracked_origin: String,

    /// Origin used when applying updates received from the transport
    #[serde(default = "default_remote_origin")]
    pub remote_origin: String,

    /// Origin of stored-position writes
    #[serde(default = "default_position_origin")]
    pub position_origin: String,

    /// Root attribute prefix for stored positions
    #[serde(default = "default_position_prefix")]
    pub position_prefix: String,

    /// Operations that always get a transaction of their own
    #[serde(default = "default_unique_operations")]
    pub unique_operations: Vec<OperationKind>,

    /// Normalize the tree after local and remote changes
    #[serde(default)]
    pub normalize: bool,

    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryConfig {
    /// Transactions closer together than this merge into one undo step
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,

    /// Origins tracked in addition to the local origin
    #[serde(default)]
    pub tracked_origins: Vec<String>,
}

fn default_root_name() -> String {
    "content".to_string()
}

fn default_local_origin() -> String {
    "duet-local".to_string()
}

fn default_untracked_origin() -> String {
    "duet-local-untracked".to_string()
}

fn default_remote_origin() -> String {
    "duet-remote".to_string()
}

fn default_position_origin() -> String {
    "duet-stored-position".to_string()
}

fn default_position_prefix() -> String {
    "__duetStoredPosition_".to_string()
}

fn default_unique_operations() -> Vec<OperationKind> {
    vec![
        OperationKind::SplitNode,
        OperationKind::MergeNode,
        OperationKind::MoveNode,
        OperationKind::SetNode,
    ]
}

fn default_capture_timeout_ms() -> u64 {
    500
}

impl SyncConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SyncConfig =
            serde_json::from_str(json).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a directory, falling back to defaults when no config
    /// file exists
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(DEFAULT_CONFIG_NAME);
        if !config_path.exists() {
            return Ok(SyncConfig::default());
        }
        let content =
            std::fs::read_to_string(&config_path).map_err(|e| SyncError::Config(e.to_string()))?;
        Self::from_json(&content)
    }

    fn validate(&self) -> Result<()> {
        let origins = [
            &self.local_origin,
            &self.untracked_origin,
            &self.remote_origin,
            &self.position_origin,
        ];
        for (i, a) in origins.iter().enumerate() {
            if origins[i + 1..].contains(a) {
                return Err(SyncError::Config(format!("origin \"{a}\" is used twice")));
            }
        }
        if self.position_prefix.is_empty() {
            return Err(SyncError::Config("positionPrefix must not be empty".into()));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root_name: default_root_name(),
            local_origin: default_local_origin(),
            untracked_origin: default_untracked_origin(),
            remote_origin: default_remote_origin(),
            position_origin: default_position_origin(),
            position_prefix: default_position_prefix(),
            unique_operations: default_unique_operations(),
            normalize: false,
            history: HistoryConfig::default(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capture_timeout_ms: default_capture_timeout_ms(),
            tracked_origins: Vec::new(),
        }
    }
}
