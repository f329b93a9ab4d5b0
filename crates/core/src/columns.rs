use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::domain::offer::Line;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKey {
    Select,
    OriginalTerm,
    ProductCode,
    ProductName,
    Quantity,
    UnitPrice,
    TotalPrice,
    Confidence,
    Reasoning,
}

impl ColumnKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::OriginalTerm => "original_term",
            Self::ProductCode => "product_code",
            Self::ProductName => "product_name",
            Self::Quantity => "quantity",
            Self::UnitPrice => "unit_price",
            Self::TotalPrice => "total_price",
            Self::Confidence => "confidence",
            Self::Reasoning => "reasoning",
        }
    }

    pub fn render(self, line: &Line) -> String {
        match self {
            Self::Select => (if line.is_selected() { "[x]" } else { "[ ]" }).to_owned(),
            Self::OriginalTerm => line.original_term().to_owned(),
            Self::ProductCode => line.product_code().to_owned(),
            Self::ProductName => line.product_name().to_owned(),
            Self::Quantity => line.quantity().to_string(),
            Self::UnitPrice => format!("{:.2}", line.unit_price()),
            Self::TotalPrice => format!("{:.2}", line.total_price()),
            Self::Confidence => format!("{}%", line.confidence()),
            Self::Reasoning => line.reasoning().to_owned(),
        }
    }
}

impl std::str::FromStr for ColumnKey {
    type Err = ProfileError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "select" => Ok(Self::Select),
            "original_term" => Ok(Self::OriginalTerm),
            "product_code" => Ok(Self::ProductCode),
            "product_name" => Ok(Self::ProductName),
            "quantity" => Ok(Self::Quantity),
            "unit_price" => Ok(Self::UnitPrice),
            "total_price" => Ok(Self::TotalPrice),
            "confidence" => Ok(Self::Confidence),
            "reasoning" => Ok(Self::Reasoning),
            other => Err(ProfileError::UnknownColumn(other.to_owned())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub key: ColumnKey,
    pub label: String,
    pub visible: bool,
    #[serde(default)]
    pub required: bool,
}

impl ColumnConfig {
    fn new(key: ColumnKey, label: &str, visible: bool, required: bool) -> Self {
        Self { key, label: label.to_owned(), visible, required }
    }
}

/// Baseline column set, in rendering order.
pub fn default_columns() -> Vec<ColumnConfig> {
    vec![
        ColumnConfig::new(ColumnKey::Select, "", true, true),
        ColumnConfig::new(ColumnKey::OriginalTerm, "Customer term", true, false),
        ColumnConfig::new(ColumnKey::ProductCode, "Code", true, true),
        ColumnConfig::new(ColumnKey::ProductName, "Product", true, false),
        ColumnConfig::new(ColumnKey::Quantity, "Qty", true, true),
        ColumnConfig::new(ColumnKey::UnitPrice, "Unit price", true, false),
        ColumnConfig::new(ColumnKey::TotalPrice, "Total", true, true),
        ColumnConfig::new(ColumnKey::Confidence, "Confidence", true, false),
        ColumnConfig::new(ColumnKey::Reasoning, "Reasoning", false, false),
    ]
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientProfile {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default = "default_columns")]
    pub columns: Vec<ColumnConfig>,
}

impl ClientProfile {
    pub fn baseline(client_id: impl Into<String>) -> Self {
        Self { client_id: client_id.into(), display_name: None, columns: default_columns() }
    }

    /// Enforces the baseline contract on a loaded schema: duplicate keys are dropped,
    /// required baseline columns missing from the schema are put back at their baseline
    /// position, and required columns are always visible.
    pub fn normalized(mut self) -> Self {
        let mut seen = HashSet::new();
        self.columns.retain(|column| seen.insert(column.key));

        for (baseline_index, baseline) in default_columns().into_iter().enumerate() {
            if baseline.required && !seen.contains(&baseline.key) {
                let index = baseline_index.min(self.columns.len());
                self.columns.insert(index, baseline);
            }
        }

        let required: HashSet<ColumnKey> = default_columns()
            .into_iter()
            .filter(|column| column.required)
            .map(|column| column.key)
            .collect();
        for column in &mut self.columns {
            column.required |= required.contains(&column.key);
            if column.required {
                column.visible = true;
            }
        }
        self
    }
}

/// Which line attributes are rendered, and in what order.
#[derive(Clone, Debug)]
pub struct ColumnProjection {
    profile: ClientProfile,
}

impl ColumnProjection {
    pub fn new(profile: ClientProfile) -> Self {
        Self { profile: profile.normalized() }
    }

    pub fn profile(&self) -> &ClientProfile {
        &self.profile
    }

    pub fn columns(&self) -> &[ColumnConfig] {
        &self.profile.columns
    }

    /// Flips visibility. Required and unknown columns are left alone.
    /// Returns whether anything changed.
    pub fn toggle_visibility(&mut self, key: ColumnKey) -> bool {
        match self.column_mut(key) {
            Some(column) if !column.required => {
                column.visible = !column.visible;
                true
            }
            _ => false,
        }
    }

    pub fn set_visibility(&mut self, key: ColumnKey, visible: bool) -> bool {
        match self.column_mut(key) {
            Some(column) if !column.required && column.visible != visible => {
                column.visible = visible;
                true
            }
            _ => false,
        }
    }

    pub fn visible_columns(&self) -> Vec<&ColumnConfig> {
        self.profile.columns.iter().filter(|column| column.visible).collect()
    }

    pub fn header(&self) -> Vec<&str> {
        self.visible_columns().into_iter().map(|column| column.label.as_str()).collect()
    }

    pub fn render(&self, line: &Line) -> Vec<String> {
        self.visible_columns().into_iter().map(|column| column.key.render(line)).collect()
    }

    fn column_mut(&mut self, key: ColumnKey) -> Option<&mut ColumnConfig> {
        self.profile.columns.iter_mut().find(|column| column.key == key)
    }
}

impl Default for ColumnProjection {
    fn default() -> Self {
        Self::new(ClientProfile::baseline("default"))
    }
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("could not read profile `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse profile `{path}`: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("could not encode profile: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("could not write profile `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("unknown column `{0}`")]
    UnknownColumn(String),
}

/// TOML file backing one client's column profile; loaded on entry, saved on change.
#[derive(Clone, Debug)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the profile, or returns the baseline profile when the file does not exist.
    pub fn load_or_default(&self, client_id: &str) -> Result<ClientProfile, ProfileError> {
        if !self.path.exists() {
            return Ok(ClientProfile::baseline(client_id));
        }

        let raw = fs::read_to_string(&self.path)
            .map_err(|source| ProfileError::Read { path: self.path.clone(), source })?;
        let profile = toml::from_str::<ClientProfile>(&raw)
            .map_err(|source| ProfileError::Parse { path: self.path.clone(), source })?;
        Ok(profile.normalized())
    }

    pub fn save(&self, profile: &ClientProfile) -> Result<(), ProfileError> {
        let encoded = toml::to_string_pretty(profile)?;
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| ProfileError::Write { path: self.path.clone(), source })?;
        }
        fs::write(&self.path, encoded)
            .map_err(|source| ProfileError::Write { path: self.path.clone(), source })?;

        info!(
            event_name = "review.columns.profile_saved",
            client_id = %profile.client_id,
            path = %self.path.display(),
            "column profile saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{ClientProfile, ColumnConfig, ColumnKey, ColumnProjection, ProfileStore};
    use crate::domain::offer::{Line, LineId};

    fn visible_keys(projection: &ColumnProjection) -> Vec<ColumnKey> {
        projection.visible_columns().into_iter().map(|column| column.key).collect()
    }

    #[test]
    fn required_columns_cannot_be_hidden() {
        let mut projection = ColumnProjection::default();

        assert!(!projection.toggle_visibility(ColumnKey::TotalPrice));
        assert!(!projection.set_visibility(ColumnKey::Select, false));
        assert!(visible_keys(&projection).contains(&ColumnKey::TotalPrice));
        assert!(visible_keys(&projection).contains(&ColumnKey::Select));
    }

    #[test]
    fn visible_columns_keep_declared_order_regardless_of_toggle_order() {
        let mut projection = ColumnProjection::default();

        projection.toggle_visibility(ColumnKey::Reasoning);
        projection.toggle_visibility(ColumnKey::OriginalTerm);
        projection.toggle_visibility(ColumnKey::Confidence);
        projection.toggle_visibility(ColumnKey::OriginalTerm);

        assert_eq!(
            visible_keys(&projection),
            vec![
                ColumnKey::Select,
                ColumnKey::OriginalTerm,
                ColumnKey::ProductCode,
                ColumnKey::ProductName,
                ColumnKey::Quantity,
                ColumnKey::UnitPrice,
                ColumnKey::TotalPrice,
                ColumnKey::Reasoning,
            ]
        );
    }

    #[test]
    fn client_schema_order_is_the_rendering_contract() {
        let profile = ClientProfile {
            client_id: "kessler".to_owned(),
            display_name: None,
            columns: vec![
                ColumnConfig {
                    key: ColumnKey::TotalPrice,
                    label: "Sum".to_owned(),
                    visible: false,
                    required: false,
                },
                ColumnConfig {
                    key: ColumnKey::ProductName,
                    label: "Article".to_owned(),
                    visible: true,
                    required: false,
                },
                ColumnConfig {
                    key: ColumnKey::ProductName,
                    label: "Duplicate".to_owned(),
                    visible: true,
                    required: false,
                },
            ],
        };

        let projection = ColumnProjection::new(profile);

        assert_eq!(
            visible_keys(&projection),
            vec![
                ColumnKey::Select,
                ColumnKey::TotalPrice,
                ColumnKey::ProductCode,
                ColumnKey::ProductName,
                ColumnKey::Quantity,
            ]
        );
        assert!(projection.columns().iter().all(|column| column.label != "Duplicate"));
    }

    #[test]
    fn render_formats_cells_for_visible_columns() {
        let projection = ColumnProjection::default();
        let line = Line::from_cents(LineId::from("l1"), "CU-15", "Copper pipe", 3, 420)
            .with_original_term("kupferrohr 15")
            .with_match(87, "semantic match");

        assert_eq!(
            projection.render(&line),
            vec!["[x]", "kupferrohr 15", "CU-15", "Copper pipe", "3", "4.20", "12.60", "87%"]
        );
        assert_eq!(projection.header()[2], "Code");
    }

    #[test]
    fn profile_store_round_trips_toggles() {
        let dir = TempDir::new().expect("temp dir");
        let store = ProfileStore::new(dir.path().join("profiles").join("kessler.toml"));

        let mut projection =
            ColumnProjection::new(store.load_or_default("kessler").expect("baseline profile"));
        assert!(projection.toggle_visibility(ColumnKey::Confidence));
        store.save(projection.profile()).expect("profile saved");

        let reloaded =
            ColumnProjection::new(store.load_or_default("kessler").expect("saved profile"));
        assert_eq!(reloaded.profile().client_id, "kessler");
        assert!(!visible_keys(&reloaded).contains(&ColumnKey::Confidence));
    }

    #[test]
    fn column_keys_parse_from_cli_spelling() {
        assert_eq!("unit-price".parse::<ColumnKey>().expect("known key"), ColumnKey::UnitPrice);
        assert!("colour".parse::<ColumnKey>().is_err());
    }
}
