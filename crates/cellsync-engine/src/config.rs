use cellsync_core::{NumberPolicy, DEFAULT_COLS, DEFAULT_ROWS};
use serde::{Deserialize, Serialize};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name given to a fresh workbook
    pub workbook_name: String,
    /// Grid size of new sheets
    pub rows: u32,
    pub cols: u32,
    /// How raw input is classified into numbers, booleans and text
    pub number_policy: NumberPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workbook_name: "Untitled".to_string(),
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            number_policy: NumberPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"rows": 10}"#).unwrap();
        assert_eq!(config.rows, 10);
        assert_eq!(config.cols, DEFAULT_COLS);
        assert_eq!(config.number_policy, NumberPolicy::default());
    }
}
