//! Load scenarios from JSON

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;

use super::Scenario;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read scenario file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse scenario JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Load a scenario from a JSON file
pub fn load_scenario<P: AsRef<Path>>(path: P) -> Result<Scenario, LoadError> {
    let file = File::open(path)?;
    load_scenario_from_reader(BufReader::new(file))
}

/// Load a scenario from any reader (e.g., string buffer, network stream)
pub fn load_scenario_from_reader<R: Read>(reader: R) -> Result<Scenario, LoadError> {
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComponentKind, Frequency};
    use crate::money::Money;

    const HOUSEHOLD: &str = r#"{
        "id": "household-2025",
        "name": "Base plan",
        "horizon": {"start": "2025-01", "months": 24},
        "components": [
            {
                "id": "salary",
                "label": "Salary",
                "kind": "income",
                "variables": {"base_salary": "5000.00"},
                "formula": "base_salary"
            },
            {
                "id": "insurance",
                "label": "Car insurance",
                "kind": "expense",
                "variables": {"premium": 600},
                "formula": "-premium",
                "frequency": "annual",
                "start_date": "2025-03-15"
            }
        ],
        "events": [
            {
                "id": "raise",
                "effective_date": "2025-07-01",
                "patches": [
                    {"target": "salary", "operation": {"op": "replace_variable", "variable": "base_salary", "value": "5500"}}
                ]
            }
        ]
    }"#;

    #[test]
    fn test_load_scenario_from_reader() {
        let scenario = load_scenario_from_reader(HOUSEHOLD.as_bytes()).unwrap();
        assert_eq!(scenario.id, "household-2025");
        assert_eq!(scenario.horizon.months, 24);
        assert_eq!(scenario.components.len(), 2);

        let insurance = &scenario.components[1];
        assert_eq!(insurance.kind, ComponentKind::Expense);
        assert_eq!(insurance.frequency, Frequency::Annual);
        assert_eq!(insurance.variables["premium"], Money::from_int(600));
        assert_eq!(scenario.components[0].frequency, Frequency::Monthly);
        assert_eq!(scenario.events.len(), 1);
    }

    #[test]
    fn test_float_amounts_are_rejected() {
        let json = HOUSEHOLD.replace(r#""5000.00""#, "5000.5");
        assert!(matches!(
            load_scenario_from_reader(json.as_bytes()),
            Err(LoadError::Json(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            load_scenario("does/not/exist.json"),
            Err(LoadError::Io(_))
        ));
    }
}
