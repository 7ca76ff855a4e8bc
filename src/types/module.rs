//! Equipment module catalog entries.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// A candidate panel as declared in `modules.json`.
///
/// Identity fields are typed; every other key (rated output, unit cost, ...)
/// is kept in `attributes` and made visible to formulas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub module_name: String,
    pub brand: String,
    #[serde(rename = "type")]
    pub module_type: String,
    /// Kept as a JSON number so integral values echo back unchanged.
    pub efficiency_percent: Number,
    pub efficiency_level: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Module {
    /// Every field of the module as a flat JSON object, identity fields
    /// included, for binding into an evaluation context.
    pub fn context_object(&self) -> Map<String, Value> {
        let mut object = self.attributes.clone();
        object.insert("module_name".into(), Value::String(self.module_name.clone()));
        object.insert("brand".into(), Value::String(self.brand.clone()));
        object.insert("type".into(), Value::String(self.module_type.clone()));
        object.insert(
            "efficiency_percent".into(),
            Value::Number(self.efficiency_percent.clone()),
        );
        object.insert(
            "efficiency_level".into(),
            Value::String(self.efficiency_level.clone()),
        );
        object
    }
}
