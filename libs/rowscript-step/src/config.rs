use serde::Deserialize;

use rowscript_api::error::StepError;
use rowscript_api::schema::FieldDescriptor;
use rowscript_api::value::TypeKind;

/// Step configuration — parsed from TOML.
///
/// Supplied fully materialized by the host; the step never reads it from a
/// repository itself.
#[derive(Debug, Clone, Deserialize)]
pub struct StepConfig {
    /// Script language; unknown names fall back to the registry default.
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_step_name")]
    pub step_name: String,

    #[serde(default)]
    pub pipeline_name: String,

    /// Route per-row script/conversion failures to the error port instead of
    /// failing the stream.
    #[serde(default)]
    pub error_routing: bool,

    /// Script fragments. Exactly one must have purpose `transform`.
    #[serde(default)]
    pub scripts: Vec<ScriptConfig>,

    /// Output field declarations, applied in order.
    #[serde(default)]
    pub fields: Vec<OutputFieldSpec>,

    /// Input schema, for hosts that cannot learn it from upstream (CLI).
    #[serde(default)]
    pub input: Vec<FieldDescriptor>,
}

fn default_language() -> String {
    crate::registry::DEFAULT_LANGUAGE.to_string()
}

fn default_step_name() -> String {
    "script".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptConfig {
    /// Binding name the script's source text is published under.
    pub name: String,
    pub purpose: ScriptPurpose,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptPurpose {
    /// Runs once, before the first row.
    Start,
    /// Runs per row.
    Transform,
    /// Runs once, after the last row.
    End,
    /// Only published as source text for the other scripts to use.
    Library,
}

/// One declared output field.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputFieldSpec {
    /// Script binding the value is read from.
    pub binding: String,

    /// Output field name; falls back to `binding` when empty.
    #[serde(default)]
    pub rename: Option<String>,

    #[serde(rename = "type")]
    pub kind: TypeKind,

    #[serde(default = "unspecified")]
    pub length: i32,

    #[serde(default = "unspecified")]
    pub precision: i32,

    /// Overwrite an existing upstream field instead of appending a new one.
    #[serde(default)]
    pub replace: bool,

    /// Take the script's top-level result instead of the named binding.
    #[serde(default)]
    pub script_result: bool,
}

fn unspecified() -> i32 {
    -1
}

impl OutputFieldSpec {
    pub fn output_name(&self) -> &str {
        match self.rename.as_deref() {
            Some(rename) if !rename.is_empty() => rename,
            _ => &self.binding,
        }
    }
}

impl StepConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, StepError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StepError::Configuration(format!("{path}: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, StepError> {
        let config: StepConfig =
            toml::from_str(toml_str).map_err(|e| StepError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// First script with the given purpose.
    pub fn script(&self, purpose: ScriptPurpose) -> Option<&ScriptConfig> {
        self.scripts.iter().find(|s| s.purpose == purpose)
    }

    pub fn validate(&self) -> Result<(), StepError> {
        let transforms = self
            .scripts
            .iter()
            .filter(|s| s.purpose == ScriptPurpose::Transform)
            .count();
        if transforms != 1 {
            return Err(StepError::Configuration(format!(
                "expected exactly one transform script, found {transforms}"
            )));
        }
        for script in &self.scripts {
            if script.name.is_empty() {
                return Err(StepError::Configuration(
                    "script with an empty name".to_string(),
                ));
            }
        }
        for (i, field) in self.fields.iter().enumerate() {
            if field.binding.is_empty() {
                return Err(StepError::Configuration(format!(
                    "no name was specified for result value #{}",
                    i + 1
                )));
            }
            if field.kind == TypeKind::None {
                return Err(StepError::Configuration(format!(
                    "no output data type was specified for field '{}'",
                    field.output_name()
                )));
            }
        }
        Ok(())
    }
}
