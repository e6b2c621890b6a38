//! Rhai adapter: bridges the engine-neutral script boundary onto an
//! embedded [rhai](https://rhai.rs) interpreter.
//!
//! The adapter owns all translation between `ScriptValue` and
//! `rhai::Dynamic`. Decimals cross the boundary as `f64` (rhai has no
//! arbitrary-precision number in its default build) and dates as their
//! epoch-millisecond integers; the step core re-types both on the way out.

use rhai::{Dynamic, Position, AST};

use rowscript_api::engine::{CompiledId, EngineFactory, ScriptEngine, ScriptFault};
use rowscript_api::error::StepError;
use rowscript_api::script::{Bindings, ScriptValue};
use rowscript_api::value;

// ---------- value translation ----------

fn to_dynamic(value: &ScriptValue) -> Dynamic {
    match value {
        ScriptValue::Null => Dynamic::UNIT,
        ScriptValue::Bool(b) => (*b).into(),
        ScriptValue::Int(v) => (*v).into(),
        ScriptValue::Float(v) => (*v).into(),
        ScriptValue::Decimal(m, s) => value::decimal_to_f64(*m, *s).into(),
        ScriptValue::Text(s) => s.clone().into(),
        ScriptValue::DateMillis(ms) => (*ms).into(),
        ScriptValue::Bytes(b) => Dynamic::from_blob(b.clone()),
        ScriptValue::Array(items) => {
            Dynamic::from_array(items.iter().map(to_dynamic).collect())
        }
        ScriptValue::Map(entries) => {
            let mut map = rhai::Map::new();
            for (k, v) in entries {
                map.insert(k.as_str().into(), to_dynamic(v));
            }
            Dynamic::from_map(map)
        }
        ScriptValue::Opaque { rendered, .. } => rendered.clone().into(),
    }
}

fn from_dynamic(dynamic: &Dynamic) -> ScriptValue {
    if dynamic.is_unit() {
        return ScriptValue::Null;
    }
    if let Ok(b) = dynamic.as_bool() {
        return ScriptValue::Bool(b);
    }
    if let Ok(v) = dynamic.as_int() {
        return ScriptValue::Int(v);
    }
    if let Ok(v) = dynamic.as_float() {
        return ScriptValue::Float(v);
    }
    if dynamic.is_string() {
        if let Some(s) = dynamic.clone().try_cast::<String>() {
            return ScriptValue::Text(s);
        }
    }
    if dynamic.is::<rhai::Blob>() {
        if let Some(b) = dynamic.clone().try_cast::<rhai::Blob>() {
            return ScriptValue::Bytes(b);
        }
    }
    if dynamic.is_array() {
        if let Some(items) = dynamic.clone().try_cast::<rhai::Array>() {
            return ScriptValue::Array(items.iter().map(from_dynamic).collect());
        }
    }
    if dynamic.is_map() {
        if let Some(map) = dynamic.clone().try_cast::<rhai::Map>() {
            return ScriptValue::Map(
                map.iter()
                    .map(|(k, v)| (k.to_string(), from_dynamic(v)))
                    .collect(),
            );
        }
    }
    ScriptValue::Opaque {
        type_name: dynamic.type_name().to_string(),
        rendered: dynamic.to_string(),
    }
}

fn fault_at(message: String, position: Position) -> ScriptFault {
    ScriptFault {
        message,
        line: position.line().map(|l| l as u32),
        column: position.position().map(|c| c as u32),
    }
}

// ---------- engine ----------

/// One rhai interpreter plus its compiled-script store. Owned by exactly
/// one step instance, never shared.
pub struct RhaiEngine {
    engine: rhai::Engine,
    compiled: Vec<AST>,
}

impl RhaiEngine {
    pub fn new() -> Self {
        let mut engine = rhai::Engine::new();
        engine.on_print(|text| tracing::info!(target: "script", "{text}"));
        engine.on_debug(|text, source, pos| {
            tracing::debug!(target: "script", source, %pos, "{text}")
        });
        Self {
            engine,
            compiled: Vec::new(),
        }
    }

    fn scope_from(bindings: &Bindings) -> rhai::Scope<'static> {
        let mut scope = rhai::Scope::new();
        for (name, value) in bindings.iter() {
            scope.push_dynamic(name.clone(), to_dynamic(value));
        }
        scope
    }

    /// Top-level variables survive evaluation inside the scope; fold them
    /// back so callers observe every assignment the script made.
    fn write_back(scope: &rhai::Scope<'_>, bindings: &mut Bindings) {
        for (name, _constant, dynamic) in scope.iter() {
            bindings.set(name, from_dynamic(&dynamic));
        }
    }
}

impl Default for RhaiEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptEngine for RhaiEngine {
    fn compile(&mut self, source: &str) -> Result<Option<CompiledId>, ScriptFault> {
        let ast = self
            .engine
            .compile(source)
            .map_err(|e| fault_at(e.0.to_string(), e.1))?;
        self.compiled.push(ast);
        Ok(Some(CompiledId(self.compiled.len() - 1)))
    }

    fn eval_source(
        &mut self,
        source: &str,
        bindings: &mut Bindings,
    ) -> Result<ScriptValue, ScriptFault> {
        let mut scope = Self::scope_from(bindings);
        let result = self
            .engine
            .eval_with_scope::<Dynamic>(&mut scope, source)
            .map_err(|e| fault_at(e.to_string(), e.position()))?;
        Self::write_back(&scope, bindings);
        Ok(from_dynamic(&result))
    }

    fn eval_compiled(
        &mut self,
        id: CompiledId,
        bindings: &mut Bindings,
    ) -> Result<ScriptValue, ScriptFault> {
        let ast = self
            .compiled
            .get(id.0)
            .ok_or_else(|| ScriptFault::new(format!("unknown compiled script handle {}", id.0)))?;
        let mut scope = Self::scope_from(bindings);
        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, ast)
            .map_err(|e| fault_at(e.to_string(), e.position()))?;
        Self::write_back(&scope, bindings);
        Ok(from_dynamic(&result))
    }
}

// ---------- factory ----------

/// Process-wide factory handle for registration. Answers to `rhai` and to
/// the generic `script` alias.
pub struct RhaiEngineFactory;

impl EngineFactory for RhaiEngineFactory {
    fn language(&self) -> &str {
        "rhai"
    }

    fn aliases(&self) -> &[&str] {
        &["script"]
    }

    fn create(&self) -> Result<Box<dyn ScriptEngine>, StepError> {
        Ok(Box::new(RhaiEngine::new()))
    }
}
