//! Layered name lookup for formula evaluation.
//!
//! Lookup order, first hit wins:
//!
//! 1. fields computed earlier in the current pass
//! 2. request fields
//! 3. module attributes
//! 4. static lookup tables
//!
//! Injected functions live in their own namespace and are only reachable
//! through call syntax, so a data field can never shadow or be shadowed by
//! a function.

use std::collections::BTreeMap;

use super::{ExprError, FunctionRegistry, Value};

/// One data layer of the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Scope {
    Computed,
    Request,
    Module,
    Tables,
}

impl Scope {
    /// Data layers in lookup order.
    pub const LOOKUP_ORDER: [Scope; 4] =
        [Scope::Computed, Scope::Request, Scope::Module, Scope::Tables];
}

/// Per-evaluation context. Cheap to build, never shared between requests.
pub struct EvaluationContext<'f> {
    computed: BTreeMap<String, Value>,
    request: BTreeMap<String, Value>,
    module: BTreeMap<String, Value>,
    tables: BTreeMap<String, Value>,
    functions: FunctionRegistry<'f>,
}

impl<'f> EvaluationContext<'f> {
    pub fn new(functions: FunctionRegistry<'f>) -> Self {
        Self {
            computed: BTreeMap::new(),
            request: BTreeMap::new(),
            module: BTreeMap::new(),
            tables: BTreeMap::new(),
            functions,
        }
    }

    /// Bind one name in the given layer, replacing any previous value there.
    pub fn bind(&mut self, scope: Scope, name: impl Into<String>, value: Value) {
        self.layer_mut(scope).insert(name.into(), value);
    }

    /// Bind every key of a JSON object in the given layer.
    pub fn bind_json_object(
        &mut self,
        scope: Scope,
        object: &serde_json::Map<String, serde_json::Value>,
    ) {
        let layer = self.layer_mut(scope);
        for (k, v) in object {
            layer.insert(k.clone(), Value::from(v));
        }
    }

    pub fn with(mut self, scope: Scope, name: impl Into<String>, value: Value) -> Self {
        self.bind(scope, name, value);
        self
    }

    /// Resolve a bare name through the data layers.
    pub fn lookup(&self, name: &str) -> Result<&Value, ExprError> {
        for scope in Scope::LOOKUP_ORDER {
            if let Some(v) = self.layer(scope).get(name) {
                return Ok(v);
            }
        }
        if self.functions.contains(name) {
            return Err(ExprError::Type(format!(
                "function '{name}' cannot be used as a value"
            )));
        }
        Err(ExprError::UnresolvedName(name.to_string()))
    }

    /// Which layer a name currently resolves from, if any.
    pub fn resolves_from(&self, name: &str) -> Option<Scope> {
        Scope::LOOKUP_ORDER
            .into_iter()
            .find(|scope| self.layer(*scope).contains_key(name))
    }

    /// A field bound by the formula pass.
    pub fn computed(&self, field: &str) -> Option<&Value> {
        self.computed.get(field)
    }

    pub fn computed_fields(&self) -> &BTreeMap<String, Value> {
        &self.computed
    }

    pub fn functions(&self) -> &FunctionRegistry<'f> {
        &self.functions
    }

    fn layer(&self, scope: Scope) -> &BTreeMap<String, Value> {
        match scope {
            Scope::Computed => &self.computed,
            Scope::Request => &self.request,
            Scope::Module => &self.module,
            Scope::Tables => &self.tables,
        }
    }

    fn layer_mut(&mut self, scope: Scope) -> &mut BTreeMap<String, Value> {
        match scope {
            Scope::Computed => &mut self.computed,
            Scope::Request => &mut self.request,
            Scope::Module => &mut self.module,
            Scope::Tables => &mut self.tables,
        }
    }
}

impl std::fmt::Debug for EvaluationContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("computed", &self.computed)
            .field("request", &self.request.keys().collect::<Vec<_>>())
            .field("module", &self.module.keys().collect::<Vec<_>>())
            .field("tables", &self.tables.keys().collect::<Vec<_>>())
            .field("functions", &self.functions.names().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> EvaluationContext<'static> {
        EvaluationContext::new(FunctionRegistry::with_builtins())
    }

    #[test]
    fn test_request_beats_module_beats_tables() {
        let ctx = ctx()
            .with(Scope::Tables, "x", Value::Int(1))
            .with(Scope::Module, "x", Value::Int(2))
            .with(Scope::Request, "x", Value::Int(3));
        assert_eq!(ctx.lookup("x").unwrap(), &Value::Int(3));
        assert_eq!(ctx.resolves_from("x"), Some(Scope::Request));
    }

    #[test]
    fn test_computed_beats_request() {
        let ctx = ctx()
            .with(Scope::Request, "capacity_kw", Value::Int(3))
            .with(Scope::Computed, "capacity_kw", Value::Float(4.5));
        assert_eq!(ctx.lookup("capacity_kw").unwrap(), &Value::Float(4.5));
    }

    #[test]
    fn test_unknown_name_is_unresolved() {
        assert_eq!(
            ctx().lookup("missing"),
            Err(ExprError::UnresolvedName("missing".into()))
        );
    }

    #[test]
    fn test_function_name_is_not_a_value() {
        assert!(matches!(ctx().lookup("max"), Err(ExprError::Type(_))));
    }

    #[test]
    fn test_data_field_named_like_function_still_resolves() {
        let ctx = ctx().with(Scope::Module, "max", Value::Int(9));
        assert_eq!(ctx.lookup("max").unwrap(), &Value::Int(9));
    }
}
