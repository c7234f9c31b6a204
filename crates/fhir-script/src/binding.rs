//! Resolution of the effective arguments of an executable script.
//!
//! An executable script may inherit from a base executable script. The
//! effective overrides are built from the chain: a base override is kept
//! only when no shallower level overrides the same argument name. Disabled
//! overrides never take part in the merge.
//!
//! Values are then resolved per argument (enabled override, else the
//! argument default), converted by the converter registry, and checked for
//! mandatory arguments.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, OnceLock};

use fhir_model::{
    ExecutableScript, ExecutableScriptArg, Result, Script, ScriptArg, ScriptSource,
    TransformerError,
};
use tracing::debug;
use uuid::Uuid;

use crate::convert::ConverterRegistry;
use crate::value::ScriptValue;

/// Something that is identified by an argument name.
pub trait NamedArg {
    fn arg_name(&self) -> &str;
}

impl NamedArg for ScriptArg {
    fn arg_name(&self) -> &str {
        &self.name
    }
}

/// An enabled override together with the argument it overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundOverride {
    /// Executable script on which the override is defined.
    pub executable_script_id: Uuid,
    pub arg: ScriptArg,
    pub value: ExecutableScriptArg,
}

impl NamedArg for BoundOverride {
    fn arg_name(&self) -> &str {
        &self.arg.name
    }
}

/// Merges arguments with the arguments of a base: every base argument whose
/// name is not among `args` comes first, followed by all of `args`.
pub fn resulting_args<T: NamedArg + Clone>(args: &[T], base_args: &[T]) -> Vec<T> {
    let names: HashSet<&str> = args.iter().map(NamedArg::arg_name).collect();
    base_args
        .iter()
        .filter(|arg| !names.contains(arg.arg_name()))
        .chain(args)
        .cloned()
        .collect()
}

/// Rebuilds the overrides of an executable script from a new version.
///
/// Overrides of the new version that target an argument already overridden
/// in the old version keep the id of the old override. Old overrides that
/// are absent from the new version are dropped.
pub fn merge_overrides(
    old: &[ExecutableScriptArg],
    new: &[ExecutableScriptArg],
) -> Vec<ExecutableScriptArg> {
    new.iter()
        .map(|value| {
            let id = old
                .iter()
                .find(|existing| existing.argument_id == value.argument_id)
                .map_or(value.id, |existing| existing.id);
            ExecutableScriptArg {
                id,
                ..value.clone()
            }
        })
        .collect()
}

/// One level of an executable script inheritance chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLevel {
    pub executable_script: Arc<ExecutableScript>,
    pub script: Arc<Script>,
}

fn find_arg(chain: &[ChainLevel], argument_id: Uuid) -> Option<&ScriptArg> {
    chain.iter().find_map(|level| level.script.arg(argument_id))
}

/// Checks the invariants of an executable script chain: every override
/// references an argument of a script in the chain and no level overrides
/// an argument name twice.
pub fn validate_executable_script(chain: &[ChainLevel]) -> Result<()> {
    if chain.is_empty() {
        return Err(TransformerError::configuration(
            "Executable script chain must not be empty",
        ));
    }
    for level in chain {
        let executable_script = &level.executable_script;
        let mut names = HashSet::new();
        for value in &executable_script.overrides {
            let arg = find_arg(chain, value.argument_id).ok_or_else(|| {
                TransformerError::configuration(format!(
                    "Executable script {} overrides argument {} that does not belong to script {}",
                    executable_script.code, value.argument_id, chain[0].script.code
                ))
            })?;
            if !names.insert(arg.name.as_str()) {
                return Err(TransformerError::configuration(format!(
                    "Executable script {} overrides argument {} more than once",
                    executable_script.code, arg.name
                )));
            }
        }
    }
    Ok(())
}

/// Where the value of a resolved argument comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentOrigin {
    /// Override defined on the given executable script.
    Override(Uuid),
    Default,
    /// Passed explicitly for one execution.
    Explicit,
    Unset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedArgument {
    pub arg: ScriptArg,
    pub raw_value: Option<String>,
    pub value: ScriptValue,
    pub origin: ArgumentOrigin,
}

/// The final argument values of an executable script.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedArguments {
    script_code: String,
    arguments: Vec<ResolvedArgument>,
}

impl ResolvedArguments {
    pub fn get(&self, name: &str) -> Option<&ResolvedArgument> {
        self.arguments.iter().find(|argument| argument.arg.name == name)
    }

    pub fn value(&self, name: &str) -> Option<&ScriptValue> {
        self.get(name).map(|argument| &argument.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedArgument> {
        self.arguments.iter()
    }

    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    /// Values keyed by argument name.
    pub fn values(&self) -> BTreeMap<String, ScriptValue> {
        self.arguments
            .iter()
            .map(|argument| (argument.arg.name.clone(), argument.value.clone()))
            .collect()
    }

    /// Applies values passed for a single execution. Names that are not
    /// arguments of the script are ignored.
    #[must_use]
    pub fn with_explicit(&self, explicit: &BTreeMap<String, ScriptValue>) -> Self {
        let mut resolved = self.clone();
        for (name, value) in explicit {
            match resolved
                .arguments
                .iter_mut()
                .find(|argument| &argument.arg.name == name)
            {
                Some(argument) => {
                    argument.value = value.clone();
                    argument.raw_value = None;
                    argument.origin = ArgumentOrigin::Explicit;
                }
                None => debug!(
                    script = %self.script_code,
                    argument = %name,
                    "ignoring value for undeclared script argument"
                ),
            }
        }
        resolved
    }

    /// Every mandatory argument must have a value.
    pub fn check_mandatory(&self) -> Result<()> {
        match self
            .arguments
            .iter()
            .find(|argument| argument.arg.mandatory && argument.value.is_null())
        {
            Some(argument) => Err(TransformerError::configuration(format!(
                "Mandatory argument {} of script {} has not been specified",
                argument.arg.name, self.script_code
            ))),
            None => Ok(()),
        }
    }
}

/// An executable script with its resolved inheritance chain and the script
/// source selected for a FHIR version.
///
/// Argument values are resolved on first use and then memoised.
#[derive(Debug)]
pub struct ExecutableScriptInfo {
    chain: Vec<ChainLevel>,
    source: Option<ScriptSource>,
    overrides: Vec<BoundOverride>,
    disabled: BTreeSet<String>,
    arguments: OnceLock<Result<ResolvedArguments>>,
}

impl ExecutableScriptInfo {
    /// `chain[0]` is the executable script itself, followed by its bases.
    pub fn new(chain: Vec<ChainLevel>, source: Option<ScriptSource>) -> Result<Self> {
        validate_executable_script(&chain)?;
        let mut overrides: Vec<BoundOverride> = Vec::new();
        let mut disabled = BTreeSet::new();
        for level in chain.iter().rev() {
            let mut level_overrides = Vec::new();
            for value in &level.executable_script.overrides {
                // validated above
                let Some(arg) = find_arg(&chain, value.argument_id) else {
                    continue;
                };
                if value.enabled {
                    level_overrides.push(BoundOverride {
                        executable_script_id: level.executable_script.id,
                        arg: arg.clone(),
                        value: value.clone(),
                    });
                } else {
                    disabled.insert(arg.name.clone());
                }
            }
            overrides = resulting_args(&level_overrides, &overrides);
        }
        Ok(Self {
            chain,
            source,
            overrides,
            disabled,
            arguments: OnceLock::new(),
        })
    }

    pub fn executable_script(&self) -> &ExecutableScript {
        &self.chain[0].executable_script
    }

    pub fn script(&self) -> &Script {
        &self.chain[0].script
    }

    pub fn chain(&self) -> &[ChainLevel] {
        &self.chain
    }

    pub fn source(&self) -> Option<&ScriptSource> {
        self.source.as_ref()
    }

    /// Effective enabled overrides of the chain.
    pub fn resulting_overrides(&self) -> &[BoundOverride] {
        &self.overrides
    }

    /// Declared arguments of the chain's scripts, merged by name.
    pub fn script_args(&self) -> Vec<ScriptArg> {
        self.chain
            .iter()
            .rev()
            .fold(Vec::new(), |base, level| resulting_args(&level.script.args, &base))
    }

    /// Resolved and converted argument values without the mandatory check,
    /// which has to wait for explicitly passed values.
    pub fn resolved_arguments(&self, registry: &ConverterRegistry) -> Result<&ResolvedArguments> {
        self.arguments
            .get_or_init(|| self.compute_arguments(registry))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Resolved argument values including the mandatory check.
    pub fn resolve_arguments(&self, registry: &ConverterRegistry) -> Result<ResolvedArguments> {
        let resolved = self.resolved_arguments(registry)?;
        resolved.check_mandatory()?;
        Ok(resolved.clone())
    }

    fn compute_arguments(&self, registry: &ConverterRegistry) -> Result<ResolvedArguments> {
        let script_code = self.script().code.clone();
        let mut arguments = Vec::new();
        for arg in self.script_args() {
            // an enabled override without a value binds null
            let bound_override = self.overrides.iter().find(|bound| bound.arg.name == arg.name);
            let (raw_value, origin) = match (bound_override, &arg.default_value) {
                (Some(bound), _) => (
                    bound.value.override_value.clone(),
                    ArgumentOrigin::Override(bound.executable_script_id),
                ),
                (None, Some(value)) => (Some(value.clone()), ArgumentOrigin::Default),
                (None, None) => (None, ArgumentOrigin::Unset),
            };
            if raw_value.is_none() && arg.mandatory && self.disabled.contains(&arg.name) {
                return Err(TransformerError::data(format!(
                    "Mandatory argument {} of script {} has been disabled and has no default value",
                    arg.name, script_code
                )));
            }
            let value = match &raw_value {
                Some(raw) => registry.convert(&arg.name, arg.data_type, arg.array, raw)?,
                None => ScriptValue::Null,
            };
            arguments.push(ResolvedArgument {
                arg,
                raw_value,
                value,
                origin,
            });
        }
        Ok(ResolvedArguments {
            script_code,
            arguments,
        })
    }
}

#[cfg(test)]
mod tests {
    use fhir_model::{DataType, ScriptType};

    use super::*;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn script() -> Script {
        Script::new("TEST", ScriptType::Evaluate, DataType::Boolean)
            .with_arg(ScriptArg::new("a", DataType::String).with_id(id(1)).with_default("y"))
            .with_arg(ScriptArg::new("b", DataType::Integer).with_id(id(2)).mandatory())
            .with_arg(ScriptArg::new("c", DataType::Boolean).with_id(id(3)).with_default("false"))
    }

    fn level(executable_script: ExecutableScript, script: &Arc<Script>) -> ChainLevel {
        ChainLevel {
            executable_script: Arc::new(executable_script),
            script: Arc::clone(script),
        }
    }

    fn named(name: &str, value: &str) -> BoundOverride {
        BoundOverride {
            executable_script_id: id(99),
            arg: ScriptArg::new(name, DataType::String),
            value: ExecutableScriptArg::new(id(0), Some(value.into())),
        }
    }

    #[test]
    fn resulting_args_prefers_child_names() {
        let child = vec![named("a", "child"), named("c", "child")];
        let base = vec![named("a", "base"), named("b", "base")];
        let merged = resulting_args(&child, &base);
        let view: Vec<(&str, Option<&str>)> = merged
            .iter()
            .map(|bound| (bound.arg.name.as_str(), bound.value.override_value.as_deref()))
            .collect();
        assert_eq!(
            view,
            vec![("b", Some("base")), ("a", Some("child")), ("c", Some("child"))]
        );
    }

    #[test]
    fn override_wins_over_default() {
        let script = Arc::new(script());
        let info = ExecutableScriptInfo::new(
            vec![level(
                ExecutableScript::new("E", script.id)
                    .with_override(ExecutableScriptArg::new(id(1), Some("x".into())))
                    .with_override(ExecutableScriptArg::new(id(2), Some("7".into()))),
                &script,
            )],
            None,
        )
        .unwrap();
        let resolved = info.resolve_arguments(&ConverterRegistry::standard()).unwrap();
        assert_eq!(resolved.value("a"), Some(&ScriptValue::from("x")));
        assert_eq!(resolved.value("b"), Some(&ScriptValue::Integer(7)));
        assert_eq!(resolved.value("c"), Some(&ScriptValue::Boolean(false)));
        assert_eq!(resolved.get("c").unwrap().origin, ArgumentOrigin::Default);
    }

    #[test]
    fn base_chain_overrides_are_inherited() {
        let script = Arc::new(script());
        let base = ExecutableScript::new("BASE", script.id)
            .with_id(id(20))
            .with_override(ExecutableScriptArg::new(id(1), Some("base".into())))
            .with_override(ExecutableScriptArg::new(id(2), Some("1".into())));
        let child = ExecutableScript::new("CHILD", script.id)
            .with_id(id(21))
            .with_base(id(20))
            .with_override(ExecutableScriptArg::new(id(2), Some("2".into())));
        let info =
            ExecutableScriptInfo::new(vec![level(child, &script), level(base, &script)], None)
                .unwrap();

        let resolved = info.resolve_arguments(&ConverterRegistry::standard()).unwrap();
        assert_eq!(resolved.value("a"), Some(&ScriptValue::from("base")));
        assert_eq!(resolved.get("a").unwrap().origin, ArgumentOrigin::Override(id(20)));
        assert_eq!(resolved.value("b"), Some(&ScriptValue::Integer(2)));
        assert_eq!(resolved.get("b").unwrap().origin, ArgumentOrigin::Override(id(21)));
    }

    #[test]
    fn disabled_override_is_absent() {
        let script = Arc::new(script());
        let info = ExecutableScriptInfo::new(
            vec![level(
                ExecutableScript::new("E", script.id)
                    .with_override(ExecutableScriptArg::new(id(1), Some("x".into())).disabled())
                    .with_override(ExecutableScriptArg::new(id(2), Some("1".into()))),
                &script,
            )],
            None,
        )
        .unwrap();
        let resolved = info.resolve_arguments(&ConverterRegistry::standard()).unwrap();
        assert_eq!(resolved.value("a"), Some(&ScriptValue::from("y")));
    }

    #[test]
    fn override_without_value_binds_null() {
        let script = Arc::new(script());
        let info = ExecutableScriptInfo::new(
            vec![level(
                ExecutableScript::new("E", script.id)
                    .with_id(id(30))
                    .with_override(ExecutableScriptArg::new(id(1), None))
                    .with_override(ExecutableScriptArg::new(id(2), Some("1".into()))),
                &script,
            )],
            None,
        )
        .unwrap();
        let resolved = info.resolve_arguments(&ConverterRegistry::standard()).unwrap();
        let a = resolved.get("a").unwrap();
        assert_eq!(a.value, ScriptValue::Null);
        assert_eq!(a.raw_value, None);
        assert_eq!(a.origin, ArgumentOrigin::Override(id(30)));
    }

    #[test]
    fn mandatory_override_without_value_is_unspecified() {
        let script = Arc::new(script());
        let info = ExecutableScriptInfo::new(
            vec![level(
                ExecutableScript::new("E", script.id)
                    .with_override(ExecutableScriptArg::new(id(2), None)),
                &script,
            )],
            None,
        )
        .unwrap();
        let err = info
            .resolve_arguments(&ConverterRegistry::standard())
            .unwrap_err();
        assert!(matches!(err, TransformerError::Configuration(_)));
    }

    #[test]
    fn disabled_mandatory_override_without_default_is_data_error() {
        let script = Arc::new(script());
        let info = ExecutableScriptInfo::new(
            vec![level(
                ExecutableScript::new("E", script.id)
                    .with_override(ExecutableScriptArg::new(id(2), Some("1".into())).disabled()),
                &script,
            )],
            None,
        )
        .unwrap();
        let err = info
            .resolved_arguments(&ConverterRegistry::standard())
            .unwrap_err();
        assert!(matches!(err, TransformerError::Data(_)), "{err}");
    }

    #[test]
    fn missing_mandatory_value_is_configuration_error_after_resolution() {
        let script = Arc::new(script());
        let info =
            ExecutableScriptInfo::new(vec![level(ExecutableScript::new("E", script.id), &script)], None)
                .unwrap();
        let registry = ConverterRegistry::standard();
        let resolved = info.resolved_arguments(&registry).unwrap();
        assert!(matches!(
            resolved.check_mandatory().unwrap_err(),
            TransformerError::Configuration(_)
        ));

        let mut explicit = BTreeMap::new();
        explicit.insert("b".to_string(), ScriptValue::Integer(3));
        let with_explicit = resolved.with_explicit(&explicit);
        assert!(with_explicit.check_mandatory().is_ok());
        assert_eq!(with_explicit.get("b").unwrap().origin, ArgumentOrigin::Explicit);
    }

    #[test]
    fn conversion_failure_names_argument() {
        let script = Arc::new(script());
        let info = ExecutableScriptInfo::new(
            vec![level(
                ExecutableScript::new("E", script.id)
                    .with_override(ExecutableScriptArg::new(id(2), Some("seven".into()))),
                &script,
            )],
            None,
        )
        .unwrap();
        let err = info
            .resolved_arguments(&ConverterRegistry::standard())
            .unwrap_err();
        let TransformerError::Conversion(conversion) = err else {
            panic!("unexpected error {err:?}");
        };
        assert_eq!(conversion.argument, "b");
    }

    #[test]
    fn overrides_must_reference_chain_arguments() {
        let script = Arc::new(script());
        let err = ExecutableScriptInfo::new(
            vec![level(
                ExecutableScript::new("E", script.id)
                    .with_override(ExecutableScriptArg::new(id(42), Some("x".into()))),
                &script,
            )],
            None,
        )
        .unwrap_err();
        assert!(err.is_fatal());

        let err = ExecutableScriptInfo::new(
            vec![level(
                ExecutableScript::new("E", script.id)
                    .with_override(ExecutableScriptArg::new(id(1), Some("x".into())))
                    .with_override(ExecutableScriptArg::new(id(1), None).disabled()),
                &script,
            )],
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn merge_overrides_keeps_retained_ids() {
        let old = vec![
            ExecutableScriptArg::new(id(1), Some("old".into())),
            ExecutableScriptArg::new(id(2), Some("gone".into())),
        ];
        let new = vec![
            ExecutableScriptArg::new(id(3), Some("added".into())),
            ExecutableScriptArg::new(id(1), Some("new".into())),
        ];
        let merged = merge_overrides(&old, &new);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, new[0].id);
        assert_eq!(merged[1].id, old[0].id);
        assert_eq!(merged[1].override_value.as_deref(), Some("new"));
        // inputs are untouched
        assert_eq!(old[0].override_value.as_deref(), Some("old"));
    }
}
