//! Script execution through the executor and the rule execution context.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use fhir_model::{
    DataType, DhisResourceType, ExecutableScript, ExecutableScriptArg, FhirVersion, Reference,
    Result, Script, ScriptArg, ScriptLanguage, ScriptSource, ScriptType, ScriptVariable,
    TransformerError,
};
use fhir_script::{
    ChainLevel, ExecutableScriptInfo, NativeScriptEvaluator, ScriptEvaluationError,
    ScriptExecutionContext, ScriptExecutor, ScriptRepository, ScriptValue, ScriptVariables,
    WritableScriptedResource,
};
use serde_json::{Value, json};
use uuid::Uuid;

#[derive(Default)]
struct InMemoryScripts {
    infos: HashMap<Uuid, Arc<ExecutableScriptInfo>>,
}

impl InMemoryScripts {
    fn add(&mut self, script: Script, executable_script: ExecutableScript) -> Uuid {
        let id = executable_script.id;
        let source = script.source_for(FhirVersion::R4).cloned();
        let info = ExecutableScriptInfo::new(
            vec![ChainLevel {
                executable_script: Arc::new(executable_script),
                script: Arc::new(script),
            }],
            source,
        )
        .unwrap();
        self.infos.insert(id, Arc::new(info));
        id
    }
}

impl ScriptRepository for InMemoryScripts {
    fn resolve_script(
        &self,
        executable_script_id: Uuid,
        _fhir_version: FhirVersion,
    ) -> Result<Option<Arc<ExecutableScriptInfo>>> {
        Ok(self.infos.get(&executable_script_id).cloned())
    }
}

#[derive(Default)]
struct Output {
    values: BTreeMap<String, Value>,
    modified: bool,
}

impl WritableScriptedResource for Output {
    fn resource_type(&self) -> DhisResourceType {
        DhisResourceType::ProgramStageEvent
    }

    fn get(&self, property: &str) -> Option<Value> {
        self.values.get(property).cloned()
    }

    fn set(&mut self, property: &str, value: &ScriptValue) -> std::result::Result<bool, String> {
        if property == "readOnly" {
            return Err("property readOnly cannot be written".to_string());
        }
        let value = value.to_json();
        let changed = self.values.get(property) != Some(&value);
        self.values.insert(property.to_string(), value);
        self.modified |= changed;
        Ok(changed)
    }

    fn is_modified(&self) -> bool {
        self.modified
    }

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn to_json(&self) -> Value {
        json!(self.values)
    }
}

fn native(code: &str, return_type: DataType, variables: &[ScriptVariable]) -> Script {
    Script::new(code, ScriptType::Evaluate, return_type)
        .with_variables(variables.iter().copied())
        .with_source(ScriptSource::new(ScriptLanguage::Native, code))
}

fn executor(scripts: InMemoryScripts, evaluator: NativeScriptEvaluator) -> ScriptExecutor {
    ScriptExecutor::new(Arc::new(scripts), FhirVersion::R4).with_evaluator(Arc::new(evaluator))
}

#[test]
fn only_declared_variables_are_bound() {
    let mut scripts = InMemoryScripts::default();
    let script = native("closed", DataType::Boolean, &[ScriptVariable::Input]);
    let id = scripts.add(script.clone(), ExecutableScript::new("closed", script.id));
    let evaluator = NativeScriptEvaluator::new().with_function("closed", |bindings| {
        Ok(ScriptValue::Boolean(
            bindings.variable(ScriptVariable::Input).is_some()
                && bindings.variable(ScriptVariable::Context).is_none()
                && !bindings.is_bound(ScriptVariable::Output),
        ))
    });
    let executor = executor(scripts, evaluator);
    let variables = ScriptVariables::new()
        .with(ScriptVariable::Input, json!({"id": "1"}))
        .with(ScriptVariable::Context, json!({}));

    let value = executor
        .execute("[rule]", id, &variables, None, &BTreeMap::new())
        .unwrap();
    assert_eq!(value, ScriptValue::Boolean(true));
}

#[test]
fn missing_required_variable_is_configuration_error() {
    let mut scripts = InMemoryScripts::default();
    let script = native(
        "needs-event",
        DataType::Boolean,
        &[ScriptVariable::Event, ScriptVariable::Output],
    );
    let id = scripts.add(script.clone(), ExecutableScript::new("E", script.id));
    let executor = executor(scripts, NativeScriptEvaluator::new());

    let err = executor
        .execute("[rule]", id, &ScriptVariables::new(), None, &BTreeMap::new())
        .unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @"configuration error: Script needs-event requires variables that are not available: output, event"
    );
}

#[test]
fn boolean_literal_needs_no_evaluator() {
    let mut scripts = InMemoryScripts::default();
    let script = Script::new("ALWAYS", ScriptType::Evaluate, DataType::Boolean)
        .with_variables([ScriptVariable::Context])
        .with_source(ScriptSource::new(ScriptLanguage::JavaScript, "true;"));
    let id = scripts.add(script.clone(), ExecutableScript::new("ALWAYS", script.id));
    let executor = ScriptExecutor::new(Arc::new(scripts), FhirVersion::R4);

    let value = executor
        .execute("[rule]", id, &ScriptVariables::new(), None, &BTreeMap::new())
        .unwrap();
    assert_eq!(value, ScriptValue::Boolean(true));
}

#[test]
fn evaluator_failure_is_wrapped_with_identity() {
    let mut scripts = InMemoryScripts::default();
    let script = native("fails", DataType::String, &[]);
    let id = scripts.add(script.clone(), ExecutableScript::new("FAILS_1", script.id));
    let evaluator = NativeScriptEvaluator::new()
        .with_function("fails", |_| Err(ScriptEvaluationError::failed("boom")));
    let executor = executor(scripts, evaluator);

    let err = executor
        .execute("[id=r1, name=Rule]", id, &ScriptVariables::new(), None, &BTreeMap::new())
        .unwrap_err();
    insta::assert_snapshot!(
        err.to_string(),
        @r#"script "fails" of rule [id=r1, name=Rule] failed: boom (executable script FAILS_1)"#
    );
    assert!(err.is_fatal());
}

#[test]
fn returned_strings_are_converted_to_return_type() {
    let mut scripts = InMemoryScripts::default();
    let script = native("org", DataType::OrgUnitRef, &[]);
    let id = scripts.add(script.clone(), ExecutableScript::new("org", script.id));
    let bad = native("bad", DataType::DateTime, &[]);
    let bad_id = scripts.add(bad.clone(), ExecutableScript::new("bad", bad.id));
    let evaluator = NativeScriptEvaluator::new()
        .with_function("org", |_| Ok(ScriptValue::from("CODE:OU_1")))
        .with_function("bad", |_| Ok(ScriptValue::Boolean(true)));
    let executor = executor(scripts, evaluator);
    let context = ScriptExecutionContext::new(&executor, "[rule]", ScriptVariables::new());

    assert_eq!(
        context.lookup(id).unwrap(),
        ScriptValue::Reference(Reference::code("OU_1"))
    );
    assert!(matches!(
        context.lookup(bad_id).unwrap_err(),
        TransformerError::Script { .. }
    ));
    assert_eq!(context.lookup_optional(None).unwrap(), ScriptValue::Null);
}

#[test]
fn arguments_reach_the_script() {
    let mut scripts = InMemoryScripts::default();
    let script = native("args", DataType::Integer, &[ScriptVariable::Args])
        .with_arg(ScriptArg::new("base", DataType::Integer).with_default("1"))
        .with_arg(ScriptArg::new("factor", DataType::Integer).mandatory());
    let factor_id = script.args[1].id;
    let with_override = scripts.add(
        script.clone(),
        ExecutableScript::new("ARGS_A", script.id)
            .with_override(ExecutableScriptArg::new(factor_id, Some("3".into()))),
    );
    let without_override = scripts.add(script.clone(), ExecutableScript::new("ARGS_B", script.id));
    let evaluator = NativeScriptEvaluator::new().with_function("args", |bindings| {
        let base = bindings.arg("base").and_then(ScriptValue::as_i64).unwrap_or(0);
        let factor = bindings.arg("factor").and_then(ScriptValue::as_i64).unwrap_or(0);
        Ok(ScriptValue::Integer(base * factor))
    });
    let executor = executor(scripts, evaluator);
    let context = ScriptExecutionContext::new(&executor, "[rule]", ScriptVariables::new());

    assert_eq!(context.lookup(with_override).unwrap(), ScriptValue::Integer(3));
    assert!(matches!(
        context.lookup(without_override).unwrap_err(),
        TransformerError::Configuration(_)
    ));

    let mut explicit = BTreeMap::new();
    explicit.insert("factor".to_string(), ScriptValue::Integer(5));
    explicit.insert("base".to_string(), ScriptValue::Integer(2));
    assert_eq!(
        context.lookup_with_args(without_override, &explicit).unwrap(),
        ScriptValue::Integer(10)
    );
}

#[test]
fn filter_and_transform_scripts() {
    let mut scripts = InMemoryScripts::default();
    let filter = native("filter", DataType::Boolean, &[ScriptVariable::Input]);
    let filter_id = scripts.add(filter.clone(), ExecutableScript::new("filter", filter.id));
    let transform = Script::new("transform", ScriptType::Transform, DataType::Boolean)
        .with_variables([ScriptVariable::Input, ScriptVariable::Output])
        .with_source(ScriptSource::new(ScriptLanguage::Native, "transform"));
    let transform_id =
        scripts.add(transform.clone(), ExecutableScript::new("transform", transform.id));
    let partial = Script::new("partial", ScriptType::Transform, DataType::Boolean)
        .with_variables([ScriptVariable::Output])
        .with_source(ScriptSource::new(ScriptLanguage::Native, "partial"));
    let partial_id = scripts.add(partial.clone(), ExecutableScript::new("partial", partial.id));

    let evaluator = NativeScriptEvaluator::new()
        .with_function("filter", |bindings| {
            let active = bindings
                .variable(ScriptVariable::Input)
                .and_then(|input| input.get("active"))
                .and_then(Value::as_bool);
            Ok(active.map_or(ScriptValue::Null, ScriptValue::Boolean))
        })
        .with_function("transform", |bindings| {
            let value = bindings
                .variable(ScriptVariable::Input)
                .and_then(|input| input.get("value"))
                .cloned()
                .unwrap_or(Value::Null);
            bindings.set_output("value", &ScriptValue::from_json(value))?;
            Ok(ScriptValue::Boolean(true))
        })
        .with_function("partial", |bindings| {
            bindings.set_output("first", &ScriptValue::from("written"))?;
            bindings.set_output("readOnly", &ScriptValue::from("x"))?;
            Ok(ScriptValue::Boolean(true))
        });
    let executor = executor(scripts, evaluator);

    let inactive = ScriptExecutionContext::new(
        &executor,
        "[rule]",
        ScriptVariables::new().with(ScriptVariable::Input, json!({"value": 4})),
    );
    let mut output = Output::default();
    assert!(!inactive.run_filter(Some(filter_id), &output).unwrap());
    assert!(inactive.run_filter(None, &output).unwrap());

    let active = ScriptExecutionContext::new(
        &executor,
        "[rule]",
        ScriptVariables::new().with(ScriptVariable::Input, json!({"active": true, "value": 4})),
    );
    assert!(active.run_filter(Some(filter_id), &output).unwrap());
    assert!(active.run_transform(Some(transform_id), &mut output).unwrap());
    assert!(output.is_modified());
    assert_eq!(output.get("value"), Some(json!(4)));

    let mut output = Output::default();
    let err = active
        .run_transform(Some(partial_id), &mut output)
        .unwrap_err();
    assert!(matches!(err, TransformerError::Script { .. }));
    // partial mutations stay applied
    assert_eq!(output.get("first"), Some(json!("written")));
}

#[test]
fn filter_reads_but_cannot_write_output() {
    let mut scripts = InMemoryScripts::default();
    let reading = native("reading", DataType::Boolean, &[ScriptVariable::Output]);
    let reading_id = scripts.add(reading.clone(), ExecutableScript::new("reading", reading.id));
    let writing = native("writing", DataType::Boolean, &[ScriptVariable::Output]);
    let writing_id = scripts.add(writing.clone(), ExecutableScript::new("writing", writing.id));
    let evaluator = NativeScriptEvaluator::new()
        .with_function("reading", |bindings| {
            let value = bindings.output().and_then(|output| output.get("value"));
            Ok(ScriptValue::Boolean(value == Some(json!(4))))
        })
        .with_function("writing", |bindings| {
            bindings.set_output("value", &ScriptValue::Integer(5))?;
            Ok(ScriptValue::Boolean(true))
        });
    let executor = executor(scripts, evaluator);
    let context = ScriptExecutionContext::new(&executor, "[rule]", ScriptVariables::new());

    let mut output = Output::default();
    output.values.insert("value".to_string(), json!(4));
    assert!(context.run_filter(Some(reading_id), &output).unwrap());

    let err = context.run_filter(Some(writing_id), &output).unwrap_err();
    assert!(matches!(err, TransformerError::Script { .. }));
    assert!(!output.is_modified());
    assert_eq!(output.get("value"), Some(json!(4)));
}
