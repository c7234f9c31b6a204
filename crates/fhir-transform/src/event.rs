//! FHIR to DHIS2 program stage event transformation.
//!
//! Event rules are bound to a mapped program stage. The event is added to
//! the active enrollment of the tracked entity instance; an event rule never
//! creates enrollments. Before a rule updates an existing event, the status
//! transitions of the rule are applied and the status and effective date of
//! the event must be applicable to the rule.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fhir_model::{
    DhisResource, DhisResourceType, Enrollment, Event, FhirResource, FhirResourceMapping,
    MappedTrackerProgramStage, PeriodCalculator, Program, ProgramStage, ProgramStageRuleData,
    Result, Rule, RuleKind, ScriptVariable, TransformerError, add_days,
};
use fhir_script::{ScriptExecutionContext, ScriptValue, WritableScriptedResource};
use tracing::{debug, info};

use crate::context::TransformerContext;
use crate::scripted::WritableScriptedEvent;
use crate::transformer::{
    FhirToDhisTransformer, TrackerCollaborators, TransformOutcome, location, organization_unit,
    resolve_date, resource_mapping, tracked_entity_instance, tracked_entity_type,
};

fn rule_data(rule: &Rule) -> Result<&ProgramStageRuleData> {
    match &rule.kind {
        RuleKind::ProgramStageEvent(data) => Ok(data),
        other => Err(TransformerError::configuration(format!(
            "Rule {rule} of type {} cannot be processed as program stage event rule",
            other.dhis_resource_type()
        ))),
    }
}

/// Program metadata and collaborators' results resolved for one input.
struct EventScope<'a> {
    stage: &'a MappedTrackerProgramStage,
    program: &'a Program,
    program_stage: &'a ProgramStage,
    enrollment: &'a Enrollment,
    mapping: &'a FhirResourceMapping,
    input: &'a FhirResource,
}

#[derive(Debug, Clone)]
pub struct ProgramStageEventTransformer {
    collaborators: TrackerCollaborators,
}

impl ProgramStageEventTransformer {
    pub fn new(collaborators: TrackerCollaborators) -> Self {
        Self { collaborators }
    }

    fn mapped_stage(
        &self,
        rule: &Rule,
        data: &ProgramStageRuleData,
    ) -> Result<Arc<MappedTrackerProgramStage>> {
        let stage_id = data.program_stage_id.ok_or_else(|| {
            TransformerError::mapping(format!("Rule {rule} is not bound to a program stage."))
        })?;
        self.collaborators
            .mappings
            .find_mapped_program_stage(stage_id)
            .ok_or_else(|| {
                TransformerError::mapping(format!(
                    "Rule {rule} requires mapped program stage {stage_id} that does not exist."
                ))
            })
    }

    fn program(&self, rule: &Rule, stage: &MappedTrackerProgramStage) -> Result<Program> {
        self.collaborators
            .metadata
            .program(&stage.program_reference)
            .ok_or_else(|| {
                TransformerError::mapping(format!(
                    "Rule {rule} requires program \"{}\" that does not exist.",
                    stage.program_reference
                ))
            })
    }

    /// Event date of a new or updated event.
    ///
    /// Stages generated by the enrollment date derive it from the
    /// enrollment. Otherwise the event date lookup is used with the same
    /// fallbacks as the enrollment date.
    pub fn event_date(
        &self,
        context: &TransformerContext,
        scripts: &ScriptExecutionContext<'_>,
        mapping: &FhirResourceMapping,
        program_stage: &ProgramStage,
        enrollment: &Enrollment,
        input: &FhirResource,
    ) -> Result<DateTime<Utc>> {
        if program_stage.generated_by_enrollment_date
            && let Some(enrollment_date) = enrollment.enrollment_date
        {
            return add_days(enrollment_date, program_stage.min_days_from_start);
        }
        resolve_date(
            scripts,
            mapping.imp_event_date_lookup_script_id,
            input,
            context.now,
            &format!("Event date of program stage instance \"{}\"", program_stage.name),
        )
    }

    fn create(
        &self,
        context: &TransformerContext,
        rule: &Rule,
        data: &ProgramStageRuleData,
        scripts: &ScriptExecutionContext<'_>,
        scope: &EventScope<'_>,
    ) -> Result<Option<Event>> {
        if context.is_creation_disabled()
            || !rule.create_enabled
            || !data.event_creation_enabled
            || !scope.stage.creation_enabled
        {
            debug!(rule = %rule, stage = %scope.stage.name, "creation of events is disabled");
            return Ok(None);
        }
        let org_unit_id = organization_unit(
            self.collaborators.metadata.as_ref(),
            scripts,
            scope.mapping.imp_event_org_lookup_script_id,
        )?
        .map(|org_unit| org_unit.id)
        .or_else(|| scope.enrollment.org_unit_id.clone());
        let Some(org_unit_id) = org_unit_id else {
            info!(
                rule = %rule,
                stage = %scope.program_stage.name,
                "event cannot be created without organization unit"
            );
            return Ok(None);
        };

        let event_date = self.event_date(
            context,
            scripts,
            scope.mapping,
            scope.program_stage,
            scope.enrollment,
            scope.input,
        )?;
        let mut event = Event::new_resource(&scope.program.id, &scope.program_stage.id);
        event.enrollment_id.clone_from(&scope.enrollment.id);
        event.tracked_entity_instance_id = Some(scope.enrollment.tracked_entity_instance_id.clone());
        event.org_unit_id = Some(org_unit_id);
        event.event_date = Some(event_date);
        let orig_due_date = scope
            .enrollment
            .incident_date
            .map(|incident_date| add_days(incident_date, scope.program_stage.min_days_from_start))
            .transpose()?;
        event.due_date = Some(orig_due_date.map_or(event_date, |due| due.max(event_date)));
        Ok(Some(event))
    }

    fn update_event_date(
        &self,
        context: &TransformerContext,
        data: &ProgramStageRuleData,
        scripts: &ScriptExecutionContext<'_>,
        scope: &EventScope<'_>,
        event: &mut Event,
    ) -> Result<()> {
        if !data.update_event_date || scope.program_stage.generated_by_enrollment_date {
            return Ok(());
        }
        let event_date = self.event_date(
            context,
            scripts,
            scope.mapping,
            scope.program_stage,
            scope.enrollment,
            scope.input,
        )?;
        if event.event_date != Some(event_date) {
            event.event_date = Some(event_date);
            event.modified = true;
            info!(event_date = %event_date, "updated event date");
        }
        Ok(())
    }

    /// Tests the effective date of the input against the event period of
    /// the rule. Without an effective date lookup every event applies.
    fn is_effective_date_applicable(
        &self,
        context: &TransformerContext,
        data: &ProgramStageRuleData,
        scripts: &ScriptExecutionContext<'_>,
        scope: &EventScope<'_>,
        event: &Event,
    ) -> Result<bool> {
        let value = scripts.lookup_optional(scope.mapping.imp_effective_date_lookup_script_id)?;
        let effective_date = match value {
            ScriptValue::Null => return Ok(true),
            ScriptValue::DateTime(date) => date,
            other => {
                return Err(TransformerError::data(format!(
                    "Effective date lookup returned a {} instead of a date-time.",
                    other.kind()
                )));
            }
        };
        let period = data.resolved_period(scope.stage);
        PeriodCalculator::new(scope.program_stage, Some(scope.enrollment), context.now)
            .is_effective_date_applicable(&period, effective_date, event)
    }
}

impl FhirToDhisTransformer for ProgramStageEventTransformer {
    fn dhis_resource_type(&self) -> DhisResourceType {
        DhisResourceType::ProgramStageEvent
    }

    fn is_sync_required(&self, _rule: &Rule) -> bool {
        false
    }

    fn transform(
        &self,
        context: &TransformerContext,
        input: &FhirResource,
        rule: &Arc<Rule>,
        scripts: &mut ScriptExecutionContext<'_>,
    ) -> Result<Option<TransformOutcome>> {
        let data = rule_data(rule)?;
        let stage = self.mapped_stage(rule, data)?;
        if !stage.enabled {
            debug!(rule = %rule, stage = %stage.name, "ignoring disabled program stage");
            return Ok(None);
        }

        // context
        let program = self.program(rule, &stage)?;
        let program_stage = program
            .find_stage(&stage.program_stage_reference)
            .ok_or_else(|| {
                TransformerError::mapping(format!(
                    "Rule {rule} requires program stage \"{}\" that is not included in program \"{}\".",
                    stage.program_stage_reference, program.name
                ))
            })?;
        let metadata = self.collaborators.metadata.as_ref();
        let entity_type = tracked_entity_type(metadata, &program)?;
        scripts.set_serialized(ScriptVariable::Program, &program);
        scripts.set_serialized(ScriptVariable::ProgramStage, program_stage);
        scripts.set_serialized(ScriptVariable::TrackedEntityType, &entity_type);
        scripts.set_serialized(
            ScriptVariable::TrackedEntityAttributes,
            &metadata.tracked_entity_attributes(),
        );
        let mapping = resource_mapping(self.collaborators.mappings.as_ref(), rule)?;
        let Some(instance) =
            tracked_entity_instance(&self.collaborators, scripts, &mapping, &entity_type, false)?
        else {
            return Ok(None);
        };
        scripts.set_serialized(ScriptVariable::TrackedEntityInstance, &instance);
        context.check_aborted()?;

        // target identity
        let resources = self.collaborators.resources.as_ref();
        let Some(enrollment) =
            resources.find_latest_active_enrollment(&program.id, &instance.id, false)
        else {
            info!(
                rule = %rule,
                program = %program.name,
                "tracked entity instance has no active enrollment"
            );
            return Ok(None);
        };
        if !data
            .applicable_enrollment_status
            .is_applicable(enrollment.status)?
        {
            debug!(rule = %rule, status = %enrollment.status, "enrollment status is not applicable");
            return Ok(None);
        }
        scripts.set_serialized(ScriptVariable::Enrollment, &enrollment);
        let scope = EventScope {
            stage: &stage,
            program: &program,
            program_stage,
            enrollment: &enrollment,
            mapping: &mapping,
            input,
        };

        let existing = enrollment
            .id
            .as_deref()
            .and_then(|enrollment_id| {
                resources
                    .find_events(&program_stage.id, enrollment_id, false)
                    .into_iter()
                    .next()
            });
        let mut event = match existing {
            Some(_) if !rule.update_enabled => {
                debug!(rule = %rule, "updating events is disabled");
                return Ok(None);
            }
            Some(mut event) => {
                if data.event_status_update.update(&mut event) {
                    debug!(rule = %rule, "event status has been set to active");
                }
                event
            }
            None => match self.create(context, rule, data, scripts, &scope)? {
                Some(event) => event,
                None => return Ok(None),
            },
        };

        if !data.applicable_event_status.is_applicable(event.status)? {
            debug!(rule = %rule, status = %event.status, "event status is not applicable");
            return Ok(None);
        }
        if !self.is_effective_date_applicable(context, data, scripts, &scope, &event)? {
            info!(
                rule = %rule,
                stage = %program_stage.name,
                "effective date of input is outside of the event period"
            );
            return Ok(None);
        }
        if !event.new_resource {
            self.update_event_date(context, data, scripts, &scope, &mut event)?;
        }
        scripts.set_serialized(ScriptVariable::Event, &event);
        context.check_aborted()?;

        // output
        let converters = scripts.executor().converters();
        let mut output = WritableScriptedEvent::new(program_stage, event, converters);
        let direction = context.direction();
        if !scripts.run_filter(rule.filter_script(direction), &output)? {
            debug!(rule = %rule, "event rule does not apply to input");
            return Ok(None);
        }
        context.check_aborted()?;
        if !scripts.run_transform(rule.transform_script(direction), &mut output)? {
            debug!(rule = %rule, "event transformation has been rejected by transform script");
            return Ok(None);
        }
        if output.event().coordinate.is_none()
            && let Some(coordinate) = location(scripts, mapping.imp_event_geo_lookup_script_id)?
        {
            output.set_coordinate(coordinate);
        }
        if output.is_modified() {
            output.validate()?;
        }
        Ok(Some(TransformOutcome::new(
            Arc::clone(rule),
            DhisResource::Event(output.into_inner()),
        )))
    }
}
