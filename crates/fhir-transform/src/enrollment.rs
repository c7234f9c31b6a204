//! FHIR to DHIS2 enrollment transformation.
//!
//! The program of the enrollment is evaluated from the input by the
//! program reference lookup of the rule. Existing enrollments are found by
//! the addressed id or as the latest active enrollment of the tracked
//! entity instance in that program; otherwise a new one is created.

use std::sync::Arc;

use fhir_model::{
    DhisResource, DhisResourceType, Enrollment, EnrollmentRuleData, FhirResource,
    FhirResourceMapping, Program, Result, Rule, RuleKind, ScriptVariable, TrackedEntityInstance,
    TransformerError,
};
use fhir_script::{ScriptExecutionContext, WritableScriptedResource};
use tracing::{debug, info};

use crate::context::TransformerContext;
use crate::scripted::WritableScriptedEnrollment;
use crate::transformer::{
    FhirToDhisTransformer, TrackerCollaborators, TransformOutcome, location, organization_unit,
    program_reference, resolve_date, resource_mapping, tracked_entity_instance,
    tracked_entity_type,
};

/// Program, tracked entity instance and mapping resolved for one input.
struct EnrollmentScope<'a> {
    program: &'a Program,
    instance: &'a TrackedEntityInstance,
    mapping: &'a FhirResourceMapping,
    input: &'a FhirResource,
}

#[derive(Debug, Clone)]
pub struct EnrollmentTransformer {
    collaborators: TrackerCollaborators,
}

fn rule_data(rule: &Rule) -> Result<&EnrollmentRuleData> {
    match &rule.kind {
        RuleKind::Enrollment(data) => Ok(data),
        other => Err(TransformerError::configuration(format!(
            "Rule {rule} of type {} cannot be processed as enrollment rule",
            other.dhis_resource_type()
        ))),
    }
}

impl EnrollmentTransformer {
    pub fn new(collaborators: TrackerCollaborators) -> Self {
        Self { collaborators }
    }

    fn program(
        &self,
        scripts: &ScriptExecutionContext<'_>,
        data: &EnrollmentRuleData,
    ) -> Result<Program> {
        let value = scripts.lookup_optional(data.program_ref_lookup_script_id)?;
        let reference = program_reference(&value)?.ok_or_else(|| {
            TransformerError::data("FHIR resource does not contain a reference to a tracker program.")
        })?;
        let program = self
            .collaborators
            .metadata
            .program(&reference)
            .ok_or_else(|| {
                TransformerError::data(format!("Tracker program \"{reference}\" does not exist."))
            })?;
        if !program.registration {
            return Err(TransformerError::data(format!(
                "Tracker program \"{reference}\" does not require registration."
            )));
        }
        Ok(program)
    }

    /// Enrollment date of a new enrollment.
    ///
    /// Falls back to the last update of the input and then to the current
    /// time. A date in the future is rejected unless the program allows it.
    pub fn enrollment_date(
        &self,
        context: &TransformerContext,
        scripts: &ScriptExecutionContext<'_>,
        mapping: &FhirResourceMapping,
        program: &Program,
        input: &FhirResource,
    ) -> Result<chrono::DateTime<chrono::Utc>> {
        let subject = format!("Enrollment date of program instance \"{}\"", program.name);
        let date = resolve_date(
            scripts,
            mapping.imp_enrollment_date_lookup_script_id,
            input,
            context.now,
            &subject,
        )?;
        if date > context.now && !program.select_enrollment_dates_in_future {
            return Err(TransformerError::data(format!(
                "{subject} is in the future and program does not allow dates in the future."
            )));
        }
        Ok(date)
    }

    fn existing(
        &self,
        context: &TransformerContext,
        program: &Program,
        instance: &TrackedEntityInstance,
        refreshed: bool,
    ) -> Result<Option<Enrollment>> {
        if let Some(id) = context.dhis_id()?
            && let Some(enrollment) = self.collaborators.resources.find_enrollment(id)
        {
            return Ok(Some(enrollment));
        }
        Ok(self.collaborators.resources.find_latest_active_enrollment(
            &program.id,
            &instance.id,
            refreshed,
        ))
    }

    fn create(
        &self,
        context: &TransformerContext,
        rule: &Rule,
        scripts: &ScriptExecutionContext<'_>,
        scope: &EnrollmentScope<'_>,
    ) -> Result<Option<Enrollment>> {
        if context.is_creation_disabled() || !rule.create_enabled {
            debug!(rule = %rule, "creation of enrollments is disabled");
            return Ok(None);
        }
        let mapping = scope.mapping;
        let enrollment_date =
            self.enrollment_date(context, scripts, mapping, scope.program, scope.input)?;
        let org_unit = organization_unit(
            self.collaborators.metadata.as_ref(),
            scripts,
            mapping.imp_enrollment_org_lookup_script_id,
        )?
        .ok_or_else(|| {
            TransformerError::data("Resource does not include a valid organization unit.")
        })?;

        let mut enrollment = Enrollment::new_resource(&scope.program.id, &scope.instance.id);
        enrollment.org_unit_id = Some(org_unit.id);
        enrollment.enrollment_date = Some(enrollment_date);
        enrollment.incident_date = Some(enrollment_date);
        enrollment.coordinate = location(scripts, mapping.imp_enrollment_geo_lookup_script_id)?;
        Ok(Some(enrollment))
    }
}

impl FhirToDhisTransformer for EnrollmentTransformer {
    fn dhis_resource_type(&self) -> DhisResourceType {
        DhisResourceType::Enrollment
    }

    fn is_sync_required(&self, rule: &Rule) -> bool {
        matches!(
            &rule.kind,
            RuleKind::Enrollment(data) if data.program_ref_lookup_script_id.is_some()
        )
    }

    fn transform(
        &self,
        context: &TransformerContext,
        input: &FhirResource,
        rule: &Arc<Rule>,
        scripts: &mut ScriptExecutionContext<'_>,
    ) -> Result<Option<TransformOutcome>> {
        let data = rule_data(rule)?;
        if data.program_ref_lookup_script_id.is_none() {
            debug!(rule = %rule, "enrollment rule without program reference lookup");
            return Ok(None);
        }

        // context
        let program = self.program(scripts, data)?;
        let metadata = self.collaborators.metadata.as_ref();
        let entity_type = tracked_entity_type(metadata, &program)?;
        scripts.set_serialized(ScriptVariable::Program, &program);
        scripts.set_serialized(ScriptVariable::TrackedEntityType, &entity_type);
        scripts.set_serialized(
            ScriptVariable::TrackedEntityAttributes,
            &metadata.tracked_entity_attributes(),
        );
        let mapping = resource_mapping(self.collaborators.mappings.as_ref(), rule)?;
        let Some(instance) = tracked_entity_instance(
            &self.collaborators,
            scripts,
            &mapping,
            &entity_type,
            false,
        )?
        else {
            return Ok(None);
        };
        scripts.set_serialized(ScriptVariable::TrackedEntityInstance, &instance);
        context.check_aborted()?;

        // target identity
        let scope = EnrollmentScope {
            program: &program,
            instance: &instance,
            mapping: &mapping,
            input,
        };
        let mut enrollment = match self.existing(context, &program, &instance, false)? {
            Some(_) if !rule.update_enabled => {
                debug!(rule = %rule, "updating enrollments is disabled");
                return Ok(None);
            }
            Some(existing) => Some(existing),
            None => self.create(context, rule, scripts, &scope)?,
        };
        if enrollment.as_ref().is_some_and(|enrollment| enrollment.new_resource)
            && context.options.sync_enabled
            && self.is_sync_required(rule)
            && let Some(existing) = self.existing(context, &program, &instance, true)?
        {
            info!(rule = %rule, "enrollment has been created in the meantime");
            enrollment = Some(existing);
        }
        let Some(enrollment) = enrollment else {
            return Ok(None);
        };
        scripts.set_serialized(ScriptVariable::Enrollment, &enrollment);
        context.check_aborted()?;

        // output
        let converters = scripts.executor().converters();
        let mut output =
            WritableScriptedEnrollment::new(&program, enrollment, converters, context.now);
        let direction = context.direction();
        if !scripts.run_filter(rule.filter_script(direction), &output)? {
            debug!(rule = %rule, "enrollment rule does not apply to input");
            return Ok(None);
        }
        context.check_aborted()?;
        if !scripts.run_transform(rule.transform_script(direction), &mut output)? {
            debug!(rule = %rule, "enrollment transformation has been rejected by transform script");
            return Ok(None);
        }
        if output.is_modified() {
            output.validate()?;
        }
        let enrollment = output.into_inner();
        Ok(Some(TransformOutcome::new(
            Arc::clone(rule),
            DhisResource::Enrollment(enrollment),
        )))
    }
}
