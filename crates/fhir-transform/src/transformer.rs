//! Transformer trait and registry.
//!
//! Each DHIS2 resource family has one transformer. The service looks up the
//! transformer of a rule by the rule's [`DhisResourceType`].
//!
//! # Example
//!
//! ```ignore
//! let registry = TransformerRegistry::with_tracker_transformers(collaborators);
//! if let Some(transformer) = registry.get(rule.dhis_resource_type()) {
//!     transformer.transform(&context, &input, &rule, &mut scripts)?;
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fhir_model::{
    DhisResource, DhisResourceId, DhisResourceType, FhirResource, FhirResourceMapping, Location,
    OrganizationUnit, Program, Reference, Result, Rule, TrackedEntityInstance, TrackedEntityType,
    TransformerError,
};
use fhir_rules::MappingRepository;
use fhir_script::{ScriptExecutionContext, ScriptValue};
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::TransformerContext;
use crate::enrollment::EnrollmentTransformer;
use crate::event::ProgramStageEventTransformer;
use crate::lookup::{DhisResourceLookup, MetadataLookup};

/// Result of a successful rule evaluation, handed to the write collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutcome {
    pub rule: Arc<Rule>,
    pub resource: DhisResource,
    pub is_new: bool,
    pub is_deletion: bool,
}

impl TransformOutcome {
    pub fn new(rule: Arc<Rule>, resource: DhisResource) -> Self {
        let is_new = resource.is_new();
        Self {
            rule,
            resource,
            is_new,
            is_deletion: false,
        }
    }

    /// Outcome that deletes the identified resource.
    pub fn deletion(rule: Arc<Rule>, id: DhisResourceId) -> Self {
        Self {
            rule,
            resource: DhisResource::Identity(id),
            is_new: false,
            is_deletion: true,
        }
    }
}

/// External collaborators shared by the tracker transformers.
#[derive(Clone)]
pub struct TrackerCollaborators {
    pub metadata: Arc<dyn MetadataLookup>,
    pub resources: Arc<dyn DhisResourceLookup>,
    pub mappings: Arc<dyn MappingRepository>,
}

impl std::fmt::Debug for TrackerCollaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerCollaborators").finish_non_exhaustive()
    }
}

/// Transforms a FHIR resource into one DHIS2 resource family.
pub trait FhirToDhisTransformer: Send + Sync {
    fn dhis_resource_type(&self) -> DhisResourceType;

    /// Whether the target resource must be re-read without caches before a
    /// new one is created, because the program binding of the rule is only
    /// known from the input.
    fn is_sync_required(&self, rule: &Rule) -> bool;

    /// Runs the pipeline of one rule. `None` means that the rule does not
    /// produce an outcome for the input.
    ///
    /// # Errors
    ///
    /// Mapping and data errors abort the rule only. All other errors abort
    /// the transformation of the resource.
    fn transform(
        &self,
        context: &TransformerContext,
        input: &FhirResource,
        rule: &Arc<Rule>,
        scripts: &mut ScriptExecutionContext<'_>,
    ) -> Result<Option<TransformOutcome>>;

    /// Identity-only outcome that deletes the DHIS2 resource.
    fn transform_deletion(&self, rule: &Arc<Rule>, dhis_id: &str) -> Result<TransformOutcome> {
        Ok(TransformOutcome::deletion(
            Arc::clone(rule),
            DhisResourceId::new(self.dhis_resource_type(), dhis_id),
        ))
    }
}

/// Registry of transformers indexed by DHIS2 resource type.
#[derive(Default)]
pub struct TransformerRegistry {
    transformers: HashMap<DhisResourceType, Box<dyn FhirToDhisTransformer>>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the enrollment and program stage event transformers.
    pub fn with_tracker_transformers(collaborators: &TrackerCollaborators) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(EnrollmentTransformer::new(collaborators.clone())));
        registry.register(Box::new(ProgramStageEventTransformer::new(
            collaborators.clone(),
        )));
        registry
    }

    /// Registers a transformer, replacing one for the same resource type.
    pub fn register(&mut self, transformer: Box<dyn FhirToDhisTransformer>) {
        self.transformers
            .insert(transformer.dhis_resource_type(), transformer);
    }

    pub fn get(&self, resource_type: DhisResourceType) -> Option<&dyn FhirToDhisTransformer> {
        self.transformers.get(&resource_type).map(AsRef::as_ref)
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    pub fn resource_types(&self) -> impl Iterator<Item = DhisResourceType> + '_ {
        self.transformers.keys().copied()
    }
}

impl std::fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.resource_types().collect();
        types.sort();
        f.debug_struct("TransformerRegistry")
            .field("resource_types", &types)
            .finish()
    }
}

pub(crate) fn resource_mapping(
    mappings: &dyn MappingRepository,
    rule: &Rule,
) -> Result<Arc<FhirResourceMapping>> {
    mappings
        .find_resource_mapping(rule.fhir_resource_type)
        .ok_or_else(|| {
            TransformerError::mapping(format!(
                "No FHIR resource mapping has been defined for {}.",
                rule.fhir_resource_type
            ))
        })
}

pub(crate) fn tracked_entity_type(
    metadata: &dyn MetadataLookup,
    program: &Program,
) -> Result<TrackedEntityType> {
    let type_id = program.tracked_entity_type_id.as_deref().ok_or_else(|| {
        TransformerError::mapping(format!(
            "Program \"{}\" does not reference a tracked entity type.",
            program.name
        ))
    })?;
    metadata
        .tracked_entity_type(&Reference::id(type_id))
        .ok_or_else(|| {
            TransformerError::mapping(format!(
                "Program \"{}\" references tracked entity type {type_id} that does not exist.",
                program.name
            ))
        })
}

fn script_reference(value: &ScriptValue, what: &str) -> Result<Option<Reference>> {
    match value {
        ScriptValue::Null => Ok(None),
        ScriptValue::Reference(reference) => Ok(Some(reference.clone())),
        ScriptValue::String(id) if id.trim().is_empty() => Ok(None),
        ScriptValue::String(id) => Ok(Some(Reference::id(id.trim()))),
        other => Err(TransformerError::data(format!(
            "{what} lookup returned a {} instead of a reference.",
            other.kind()
        ))),
    }
}

/// Looks up the tracked entity instance of the input. `None` if the input
/// does not identify one or it does not exist yet.
pub(crate) fn tracked_entity_instance(
    collaborators: &TrackerCollaborators,
    scripts: &ScriptExecutionContext<'_>,
    mapping: &FhirResourceMapping,
    tracked_entity_type: &TrackedEntityType,
    refreshed: bool,
) -> Result<Option<TrackedEntityInstance>> {
    let script_id = mapping.imp_tei_lookup_script_id.ok_or_else(|| {
        TransformerError::mapping(format!(
            "FHIR resource mapping of {} does not define a tracked entity instance lookup.",
            mapping.fhir_resource_type
        ))
    })?;
    let identifier = match scripts.lookup(script_id)? {
        ScriptValue::Null => None,
        ScriptValue::Reference(reference) => Some(reference.value),
        value => value.as_str().map(ToString::to_string),
    };
    let Some(identifier) = identifier.filter(|identifier| !identifier.is_empty()) else {
        debug!(rule = scripts.rule(), "input does not identify a tracked entity instance");
        return Ok(None);
    };
    let instance = collaborators.resources.find_tracked_entity_instance(
        &tracked_entity_type.id,
        &identifier,
        refreshed,
    );
    if instance.is_none() {
        info!(
            rule = scripts.rule(),
            tracked_entity_type = %tracked_entity_type.name,
            "tracked entity instance does not exist"
        );
    }
    Ok(instance)
}

/// Runs an organization unit lookup script and resolves its result.
pub(crate) fn organization_unit(
    metadata: &dyn MetadataLookup,
    scripts: &ScriptExecutionContext<'_>,
    script_id: Option<Uuid>,
) -> Result<Option<OrganizationUnit>> {
    let value = scripts.lookup_optional(script_id)?;
    let Some(reference) = script_reference(&value, "Organization unit")? else {
        return Ok(None);
    };
    Ok(metadata.organization_unit(&reference))
}

pub(crate) fn location(
    scripts: &ScriptExecutionContext<'_>,
    script_id: Option<Uuid>,
) -> Result<Option<Location>> {
    match scripts.lookup_optional(script_id)? {
        ScriptValue::Null => Ok(None),
        ScriptValue::Location(location) => Ok(Some(location)),
        other => Err(TransformerError::data(format!(
            "Location lookup returned a {} instead of a location.",
            other.kind()
        ))),
    }
}

pub(crate) fn program_reference(value: &ScriptValue) -> Result<Option<Reference>> {
    script_reference(value, "Program reference")
}

/// Date of a new resource: the lookup script result, else the last update
/// of the input, else the current time. Fallbacks are logged.
pub(crate) fn resolve_date(
    scripts: &ScriptExecutionContext<'_>,
    script_id: Option<Uuid>,
    input: &FhirResource,
    now: DateTime<Utc>,
    subject: &str,
) -> Result<DateTime<Utc>> {
    let value = scripts.lookup_optional(script_id)?;
    let date = match value {
        ScriptValue::Null => None,
        ScriptValue::DateTime(date) => Some(date),
        other => {
            return Err(TransformerError::data(format!(
                "{subject} lookup returned a {} instead of a date-time.",
                other.kind()
            )));
        }
    };
    if let Some(date) = date {
        return Ok(date);
    }
    if let Some(last_updated) = input.last_updated {
        info!(
            rule = scripts.rule(),
            "{subject} has not been returned by the date lookup (using last updated timestamp)"
        );
        return Ok(last_updated);
    }
    info!(
        rule = scripts.rule(),
        "{subject} has not been returned by the date lookup (using current timestamp)"
    );
    Ok(now)
}
