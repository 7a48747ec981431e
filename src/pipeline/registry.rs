//! Render-job assembly.
//!
//! Turns the request's ordered datasets plus the compiled-template registry
//! into the ordered subreport job list and the master fill parameters. Job
//! order is request key order, then record order within a key; the engine
//! consumes jobs positionally, so this order is part of the contract.

use indexmap::IndexMap;

use crate::engine::{
    CompiledTemplate, CompositionParameters, ParamValue, RowSource, PARAM_SUBREPORT_DATA_SOURCES,
    PARAM_SUBREPORT_SOURCES,
};
use crate::request::{CompositionRequest, TemplateKey};

/// One subreport invocation: a compiled template paired with its row source.
///
/// Jobs are created one per record; the row source wraps a one-element
/// batch, since the engine expects one data row per subreport invocation.
#[derive(Debug, Clone)]
pub struct RenderJob {
    template: CompiledTemplate,
    rows: RowSource,
}

impl RenderJob {
    /// Pair a compiled template with a row source.
    pub fn new(template: CompiledTemplate, rows: RowSource) -> Self {
        RenderJob { template, rows }
    }

    /// The compiled template this job renders with.
    pub fn template(&self) -> &CompiledTemplate {
        &self.template
    }

    /// The rows this job binds.
    pub fn rows(&self) -> &RowSource {
        &self.rows
    }
}

/// Build the ordered subreport job list.
///
/// Walks datasets in request order. The master key is never a subreport.
/// Keys without a compiled counterpart are skipped with a warning rather
/// than failing the request: the master template may legitimately ignore
/// some data keys.
pub fn build_jobs(
    request: &CompositionRequest,
    registry: &IndexMap<TemplateKey, CompiledTemplate>,
) -> Vec<RenderJob> {
    let mut jobs = Vec::with_capacity(request.record_count());
    for (key, records) in request.datasets() {
        if key.is_master() {
            continue;
        }
        let Some(template) = registry.get(key) else {
            log::warn!(
                "no compiled template for dataset '{}', skipping {} record(s)",
                key,
                records.len()
            );
            continue;
        };
        for record in records {
            jobs.push(RenderJob::new(
                template.clone(),
                RowSource::single(record.clone()),
            ));
        }
    }
    jobs
}

/// Build the master fill parameters: the two reserved parallel lists drawn
/// from `jobs`, plus every top-level request field.
pub fn base_parameters(request: &CompositionRequest, jobs: &[RenderJob]) -> CompositionParameters {
    let mut parameters = CompositionParameters::new();
    parameters.insert(
        PARAM_SUBREPORT_SOURCES,
        ParamValue::Templates(jobs.iter().map(|job| job.template().clone()).collect()),
    );
    parameters.insert(
        PARAM_SUBREPORT_DATA_SOURCES,
        ParamValue::RowSources(jobs.iter().map(|job| job.rows().clone()).collect()),
    );
    for (name, value) in request.fields() {
        if name == PARAM_SUBREPORT_SOURCES || name == PARAM_SUBREPORT_DATA_SOURCES {
            log::warn!("request field '{}' shadows a reserved parameter, ignored", name);
            continue;
        }
        parameters.set_field(name.clone(), value.clone());
    }
    parameters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{FieldValue, Record};
    use serde_json::json;

    fn record(name: &str) -> Record {
        let mut record = Record::new();
        record.insert("name".to_string(), FieldValue::from(name));
        record
    }

    fn compiled(key: &str) -> CompiledTemplate {
        CompiledTemplate::new(TemplateKey::new(key), key.to_string())
    }

    fn registry_of(keys: &[&str]) -> IndexMap<TemplateKey, CompiledTemplate> {
        keys.iter()
            .map(|key| (TemplateKey::new(key), compiled(key)))
            .collect()
    }

    #[test]
    fn test_one_job_per_record_in_request_order() {
        let request = CompositionRequest::new()
            .with_dataset("relative", vec![record("R1"), record("R2")])
            .with_dataset("address", vec![record("A1")]);
        let registry = registry_of(&["master", "relative", "address"]);

        let jobs = build_jobs(&request, &registry);
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[0].template().key().as_str(), "relative");
        assert_eq!(jobs[0].rows().row(0).unwrap()["name"].as_str(), Some("R1"));
        assert_eq!(jobs[1].rows().row(0).unwrap()["name"].as_str(), Some("R2"));
        assert_eq!(jobs[2].template().key().as_str(), "address");

        // Records of one key share one artifact.
        assert!(jobs[0].template().shares_artifact(jobs[1].template()));
    }

    #[test]
    fn test_master_and_uncompiled_keys_skipped() {
        let request = CompositionRequest::new()
            .with_dataset("master", vec![record("M")])
            .with_dataset("unknown", vec![record("U")])
            .with_dataset("relative", vec![record("R")]);
        let registry = registry_of(&["master", "relative"]);

        let jobs = build_jobs(&request, &registry);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].template().key().as_str(), "relative");
    }

    #[test]
    fn test_base_parameters_parallel_lists_and_fields() {
        let request = CompositionRequest::from_value(&json!({
            "relative": [{"name": "R1"}, {"name": "R2"}],
            "title": "Family report",
            "SubreportSources": "spoofed"
        }))
        .unwrap();
        let registry = registry_of(&["relative"]);
        let jobs = build_jobs(&request, &registry);

        let parameters = base_parameters(&request, &jobs);
        assert_eq!(parameters.subreport_sources().len(), 2);
        assert_eq!(parameters.subreport_data_sources().len(), 2);
        assert_eq!(parameters.subreport_data_sources()[0].row_count(), 1);
        assert_eq!(
            parameters.field("title").and_then(FieldValue::as_str),
            Some("Family report")
        );
        // Reserved names cannot be shadowed by request fields.
        assert_eq!(parameters.subreport_sources().len(), 2);
        assert!(parameters.field(PARAM_SUBREPORT_SOURCES).is_none());
    }
}
