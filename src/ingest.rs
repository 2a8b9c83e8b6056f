//! File ingester: drives one manifest file from raw CSV to workflow dispatch.
//!
//! Responsibilities here are file-scoped: the duplicate-submission guard,
//! header validation, row cleaning into the internal vocabulary, and routing
//! the cleaned rows to the workflow for the job. Row-scoped failures are the
//! workflows' problem and never abort the file.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use diesel::PgConnection;

use crate::{
    controller::{IncidentSpec, JobController},
    db::{
        self, file_processed,
        file_processed::NewFileProcessed,
        manifest as manifest_dao,
    },
    jobs::{GenomeType, GenomicJob, IncidentCode, RunResult},
    manifest::{
        columns::{self, ColumnMap},
        validate::{self, StructureCheck},
    },
    storage::ManifestStore,
};

pub mod aw1;
pub mod aw2;
pub mod aw4;
pub mod aw5;
pub mod gem;

pub const FILE_RESULT_SUCCESS: &str = "success";
pub const FILE_RESULT_ERROR: &str = "error";

/// One manifest file dropped in a bucket, as named by the task payload.
pub struct FileInput {
    pub job: GenomicJob,
    pub bucket: String,
    pub file_path: String,
    pub upload_date: Option<NaiveDateTime>,
    pub create_feedback_record: bool,
}

impl FileInput {
    pub fn file_name(&self) -> &str {
        self.file_path.rsplit('/').next().unwrap_or(&self.file_path)
    }
}

/// Immutable file context handed to the workflows.
pub struct IngestionContext {
    pub job: GenomicJob,
    pub file_processed_id: i64,
    pub genome_type: Option<GenomeType>,
    pub gc_site_id: Option<String>,
}

pub fn ingest_manifest_file(
    conn: &mut PgConnection,
    store: &dyn ManifestStore,
    controller: &mut JobController,
    input: &FileInput,
) -> db::Result<RunResult> {
    let job = input.job;
    let file_name = input.file_name().to_string();

    // Idempotent reingestion guard. Metrics ingestion is exempt: corrected
    // AW2 data overwrites existing metric rows instead.
    if job != GenomicJob::MetricsIngestion
        && file_processed::already_processed(conn, &input.bucket, &input.file_path)?
    {
        tracing::info!(
            bucket = %input.bucket,
            file = %input.file_path,
            "manifest already processed, skipping"
        );
        return Ok(RunResult::NoFiles);
    }

    let genome_type = validate::genome_type_from_filename(job, &file_name);
    let Some(columns) = columns::expected_columns(job, genome_type) else {
        return Err(db::Error::manifest_file(format!(
            "no manifest columns defined for job {job} and file {file_name}"
        )));
    };

    let contents = store.read(&input.bucket, &input.file_path)?;
    let upload_date = input
        .upload_date
        .or_else(|| validate::timestamp_from_filename(&file_name));

    let file_record = NewFileProcessed {
        run_id: controller.run_id,
        bucket_name: input.bucket.clone(),
        file_path: input.file_path.clone(),
        file_name: file_name.clone(),
        upload_date,
    }
    .create(conn)?;

    let mut reader = csv::Reader::from_reader(contents.as_bytes());
    let raw_headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect();

    match validate::check_structure(columns, &raw_headers) {
        StructureCheck::Missing(missing) => {
            controller.create_incident(
                conn,
                IncidentCode::FileValidationFailedStructure,
                IncidentSpec {
                    message: format!("{file_name}: missing expected columns: {}", missing.join(", ")),
                    source_file_processed_id: Some(file_record.id),
                    ..Default::default()
                },
            )?;
            file_processed::mark_processed(conn, file_record.id, FILE_RESULT_ERROR)?;
            return Ok(RunResult::Error);
        }
        StructureCheck::Extra(extra) => {
            // Tolerated: the unknown keys are dropped during row cleaning.
            controller.create_incident(
                conn,
                IncidentCode::FileValidationFailedStructure,
                IncidentSpec {
                    message: format!("{file_name}: unexpected columns: {}", extra.join(", ")),
                    source_file_processed_id: Some(file_record.id),
                    ..Default::default()
                },
            )?;
        }
        StructureCheck::Valid => {}
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(clean_row(columns, &raw_headers, &record?));
    }

    for row in &rows {
        if let Err(message) = validate::check_enumerated_values(job, genome_type, row) {
            controller.create_incident(
                conn,
                IncidentCode::FileValidationFailedValues,
                IncidentSpec {
                    message: format!("{file_name}: {message}"),
                    source_file_processed_id: Some(file_record.id),
                    always_notify: true,
                    ..Default::default()
                },
            )?;
            file_processed::mark_processed(conn, file_record.id, FILE_RESULT_ERROR)?;
            return Ok(RunResult::Error);
        }
    }

    // An AW1 manifest opens the feedback loop the AW2F counts reconcile
    // against.
    if input.create_feedback_record && job == GenomicJob::Aw1Manifest {
        let manifest_file = manifest_dao::NewManifestFile {
            manifest_type: "AW1".to_string(),
            bucket_name: input.bucket.clone(),
            file_path: input.file_path.clone(),
            record_count: rows.len() as i32,
            upload_date,
        }
        .create(conn)?;
        manifest_dao::create_feedback(conn, manifest_file.id)?;
        file_processed::set_manifest_file(conn, file_record.id, manifest_file.id)?;
    }

    let context = IngestionContext {
        job,
        file_processed_id: file_record.id,
        genome_type,
        gc_site_id: validate::gc_site_from_filename(&file_name),
    };

    let result = match job {
        GenomicJob::Aw1Manifest | GenomicJob::Aw1fManifest => {
            aw1::ingest(conn, controller, &context, &rows)?
        }
        GenomicJob::MetricsIngestion => aw2::ingest(conn, controller, &context, &rows)?,
        GenomicJob::GemA2Manifest => gem::ingest(conn, controller, &context, &rows)?,
        GenomicJob::Aw4ArrayManifest | GenomicJob::Aw4WgsManifest => {
            aw4::ingest(conn, controller, &context, &rows)?
        }
        GenomicJob::Aw5ArrayManifest | GenomicJob::Aw5WgsManifest => {
            aw5::ingest(conn, controller, &context, &rows)?
        }
        other => {
            return Err(db::Error::manifest_file(format!(
                "{other} is not a manifest ingestion job"
            )));
        }
    };

    let file_result = match result {
        RunResult::Error => FILE_RESULT_ERROR,
        _ => FILE_RESULT_SUCCESS,
    };
    file_processed::mark_processed(conn, file_record.id, file_result)?;
    tracing::info!(
        file = %input.file_path,
        rows = rows.len(),
        result = %result,
        "manifest ingestion finished"
    );

    Ok(result)
}

/// Map one raw CSV record into the internal vocabulary: headers normalized
/// and translated via the column map, values trimmed, unknown keys dropped.
pub fn clean_row(
    columns: ColumnMap,
    raw_headers: &[String],
    record: &csv::StringRecord,
) -> BTreeMap<String, String> {
    let mut row = BTreeMap::new();
    for (raw_header, value) in raw_headers.iter().zip(record.iter()) {
        let normalized = columns::normalize_header(raw_header);
        if let Some(internal) = columns::internal_field(columns, &normalized) {
            row.insert(
                internal.to_string(),
                value.trim_start_matches('\u{feff}').trim().to_string(),
            );
        }
    }
    row
}

pub(crate) fn row_is_blank(row: &BTreeMap<String, String>) -> bool {
    row.values().all(|v| v.is_empty())
}

pub(crate) fn row_value<'a>(row: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    row.get(key).map(String::as_str).filter(|v| !v.is_empty())
}
