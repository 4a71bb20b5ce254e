//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api;
use crate::config::Settings;
use neuroproof_core::{
    BodyId, DatasetFixture, GraphView, HistoryForest, Loader, MergeAction, MergeEngine,
    NeuroError, Segment, Store, SummaryRecord,
    model::{connections_of, synapses_of},
};
use serde::Serialize;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a dataset document (1 GB).
const MAX_LOAD_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Maximum size of a merge instruction file (256 MB).
const MAX_MERGE_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), NeuroError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| NeuroError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(NeuroError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve `path` to an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, NeuroError> {
    let canonical = path.canonicalize().map_err(|e| {
        NeuroError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(NeuroError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

fn read_input(path: &Path, max_size: u64) -> Result<String, NeuroError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, max_size)?;
    std::fs::read_to_string(&validated)
        .map_err(|e| NeuroError::IoError(format!("Read file: {}", e)))
}

fn print_json(value: &impl Serialize) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

fn open_store(settings: &Settings) -> Result<Store, NeuroError> {
    Store::open(&settings.database)
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create the database and the dataset's summary record.
pub fn cmd_init(settings: &Settings, json_mode: bool, force: bool) -> Result<(), NeuroError> {
    if settings.database.exists() {
        if !force {
            return Err(NeuroError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(&settings.database)
            .map_err(|e| NeuroError::IoError(format!("Remove database: {}", e)))?;
    }

    let store = open_store(settings)?;
    let (_, report) = store.write(|tx| {
        Loader::prepare_dataset(tx, &settings.dataset, settings.thresholds)
    })?;

    if json_mode {
        print_json(&serde_json::json!({
            "database": settings.database.to_string_lossy(),
            "dataset": settings.dataset,
            "version": report.version,
            "pre_hp_threshold": settings.thresholds.pre,
            "post_hp_threshold": settings.thresholds.post,
        }));
        return Ok(());
    }

    println!(
        "Initialized dataset '{}' in {:?} (HP thresholds pre={} post={})",
        settings.dataset, settings.database, settings.thresholds.pre, settings.thresholds.post
    );
    Ok(())
}

// =============================================================================
// LOAD COMMAND
// =============================================================================

/// Load a dataset document in one transaction.
pub fn cmd_load(settings: &Settings, json_mode: bool, file: &Path) -> Result<(), NeuroError> {
    tracing::info!("Loading {:?}", file);
    let text = read_input(file, MAX_LOAD_FILE_SIZE)?;
    let mut fixture = DatasetFixture::from_json(&text)?;
    fixture.pre_hp_threshold = fixture.pre_hp_threshold.or(Some(settings.thresholds.pre));
    fixture.post_hp_threshold = fixture.post_hp_threshold.or(Some(settings.thresholds.post));

    let store = open_store(settings)?;
    let report = Loader::load_fixture(&store, &fixture)?;

    if json_mode {
        print_json(&report);
        return Ok(());
    }

    println!("Loaded dataset '{}' (version {})", fixture.dataset, report.version);
    println!("  Segments:    {}", report.segments);
    println!("  Synapses:    {}", report.synapses);
    println!("  Connections: {}", report.connections);
    println!("  Skeletons:   {}", report.skeletons);
    Ok(())
}

// =============================================================================
// MERGE COMMAND
// =============================================================================

/// Parse a file holding one instruction or an array of them.
pub fn parse_merge_file(text: &str) -> Result<Vec<MergeAction>, NeuroError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| NeuroError::InvalidMergeInstruction(e.to_string()))?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        single => vec![single],
    };
    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item)
                .map_err(|e| NeuroError::InvalidMergeInstruction(e.to_string()))
        })
        .collect()
}

/// Apply each instruction in its own transaction, stopping at the first
/// failure.
pub fn cmd_merge(settings: &Settings, json_mode: bool, file: &Path) -> Result<(), NeuroError> {
    let text = read_input(file, MAX_MERGE_FILE_SIZE)?;
    let actions = parse_merge_file(&text)?;
    let store = open_store(settings)?;

    let mut merged = Vec::with_capacity(actions.len());
    for action in &actions {
        let segment = MergeEngine::merge_entities(&store, &settings.dataset, action)?;
        if !json_mode {
            println!(
                "Merged {:?} into {} (pre={} post={})",
                action.bodies_merged.iter().map(|b| b.0).collect::<Vec<_>>(),
                segment.body_id,
                segment.pre,
                segment.post
            );
        }
        merged.push(segment);
    }

    if json_mode {
        print_json(&serde_json::json!({
            "version": store.version(),
            "segments": merged,
        }));
    } else {
        println!("{} merge(s) applied, store version {}", merged.len(), store.version());
    }
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show store version and the dataset's summary counters.
pub fn cmd_status(settings: &Settings, json_mode: bool) -> Result<(), NeuroError> {
    let store = open_store(settings)?;
    let graph = store.snapshot();
    let summary = SummaryRecord::load(&*graph, &settings.dataset);

    if json_mode {
        print_json(&api::StatusResponse {
            dataset: settings.dataset.clone(),
            version: store.version(),
            node_count: graph.node_count(),
            relationship_count: graph.relationship_count(),
            summary: summary.as_ref().map(api::SummaryJson::from),
        });
        return Ok(());
    }

    println!("neuroproof Status");
    println!("=================");
    println!("Database:      {:?}", settings.database);
    println!("Dataset:       {}", settings.dataset);
    println!("Version:       {}", store.version());
    println!("Nodes:         {}", graph.node_count());
    println!("Relationships: {}", graph.relationship_count());
    println!();
    match summary {
        Some(summary) => {
            println!("Synapses:      {}", summary.total_synapse_count);
            println!("  Pre:         {}", summary.total_pre_count);
            println!("  Post:        {}", summary.total_post_count);
            println!("Connections:   {}", summary.total_connection_count);
            println!(
                "Last edit:     {}",
                summary
                    .last_database_edit
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string())
            );
        }
        None => println!("No summary record; run `neuroproof init` first"),
    }
    Ok(())
}

// =============================================================================
// SHOW COMMAND
// =============================================================================

/// Show one live segment with its synapses and connections.
pub fn cmd_show(settings: &Settings, json_mode: bool, body: i64) -> Result<(), NeuroError> {
    let store = open_store(settings)?;
    let graph = store.snapshot();
    let segment = Segment::load(&*graph, &settings.dataset, BodyId(body))?.ok_or_else(|| {
        NeuroError::ConstraintViolation(format!(
            "no live segment {} in '{}'",
            body, settings.dataset
        ))
    })?;
    let synapses = synapses_of(&*graph, segment.id);
    let connections = connections_of(&*graph, segment.id);

    if json_mode {
        print_json(&api::SegmentResponse {
            last_modified: segment.time_stamp.map(|t| t.to_rfc3339()),
            synapses,
            connections,
            segment,
        });
        return Ok(());
    }

    println!("Segment {}", segment.body_id);
    if let Some(name) = &segment.name {
        println!("  Name:     {}", name);
    }
    println!("  Size:     {}", segment.size.unwrap_or(0));
    println!("  Pre/Post: {}/{}", segment.pre, segment.post);
    println!("  Regions:  {}", segment.regions.join(", "));
    if let Some(ts) = segment.time_stamp {
        println!("  Modified: {}", ts.to_rfc3339());
    }
    println!("  Synapses: {}", synapses.len());
    println!("  Connections:");
    for connection in &connections {
        println!(
            "    {:?} {} weight={} weightHP={}",
            connection.direction,
            connection
                .partner
                .map(|b| b.to_string())
                .unwrap_or_else(|| "?".to_string()),
            connection.weight,
            connection.weight_hp.unwrap_or(0)
        );
    }
    Ok(())
}

// =============================================================================
// HISTORY COMMAND
// =============================================================================

/// Show the merge provenance of a live segment.
pub fn cmd_history(settings: &Settings, json_mode: bool, body: i64) -> Result<(), NeuroError> {
    let store = open_store(settings)?;
    let graph = store.snapshot();
    let body_id = BodyId(body);
    if graph.segment(&settings.dataset, body_id).is_none() {
        return Err(NeuroError::ConstraintViolation(format!(
            "no live segment {} in '{}'",
            body, settings.dataset
        )));
    }
    let forest = HistoryForest::for_body(&*graph, &settings.dataset, body_id);

    if json_mode {
        print_json(&api::HistoryResponse::new(body_id, &forest));
        return Ok(());
    }

    if forest.is_empty() {
        println!("Segment {} has never absorbed another body", body_id);
        return Ok(());
    }
    println!("Segment {} (merge depth {})", body_id, forest.depth());
    for record in forest.records() {
        let donors: Vec<String> = record
            .donors
            .iter()
            .map(|d| d.body_id.map(|b| b.to_string()).unwrap_or_else(|| "?".to_string()))
            .collect();
        println!(
            "  {} absorbed [{}]{}",
            record
                .result_body_id
                .map(|b| b.to_string())
                .unwrap_or_else(|| "?".to_string()),
            donors.join(", "),
            record
                .timestamp
                .map(|t| format!(" at {}", t.to_rfc3339()))
                .unwrap_or_default()
        );
    }
    Ok(())
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(settings: &Settings) -> Result<(), NeuroError> {
    let store = open_store(settings)?;

    println!("neuroproof server starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", settings.host);
    println!("  Port:     {}", settings.port);
    println!("  Database: {:?}", settings.database);
    println!();
    println!("Endpoints:");
    println!("  GET  /health");
    println!("  GET  /status/{{dataset}}");
    println!("  GET  /segments/{{dataset}}/{{body_id}}");
    println!("  GET  /history/{{dataset}}/{{body_id}}");
    println!("  POST /merge/{{dataset}}");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", settings.host, settings.port);
    api::run_server(&addr, store).await
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const INSTRUCTION: &str = r#"{
        "Action": "merge",
        "ResultBodyID": 1,
        "BodiesMerged": [2],
        "ResultBodySize": 10,
        "ResultBodySynapses": []
    }"#;

    #[test]
    fn merge_file_accepts_single_object() {
        let actions = parse_merge_file(INSTRUCTION).expect("parse");
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].result_body_id, BodyId(1));
    }

    #[test]
    fn merge_file_accepts_array() {
        let text = format!("[{}, {}]", INSTRUCTION, INSTRUCTION);
        assert_eq!(parse_merge_file(&text).expect("parse").len(), 2);
    }

    #[test]
    fn merge_file_rejects_garbage() {
        let err = parse_merge_file("[1, 2]").expect_err("not instructions");
        assert_eq!(err.kind(), "invalid_merge_instruction");
    }

    #[test]
    fn missing_input_file_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(validate_file_path(&dir.path().join("absent.json")).is_err());
        assert!(validate_file_path(dir.path()).is_err());
    }
}
