//! Run provenance in W3C PROV-JSON form
//!
//! One document is written per run to the output directory. It records who
//! ran the tool (user acting for the organisation), which build of the tool
//! ran, the configuration file, one collection per (category, specification)
//! with its member files, the processing activity and everything it
//! generated.

use crate::models::RunReport;
use crate::services::file_catalog::Catalog;
use chrono::{DateTime, Utc};
use nwra_common::time::{format_local, from_system_time};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Identifier of the processing activity
pub const ACTIVITY_ID: &str = ":LocalHazardGeneration";
const ACTIVITY_TITLE: &str = "Local wind hazard generation";
const ORGANISATION_ID: &str = "GeoscienceAustralia";
const ORGANISATION_NAME: &str = "Geoscience Australia";
const CONFIG_ENTITY_ID: &str = ":configurationFile";
const REGIONAL_INPUTS_ID: &str = "nwra:smoothedregionalwindrasters";

/// Build identification of this binary, captured at compile time
#[derive(Debug, Clone, PartialEq)]
pub struct SoftwareInfo {
    pub name: String,
    pub commit: String,
    pub tag: String,
    pub commit_date: String,
    pub url: String,
    pub built_at: String,
}

impl SoftwareInfo {
    /// Identification baked in by the build script
    pub fn from_build() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            commit: option_env!("GIT_COMMIT").unwrap_or("unknown").to_string(),
            tag: option_env!("GIT_TAG").unwrap_or("unknown").to_string(),
            commit_date: option_env!("GIT_COMMIT_DATE").unwrap_or("unknown").to_string(),
            url: option_env!("GIT_REMOTE_URL").unwrap_or("unknown").to_string(),
            built_at: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown").to_string(),
        }
    }
}

/// Name of the user running the process
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Accumulates provenance statements for one run
#[derive(Debug, Clone)]
pub struct ProvenanceRecorder {
    software: SoftwareInfo,
    user_id: String,
    sections: BTreeMap<&'static str, Map<String, Value>>,
    relation_count: usize,
}

impl ProvenanceRecorder {
    pub fn new(software: SoftwareInfo, user: &str) -> Self {
        let mut recorder = Self {
            software,
            user_id: format!(":{}", user),
            sections: BTreeMap::new(),
            relation_count: 0,
        };
        recorder.record_agents();
        recorder
    }

    fn insert(&mut self, section: &'static str, id: &str, attributes: Value) {
        self.sections
            .entry(section)
            .or_default()
            .insert(id.to_string(), attributes);
    }

    fn relate(&mut self, section: &'static str, attributes: Value) {
        self.relation_count += 1;
        let id = format!("_:id{}", self.relation_count);
        self.insert(section, &id, attributes);
    }

    fn record_agents(&mut self) {
        let software = self.software.clone();
        self.insert(
            "agent",
            &software.name,
            json!({
                "dcterms:type": "prov:SoftwareAgent",
                "git:commit": software.commit,
                "git:tag": software.tag,
                "dcterms:date": software.commit_date,
                "prov:url": software.url,
                "nwra:buildTimestamp": software.built_at,
            }),
        );

        let user_id = self.user_id.clone();
        self.insert("agent", &user_id, json!({ "prov:type": "prov:Person" }));
        self.insert(
            "agent",
            ORGANISATION_ID,
            json!({
                "prov:type": "prov:Organisation",
                "foaf:name": ORGANISATION_NAME,
            }),
        );
        self.relate(
            "actedOnBehalfOf",
            json!({
                "prov:delegate": user_id,
                "prov:responsible": ORGANISATION_ID,
            }),
        );
    }

    /// Record the configuration file as an input of the run
    pub fn record_config(&mut self, config_path: &Path) {
        let location = config_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| config_path.to_string_lossy().to_string());
        self.insert(
            "entity",
            CONFIG_ENTITY_ID,
            json!({
                "dcterms:title": "Configuration file",
                "dcterms:type": "foaf:Document",
                "dcterms:format": "Text file",
                "prov:atLocation": location,
            }),
        );
        self.used(CONFIG_ENTITY_ID);
    }

    /// Record one collection per (category, specification) with its files
    pub fn record_catalog(&mut self, catalog: &Catalog) {
        for category in catalog.categories() {
            let origin = category.origin_dir.to_string_lossy().to_string();
            let dir_mtime = std::fs::metadata(&category.origin_dir)
                .and_then(|m| m.modified())
                .map(|t| format_local(from_system_time(t)))
                .unwrap_or_default();

            let modified: HashMap<&Path, DateTime<Utc>> = category
                .files
                .iter()
                .map(|r| (r.path.as_path(), r.modified_at))
                .collect();

            for expansion in &category.expansions {
                let collection_id = format!(":{}", expansion.spec);
                self.insert(
                    "entity",
                    &collection_id,
                    json!({
                        "prov:type": "prov:Collection",
                        "dcterms:title": category.category,
                        "prov:atLocation": origin,
                        "prov:generatedAtTime": dir_mtime,
                    }),
                );
                self.used(&collection_id);

                for path in &expansion.files {
                    let created = modified
                        .get(path.as_path())
                        .map(|t| format_local(*t))
                        .unwrap_or_default();
                    let entity_id = file_entity_id(path);
                    self.insert(
                        "entity",
                        &entity_id,
                        json!({
                            "prov:atLocation": origin,
                            "dcterms:created": created,
                        }),
                    );
                    self.relate(
                        "hadMember",
                        json!({
                            "prov:collection": collection_id,
                            "prov:entity": entity_id,
                        }),
                    );
                }
            }
        }
    }

    /// Record every output raster and mosaic produced by the run
    pub fn record_outputs(&mut self, report: &RunReport) {
        for generated in report.generated_files() {
            let entity_id = file_entity_id(&generated);
            let location = generated
                .parent()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default();
            let format = match generated.extension().and_then(|e| e.to_str()) {
                Some("vrt") => "VRT",
                _ => "GeoTIFF",
            };
            self.insert(
                "entity",
                &entity_id,
                json!({
                    "prov:atLocation": location,
                    "dcterms:format": format,
                }),
            );
            self.relate(
                "wasGeneratedBy",
                json!({
                    "prov:entity": entity_id,
                    "prov:activity": ACTIVITY_ID,
                }),
            );
        }
    }

    fn used(&mut self, entity_id: &str) {
        self.relate(
            "used",
            json!({
                "prov:activity": ACTIVITY_ID,
                "prov:entity": entity_id,
            }),
        );
    }

    /// Close the activity and produce the document
    pub fn finish(mut self, started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> Value {
        self.insert(
            "activity",
            ACTIVITY_ID,
            json!({
                "prov:startTime": format_local(started_at),
                "prov:endTime": format_local(ended_at),
                "dcterms:title": ACTIVITY_TITLE,
                "dcterms:type": "void:Dataset",
            }),
        );
        self.used(REGIONAL_INPUTS_ID);

        let user_id = self.user_id.clone();
        let software = self.software.name.clone();
        self.relate(
            "wasAssociatedWith",
            json!({ "prov:activity": ACTIVITY_ID, "prov:agent": user_id }),
        );
        self.relate(
            "wasAssociatedWith",
            json!({ "prov:activity": ACTIVITY_ID, "prov:agent": software }),
        );

        let mut document = Map::new();
        document.insert("prefix".to_string(), prefixes());
        for (section, entries) in self.sections {
            document.insert(section.to_string(), Value::Object(entries));
        }
        Value::Object(document)
    }
}

fn prefixes() -> Value {
    json!({
        "default": "",
        "prov": "http://www.w3.org/ns/prov#",
        "xsd": "http://www.w3.org/2001/XMLSchema#",
        "foaf": "http://xmlns.com/foaf/0.1/",
        "void": "http://vocab.deri.ie/void#",
        "dcterms": "http://purl.org/dc/terms/",
        "git": "http://github.com/GeoscienceAustralia",
        "nwra": "http://www.ga.gov.au/hazards",
    })
}

/// Entity identifier for a file, by full path
fn file_entity_id(path: &Path) -> String {
    format!(":{}", path.to_string_lossy())
}

/// Write the document to `path`, replacing any previous one atomically
pub fn write_document(document: &Value, path: &Path) -> io::Result<PathBuf> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".nwra-")
        .suffix(".part")
        .tempfile_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, document)?;
    temp.write_all(b"\n")?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    tracing::info!(path = %path.display(), "Provenance written");
    Ok(path.to_path_buf())
}
