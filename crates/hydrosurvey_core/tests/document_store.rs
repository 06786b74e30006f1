use hydrosurvey_core::{DocumentStore, EntityKey, EntityKind, MaskRange, SaveMode, StoreError};
use std::path::PathBuf;

const PROJECT_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Project>
  <Settings><Setting Name="ProjectName">Scheldt 2024</Setting></Settings>
  <Surveys>
    <Survey id="2"><Name>Spring campaign</Name><Vessel>RV Belgica</Vessel></Survey>
  </Surveys>
  <Instruments>
    <Instrument id="1">
      <Name>ADCP 1</Name>
      <DataFile>raw/transect.000</DataFile>
      <MaskEchoIntensity Enabled="false"><Min>12</Min><Max>n/a</Max></MaskEchoIntensity>
      <Survey>2</Survey>
      <Operator>J. Doe</Operator>
    </Instrument>
  </Instruments>
  <MapPresets>
    <MapPreset id="7"><Name>overview</Name><Instrument>1</Instrument></MapPreset>
  </MapPresets>
</Project>
"#;

fn project_file(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("project.xml");
    std::fs::write(&path, PROJECT_XML).unwrap();
    path
}

#[test]
fn save_then_load_preserves_every_entity_and_setting() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = DocumentStore::open(project_file(&dir)).unwrap();
    store.create_entity(EntityKind::Model, "ssc", [("Slope", "0.82")]).unwrap();
    store.set_setting("BaseDirectory", "/data/scheldt");

    let copy = dir.path().join("copy.xml");
    store.save(&copy, SaveMode::CreateNew).unwrap();
    let reloaded = DocumentStore::open(&copy).unwrap();

    assert_eq!(reloaded.document(), store.document());
    let instrument = reloaded.get_entity(EntityKind::Instrument, "1").unwrap();
    // Disabled mask bounds survive verbatim, even when they do not parse.
    assert_eq!(
        instrument.mask("MaskEchoIntensity"),
        Some(&MaskRange::range(false, "12", "n/a"))
    );
    assert_eq!(instrument.field("Operator"), Some("J. Doe"));
    assert_eq!(reloaded.get_setting("ProjectName"), Some("Scheldt 2024"));
    assert_eq!(store.project_path(), Some(copy.as_path()));
    assert!(!store.is_modified());
}

#[test]
fn get_entity_reports_not_found_and_entities_keep_insertion_order() {
    let mut store = DocumentStore::new_project();
    let first = store
        .create_entity(EntityKind::Survey, "b", Vec::<(&str, &str)>::new())
        .unwrap()
        .id
        .clone();
    let second = store
        .create_entity(EntityKind::Survey, "a", Vec::<(&str, &str)>::new())
        .unwrap()
        .id
        .clone();

    let ids: Vec<&str> = store
        .get_entities(EntityKind::Survey)
        .iter()
        .map(|entity| entity.id.as_str())
        .collect();
    assert_eq!(ids, vec![first.as_str(), second.as_str()]);

    let err = store.get_entity(EntityKind::Survey, "99").unwrap_err();
    assert!(matches!(err, StoreError::NotFound(key) if key.id == "99"));
}

#[test]
fn created_ids_start_above_loaded_ids() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = DocumentStore::open(project_file(&dir)).unwrap();
    let created = store
        .create_entity(EntityKind::MapPreset, "detail", Vec::<(&str, &str)>::new())
        .unwrap();
    assert_eq!(created.id, "8");
    // Absent recognized options are synthesized on create.
    assert_eq!(created.field("GridLineCount"), Some("10"));
}

#[test]
fn delete_is_blocked_while_referenced() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = DocumentStore::open(project_file(&dir)).unwrap();
    let instrument = EntityKey::new(EntityKind::Instrument, "1");

    let err = store.delete_entity(&instrument).unwrap_err();
    match err {
        StoreError::StillReferenced { target, referrers } => {
            assert_eq!(target, instrument);
            assert_eq!(referrers, vec![EntityKey::new(EntityKind::MapPreset, "7")]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(store.find_entity(&instrument).is_some());

    store
        .delete_entity(&EntityKey::new(EntityKind::MapPreset, "7"))
        .unwrap();
    store.delete_entity(&instrument).unwrap();
    assert!(store.get_entities(EntityKind::Instrument).is_empty());
    assert!(store.is_modified());
}

#[test]
fn failed_save_leaves_document_and_target_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = project_file(&dir);
    let mut store = DocumentStore::open(&path).unwrap();
    store
        .rename_entity(&EntityKey::new(EntityKind::Survey, "2"), "Autumn")
        .unwrap();
    let before = store.document().clone();

    let err = store.save(&path, SaveMode::CreateNew).unwrap_err();
    assert!(matches!(err, StoreError::TargetExists(_)));

    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "x").unwrap();
    let err = store
        .save(blocker.join("project.xml"), SaveMode::Overwrite)
        .unwrap_err();
    assert!(matches!(err, StoreError::Io { .. }));

    assert_eq!(store.document(), &before);
    assert!(store.is_modified());
    assert_eq!(store.project_path(), Some(path.as_path()));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), PROJECT_XML);
}

#[test]
fn malformed_load_keeps_current_document() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = DocumentStore::open(project_file(&dir)).unwrap();
    let generation = store.generation();
    let before = store.document().clone();

    let broken = dir.path().join("broken.xml");
    std::fs::write(&broken, "<Project><Surveys><Survey id=\"1\"></Project>").unwrap();
    let err = store.load(&broken).unwrap_err();
    assert!(matches!(err, StoreError::MalformedDocument(_)));

    let err = store.load(dir.path().join("missing.xml")).unwrap_err();
    assert!(matches!(err, StoreError::Io { .. }));

    assert_eq!(store.document(), &before);
    assert_eq!(store.generation(), generation);
}

#[test]
fn base_directory_prefers_setting_then_project_dir() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = DocumentStore::new_project();
    assert_eq!(store.base_directory(), PathBuf::from("."));

    store.save(dir.path().join("p.xml"), SaveMode::CreateNew).unwrap();
    assert_eq!(store.base_directory(), dir.path());

    store.set_setting("BaseDirectory", "/mnt/survey");
    assert_eq!(store.base_directory(), PathBuf::from("/mnt/survey"));
}

#[test]
fn selection_list_offers_names_but_yields_ids() {
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::open(project_file(&dir)).unwrap();
    let list = store.selection_list(EntityKind::Survey);
    assert_eq!(list.display_names(), vec!["Spring campaign"]);
    assert_eq!(list.id_for_display_name("Spring campaign"), Some("2"));
    assert_eq!(
        store.references_to(&EntityKey::new(EntityKind::Survey, "2")),
        vec![(
            EntityKey::new(EntityKind::Instrument, "1"),
            "Survey".to_string()
        )]
    );
}

#[test]
fn id_allocation_survives_the_largest_numeric_id() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("project.xml");
    std::fs::write(
        &path,
        r#"<Project><Surveys><Survey id="18446744073709551614"><Name>late</Name></Survey></Surveys></Project>"#,
    )
    .unwrap();
    let mut store = DocumentStore::open(&path).unwrap();

    let last = store
        .create_entity(EntityKind::Survey, "last", Vec::<(&str, &str)>::new())
        .unwrap()
        .id
        .clone();
    assert_eq!(last, u64::MAX.to_string());

    let beyond = store
        .create_entity(EntityKind::Survey, "beyond", Vec::<(&str, &str)>::new())
        .unwrap()
        .id
        .clone();
    let again = store
        .create_entity(EntityKind::Survey, "again", Vec::<(&str, &str)>::new())
        .unwrap()
        .id
        .clone();
    assert!(beyond.parse::<u64>().is_err());
    assert_ne!(beyond, again);
    assert_eq!(store.get_entities(EntityKind::Survey).len(), 4);

    store.save(&path, SaveMode::Overwrite).unwrap();
    let reloaded = DocumentStore::open(&path).unwrap();
    assert!(reloaded.get_entity(EntityKind::Survey, &beyond).is_ok());
}

#[test]
fn create_refuses_field_names_that_cannot_round_trip() {
    let mut store = DocumentStore::new_project();
    for field in ["Tide Gauge", "Name", "MaskBins", "Survey", "3D"] {
        let err = store
            .create_entity(EntityKind::Instrument, "adcp", [(field, "x")])
            .unwrap_err();
        assert!(
            matches!(err, StoreError::InvalidFieldName { ref name, .. } if name == field),
            "{field}: {err}"
        );
    }
    assert!(store.get_entities(EntityKind::Instrument).is_empty());
    assert!(!store.is_modified());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("project.xml");
    store
        .create_entity(EntityKind::Instrument, "adcp", [("TideGauge", "Vlissingen")])
        .unwrap();
    store.save(&path, SaveMode::CreateNew).unwrap();
    let reloaded = DocumentStore::open(&path).unwrap();
    assert_eq!(reloaded.document(), store.document());
}

#[test]
fn duplicate_name_node_keeps_the_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("project.xml");
    std::fs::write(
        &path,
        r#"<Project><Surveys><Survey id="1"><Name>first</Name><Name>second</Name></Survey></Surveys></Project>"#,
    )
    .unwrap();
    let store = DocumentStore::open(&path).unwrap();
    let survey = store.get_entity(EntityKind::Survey, "1").unwrap();
    assert_eq!(survey.name, "first");
    assert_eq!(survey.field("Name"), None);
}
