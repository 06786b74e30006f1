use hydrosurvey_core::{
    CloseOutcome, CloseRequest, CommitError, DocumentStore, EditorForm, EditorSession, EntityKey,
    EntityKind, FieldPath, FieldValue, MaskRange, PlotMode, PromptChoice, SaveMode, SessionError,
    SessionState, StoreError, ValidationFailure,
};
use std::path::PathBuf;

const PROJECT_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Project>
  <Instruments>
    <Instrument id="1">
      <Name>Bow ADCP</Name>
      <DataFile>raw/transect.000</DataFile>
      <MaskEchoIntensity Enabled="true"><Min>0</Min><Max>255</Max></MaskEchoIntensity>
    </Instrument>
    <Instrument id="2">
      <Name>Stern ADCP</Name>
      <DataFile>raw/transect.000</DataFile>
    </Instrument>
    <Instrument id="3">
      <Name>Legacy ADCP</Name>
      <DataFile>raw/transect.000</DataFile>
      <MaskBins Enabled="false"><Target>3</Target></MaskBins>
    </Instrument>
  </Instruments>
  <Models>
    <Model id="1"><Name>SSC regression</Name></Model>
  </Models>
  <MapPresets>
    <MapPreset id="1">
      <Name>comparison</Name>
      <PlotType>AdcpComparison</PlotType>
      <Instrument>9</Instrument>
      <Model>1</Model>
    </MapPreset>
  </MapPresets>
</Project>
"#;

struct Fixture {
    _dir: tempfile::TempDir,
    path: PathBuf,
    store: DocumentStore,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("raw")).unwrap();
    std::fs::write(dir.path().join("raw/transect.000"), b"\x7f\x7f").unwrap();
    let path = dir.path().join("project.xml");
    std::fs::write(&path, PROJECT_XML).unwrap();
    let store = DocumentStore::open(&path).unwrap();
    Fixture {
        _dir: dir,
        path,
        store,
    }
}

fn instrument(id: &str) -> EntityKey {
    EntityKey::new(EntityKind::Instrument, id)
}

fn echo(node: fn(String) -> FieldPath) -> FieldPath {
    node("MaskEchoIntensity".to_string())
}

#[test]
fn disabling_a_mask_keeps_its_bounds_through_save_and_reload() {
    let mut fx = fixture();
    let mut session =
        EditorSession::open(&fx.store, instrument("1"), EditorForm::Instrument).unwrap();
    assert_eq!(
        session.value(&echo(FieldPath::MaskEnabled)),
        Some(&FieldValue::Flag(true))
    );

    session.set_flag(&echo(FieldPath::MaskEnabled), false).unwrap();
    session.save(&mut fx.store).unwrap();

    let reloaded = DocumentStore::open(&fx.path).unwrap();
    let entity = reloaded.get_entity(EntityKind::Instrument, "1").unwrap();
    assert_eq!(
        entity.mask("MaskEchoIntensity"),
        Some(&MaskRange::range(false, "0", "255"))
    );
}

#[test]
fn absent_mask_node_shows_documented_defaults() {
    let fx = fixture();
    let session =
        EditorSession::open(&fx.store, instrument("2"), EditorForm::Instrument).unwrap();
    assert_eq!(
        session.value(&echo(FieldPath::MaskEnabled)),
        Some(&FieldValue::Flag(false))
    );
    assert_eq!(
        session.value(&echo(FieldPath::MaskMax)),
        Some(&FieldValue::Text("255".to_string()))
    );
    assert_eq!(
        session.value(&FieldPath::scalar("Frequency")),
        Some(&FieldValue::Text("600".to_string()))
    );
}

#[test]
fn commit_is_all_or_nothing_when_a_bound_node_is_missing() {
    let mut fx = fixture();
    let before_entity = fx
        .store
        .get_entity(EntityKind::Instrument, "3")
        .unwrap()
        .clone();
    let before_file = std::fs::read(&fx.path).unwrap();

    let mut session =
        EditorSession::open(&fx.store, instrument("3"), EditorForm::Instrument).unwrap();
    session.set_text(&FieldPath::Name, "Renamed ADCP").unwrap();
    session.set_flag(&echo(FieldPath::MaskEnabled), false).unwrap();

    let err = session.save(&mut fx.store).unwrap_err();
    match err {
        SessionError::Commit(CommitError::MissingNode { key, path }) => {
            assert_eq!(key, instrument("3"));
            assert_eq!(path, FieldPath::MaskMin("MaskBins".to_string()));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(
        fx.store.get_entity(EntityKind::Instrument, "3").unwrap(),
        &before_entity
    );
    assert_eq!(std::fs::read(&fx.path).unwrap(), before_file);
    assert_eq!(session.state(), SessionState::Dirty);
    assert!(session.last_failure().unwrap().contains("MaskBins.Min"));
}

#[test]
fn dirty_lifecycle_follows_save_outcomes() {
    let mut fx = fixture();
    let mut session =
        EditorSession::open(&fx.store, instrument("2"), EditorForm::Instrument).unwrap();
    assert_eq!(session.state(), SessionState::Clean);

    session
        .set_text(&FieldPath::scalar("BeamAngle"), "twenty")
        .unwrap();
    assert_eq!(session.state(), SessionState::Dirty);

    let err = session.save(&mut fx.store).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Validation(ValidationFailure::NotANumber { ref value, .. }) if value == "twenty"
    ));
    assert_eq!(session.state(), SessionState::Dirty);
    assert_eq!(
        fx.store
            .get_entity(EntityKind::Instrument, "2")
            .unwrap()
            .field("BeamAngle"),
        Some("20")
    );

    session
        .set_text(&FieldPath::scalar("BeamAngle"), "25")
        .unwrap();
    session.save(&mut fx.store).unwrap();
    assert_eq!(session.state(), SessionState::Clean);
    assert!(session.last_failure().is_none());
    assert!(!fx.store.is_modified());

    let reloaded = DocumentStore::open(&fx.path).unwrap();
    let entity = reloaded.get_entity(EntityKind::Instrument, "2").unwrap();
    assert_eq!(entity.field("BeamAngle"), Some("25"));
    // The save rewrote the whole document, not just this entity.
    assert_eq!(reloaded.get_entities(EntityKind::Instrument).len(), 3);
    assert!(reloaded.get_entity(EntityKind::MapPreset, "1").is_ok());
}

#[test]
fn missing_data_file_is_reported_with_resolved_path() {
    let mut fx = fixture();
    let mut session =
        EditorSession::open(&fx.store, instrument("2"), EditorForm::Instrument).unwrap();
    session
        .set_text(&FieldPath::scalar("DataFile"), "raw/other.000")
        .unwrap();

    match session.save(&mut fx.store).unwrap_err() {
        SessionError::Validation(ValidationFailure::FileNotFound { path, .. }) => {
            assert_eq!(path, fx.path.parent().unwrap().join("raw/other.000"));
        }
        other => panic!("expected FileNotFound, got {other}"),
    }
}

#[test]
fn dangling_selection_shows_first_choice_but_blocks_commit() {
    let mut fx = fixture();
    let preset = EntityKey::new(EntityKind::MapPreset, "1");
    let mut session = EditorSession::open_default(&fx.store, preset.clone()).unwrap();
    assert_eq!(
        session.form(),
        EditorForm::MapPreset(PlotMode::AdcpComparison)
    );

    let selected = session
        .value(&FieldPath::reference("Instrument"))
        .and_then(FieldValue::as_selection)
        .and_then(|ids| ids.first())
        .cloned();
    assert_eq!(selected.as_deref(), Some("9"));
    let list = fx.store.selection_list(EntityKind::Instrument);
    assert_eq!(list.display_index(selected.as_deref()), Some(0));

    let err = session.save(&mut fx.store).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Validation(ValidationFailure::UnresolvedSelection { ref target, .. })
            if target == &EntityKey::new(EntityKind::Instrument, "9")
    ));

    session
        .select_by_name(&fx.store, "Instrument", "Stern ADCP")
        .unwrap();
    session.save(&mut fx.store).unwrap();
    let saved = fx.store.find_entity(&preset).unwrap();
    assert_eq!(saved.reference_ids("Instrument"), vec!["2".to_string()]);
    assert_eq!(saved.reference_ids("Model"), vec!["1".to_string()]);
}

#[test]
fn close_prompt_supports_cancel_failed_save_and_discard() {
    let mut fx = fixture();
    let mut session =
        EditorSession::open(&fx.store, instrument("2"), EditorForm::Instrument).unwrap();
    session.set_text(&FieldPath::Name, "").unwrap();

    assert_eq!(session.request_close().unwrap(), CloseRequest::PromptRequired);
    assert_eq!(session.state(), SessionState::Closing);
    let outcome = session
        .resolve_close(&mut fx.store, PromptChoice::Cancel)
        .unwrap();
    assert!(matches!(outcome, CloseOutcome::Cancelled));
    assert_eq!(session.state(), SessionState::Dirty);

    session.request_close().unwrap();
    let outcome = session
        .resolve_close(&mut fx.store, PromptChoice::Save)
        .unwrap();
    assert!(matches!(
        outcome,
        CloseOutcome::KeptOpen(SessionError::Validation(ValidationFailure::MissingField { .. }))
    ));
    assert!(!session.is_closed());

    session.request_close().unwrap();
    let outcome = session
        .resolve_close(&mut fx.store, PromptChoice::Discard)
        .unwrap();
    assert!(matches!(outcome, CloseOutcome::Closed));
    assert!(session.is_closed());
    assert_eq!(
        fx.store.get_entity(EntityKind::Instrument, "2").unwrap().name,
        "Stern ADCP"
    );
}

#[test]
fn revert_restores_entity_values_and_cleans_session() {
    let fx = fixture();
    let mut session =
        EditorSession::open(&fx.store, instrument("2"), EditorForm::Instrument).unwrap();
    session.set_text(&FieldPath::Name, "scratch").unwrap();
    session.revert(&fx.store).unwrap();

    assert_eq!(session.state(), SessionState::Clean);
    assert_eq!(
        session.value(&FieldPath::Name),
        Some(&FieldValue::Text("Stern ADCP".to_string()))
    );
}

#[test]
fn reload_makes_open_sessions_stale() {
    let mut fx = fixture();
    let mut session =
        EditorSession::open(&fx.store, instrument("2"), EditorForm::Instrument).unwrap();
    session.set_text(&FieldPath::Name, "renamed").unwrap();

    let path = fx.path.clone();
    fx.store.load(&path).unwrap();
    let err = session.save(&mut fx.store).unwrap_err();
    assert!(matches!(err, SessionError::Stale { .. }));
}

#[test]
fn single_target_slot_refuses_several_selections() {
    let mut fx = fixture();
    let preset = EntityKey::new(EntityKind::MapPreset, "1");
    let before = fx.store.find_entity(&preset).unwrap().clone();
    let mut session = EditorSession::open_default(&fx.store, preset.clone()).unwrap();

    session
        .select("Instrument", vec!["1".to_string(), "2".to_string()])
        .unwrap();
    let err = session.save(&mut fx.store).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Validation(ValidationFailure::TooManySelections { count: 2, .. })
    ));
    assert_eq!(fx.store.find_entity(&preset).unwrap(), &before);
    assert_eq!(session.state(), SessionState::Dirty);

    session.select("Instrument", vec!["2".to_string()]).unwrap();
    session.save(&mut fx.store).unwrap();
    let saved = fx.store.find_entity(&preset).unwrap();
    assert_eq!(saved.reference_ids("Instrument"), vec!["2".to_string()]);
}

fn saved_survey(project: &std::path::Path) -> (DocumentStore, EntityKey) {
    let mut store = DocumentStore::new_project();
    let key = store
        .create_entity(EntityKind::Survey, "spring", [("Vessel", "Zeeleeuw")])
        .unwrap()
        .key();
    store.save(project, SaveMode::CreateNew).unwrap();
    (store, key)
}

#[test]
fn failed_write_rolls_back_commit_and_keeps_session_dirty() {
    let dir = tempfile::tempdir().unwrap();
    let project_dir = dir.path().join("campaign");
    let (mut store, key) = saved_survey(&project_dir.join("project.xml"));
    let before = store.document().clone();

    let mut session = EditorSession::open(&store, key.clone(), EditorForm::Survey).unwrap();
    session.set_text(&FieldPath::scalar("Vessel"), "Belgica").unwrap();

    // A plain file where the project directory was makes the write fail.
    std::fs::remove_dir_all(&project_dir).unwrap();
    std::fs::write(&project_dir, "not a directory").unwrap();

    let err = session.save(&mut store).unwrap_err();
    assert!(matches!(err, SessionError::Store(StoreError::Io { .. })));
    assert_eq!(session.state(), SessionState::Dirty);
    assert!(session.last_failure().is_some());
    assert_eq!(store.document(), &before);
    assert_eq!(store.find_entity(&key).unwrap().field("Vessel"), Some("Zeeleeuw"));
    assert!(!store.is_modified());
}

#[test]
fn save_without_project_file_keeps_session_dirty() {
    let mut store = DocumentStore::new_project();
    let key = store
        .create_entity(EntityKind::Survey, "spring", Vec::<(&str, &str)>::new())
        .unwrap()
        .key();
    let mut session = EditorSession::open(&store, key.clone(), EditorForm::Survey).unwrap();
    session.set_text(&FieldPath::scalar("Vessel"), "Belgica").unwrap();

    let err = session.save(&mut store).unwrap_err();
    assert!(matches!(err, SessionError::Store(StoreError::NoProjectPath)));
    assert_eq!(session.state(), SessionState::Dirty);
    assert_eq!(store.find_entity(&key).unwrap().field("Vessel"), Some(""));
}
