use hydrosurvey_core::{
    AppError, CloseOutcome, EntityKey, EntityKind, ExitDecision, FieldPath, ProjectSession,
    PromptChoice, SaveMode, SessionError,
};

fn saved_project(dir: &tempfile::TempDir) -> (ProjectSession, EntityKey, EntityKey) {
    let mut app = ProjectSession::new();
    let store = app.store_mut();
    let first = store
        .create_entity(EntityKind::Survey, "spring", [("Vessel", "Zeeleeuw")])
        .unwrap()
        .key();
    let second = store
        .create_entity(EntityKind::Survey, "autumn", [("Vessel", "Simon Stevin")])
        .unwrap()
        .key();
    store
        .save(dir.path().join("project.xml"), SaveMode::CreateNew)
        .unwrap();
    (app, first, second)
}

#[test]
fn exit_is_vetoed_by_a_failed_save_and_allowed_after_discard() {
    let dir = tempfile::tempdir().unwrap();
    let (mut app, first, second) = saved_project(&dir);

    let valid = app.open_editor(first.clone(), None).unwrap();
    let invalid = app.open_editor(second, None).unwrap();
    app.editor_mut(valid)
        .unwrap()
        .set_text(&FieldPath::scalar("Vessel"), "Belgica")
        .unwrap();
    app.editor_mut(invalid)
        .unwrap()
        .set_text(&FieldPath::Name, " ")
        .unwrap();

    let decision = app.request_exit(|_| PromptChoice::Save).unwrap();
    match decision {
        ExitDecision::Vetoed { editor, reason } => {
            assert_eq!(editor, invalid);
            assert!(matches!(reason, Some(SessionError::Validation(_))));
        }
        ExitDecision::Exit => panic!("exit must be vetoed"),
    }
    assert!(app.editor(invalid).is_some());

    let decision = app
        .request_exit(|session| {
            if session.id() == invalid {
                PromptChoice::Discard
            } else {
                PromptChoice::Save
            }
        })
        .unwrap();
    assert!(matches!(decision, ExitDecision::Exit));
    assert_eq!(app.open_editor_count(), 0);
    assert_eq!(
        app.store()
            .get_entity(first.kind, &first.id)
            .unwrap()
            .field("Vessel"),
        Some("Belgica")
    );
}

#[test]
fn cancel_keeps_editor_open_and_dirty() {
    let dir = tempfile::tempdir().unwrap();
    let (mut app, first, _) = saved_project(&dir);
    let editor = app.open_editor(first, None).unwrap();
    app.editor_mut(editor)
        .unwrap()
        .set_text(&FieldPath::scalar("Vessel"), "Belgica")
        .unwrap();

    let mut prompted = 0;
    let outcome = app
        .close_editor(editor, |session| {
            prompted += 1;
            assert!(!session.is_closed());
            PromptChoice::Cancel
        })
        .unwrap();
    assert!(matches!(outcome, CloseOutcome::Cancelled));
    assert_eq!(prompted, 1);
    assert!(app.editor_mut(editor).unwrap().is_dirty());

    let err = app.open_project(dir.path().join("project.xml")).unwrap_err();
    assert!(matches!(err, AppError::EditorsOpen(1)));
}

#[test]
fn save_editor_persists_and_keeps_editor_open() {
    let dir = tempfile::tempdir().unwrap();
    let (mut app, first, _) = saved_project(&dir);
    let editor = app.open_editor(first.clone(), None).unwrap();
    app.editor_mut(editor)
        .unwrap()
        .set_text(&FieldPath::scalar("Vessel"), "Belgica")
        .unwrap();
    app.save_editor(editor).unwrap();
    app.close_editor(editor, |_| PromptChoice::Cancel).unwrap();

    app.open_project(dir.path().join("project.xml")).unwrap();
    let survey = app.store().get_entity(first.kind, &first.id).unwrap();
    assert_eq!(survey.field("Vessel"), Some("Belgica"));
}

#[test]
fn exit_prompts_editors_in_the_order_they_were_opened() {
    let dir = tempfile::tempdir().unwrap();
    let (mut app, first, second) = saved_project(&dir);

    let opened = vec![
        app.open_editor(second, None).unwrap(),
        app.open_editor(first, None).unwrap(),
    ];
    for id in &opened {
        app.editor_mut(*id)
            .unwrap()
            .set_text(&FieldPath::scalar("Description"), "draft")
            .unwrap();
    }
    assert_eq!(app.editor_ids(), opened);

    let mut prompted = Vec::new();
    let decision = app
        .request_exit(|session| {
            prompted.push(session.id());
            PromptChoice::Discard
        })
        .unwrap();
    assert!(matches!(decision, ExitDecision::Exit));
    assert_eq!(prompted, opened);
    assert_eq!(app.open_editor_count(), 0);
}
