//! Declarative creation from manifest text and files.

use engine_resources::prelude::*;
use engine_tests::Fixture;

const LEVEL: &str = r#"
// Level 1 resources.
recorder "A" LOAD ;
recorder "B" LOCK;
surface  "C" ;
recorder ""  LOAD;   /* anonymous */
"#;

#[test]
fn records_honor_initial_state() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    fx.register_recording_types()?;

    let handles = fx.registry.create_from_str(LEVEL, "level1")?;
    assert_eq!(handles.len(), 4);
    assert_eq!(fx.state_of("A"), Some(ResourceState::Loaded));
    assert_eq!(fx.state_of("B"), Some(ResourceState::Locked));
    assert_eq!(fx.state_of("C"), Some(ResourceState::Unloaded));

    let anon = fx.registry.meta(handles[3]).expect("anonymous resource");
    assert!(anon.is_anonymous());
    assert_eq!(anon.state(), ResourceState::Loaded);
    assert_eq!(anon.kind(), "recorder");
    assert!(fx
        .registry
        .iter()
        .all(|(_, meta)| meta.group() == "level1"));
    assert_eq!(fx.log.take(), ["load A", "load B", "load "]);
    Ok(())
}

#[test]
fn syntax_error_reports_position() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    fx.register_recording_types()?;

    let err = fx
        .registry
        .create_from_str("recorder \"A\";\nrecorder 12;", "")
        .unwrap_err();
    match err {
        ResourceError::Parse(e) => {
            assert_eq!((e.line, e.column), (2, 10));
            assert_eq!(e.source_name, "<string>");
            assert!(e.message.contains("expected string"), "{}", e.message);
        }
        other => panic!("expected parse error, got {other:?}"),
    }
    // Records before the error were created.
    assert!(fx.registry.exists("A"));
    Ok(())
}

#[test]
fn leftover_parameters_are_parse_errors() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    fx.register_recording_types()?;

    let err = fx
        .registry
        .create_from_str(r#"recorder "X" 42;"#, "")
        .unwrap_err();
    assert!(matches!(err, ResourceError::Parse(ref e) if e.column == 14), "{err}");
    assert!(!fx.registry.exists("X"));
    Ok(())
}

#[test]
fn unknown_type_and_duplicate_name() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    fx.register_recording_types()?;

    let err = fx
        .registry
        .create_from_str(r#"mesh "M";"#, "")
        .unwrap_err();
    assert!(matches!(err, ResourceError::UnknownType(ref t) if t == "mesh"));

    let err = fx
        .registry
        .create_from_str(r#"recorder "D"; recorder "D" LOAD;"#, "")
        .unwrap_err();
    assert!(matches!(err, ResourceError::DuplicateName(ref n) if n == "D"));
    assert_eq!(fx.state_of("D"), Some(ResourceState::Unloaded));
    Ok(())
}

#[test]
fn create_from_file() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    fx.register_recording_types()?;

    let path = std::env::temp_dir().join(format!("manifest-{}.res", std::process::id()));
    std::fs::write(&path, LEVEL)?;
    let created = fx.registry.create_from_file(&path, "disk");
    std::fs::remove_file(&path)?;

    assert_eq!(created?.len(), 4);
    assert_eq!(fx.state_of("B"), Some(ResourceState::Locked));

    let missing = path.with_extension("missing");
    let err = fx.registry.create_from_file(&missing, "").unwrap_err();
    assert!(matches!(err, ResourceError::Io { .. }));
    Ok(())
}

#[test]
fn file_errors_name_the_file() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    fx.register_recording_types()?;

    let path = std::env::temp_dir().join(format!("broken-{}.res", std::process::id()));
    std::fs::write(&path, "recorder \"unterminated ;")?;
    let err = fx.registry.create_from_file(&path, "").unwrap_err();
    std::fs::remove_file(&path)?;

    match err {
        ResourceError::Parse(e) => {
            assert_eq!(e.source_name, path.display().to_string());
            assert_eq!((e.line, e.column), (1, 10));
        }
        other => panic!("expected parse error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn programmatic_create_accepts_missing_terminator() -> anyhow::Result<()> {
    let mut fx = Fixture::new();
    fx.register_recording_types()?;

    let h = fx
        .registry
        .create("surface", "S", ResourceState::Locked, "", "ui")?;
    assert_eq!(fx.registry.meta(h).map(|m| m.lock_count()), Some(1));
    assert_eq!(fx.log.take(), ["create S", "restore S"]);
    Ok(())
}
