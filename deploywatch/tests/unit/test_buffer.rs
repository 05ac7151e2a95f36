//! Log buffer tests

use deploywatch::models::log_line::LineClass;
use deploywatch::observe::buffer::LogBuffer;

#[test]
fn test_append_assigns_increasing_sequences() {
    let mut buffer = LogBuffer::new();
    let first = buffer.append("Cloning repository").unwrap();
    let second = buffer.append("Installing dependencies").unwrap();

    assert_eq!(first.sequence, 0);
    assert_eq!(second.sequence, 1);
    assert_eq!(buffer.len(), 2);
}

#[test]
fn test_blank_lines_are_dropped() {
    let mut buffer = LogBuffer::new();
    assert!(buffer.append("").is_none());
    assert!(buffer.append("  \t ").is_none());
    assert!(buffer.is_empty());

    let appended = buffer.append_many(["a", " ", "b", ""]);
    assert_eq!(appended.len(), 2);
    assert_eq!(buffer.snapshot()[1].sequence, 1);
}

#[test]
fn test_duplicates_are_kept() {
    let mut buffer = LogBuffer::new();
    buffer.append_many(["retrying", "retrying"]);
    assert_eq!(buffer.len(), 2);
}

#[test]
fn test_replace_all_extends() {
    let mut buffer = LogBuffer::new();
    buffer.replace_all(["a", "b"]);
    let replacement = buffer.replace_all(["a", "b", "c"]);

    assert_eq!(replacement.retained, 2);
    assert_eq!(replacement.appended.len(), 1);
    assert_eq!(replacement.appended[0].text, "c");
    assert_eq!(replacement.appended[0].sequence, 2);
}

#[test]
fn test_replace_all_identical_is_noop() {
    let mut buffer = LogBuffer::new();
    buffer.replace_all(["a", "b"]);
    let replacement = buffer.replace_all(["a", "", "b"]);
    assert!(replacement.is_noop(2));
}

#[test]
fn test_replace_all_never_reuses_sequences() {
    let mut buffer = LogBuffer::new();
    buffer.replace_all(["a", "b", "c"]);
    let replacement = buffer.replace_all(["x"]);

    assert_eq!(replacement.retained, 0);
    assert_eq!(buffer.snapshot()[0].sequence, 3);

    buffer.replace_all(Vec::<String>::new());
    assert!(buffer.is_empty());
    assert_eq!(buffer.append("y").unwrap().sequence, 4);
}

#[test]
fn test_reset_restarts_numbering() {
    let mut buffer = LogBuffer::new();
    buffer.append_many(["a", "b"]);
    buffer.reset();
    assert!(buffer.is_empty());
    assert_eq!(buffer.append("c").unwrap().sequence, 0);
}

#[test]
fn test_lines_are_classified() {
    let mut buffer = LogBuffer::new();
    buffer.append_many([
        "Compiling...",
        "WARN peer dependency missing",
        "Error: build failed",
        "✓ Build complete",
    ]);
    let classes: Vec<LineClass> = buffer.lines().iter().map(|l| l.class).collect();
    assert_eq!(
        classes,
        vec![
            LineClass::Normal,
            LineClass::Warning,
            LineClass::Error,
            LineClass::SuccessMarker,
        ]
    );
}
