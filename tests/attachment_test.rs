//! Attachment loading tests.

use std::fs;

use bulletin::{AttachmentLoader, AttachmentSpec, DispatchError, FileAttachmentLoader};

// ============================================================================
// Loading
// ============================================================================

#[tokio::test]
async fn loads_files_in_order() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("timetable.pdf"), b"%PDF-1.4").unwrap();
    fs::write(dir.path().join("marks.csv"), b"regNo,marks\nR1,88\n").unwrap();

    let loader = FileAttachmentLoader::with_base_dir(dir.path());
    let loaded = loader
        .load(&[
            AttachmentSpec::new("timetable.pdf", "timetable.pdf"),
            AttachmentSpec::new("marks.csv", "marks.csv"),
        ])
        .await
        .unwrap();

    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].filename, "timetable.pdf");
    assert_eq!(loaded[0].content_type, "application/pdf");
    assert_eq!(loaded[0].data, b"%PDF-1.4");
    assert_eq!(loaded[1].content_type, "text/csv");
    assert_eq!(loaded[1].size(), 18);
}

#[tokio::test]
async fn absolute_paths_ignore_base_dir() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notice.txt");
    fs::write(&path, b"Exams start Monday.").unwrap();

    let loader = FileAttachmentLoader::with_base_dir("/nonexistent/base");
    let loaded = loader
        .load(&[AttachmentSpec::new("notice.txt", path.to_string_lossy())])
        .await
        .unwrap();

    assert_eq!(loaded[0].data, b"Exams start Monday.");
}

#[tokio::test]
async fn explicit_content_type_wins() {
    let file = tempfile::NamedTempFile::new().unwrap();
    fs::write(file.path(), b"binary").unwrap();

    let loaded = FileAttachmentLoader::new()
        .load(&[AttachmentSpec::new("report.dat", file.path().to_string_lossy())
            .content_type("application/vnd.ms-excel")])
        .await
        .unwrap();

    assert_eq!(loaded[0].content_type, "application/vnd.ms-excel");
}

#[tokio::test]
async fn empty_spec_list_loads_nothing() {
    let loaded = FileAttachmentLoader::new().load(&[]).await.unwrap();
    assert!(loaded.is_empty());
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn missing_file_names_the_attachment() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ok.txt"), b"ok").unwrap();

    let err = FileAttachmentLoader::with_base_dir(dir.path())
        .load(&[
            AttachmentSpec::new("ok.txt", "ok.txt"),
            AttachmentSpec::new("Fee Receipt.pdf", "receipts/missing.pdf"),
        ])
        .await
        .unwrap_err();

    match &err {
        DispatchError::AttachmentReadError { filename, reason } => {
            assert_eq!(filename, "Fee Receipt.pdf");
            assert!(reason.contains("missing.pdf"));
        }
        other => panic!("expected AttachmentReadError, got {other:?}"),
    }
    assert!(err.is_fatal());
    assert!(err.to_string().contains("Fee Receipt.pdf"));
}
