//! Recipient resolver tests.

use bulletin::{DispatchError, FieldMapping, MemoryResolver, RecipientResolver};

const STUDENTS: &str = r#"[
    {"regNo": "RA001", "name": "Asha Rao", "email": "asha@school.edu",
     "parentEmail": "rao.parent@example.com", "department": "CSE", "semester": 5},
    {"RegNo": "RA002", "name": "Ravi Kumar", "email": " ravi@school.edu ",
     "parentEmail": null, "tags": ["hostel"]}
]"#;

#[tokio::test]
async fn loads_records_from_json_file() {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), STUDENTS).unwrap();

    let resolver = MemoryResolver::from_json_file(file.path(), FieldMapping::default()).unwrap();
    assert_eq!(resolver.len(), 2);

    let asha = resolver.resolve("RA001").await.unwrap();
    assert_eq!(asha.primary_address, "asha@school.edu");
    assert_eq!(asha.alternate_address, "rao.parent@example.com");
    assert_eq!(asha.field("semester"), Some("5"));

    let ravi = resolver.resolve("RA002").await.unwrap();
    assert_eq!(ravi.primary_address, "ravi@school.edu");
    assert_eq!(ravi.address(true), "");
    assert_eq!(ravi.field("tags"), None);
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let resolver = MemoryResolver::from_json_str(STUDENTS, FieldMapping::default()).unwrap();

    let err = resolver.resolve("RA999").await.unwrap_err();
    assert!(matches!(err, DispatchError::RecipientNotFound(_)));
    assert_eq!(err.to_string(), "no data found for RA999");
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn custom_mapping() {
    let mapping = FieldMapping {
        id: "staffId".into(),
        primary: "workEmail".into(),
        alternate: "personalEmail".into(),
    };
    let resolver = MemoryResolver::from_json_str(
        r#"[{"staffId": "S1", "workEmail": "s1@school.edu", "personalEmail": "s1@example.com"}]"#,
        mapping,
    )
    .unwrap();

    let record = resolver.resolve("S1").await.unwrap();
    assert_eq!(record.address(false), "s1@school.edu");
    assert_eq!(record.address(true), "s1@example.com");
}

#[test]
fn record_without_id_is_rejected() {
    let err = MemoryResolver::from_json_str(r#"[{"name": "x"}]"#, FieldMapping::default())
        .unwrap_err();
    assert!(err.to_string().contains("regNo"));
}

#[test]
fn missing_file_is_configuration_error() {
    let err = MemoryResolver::from_json_file("/no/such/students.json", FieldMapping::default())
        .unwrap_err();
    assert!(matches!(err, DispatchError::Configuration(_)));
}
