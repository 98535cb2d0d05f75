use std::fs;

use specflow::models::*;
use specflow::store::{AuditLog, DocumentStore, FileStore, StoreError};
use speculate2::speculate;

speculate! {
    before {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = dir.path().to_string_lossy().to_string();
        let store = FileStore::new();
    }

    describe "documents" {
        it "reports a missing document as not found" {
            let err = store.read(&root, DocKind::Plan).unwrap_err();
            assert!(matches!(err, StoreError::NotFound { kind: DocKind::Plan, .. }));
            assert!(!store.exists(&root, DocKind::Plan).expect("Failed to check"));
        }

        it "creates the spec directory on first write" {
            let version = store.write(&root, DocKind::Tasks, "# Tasks\n", None).expect("Failed to write");

            let path = dir.path().join(".spec").join("specs").join("tasks.md");
            assert_eq!(fs::read_to_string(&path).expect("Failed to read file"), "# Tasks\n");
            assert_eq!(store.read(&root, DocKind::Tasks).expect("Failed to read").version, version);
        }

        it "leaves no temporary file behind" {
            store.write(&root, DocKind::Plan, "# Plan\n", None).expect("Failed to write");

            let names: Vec<_> = fs::read_dir(dir.path().join(".spec").join("specs"))
                .expect("Failed to list directory")
                .map(|entry| entry.expect("Failed to read entry").file_name())
                .collect();
            assert_eq!(names, vec!["plan.md"]);
        }

        it "writes steering documents under their own directory" {
            store.write(&root, DocKind::Steering(SteeringKind::Structure), "layout", None).expect("Failed to write");
            assert!(dir.path().join(".spec/steering/structure.md").exists());
        }

        it "rejects a stale write and keeps the newer content" {
            let first = store.write(&root, DocKind::Plan, "one", None).expect("Failed to write");
            store.write(&root, DocKind::Plan, "two", Some(&first)).expect("Failed to write");

            let err = store.write(&root, DocKind::Plan, "three", Some(&first)).unwrap_err();
            assert!(matches!(err, StoreError::Conflict { .. }));
            assert_eq!(store.read(&root, DocKind::Plan).expect("Failed to read").content, "two");
        }

        it "refuses to create over an existing file" {
            store.write(&root, DocKind::Plan, "one", None).expect("Failed to write");
            let err = store.write(&root, DocKind::Plan, "two", None).unwrap_err();
            assert!(matches!(err, StoreError::Conflict { .. }));
        }

        it "notices edits made outside the store" {
            let version = store.write(&root, DocKind::Plan, "one", None).expect("Failed to write");
            fs::write(FileStore::document_path(&root, DocKind::Plan), "edited by hand").expect("Failed to edit");

            let err = store.write(&root, DocKind::Plan, "two", Some(&version)).unwrap_err();
            assert!(matches!(err, StoreError::Conflict { .. }));
        }
    }

    describe "events" {
        it "is empty before anything was recorded" {
            assert!(store.events(&root, None).expect("Failed to list events").is_empty());
        }

        it "appends one json line per event" {
            let t1 = TaskId::new("T-1");
            store.record(&TaskEvent::transition(&root, &t1, TaskStatus::NotStarted, TaskStatus::InProgress)).expect("Failed to record");
            store.record(&TaskEvent::reset(&root, &t1, TaskStatus::InProgress)).expect("Failed to record");
            store.record(&TaskEvent::transition(&root, &TaskId::new("T-2"), TaskStatus::NotStarted, TaskStatus::InProgress)).expect("Failed to record");

            let raw = fs::read_to_string(dir.path().join(".spec/specs/events.jsonl")).expect("Failed to read log");
            assert_eq!(raw.lines().count(), 3);

            let events = store.events(&root, Some("T-1")).expect("Failed to list events");
            let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
            assert_eq!(kinds, vec![EventKind::Transition, EventKind::Reset]);
        }
    }
}
