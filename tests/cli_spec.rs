use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use speculate2::speculate;

const TASKS: &str = "\
# Implementation Tasks

### Task T-1: Schema
**Status**: ⚪ Not Started
**Blocked By**: None

#### Acceptance Criteria (EARS)
- [ ] WHEN migrated THEN THE SYSTEM SHALL create tables

### Task T-2: Parser
**Status**: ⚪ Not Started
**Blocked By**: T-1

#### Acceptance Criteria (EARS)
- [ ] WHEN parsed THEN THE SYSTEM SHALL keep bytes
";

fn specflow(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_specflow"))
        .args(args)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("SPECFLOW_DB", home.join("specflow.db"))
        .env("RUST_LOG", "specflow=warn")
        .output()
        .expect("Failed to run specflow")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

speculate! {
    before {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let home = dir.path().to_path_buf();
        let project = home.join("project");
        fs::create_dir_all(&project).expect("Failed to create project dir");
        let project_arg = project.to_string_lossy().to_string();
        let tasks_file = home.join("tasks.md");
        fs::write(&tasks_file, TASKS).expect("Failed to write tasks file");
        let tasks_arg = tasks_file.to_string_lossy().to_string();
    }

    describe "file store" {
        before {
            let put = specflow(&home, &["--project", &project_arg, "put", "tasks", &tasks_arg]);
            assert!(put.status.success(), "{}", stderr(&put));
        }

        it "prints the schedule" {
            let output = specflow(&home, &["--project", &project_arg, "schedule"]);
            assert!(output.status.success(), "{}", stderr(&output));

            let text = stdout(&output);
            assert!(text.contains("Ready: T-1\n"));
            assert!(text.contains("Critical path: T-1 → T-2\n"));
            assert!(text.contains("└── FAIL T-2 (0/1): 1 unchecked\n"));
        }

        it "prints a verification transcript" {
            let output = specflow(&home, &["--project", &project_arg, "verify", "T-1"]);
            assert!(output.status.success(), "{}", stderr(&output));

            let text = stdout(&output);
            assert!(text.starts_with("File: "));
            assert!(text.contains("tasks.md:8: - [ ] WHEN migrated THEN THE SYSTEM SHALL create tables\n"));
            assert!(text.contains("Counts: Checked 0/1\nDecision: FAIL\n"));
        }

        it "fails a rejected completion without touching the document" {
            let output = specflow(&home, &["--project", &project_arg, "complete", "T-1"]);
            assert!(!output.status.success());
            assert!(stderr(&output).contains("incomplete checklist"));

            let on_disk = fs::read_to_string(project.join(".spec/specs/tasks.md")).expect("Failed to read");
            assert_eq!(on_disk, TASKS);
        }

        it "completes a task after its criterion is checked" {
            let check = specflow(&home, &["--project", &project_arg, "check", "T-1", "1"]);
            assert!(check.status.success(), "{}", stderr(&check));
            let complete = specflow(&home, &["--project", &project_arg, "complete", "T-1"]);
            assert!(complete.status.success(), "{}", stderr(&complete));

            let get = specflow(&home, &["--project", &project_arg, "get", "tasks"]);
            assert!(stdout(&get).contains("### Task T-1: Schema\n**Status**: ✅ Done\n"));

            let history = specflow(&home, &["--project", &project_arg, "history", "T-1"]);
            let events: serde_json::Value = serde_json::from_str(&stdout(&history)).expect("history should be json");
            assert_eq!(events.as_array().map(|a| a.len()), Some(3));
        }

        it "rejects criterion position zero" {
            let output = specflow(&home, &["--project", &project_arg, "check", "T-1", "0"]);
            assert!(!output.status.success());
        }

        it "refuses to store a cyclic tasks document" {
            let cyclic = TASKS.replacen("**Blocked By**: None", "**Blocked By**: T-2", 1);
            let cyclic_file = home.join("cyclic.md");
            fs::write(&cyclic_file, cyclic).expect("Failed to write");

            let output = specflow(&home, &["--project", &project_arg, "put", "tasks", &cyclic_file.to_string_lossy()]);
            assert!(!output.status.success());
            assert!(stderr(&output).contains("cyclic dependency"));
        }
    }

    describe "sqlite store" {
        it "manages projects and schedules their tasks" {
            let create = specflow(&home, &["--store", "sqlite", "project", "create", "demo"]);
            assert!(create.status.success(), "{}", stderr(&create));

            let put = specflow(&home, &["--store", "sqlite", "--project", "demo", "put", "tasks", &tasks_arg]);
            assert!(put.status.success(), "{}", stderr(&put));

            let output = specflow(&home, &["--store", "sqlite", "--project", "demo", "schedule", "--json"]);
            assert!(output.status.success(), "{}", stderr(&output));
            let report: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("schedule should be json");
            assert_eq!(report["schedule"]["ready"], serde_json::json!(["T-1"]));

            let list = specflow(&home, &["--store", "sqlite", "project", "list"]);
            assert!(stdout(&list).contains("demo"));
        }

        it "fails for an unknown project" {
            let output = specflow(&home, &["--store", "sqlite", "--project", "missing", "schedule"]);
            assert!(!output.status.success());
            assert!(stderr(&output).contains("Project missing not found"));
        }
    }
}
