use specflow::engine::scheduler::{contention, critical_path, ready_tasks};
use specflow::engine::{
    schedule, validate_statuses, verify, ChecklistFailure, Contention, Decision, EngineError,
    RejectReason, TaskGraph,
};
use specflow::models::*;
use speculate2::speculate;

fn ids(values: &[&str]) -> Vec<TaskId> {
    values.iter().map(|v| TaskId::new(*v)).collect()
}

fn rejection(err: EngineError) -> RejectReason {
    match err {
        EngineError::Rejected(rejection) => rejection.reason,
        other => panic!("expected a rejection, got {other}"),
    }
}

/// T-1 ─┬─> T-2 ─┐
///      └─> T-3 ─┴─> T-4 ──> T-5
fn diamond() -> TaskGraph {
    TaskGraph::build(vec![
        TaskInput::new("T-1", "Schema").criterion("a", true),
        TaskInput::new("T-2", "Parser").depends_on("T-1").criterion("b", false),
        TaskInput::new("T-3", "Store").depends_on("T-1").criterion("c", false),
        TaskInput::new("T-4", "Workflow")
            .depends_on("T-2")
            .depends_on("T-3")
            .criterion("d", false),
        TaskInput::new("T-5", "Cli").depends_on("T-4"),
    ])
    .expect("Failed to build graph")
}

speculate! {
    describe "building" {
        it "derives dependents as the inverse of dependencies" {
            let graph = diamond();
            assert_eq!(graph.dependents_of("T-1").unwrap(), ids(&["T-2", "T-3"]).as_slice());
            assert_eq!(graph.dependents_of("T-4").unwrap(), ids(&["T-5"]).as_slice());
            assert!(graph.dependents_of("T-5").unwrap().is_empty());
        }

        it "drops repeated dependencies" {
            let graph = TaskGraph::build(vec![
                TaskInput::new("T-1", "a"),
                TaskInput::new("T-2", "b").depends_on("T-1").depends_on("T-1"),
            ]).unwrap();
            assert_eq!(graph.dependencies_of("T-2").unwrap(), ids(&["T-1"]).as_slice());
            assert_eq!(graph.dependents_of("T-1").unwrap().len(), 1);
        }

        it "rejects a repeated task id" {
            let err = TaskGraph::build(vec![TaskInput::new("T-1", "a"), TaskInput::new("T-1", "b")]).unwrap_err();
            assert!(matches!(err, EngineError::DuplicateTask(id) if id.as_str() == "T-1"));
        }

        it "rejects a dependency on an unknown task" {
            let err = TaskGraph::build(vec![TaskInput::new("T-1", "a").depends_on("T-9")]).unwrap_err();
            assert!(matches!(err, EngineError::UnknownDependency { .. }));
        }

        it "reports a cycle as a closed path" {
            let err = TaskGraph::build(vec![
                TaskInput::new("T-1", "a").depends_on("T-3"),
                TaskInput::new("T-2", "b").depends_on("T-1"),
                TaskInput::new("T-3", "c").depends_on("T-2"),
            ]).unwrap_err();

            match err {
                EngineError::CyclicDependency { cycle } => {
                    assert_eq!(cycle, ids(&["T-1", "T-3", "T-2", "T-1"]));
                }
                other => panic!("expected a cycle, got {other}"),
            }
        }

        it "treats a self dependency as a cycle" {
            let err = TaskGraph::build(vec![TaskInput::new("T-1", "a").depends_on("T-1")]).unwrap_err();
            assert!(matches!(err, EngineError::CyclicDependency { cycle } if cycle == ids(&["T-1", "T-1"])));
        }

        it "accepts an empty task list" {
            let graph = TaskGraph::build(Vec::new()).unwrap();
            assert!(graph.is_empty());
            assert!(graph.phases().is_empty());
        }
    }

    describe "ordering" {
        it "places every task after its dependencies" {
            let graph = diamond();
            let order: Vec<_> = graph.topological_order().iter().map(|t| t.id.clone()).collect();
            assert_eq!(order, ids(&["T-1", "T-2", "T-3", "T-4", "T-5"]));
        }

        it "prefers declaration order among free tasks" {
            let graph = TaskGraph::build(vec![
                TaskInput::new("T-1", "a").depends_on("T-3"),
                TaskInput::new("T-2", "b"),
                TaskInput::new("T-3", "c"),
            ]).unwrap();
            let order: Vec<_> = graph.topological_order().iter().map(|t| t.id.clone()).collect();
            assert_eq!(order, ids(&["T-2", "T-3", "T-1"]));
        }

        it "groups tasks into phases" {
            assert_eq!(
                diamond().phases(),
                vec![ids(&["T-1"]), ids(&["T-2", "T-3"]), ids(&["T-4"]), ids(&["T-5"])]
            );
        }
    }

    describe "status machine" {
        it "claims a task unconditionally" {
            let mut graph = diamond();
            let transition = graph.set_status("T-5", TaskStatus::InProgress).unwrap();
            assert_eq!(transition.from, TaskStatus::NotStarted);
            assert_eq!(graph.get("T-5").unwrap().status, TaskStatus::InProgress);
        }

        it "refuses to skip straight to done through set_status" {
            let mut graph = diamond();
            let err = graph.set_status("T-1", TaskStatus::Done).unwrap_err();
            assert_eq!(
                rejection(err),
                RejectReason::InvalidTransition { from: TaskStatus::NotStarted, to: TaskStatus::Done }
            );
        }

        it "checks dependencies before the checklist" {
            let mut graph = diamond();
            graph.set_status("T-4", TaskStatus::InProgress).unwrap();
            let err = graph.complete("T-4").unwrap_err();
            assert_eq!(rejection(err), RejectReason::UnmetDependency { unmet: ids(&["T-2", "T-3"]) });
        }

        it "refuses a task without criteria" {
            let mut graph = TaskGraph::build(vec![TaskInput::new("T-1", "a")]).unwrap();
            let err = graph.complete("T-1").unwrap_err();
            assert!(matches!(
                rejection(err),
                RejectReason::IncompleteChecklist { failure: ChecklistFailure::NoCriteria, .. }
            ));
            assert_eq!(graph.get("T-1").unwrap().status, TaskStatus::NotStarted);
        }

        it "completes a never started task in two steps" {
            let mut graph = diamond();
            let transitions = graph.complete("T-1").unwrap();
            let steps: Vec<_> = transitions.iter().map(|t| (t.from, t.to)).collect();
            assert_eq!(
                steps,
                vec![
                    (TaskStatus::NotStarted, TaskStatus::InProgress),
                    (TaskStatus::InProgress, TaskStatus::Done),
                ]
            );
        }

        it "rejects resetting a task that was never started" {
            let mut graph = diamond();
            assert!(matches!(rejection(graph.reset("T-1").unwrap_err()), RejectReason::InvalidTransition { .. }));
        }

        it "keeps a done task from gaining pending dependencies" {
            let mut graph = diamond();
            graph.complete("T-1").unwrap();
            let err = graph.set_dependencies("T-1", ids(&["T-5"])).unwrap_err();
            assert_eq!(rejection(err), RejectReason::UnmetDependency { unmet: ids(&["T-5"]) });
            assert!(graph.dependencies_of("T-1").unwrap().is_empty());
        }

        it "restores the old edges when new ones close a cycle" {
            let mut graph = diamond();
            let err = graph.set_dependencies("T-2", ids(&["T-1", "T-5"])).unwrap_err();
            assert!(matches!(err, EngineError::CyclicDependency { .. }));
            assert_eq!(graph.dependencies_of("T-2").unwrap(), ids(&["T-1"]).as_slice());
            assert_eq!(graph.dependents_of("T-5").unwrap().len(), 0);
        }
    }

    describe "status audit" {
        it "flags done tasks whose dependencies were reset" {
            let mut graph = diamond();
            graph.complete("T-1").unwrap();
            graph.toggle_criterion("T-2", 0).unwrap();
            graph.complete("T-2").unwrap();
            graph.reset("T-1").unwrap();

            let violations = validate_statuses(&graph);
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].task, TaskId::new("T-2"));
            assert_eq!(violations[0].reason, RejectReason::UnmetDependency { unmet: ids(&["T-1"]) });
        }

        it "never flags in progress tasks" {
            let graph = TaskGraph::build(vec![
                TaskInput::new("T-1", "a"),
                TaskInput::new("T-2", "b").depends_on("T-1").status(TaskStatus::InProgress),
            ]).unwrap();
            assert!(validate_statuses(&graph).is_empty());
        }

        it "flags a hand edited done task with an open checklist" {
            let graph = TaskGraph::build(vec![
                TaskInput::new("T-1", "a").status(TaskStatus::Done).criterion("x", false),
            ]).unwrap();
            let violations = validate_statuses(&graph);
            assert!(matches!(violations[0].reason, RejectReason::IncompleteChecklist { .. }));
        }
    }

    describe "scheduling" {
        it "lists not started tasks with every dependency done" {
            let mut graph = diamond();
            assert_eq!(ready_tasks(&graph), ids(&["T-1"]));

            graph.complete("T-1").unwrap();
            assert_eq!(ready_tasks(&graph), ids(&["T-2", "T-3"]));

            graph.set_status("T-2", TaskStatus::InProgress).unwrap();
            assert_eq!(ready_tasks(&graph), ids(&["T-3"]));
        }

        it "flags ready tasks that gate the same dependent" {
            let mut graph = diamond();
            graph.complete("T-1").unwrap();
            let ready = ready_tasks(&graph);
            assert_eq!(
                contention(&graph, &ready),
                vec![Contention {
                    first: TaskId::new("T-2"),
                    second: TaskId::new("T-3"),
                    dependent: TaskId::new("T-4"),
                }]
            );
        }

        it "follows the longest chain" {
            assert_eq!(critical_path(&diamond()), ids(&["T-1", "T-2", "T-4", "T-5"]));
        }

        it "schedules nothing once everything is done" {
            let mut graph = diamond();
            graph.complete("T-1").unwrap();
            for id in ["T-2", "T-3", "T-4"] {
                graph.toggle_criterion(id, 0).unwrap();
                graph.complete(id).unwrap();
            }
            graph.add_criterion("T-5", "e").unwrap();
            graph.toggle_criterion("T-5", 0).unwrap();
            graph.complete("T-5").unwrap();

            let schedule = schedule(&graph);
            assert!(schedule.ready.is_empty());
            assert!(schedule.parallel_groups.is_empty());
            assert_eq!(schedule.progress.done, 5);
        }
    }

    describe "properties" {
        it "schedules the same snapshot the same way twice" {
            let mut graph = diamond();
            graph.complete("T-1").unwrap();
            assert_eq!(schedule(&graph), schedule(&graph));
        }

        it "keeps dependents the inverse of dependencies after edits" {
            let mut graph = diamond();
            graph.set_dependencies("T-5", ids(&["T-2", "T-3"])).unwrap();
            graph.set_dependencies("T-4", ids(&["T-1"])).unwrap();

            for task in graph.tasks() {
                let expected: Vec<TaskId> = graph
                    .tasks()
                    .filter(|other| other.dependencies.contains(&task.id))
                    .map(|other| other.id.clone())
                    .collect();
                assert_eq!(graph.dependents_of(task.id.as_str()).unwrap(), expected.as_slice());
            }
        }

        it "measures a chain of three as a path of three" {
            let graph = TaskGraph::build(vec![
                TaskInput::new("T-1", "a"),
                TaskInput::new("T-2", "b").depends_on("T-1"),
                TaskInput::new("T-3", "c").depends_on("T-2"),
            ]).unwrap();
            assert_eq!(critical_path(&graph).len(), 3);
        }

        it "never lists a task with a pending dependency as ready" {
            let mut graph = diamond();
            graph.complete("T-1").unwrap();
            graph.toggle_criterion("T-2", 0).unwrap();
            graph.complete("T-2").unwrap();

            for id in ready_tasks(&graph) {
                let task = graph.get(id.as_str()).unwrap();
                assert!(task
                    .dependencies
                    .iter()
                    .all(|dep| graph.get(dep.as_str()).unwrap().status == TaskStatus::Done));
            }
        }
    }

    describe "verification" {
        it "quotes every criterion with its state" {
            let graph = TaskGraph::build(vec![
                TaskInput::new("T-1", "a").criterion("one", true).criterion("two", false),
            ]).unwrap();
            let verification = verify(graph.get("T-1").unwrap());

            assert_eq!(verification.decision, Decision::Fail(ChecklistFailure::Unchecked(1)));
            assert_eq!((verification.checked, verification.total), (1, 2));
            let quoted: Vec<_> = verification.evidence.iter().map(|e| e.text.as_str()).collect();
            assert_eq!(quoted, vec!["- [x] one", "- [ ] two"]);
        }
    }
}
