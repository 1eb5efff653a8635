//! Worker signals through the coordinator: auto-advance versus advisory,
//! stale signals, remediation forwarding and a full walk to deployment.

mod fixtures;

use std::sync::Arc;

use fixtures::{FixedEstimator, RecordingRemediation, RecordingWorker, WorkerCall};
use phase_pipeline::handoff::{Artifact, PlanStep, TaskStatus};
use phase_pipeline::{
    MemoryPhaseStore, Phase, PhaseArtifacts, PhaseSignal, PipelineConfig, PipelineCoordinator, PipelineEvent,
    ProgressSnapshot, SignalOutcome, TransitionRequest, TriggeringActor, WorkerRegistry, WorkerSignal, WorkflowId,
    WorkflowInstance,
};

async fn coordinator_with(
    workers: WorkerRegistry,
    estimator: Option<&'static str>,
    instance: WorkflowInstance,
) -> (PipelineCoordinator, WorkflowId) {
    let estimator = estimator.map(|answer| Arc::new(FixedEstimator(answer)) as Arc<dyn phase_pipeline::ConfidenceEstimator>);
    let coordinator = PipelineCoordinator::from_config(
        Arc::new(MemoryPhaseStore::new()),
        workers,
        estimator,
        &PipelineConfig::default(),
    );
    let id = coordinator.create_workflow(instance).await.unwrap().id;
    (coordinator, id)
}

fn ready_metrics(id: &WorkflowId) -> ProgressSnapshot {
    ProgressSnapshot::new(id.clone(), Phase::Ideation)
        .with_confidence(0.85)
        .with_completion(0.7)
        .with_blockers(1)
        .with_pending_questions(1)
}

fn ready(id: &WorkflowId, phase: Phase, metrics: Option<ProgressSnapshot>) -> PhaseSignal {
    PhaseSignal::new(id.clone(), phase, WorkerSignal::ReadyForNextPhase { metrics })
}

fn kinds(events: &[PipelineEvent]) -> Vec<&'static str> {
    events.iter().map(|event| event.kind()).collect()
}

#[tokio::test]
async fn test_confident_ready_signal_advances_automatically() {
    let (coordinator, id) = coordinator_with(
        WorkerRegistry::new(),
        None,
        WorkflowInstance::new(WorkflowId::new("auto")).with_auto_advance(true),
    )
    .await;
    let mut events = coordinator.subscribe(&id);

    let outcome = coordinator
        .handle_signal(ready(&id, Phase::Ideation, Some(ready_metrics(&id))))
        .await
        .unwrap();

    match outcome {
        SignalOutcome::Advanced(record) => {
            assert_eq!(record.to_phase, Phase::IdeationReady);
            assert_eq!(record.triggering_actor, TriggeringActor::Auto);
        }
        other => panic!("expected an automatic advance, got {:?}", other),
    }
    assert_eq!(coordinator.current_phase(&id).await.unwrap(), Phase::IdeationReady);

    let received = kinds(&events.drain());
    assert_eq!(received.iter().filter(|kind| **kind == "transition").count(), 1);
    assert!(!received.contains(&"transition_available"));
}

#[tokio::test]
async fn test_same_metrics_without_auto_advance_publish_an_advisory() {
    let (coordinator, id) = coordinator_with(
        WorkerRegistry::new(),
        None,
        WorkflowInstance::new(WorkflowId::new("manual")).with_auto_advance(false),
    )
    .await;
    let mut events = coordinator.subscribe(&id);

    let outcome = coordinator
        .handle_signal(ready(&id, Phase::Ideation, Some(ready_metrics(&id))))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        SignalOutcome::AdvisoryPublished {
            target: Phase::IdeationReady,
            missing: vec![]
        }
    );
    assert_eq!(coordinator.current_phase(&id).await.unwrap(), Phase::Ideation);

    let received = events.drain();
    assert!(!kinds(&received).contains(&"transition"));
    let advisory = received
        .iter()
        .find_map(|event| match event {
            PipelineEvent::TransitionAvailable { from, to, metrics, .. } => Some((*from, *to, metrics.confidence)),
            _ => None,
        })
        .unwrap();
    assert_eq!(advisory, (Phase::Ideation, Phase::IdeationReady, 0.85));

    // A human confirming the advisory commits it
    let result = coordinator
        .request_transition(TransitionRequest::new(id.clone(), Phase::IdeationReady, "agreed"))
        .await
        .unwrap();
    assert_eq!(result.phase(), Phase::IdeationReady);
}

#[tokio::test]
async fn test_low_confidence_advisory_lists_unmet_prerequisites() {
    let (coordinator, id) = coordinator_with(
        WorkerRegistry::new(),
        None,
        WorkflowInstance::new(WorkflowId::new("early")).with_auto_advance(true),
    )
    .await;

    let metrics = ProgressSnapshot::new(id.clone(), Phase::Ideation)
        .with_confidence(0.4)
        .with_completion(0.3);
    let outcome = coordinator
        .handle_signal(ready(&id, Phase::Ideation, Some(metrics)))
        .await
        .unwrap();

    match outcome {
        SignalOutcome::AdvisoryPublished { target, missing } => {
            assert_eq!(target, Phase::IdeationReady);
            assert!(missing.iter().any(|reason| reason.contains("minimum")));
        }
        other => panic!("expected an advisory, got {:?}", other),
    }
}

#[tokio::test]
async fn test_refused_automatic_advance_falls_back_to_advisory() {
    let (coordinator, id) = coordinator_with(
        WorkerRegistry::new(),
        None,
        WorkflowInstance::new(WorkflowId::new("reviewed"))
            .with_auto_advance(true)
            .with_human_review(true),
    )
    .await;
    let mut events = coordinator.subscribe(&id);

    let outcome = coordinator
        .handle_signal(ready(&id, Phase::Ideation, Some(ready_metrics(&id))))
        .await
        .unwrap();
    match outcome {
        SignalOutcome::AdvisoryPublished { missing, .. } => {
            assert_eq!(missing.len(), 1);
            assert!(missing[0].contains("human review"));
        }
        other => panic!("expected an advisory, got {:?}", other),
    }
    assert_eq!(coordinator.current_phase(&id).await.unwrap(), Phase::Ideation);
    assert!(kinds(&events.drain()).contains(&"transition_available"));

    let history = coordinator.history(&id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].triggering_actor, TriggeringActor::Auto);
    assert!(!history[0].is_committed());
}

#[tokio::test]
async fn test_ready_signal_without_metrics_runs_the_detector() {
    let (coordinator, id) = coordinator_with(
        WorkerRegistry::new(),
        Some("0.9"),
        WorkflowInstance::new(WorkflowId::new("detected")).with_auto_advance(true),
    )
    .await;
    coordinator
        .record_artifacts(&id, Phase::Ideation, &complete_ideation())
        .await
        .unwrap();

    let outcome = coordinator
        .handle_signal(ready(&id, Phase::Ideation, None))
        .await
        .unwrap();
    assert!(matches!(outcome, SignalOutcome::Advanced(_)));

    let progress = coordinator.progress(&id).await.unwrap();
    let snapshot = progress.get(Phase::Ideation).unwrap();
    assert_eq!(snapshot.completion_score, 1.0);
    assert_eq!(snapshot.confidence, 0.9);
    assert_eq!(snapshot.milestones_met.len(), 5);
}

#[tokio::test]
async fn test_signals_from_a_previous_phase_are_stale() {
    let (coordinator, id) = coordinator_with(
        WorkerRegistry::new(),
        None,
        WorkflowInstance::new(WorkflowId::new("moved-on")),
    )
    .await;
    coordinator
        .request_transition(TransitionRequest::new(id.clone(), Phase::IdeationReady, "operator override").forced(true))
        .await
        .unwrap();

    let snapshot = ProgressSnapshot::new(id.clone(), Phase::Ideation).with_completion(0.2);
    let outcome = coordinator
        .handle_signal(PhaseSignal::new(
            id.clone(),
            Phase::Ideation,
            WorkerSignal::Progress { snapshot },
        ))
        .await
        .unwrap();
    assert!(matches!(outcome, SignalOutcome::Ignored { .. }));
    assert!(coordinator.progress(&id).await.unwrap().is_empty());

    let outcome = coordinator
        .handle_signal(ready(&id, Phase::Ideation, Some(ready_metrics(&id))))
        .await
        .unwrap();
    assert!(matches!(outcome, SignalOutcome::Ignored { .. }));
    assert_eq!(coordinator.current_phase(&id).await.unwrap(), Phase::IdeationReady);
}

#[tokio::test]
async fn test_repeated_failures_are_forwarded_to_remediation() {
    let remediation = RecordingRemediation::new();
    let (coordinator, id) = coordinator_with(
        WorkerRegistry::new(),
        None,
        WorkflowInstance::new(WorkflowId::new("flaky")),
    )
    .await;
    let coordinator = coordinator.with_remediation(remediation.clone());

    for attempt_count in 1..=3 {
        coordinator
            .handle_signal(PhaseSignal::new(
                id.clone(),
                Phase::Ideation,
                WorkerSignal::Failed {
                    attempt_count,
                    error: Some("model refused".into()),
                },
            ))
            .await
            .unwrap();
    }

    let requests = remediation.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].attempt_count, 3);
    assert_eq!(requests[0].phase, Phase::Ideation);
    assert_eq!(requests[0].error.as_deref(), Some("model refused"));
    // Remediation decides what happens next; the phase is left alone
    assert_eq!(coordinator.current_phase(&id).await.unwrap(), Phase::Ideation);
}

fn complete_ideation() -> PhaseArtifacts {
    PhaseArtifacts::new()
        .with_turn(phase_pipeline::handoff::ConversationTurn::user(
            "Dog walkers keep double-booking their afternoons",
        ))
        .with_artifact(Artifact::TargetAudience {
            description: "independent dog walkers".into(),
        })
        .with_artifact(Artifact::Requirements {
            items: vec!["shared calendar".into(), "sms reminders".into()],
        })
        .with_artifact(Artifact::SuccessMetrics {
            items: vec!["zero double bookings per month".into()],
        })
        .with_artifact(Artifact::Entities {
            names: vec!["Walker".into(), "Booking".into()],
        })
}

fn complete_specification() -> PhaseArtifacts {
    PhaseArtifacts::new()
        .with_artifact(Artifact::Requirements {
            items: vec!["shared calendar".into()],
        })
        .with_artifact(Artifact::ExecutionPlan {
            steps: vec![PlanStep::new(2, "Reminder service"), PlanStep::new(1, "Calendar model")],
        })
        .with_question("Which SMS provider?", true)
        .with_work_unit("calendar model", TaskStatus::Pending)
        .with_work_unit("reminder service", TaskStatus::Pending)
}

fn complete_building() -> PhaseArtifacts {
    PhaseArtifacts::new()
        .with_work_unit("calendar model", TaskStatus::Done)
        .with_work_unit("reminder service", TaskStatus::Done)
}

#[tokio::test]
async fn test_workflow_walks_from_ideation_to_deployment() {
    let ideation = RecordingWorker::new();
    let specification = RecordingWorker::new();
    let building = RecordingWorker::new();
    let workers = WorkerRegistry::new()
        .with_worker(Phase::Ideation, ideation.clone())
        .with_worker(Phase::Specification, specification.clone())
        .with_worker(Phase::Building, building.clone());
    let (coordinator, id) = coordinator_with(
        workers,
        Some("0.9"),
        WorkflowInstance::new(WorkflowId::new("dog-walkers")).with_auto_advance(true),
    )
    .await;
    let mut firehose = coordinator.subscribe_all();

    // Intake starts the ideation worker with no bundle
    assert_eq!(
        ideation.calls(),
        vec![WorkerCall::Start {
            workflow_id: id.clone(),
            source: None
        }]
    );

    coordinator
        .record_artifacts(&id, Phase::Ideation, &complete_ideation())
        .await
        .unwrap();
    let outcome = coordinator.handle_signal(ready(&id, Phase::Ideation, None)).await.unwrap();
    assert!(matches!(outcome, SignalOutcome::Advanced(_)));

    coordinator
        .request_transition(TransitionRequest::new(id.clone(), Phase::Specification, "scope approved"))
        .await
        .unwrap();

    coordinator
        .record_artifacts(&id, Phase::Specification, &complete_specification())
        .await
        .unwrap();
    let outcome = coordinator
        .handle_signal(PhaseSignal::new(id.clone(), Phase::Specification, WorkerSignal::Completed))
        .await
        .unwrap();
    assert!(matches!(outcome, SignalOutcome::Advanced(_)));

    coordinator
        .request_transition(TransitionRequest::new(id.clone(), Phase::Building, "spec signed off"))
        .await
        .unwrap();

    coordinator
        .record_artifacts(&id, Phase::Building, &complete_building())
        .await
        .unwrap();
    let outcome = coordinator.handle_signal(ready(&id, Phase::Building, None)).await.unwrap();
    assert!(matches!(outcome, SignalOutcome::Advanced(_)));

    coordinator
        .request_transition(TransitionRequest::new(id.clone(), Phase::Deployed, "ship it"))
        .await
        .unwrap();
    assert_eq!(coordinator.current_phase(&id).await.unwrap(), Phase::Deployed);
    assert!(coordinator.valid_targets(&id).await.unwrap().is_empty());

    let outcome = coordinator
        .handle_signal(PhaseSignal::new(id.clone(), Phase::Deployed, WorkerSignal::Completed))
        .await
        .unwrap();
    assert_eq!(outcome, SignalOutcome::Completed);

    let path: Vec<_> = coordinator
        .history(&id)
        .await
        .unwrap()
        .into_iter()
        .filter(|record| record.is_committed())
        .map(|record| record.to_phase)
        .collect();
    assert_eq!(
        path,
        vec![
            Phase::IdeationReady,
            Phase::Specification,
            Phase::SpecReady,
            Phase::Building,
            Phase::BuildReview,
            Phase::Deployed,
        ]
    );

    let bundles = coordinator.handoffs(&id).await.unwrap();
    let targets: Vec<_> = bundles.iter().map(|bundle| bundle.target_phase()).collect();
    assert_eq!(targets, vec![Phase::Specification, Phase::Building, Phase::Deployed]);
    let plan: Vec<_> = bundles[1].execution_plan().iter().map(|step| step.title.as_str()).collect();
    assert_eq!(plan, vec!["Calendar model", "Reminder service"]);

    assert_eq!(specification.starts(), 1);
    assert_eq!(specification.stops(), 1);
    assert_eq!(building.starts(), 1);
    assert_eq!(building.stops(), 1);

    let transitions = firehose
        .drain()
        .into_iter()
        .filter(|event| event.kind() == "transition")
        .count();
    assert_eq!(transitions, 6);
}
