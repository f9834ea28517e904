use std::sync::{Arc, Barrier};
use std::thread;

use super::common::*;
use crate::pipeline::{
    replay_stage, ActorId, ApplicationId, MoveStageRequest, PipelineError, PipelineScope, Stage,
};
use chrono::Duration;

#[test]
fn move_stage_records_event_and_updates_record() {
    let (service, _, clock) = build_service();
    let application = apply(&service, ENGINEERING_JOB, "cand-ada");
    clock.advance(Duration::hours(1));

    let (updated, event) = service
        .move_stage(
            MoveStageRequest::new(application.id.clone(), "interview", ActorId::new("u1"))
                .with_note("  referred by hiring manager  "),
        )
        .expect("transition succeeds");

    assert_eq!(updated.stage, Stage::Interview);
    assert_eq!(updated.version, 1);
    assert_eq!(updated.created_at, application.created_at);
    assert_eq!(updated.updated_at, start_time() + Duration::hours(1));
    assert_eq!(event.from_stage, Stage::Applied);
    assert_eq!(event.to_stage, Stage::Interview);
    assert_eq!(event.actor, ActorId::new("u1"));
    assert_eq!(event.note.as_deref(), Some("referred by hiring manager"));
    assert_eq!(event.recorded_at, updated.updated_at);
}

#[test]
fn missing_application_fails_before_stage_validation() {
    let (service, _, _) = build_service();
    let result = service.move_stage(MoveStageRequest::new(
        ApplicationId::new("app-404"),
        "not-a-stage",
        recruiter(),
    ));
    assert!(matches!(result, Err(PipelineError::ApplicationNotFound(_))));
}

#[test]
fn unknown_stage_is_rejected_without_side_effects() {
    let (service, _, _) = build_service();
    let application = apply(&service, ENGINEERING_JOB, "cand-ada");

    match service.move_stage(MoveStageRequest::new(
        application.id.clone(),
        "withdrawn",
        recruiter(),
    )) {
        Err(PipelineError::InvalidStage(name)) => assert_eq!(name, "withdrawn"),
        other => panic!("expected invalid stage, got {other:?}"),
    }
    assert_eq!(service.get(&application.id).expect("stored"), application);
    assert!(service
        .activity_history(&application.id)
        .expect("history")
        .is_empty());
}

#[test]
fn terminal_stages_absorb_every_target() {
    let (service, _, _) = build_service();
    let hired = apply(&service, ENGINEERING_JOB, "cand-hired");
    let hired = move_to(&service, &hired, "hired");
    let rejected = apply(&service, ENGINEERING_JOB, "cand-rejected");
    let rejected = move_to(&service, &rejected, "rejected");

    for application in [&hired, &rejected] {
        for target in Stage::all() {
            let result = service.move_stage(MoveStageRequest::new(
                application.id.clone(),
                target.label(),
                recruiter(),
            ));
            match result {
                Err(PipelineError::TerminalStageViolation { stage }) => {
                    assert_eq!(stage, application.stage)
                }
                other => panic!("expected terminal violation for {target}, got {other:?}"),
            }
        }
        assert_eq!(
            service.activity_history(&application.id).expect("history").len(),
            1
        );
    }
}

#[test]
fn no_op_transition_leaves_everything_unchanged() {
    let (service, _, _) = build_service();
    let application = apply(&service, ENGINEERING_JOB, "cand-ada");
    let application = move_to(&service, &application, "screening");
    let scope = PipelineScope::JobPosting(job(ENGINEERING_JOB));
    let summary_before = service.pipeline_summary(&scope).expect("summary");

    let result = service.move_stage(MoveStageRequest::new(
        application.id.clone(),
        "Screening",
        recruiter(),
    ));

    assert!(matches!(
        result,
        Err(PipelineError::NoOpTransition {
            stage: Stage::Screening
        })
    ));
    assert_eq!(service.get(&application.id).expect("stored"), application);
    assert_eq!(
        service.activity_history(&application.id).expect("history").len(),
        1
    );
    assert_eq!(service.pipeline_summary(&scope).expect("summary"), summary_before);
}

#[test]
fn backward_moves_are_allowed_between_open_stages() {
    let (service, _, _) = build_service();
    let application = apply(&service, ENGINEERING_JOB, "cand-ada");
    let application = move_to(&service, &application, "offer");
    let application = move_to(&service, &application, "interview");
    assert_eq!(application.stage, Stage::Interview);
    assert_eq!(application.version, 2);
}

#[test]
fn stale_expected_version_yields_conflict_retry() {
    let (service, _, _) = build_service();
    let application = apply(&service, ENGINEERING_JOB, "cand-ada");
    move_to(&service, &application, "screening");

    let result = service.move_stage(
        MoveStageRequest::new(application.id.clone(), "interview", recruiter())
            .expecting_version(application.version),
    );

    match result {
        Err(PipelineError::ConflictRetry { stage, version }) => {
            assert_eq!(stage, Stage::Screening);
            assert_eq!(version, 1);
        }
        other => panic!("expected conflict retry, got {other:?}"),
    }
    assert_eq!(
        service.get(&application.id).expect("stored").stage,
        Stage::Screening
    );

    let (updated, _) = service
        .move_stage(
            MoveStageRequest::new(application.id.clone(), "interview", recruiter())
                .expecting_version(1),
        )
        .expect("fresh version commits");
    assert_eq!(updated.version, 2);
}

#[test]
fn log_replays_to_stored_stage_after_many_moves() {
    let (service, _, clock) = build_service();
    let application = apply(&service, ENGINEERING_JOB, "cand-ada");
    let path = ["screening", "interview", "screening", "assessment", "offer", "hired"];

    for stage in path {
        clock.advance(Duration::minutes(10));
        move_to(&service, &application, stage);
    }

    let stored = service.get(&application.id).expect("stored");
    let history = service.activity_history(&application.id).expect("history");
    assert_eq!(history.len(), path.len());
    assert_eq!(replay_stage(&history), Ok(stored.stage));
    assert_eq!(stored.stage, Stage::Hired);
}

#[test]
fn backwards_clock_does_not_reorder_history() {
    let (service, _, clock) = build_service();
    let application = apply(&service, ENGINEERING_JOB, "cand-ada");
    clock.advance(Duration::minutes(30));
    move_to(&service, &application, "screening");
    clock.rewind(Duration::minutes(20));
    move_to(&service, &application, "interview");

    let history = service.activity_history(&application.id).expect("history");
    assert_eq!(history[0].to_stage, Stage::Screening);
    assert_eq!(history[1].to_stage, Stage::Interview);
    assert!(history[1].recorded_at >= history[0].recorded_at);
    assert_eq!(replay_stage(&history), Ok(Stage::Interview));
}

#[test]
fn concurrent_moves_to_same_stage_commit_once() {
    let (service, _, _) = build_service();
    let service = Arc::new(service);
    let application = apply(&service, ENGINEERING_JOB, "cand-race");

    for round in 0..8 {
        let target = if round % 2 == 0 { "screening" } else { "applied" };
        let current = service.get(&application.id).expect("stored");
        let workers = 6;
        let barrier = Arc::new(Barrier::new(workers));

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                let id = current.id.clone();
                let version = current.version;
                thread::spawn(move || {
                    barrier.wait();
                    service.move_stage(
                        MoveStageRequest::new(id, target, ActorId::new(format!("u{worker}")))
                            .expecting_version(version),
                    )
                })
            })
            .collect();

        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().expect("worker finished"))
            .collect();

        let successes = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(successes, 1, "exactly one writer wins round {round}");
        for result in results.iter().filter_map(|result| result.as_ref().err()) {
            assert!(
                matches!(
                    result,
                    PipelineError::ConflictRetry { .. } | PipelineError::NoOpTransition { .. }
                ),
                "loser saw {result:?}"
            );
        }
    }

    let history = service.activity_history(&application.id).expect("history");
    assert_eq!(history.len(), 8);
    for pair in history.windows(2) {
        assert_eq!(pair[0].to_stage, pair[1].from_stage);
        assert_ne!(pair[0].from_stage, pair[1].from_stage);
    }
    let audit = service.audit_application(&application.id).expect("audit");
    assert!(audit.consistent);

    let summary = service
        .pipeline_summary(&PipelineScope::JobPosting(job(ENGINEERING_JOB)))
        .expect("summary");
    assert_eq!(summary.total, 1);
    assert_eq!(summary.count(Stage::Applied), 1);
}

#[test]
fn concurrent_moves_without_expected_version_never_duplicate_events() {
    let (service, _, _) = build_service();
    let service = Arc::new(service);
    let application = apply(&service, ENGINEERING_JOB, "cand-race");
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            let id = application.id.clone();
            thread::spawn(move || {
                barrier.wait();
                service.move_stage(MoveStageRequest::new(id, "screening", recruiter()))
            })
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|handle| handle.join().expect("worker finished"))
        .filter(Result::is_ok)
        .count();

    assert_eq!(successes, 1);
    let history = service.activity_history(&application.id).expect("history");
    let applied_to_screening = history
        .iter()
        .filter(|event| event.from_stage == Stage::Applied && event.to_stage == Stage::Screening)
        .count();
    assert_eq!(applied_to_screening, 1);
}
