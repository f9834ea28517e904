//! End-to-end scenarios for the hiring pipeline, driven through the public service
//! facade and HTTP router.

mod common {
    use std::sync::Arc;

    use hiring_pipeline::pipeline::{
        ActorId, Application, CandidateFields, CandidateId, HiringPipelineService,
        InMemoryJobPostingDirectory, JobPostingId, JobPostingRef, JobPostingStatus,
        MoveStageRequest, OrganizationId,
    };

    pub(super) const ORG: &str = "org-initech";
    pub(super) const BACKEND_JOB: &str = "job-backend";
    pub(super) const DESIGN_JOB: &str = "job-design";

    pub(super) type Service = HiringPipelineService<InMemoryJobPostingDirectory>;

    pub(super) fn build_service() -> Arc<Service> {
        let directory = InMemoryJobPostingDirectory::with_postings(
            [BACKEND_JOB, DESIGN_JOB].map(|id| JobPostingRef {
                id: JobPostingId::new(id),
                organization_id: OrganizationId::new(ORG),
                status: JobPostingStatus::Open,
            }),
        );
        Arc::new(HiringPipelineService::new(Arc::new(directory)))
    }

    pub(super) fn fields(name: &str) -> CandidateFields {
        CandidateFields {
            name: name.to_string(),
            email: format!("{name}@example.com"),
            cover_letter: None,
            resume_url: None,
            notes: None,
        }
    }

    pub(super) fn submit(service: &Service, job: &str, candidate: &str) -> Application {
        service
            .apply(&JobPostingId::new(job), CandidateId::new(candidate), fields(candidate))
            .expect("application accepted")
    }

    pub(super) fn request(application: &Application, stage: &str) -> MoveStageRequest {
        MoveStageRequest::new(application.id.clone(), stage, ActorId::new("hiring-manager"))
    }
}

mod lifecycle {
    use super::common::*;
    use hiring_pipeline::pipeline::{
        JobPostingId, OrganizationId, PipelineErrorKind, PipelineScope, Stage,
    };

    #[test]
    fn interview_then_rejection_updates_counts_and_history() {
        let service = build_service();
        let application = submit(&service, BACKEND_JOB, "cand-1");

        service
            .move_stage(request(&application, "interview"))
            .expect("applied -> interview");
        let (rejected, event) = service
            .move_stage(request(&application, "rejected").with_note("Went with another candidate"))
            .expect("interview -> rejected");

        assert_eq!(rejected.stage, Stage::Rejected);
        assert_eq!(event.from_stage, Stage::Interview);
        assert_eq!(event.note.as_deref(), Some("Went with another candidate"));

        let summary = service
            .pipeline_summary(&PipelineScope::JobPosting(JobPostingId::new(BACKEND_JOB)))
            .expect("summary");
        assert_eq!(summary.count(Stage::Rejected), 1);
        assert_eq!(summary.count(Stage::Interview), 0);
        assert_eq!(summary.total, 1);

        let history = service.activity_history(&application.id).expect("history");
        let path: Vec<_> = history
            .iter()
            .map(|event| (event.from_stage, event.to_stage))
            .collect();
        assert_eq!(
            path,
            vec![
                (Stage::Applied, Stage::Interview),
                (Stage::Interview, Stage::Rejected)
            ]
        );

        let terminal = service
            .move_stage(request(&application, "applied"))
            .expect_err("terminal stage is absorbing");
        assert_eq!(terminal.kind(), PipelineErrorKind::TerminalStageViolation);
        assert_eq!(service.activity_history(&application.id).expect("history").len(), 2);
    }

    #[test]
    fn organization_summary_spans_postings_and_rebuild_agrees() {
        let service = build_service();
        let first = submit(&service, BACKEND_JOB, "cand-1");
        let second = submit(&service, DESIGN_JOB, "cand-1");
        submit(&service, DESIGN_JOB, "cand-2");
        service
            .move_stage(request(&first, "offer"))
            .expect("applied -> offer");
        service
            .move_stage(request(&second, "hired"))
            .expect("applied -> hired");

        let scope = PipelineScope::Organization(OrganizationId::new(ORG));
        let summary = service.pipeline_summary(&scope).expect("summary");
        assert_eq!(summary.total, 3);
        assert_eq!(summary.count(Stage::Applied), 1);
        assert_eq!(summary.count(Stage::Offer), 1);
        assert_eq!(summary.count(Stage::Hired), 1);

        let report = service.rebuild(&scope).expect("rebuild");
        assert!(report.applied);
        assert!(report.drift.is_empty());
        assert_eq!(report.summary, summary);

        for application in [&first, &second] {
            let audit = service.audit_application(&application.id).expect("audit");
            assert!(audit.consistent);
        }
    }
}

mod concurrency {
    use super::common::*;
    use hiring_pipeline::pipeline::{JobPostingId, PipelineErrorKind, PipelineScope, Stage};
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn racing_movers_produce_exactly_one_transition() {
        let service = build_service();
        let application = submit(&service, BACKEND_JOB, "cand-race");
        let workers = 8;
        let barrier = Arc::new(Barrier::new(workers));

        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                let request = request(&application, "screening").expecting_version(0);
                thread::spawn(move || {
                    barrier.wait();
                    service.move_stage(request).map_err(|err| err.kind())
                })
            })
            .collect();

        let outcomes: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().expect("worker finished"))
            .collect();

        assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .filter_map(|outcome| outcome.as_ref().err())
            .all(|kind| matches!(
                kind,
                PipelineErrorKind::ConflictRetry | PipelineErrorKind::NoOpTransition
            )));

        let history = service.activity_history(&application.id).expect("history");
        assert_eq!(history.len(), 1);
        let summary = service
            .pipeline_summary(&PipelineScope::JobPosting(JobPostingId::new(BACKEND_JOB)))
            .expect("summary");
        assert_eq!(summary.count(Stage::Screening), 1);
        assert_eq!(summary.total, 1);
    }
}

mod routing {
    use super::common::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use hiring_pipeline::pipeline::{pipeline_router, ACTOR_HEADER};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn json_body(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        serde_json::from_slice(&body).expect("json")
    }

    #[tokio::test]
    async fn apply_move_and_summarize_over_http() {
        let router = pipeline_router(build_service());

        let created = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/jobs/{BACKEND_JOB}/applications"))
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({
                            "candidate_id": "cand-http",
                            "name": "Peter Gibbons",
                            "email": "peter@example.com"
                        })
                        .to_string(),
                    ))
                    .expect("request"),
            )
            .await
            .expect("router dispatch");
        assert_eq!(created.status(), StatusCode::CREATED);
        let application = json_body(created).await;
        let application_id = application["id"].as_str().expect("id").to_string();

        let moved = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(format!("/api/v1/applications/{application_id}/stage"))
                    .header("content-type", "application/json")
                    .header(ACTOR_HEADER, "hiring-manager")
                    .body(Body::from(json!({ "stage": "Interview" }).to_string()))
                    .expect("request"),
            )
            .await
            .expect("router dispatch");
        assert_eq!(moved.status(), StatusCode::OK);

        let summary = router
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(format!("/api/v1/jobs/{BACKEND_JOB}/pipeline"))
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router dispatch");
        assert_eq!(summary.status(), StatusCode::OK);
        let payload = json_body(summary).await;
        assert_eq!(payload["counts"], json!({ "interview": 1 }));
    }

    #[tokio::test]
    async fn unknown_job_summary_is_not_found() {
        let router = pipeline_router(build_service());
        let response = router
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/v1/jobs/job-unknown/pipeline")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["kind"], json!("not_found"));
    }
}
