use crate::infra::demo_directory;
use clap::Args;
use hiring_pipeline::error::AppError;
use hiring_pipeline::pipeline::{
    ActivityEntry, ActorId, Application, CandidateFields, CandidateId, HiringPipelineService,
    InMemoryJobPostingDirectory, JobPostingId, MoveStageRequest, OrganizationId, PipelineScope,
    PipelineSummary, Stage,
};
use std::sync::Arc;

type DemoService = HiringPipelineService<InMemoryJobPostingDirectory>;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Print summaries as JSON instead of a table.
    #[arg(long)]
    pub(crate) json: bool,
    /// Skip the per-application activity listing.
    #[arg(long)]
    pub(crate) skip_activity: bool,
}

const DEMO_JOB: &str = "job-backend-eng";
const DEMO_ORG: &str = "org-northwind";

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let service = HiringPipelineService::new(Arc::new(demo_directory()));
    let recruiter = ActorId::new("recruiter-demo");
    let job = JobPostingId::new(DEMO_JOB);

    println!("Hiring pipeline demo");
    let ada = submit(&service, &job, "cand-ada", "Ada Lovelace")?;
    let grace = submit(&service, &job, "cand-grace", "Grace Hopper")?;
    let linus = submit(&service, &job, "cand-linus", "Linus Torvalds")?;
    submit(&service, &JobPostingId::new("job-product-design"), "cand-ada", "Ada Lovelace")?;

    advance(&service, &ada, &recruiter, &["screening", "interview", "offer", "hired"])?;
    advance(&service, &grace, &recruiter, &["screening", "interview", "rejected"])?;
    advance(&service, &linus, &recruiter, &["screening"])?;
    service.add_note(&linus.id, recruiter.clone(), "Strong systems background")?;

    println!("\nGuarded transitions");
    let attempts = [
        (&ada, "screening"),
        (&linus, "screening"),
        (&linus, "sourcing"),
    ];
    for (application, target) in attempts {
        let request = MoveStageRequest::new(application.id.clone(), target, recruiter.clone());
        match service.move_stage(request) {
            Ok((moved, _)) => println!("  {} -> {} accepted", moved.id, moved.stage),
            Err(err) => println!(
                "  {} -> {} refused ({:?}): {}",
                application.id,
                target,
                err.kind(),
                err
            ),
        }
    }

    let duplicate = service.apply(&job, CandidateId::new("cand-ada"), fields("Ada Lovelace"));
    if let Err(err) = duplicate {
        println!("  second application for cand-ada refused: {err}");
    }

    let job_summary = service.pipeline_summary(&PipelineScope::JobPosting(job.clone()))?;
    let org_scope = PipelineScope::Organization(OrganizationId::new(DEMO_ORG));
    let org_summary = service.pipeline_summary(&org_scope)?;
    render_summary(&job_summary, args.json)?;
    render_summary(&org_summary, args.json)?;

    if !args.skip_activity {
        println!("\nActivity");
        for application in [&ada, &grace, &linus] {
            println!("  {} ({})", application.id, application.candidate.name);
            for entry in service.activity(&application.id)? {
                match entry {
                    ActivityEntry::Transition(event) => println!(
                        "    {} {} -> {} by {}",
                        event.recorded_at.format("%H:%M:%S%.3f"),
                        event.from_stage,
                        event.to_stage,
                        event.actor
                    ),
                    ActivityEntry::Note(note) => println!(
                        "    {} note by {}: {}",
                        note.recorded_at.format("%H:%M:%S%.3f"),
                        note.actor,
                        note.body
                    ),
                }
            }
            let audit = service.audit_application(&application.id)?;
            println!(
                "    replay: {} transitions, consistent = {}",
                audit.transitions, audit.consistent
            );
        }
    }

    Ok(())
}

fn fields(name: &str) -> CandidateFields {
    CandidateFields {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_ascii_lowercase().replace(' ', ".")),
        cover_letter: None,
        resume_url: None,
        notes: None,
    }
}

fn submit(
    service: &DemoService,
    job: &JobPostingId,
    candidate_id: &str,
    name: &str,
) -> Result<Application, AppError> {
    let application = service.apply(job, CandidateId::new(candidate_id), fields(name))?;
    println!(
        "  {} applied to {} as {}",
        application.candidate.name, application.job_posting_id, application.id
    );
    Ok(application)
}

fn advance(
    service: &DemoService,
    application: &Application,
    actor: &ActorId,
    stages: &[&str],
) -> Result<(), AppError> {
    for stage in stages {
        service.move_stage(MoveStageRequest::new(
            application.id.clone(),
            *stage,
            actor.clone(),
        ))?;
    }
    Ok(())
}

fn render_summary(summary: &PipelineSummary, as_json: bool) -> Result<(), AppError> {
    println!("\nPipeline for {}", summary.scope);
    if as_json {
        let payload = serde_json::to_string_pretty(summary).map_err(std::io::Error::from)?;
        println!("{payload}");
        return Ok(());
    }
    for stage in Stage::all() {
        println!("  {:<12} {}", stage.label(), summary.count(stage));
    }
    println!("  {:<12} {}", "Total", summary.total);
    Ok(())
}
