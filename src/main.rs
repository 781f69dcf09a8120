use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use approval_flow::config::AppConfig;
use approval_flow::error::AppError;
use approval_flow::telemetry;
use approval_flow::workflows::approval::{
    approval_router, ApprovalLevel, ApprovalWorkflowService, ApproverRecord, Assignment,
    AssignmentType, Direction, HierarchyNodeId, InMemoryDirectory, InMemoryHierarchy,
    JobAssignment, JobAssignmentId, MemoryRepository, NewApprover, ServiceError, StageType,
    UserId, WorkflowRepository, WorkflowSetup,
};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tracing::info;

const COMPANY: HierarchyNodeId = HierarchyNodeId(1);
const ENGINEERING: HierarchyNodeId = HierarchyNodeId(2);
const PLATFORM: HierarchyNodeId = HierarchyNodeId(3);

const APPLICANT: UserId = UserId(500);
const MANAGER: UserId = UserId(501);
const TEAM_LEAD: UserId = UserId(503);
const FINANCE_DIRECTOR: UserId = UserId(504);

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "Approval Flow",
    about = "Run the approval workflow engine as an HTTP service or walk a seeded demo",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Seed a demo workflow and print inheritance and resolution results
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args, Debug, Default)]
struct DemoArgs {
    /// Applicant to resolve approvers for (defaults to the seeded applicant)
    #[arg(long)]
    applicant: Option<u64>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Demo(args) => run_demo(args),
    }
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let repository = Arc::new(MemoryRepository::new());
    let service = Arc::new(ApprovalWorkflowService::new(
        repository.clone(),
        Arc::new(demo_hierarchy()),
        Arc::new(demo_directory()),
    ));
    let fixture = seed_demo(repository.as_ref(), service.as_ref())?;
    info!(
        workflow = fixture.setup.workflow.id.0,
        root_assignment = fixture.setup.default_assignment.id.0,
        "demo workflow seeded"
    );

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .merge(approval_router(service))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "approval workflow service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Company -> Engineering -> Platform, as an organisation tree.
fn demo_hierarchy() -> InMemoryHierarchy {
    let mut tree = InMemoryHierarchy::new();
    tree.link(AssignmentType::Organisation, COMPANY, ENGINEERING);
    tree.link(AssignmentType::Organisation, ENGINEERING, PLATFORM);
    tree
}

fn demo_directory() -> InMemoryDirectory {
    let directory = InMemoryDirectory::new();
    for user in [APPLICANT, MANAGER, TEAM_LEAD, FINANCE_DIRECTOR] {
        directory.add_user(user);
    }
    directory.upsert_job_assignment(JobAssignment {
        id: JobAssignmentId(700),
        user_id: APPLICANT,
        manager_id: Some(MANAGER),
        temporary_manager_id: None,
        temporary_manager_expires: None,
    });
    directory
}

struct DemoFixture {
    setup: WorkflowSetup,
    engineering: Assignment,
    platform: Assignment,
    first_level: ApprovalLevel,
    second_level: ApprovalLevel,
}

/// Purchase approval workflow: the company level requires the applicant's
/// manager and then the finance director; engineering overrides the first
/// sign-off with its team lead.
fn seed_demo(
    repository: &MemoryRepository,
    service: &ApprovalWorkflowService<MemoryRepository>,
) -> Result<DemoFixture, ServiceError> {
    let setup = service.create_workflow("Purchase approval", AssignmentType::Organisation, COMPANY)?;
    service.add_stage(setup.version.id, "Submit", StageType::FormSubmission)?;
    let review = service.add_stage(setup.version.id, "Review", StageType::Approvals)?;
    service.add_stage(setup.version.id, "Done", StageType::Finished)?;

    let first_level = repository
        .levels_for_stage(review.id)?
        .into_iter()
        .next()
        .ok_or(ServiceError::StageNotFound(review.id))?;
    let second_level = service.add_approval_level(review.id, "Finance sign-off")?;

    service.add_approver(
        setup.default_assignment.id,
        first_level.id,
        NewApprover::manager(),
    )?;
    service.add_approver(
        setup.default_assignment.id,
        second_level.id,
        NewApprover::User(FINANCE_DIRECTOR),
    )?;

    let engineering = service.create_assignment(setup.workflow.id, ENGINEERING)?;
    service.activate_assignment(engineering.id)?;
    service.add_approver(engineering.id, first_level.id, NewApprover::User(TEAM_LEAD))?;

    let platform = service.create_assignment(setup.workflow.id, PLATFORM)?;
    service.activate_assignment(platform.id)?;

    Ok(DemoFixture {
        setup,
        engineering,
        platform,
        first_level,
        second_level,
    })
}

fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let repository = Arc::new(MemoryRepository::new());
    let service = ApprovalWorkflowService::new(
        repository.clone(),
        Arc::new(demo_hierarchy()),
        Arc::new(demo_directory()),
    );
    let fixture = seed_demo(repository.as_ref(), &service)?;
    let applicant = args.applicant.map_or(APPLICANT, UserId);

    println!("Approval workflow demo");
    println!(
        "Workflow: {} (version {})",
        fixture.setup.workflow.name, fixture.setup.version.id.0
    );

    println!("\nApprover rows by assignment");
    let assignments = [
        ("Company", &fixture.setup.default_assignment),
        ("Engineering", &fixture.engineering),
        ("Platform", &fixture.platform),
    ];
    for (label, assignment) in &assignments {
        println!("- {label} (node {})", assignment.node.0);
        for level in [&fixture.first_level, &fixture.second_level] {
            let rows = service.approvers_at(assignment.id, level.id)?;
            for row in &rows {
                println!("    {}: {}", level.name, describe_row(row));
            }
            if rows.is_empty() {
                println!("    {}: none", level.name);
            }
        }
    }

    println!("\nResolution for applicant {}", applicant.0);
    for level in [&fixture.first_level, &fixture.second_level] {
        let approvers = service.resolve_approvers(fixture.platform.id, level.id, applicant, None)?;
        let ids: Vec<u64> = approvers.iter().map(|user| user.0).collect();
        println!("- {} at Platform: {ids:?}", level.name);
    }

    println!("\nApplication walkthrough");
    let application = service.start_application(fixture.platform.id, applicant)?;
    println!("- started in phase {}", application.state.phase.label());
    let mut current = application;
    loop {
        current = service.advance_application(current.id, Direction::Next)?;
        match current.state.approval_level_id {
            Some(level_id) => {
                let approvers = service.resolve_current_approvers(current.id, None)?;
                let ids: Vec<u64> = approvers.iter().map(|user| user.0).collect();
                println!("- awaiting approval level {} from {ids:?}", level_id.0);
            }
            None => {
                println!("- reached phase {}", current.state.phase.label());
                break;
            }
        }
    }

    Ok(())
}

fn describe_row(row: &ApproverRecord) -> String {
    let target = if row.type_code == NewApprover::manager().type_code() {
        "manager relationship".to_string()
    } else {
        format!("user {}", row.identifier)
    };
    if row.is_inherited() {
        format!("{target} (inherited)")
    } else {
        target
    }
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
