use std::{collections::BTreeSet, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    assignment::NOT_ASSIGNED, registrations::pending_registrations, AssignmentCoordinator,
    ConsoleApi, DashboardView, HttpConsoleApi, KycService, KycUpdate, MissingConsoleApi,
    NotificationBus, RegistrationReview,
};
use shared::{
    domain::{EmployeeId, FarmerId, KycDocuments, RegistrationId, RegistrationStatus},
    protocol::ChangeTopic,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::ConsoleSettings;

#[derive(Parser, Debug)]
#[command(name = "agri-console", about = "KYC operations console")]
struct Args {
    /// Settings file; defaults to ./console.toml.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `api_base_url` from settings.
    #[arg(long)]
    api_base_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dashboard counters.
    Stats,
    /// KYC breakdown of one employee's assigned farmers.
    Caseload { employee_id: i64 },
    /// Farmers with no assigned employee.
    Eligible,
    /// Assign farmers to an employee in one batch.
    Assign {
        #[arg(long)]
        employee: i64,
        #[arg(required = true)]
        farmers: Vec<i64>,
    },
    Kyc {
        #[command(subcommand)]
        action: KycAction,
    },
    Registrations {
        #[command(subcommand)]
        action: RegistrationAction,
    },
}

#[derive(Subcommand, Debug)]
enum KycAction {
    Approve {
        farmer_id: i64,
        #[arg(long)]
        aadhaar: Option<String>,
        #[arg(long)]
        pan: Option<String>,
    },
    Reject {
        farmer_id: i64,
        #[arg(long)]
        reason: String,
    },
    ReferBack {
        farmer_id: i64,
        #[arg(long)]
        reason: String,
    },
}

#[derive(Subcommand, Debug)]
enum RegistrationAction {
    List,
    Approve { registration_id: i64 },
    Reject { registration_id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = config::load_settings(args.config.as_deref());
    if let Some(url) = args.api_base_url {
        settings.api_base_url = Some(url);
    }

    let api = build_api(&settings)?;
    let bus = NotificationBus::new();
    let _audit = bus.subscribe_with(ChangeTopic::KycUpdated, |event| {
        info!(farmer_id = event.id, change = ?event.change, "kyc change published");
    });

    let view = DashboardView::new("console", Arc::clone(&api), settings.cache_ttl());
    view.refresh(false)
        .await
        .context("failed to load console data")?;
    view.watch(&bus, settings.refresh_grace_period()).await;

    match args.command {
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&view.stats().await)?);
            println!(
                "{}",
                serde_json::to_string_pretty(&view.registration_stats().await)?
            );
        }
        Command::Caseload { employee_id } => {
            let (employee, caseload) = view
                .caseload(EmployeeId(employee_id))
                .await
                .with_context(|| format!("employee {employee_id} not found"))?;
            println!("{} ({})", employee.name, employee.id);
            println!("{}", serde_json::to_string_pretty(&caseload)?);
        }
        Command::Eligible => {
            for farmer in view.eligible_farmers().await {
                println!(
                    "{}\t{}\t{}\t{}",
                    farmer.id,
                    farmer.name,
                    farmer.kyc_status,
                    farmer.assigned_employee_ref.as_deref().unwrap_or(NOT_ASSIGNED)
                );
            }
        }
        Command::Assign { employee, farmers } => {
            let coordinator = AssignmentCoordinator::new(Arc::clone(&api), bus.clone());
            let ids: BTreeSet<FarmerId> = farmers.into_iter().map(FarmerId).collect();
            let Some(outcome) = view
                .bulk_assign(&coordinator, &ids, EmployeeId(employee))
                .await
                .context("assignment failed")?
            else {
                warn!("assignment superseded before it completed");
                return Ok(());
            };
            println!(
                "assigned {} farmer(s) to employee {employee}{}",
                outcome.succeeded.len(),
                if outcome.used_fallback {
                    " (individually)"
                } else {
                    ""
                }
            );
            if !outcome.failed.is_empty() {
                let failed: Vec<String> = outcome.failed.iter().map(ToString::to_string).collect();
                println!("failed: {}", failed.join(", "));
            }
        }
        Command::Kyc { action } => {
            let service = KycService::new(Arc::clone(&api), bus.clone());
            let update = match action {
                KycAction::Approve {
                    farmer_id,
                    aadhaar,
                    pan,
                } => {
                    let documents = (aadhaar.is_some() || pan.is_some()).then(|| KycDocuments {
                        aadhaar_number: aadhaar,
                        pan_number: pan,
                    });
                    KycUpdate::approve(FarmerId(farmer_id), documents)
                }
                KycAction::Reject { farmer_id, reason } => {
                    KycUpdate::reject(FarmerId(farmer_id), reason)
                }
                KycAction::ReferBack { farmer_id, reason } => {
                    KycUpdate::refer_back(FarmerId(farmer_id), reason)
                }
            };
            let farmer_id = update.farmer_id;
            let transition = view
                .update_kyc(&service, update, &settings.reviewer())
                .await
                .with_context(|| format!("kyc update for farmer {farmer_id} failed"))?;
            println!("farmer {farmer_id}: {} -> {}", transition.from, transition.to);
        }
        Command::Registrations { action } => {
            let review = RegistrationReview::new(Arc::clone(&api), bus.clone());
            let (registration_id, decision) = match action {
                RegistrationAction::List => {
                    let snapshot = view.snapshot().await;
                    for registration in pending_registrations(&snapshot.registrations) {
                        println!(
                            "{}\t{}\t{:?}\t{}",
                            registration.id,
                            registration.name,
                            registration.role,
                            registration.status
                        );
                    }
                    return Ok(());
                }
                RegistrationAction::Approve { registration_id } => {
                    (registration_id, RegistrationStatus::Approved)
                }
                RegistrationAction::Reject { registration_id } => {
                    (registration_id, RegistrationStatus::Rejected)
                }
            };
            view.review_registration(&review, RegistrationId(registration_id), decision)
                .await
                .with_context(|| format!("review of registration {registration_id} failed"))?;
            println!("registration {registration_id}: {decision}");
        }
    }

    view.close().await;
    Ok(())
}

fn build_api(settings: &ConsoleSettings) -> Result<Arc<dyn ConsoleApi>> {
    let Some(base_url) = settings.api_base_url.as_deref() else {
        warn!("no api_base_url configured; console runs without a backend");
        return Ok(Arc::new(MissingConsoleApi));
    };
    let mut api = HttpConsoleApi::new(base_url, settings.request_timeout())
        .context("invalid console api settings")?;
    if let Some(token) = &settings.api_token {
        api = api.with_token(token.clone());
    }
    info!(base_url = %api.base_url(), "using console api");
    Ok(Arc::new(api))
}
