use clap::{Args, Parser, Subcommand};
use ipd_core::config::load_access_policy;
use ipd_core::constants::{DEFAULT_CARE_LOCATION, DEFAULT_DATA_DIR};
use ipd_core::episode::{AdmissionDraft, DischargeDraft, EmergencyContactDraft, InsuranceDraft};
use ipd_core::{
    ActorContext, CoreConfig, EpisodeError, EpisodeFilter, EpisodeResult, IpdService, Role,
    StatusChange,
};
use ipd_uuid::ShardableUuid;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ipd")]
#[command(about = "Inpatient episode record CLI")]
struct Cli {
    /// Data directory holding the episode repositories
    #[arg(long, global = true, env = "IPD_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,
    /// Care location recorded on every commit
    #[arg(long, global = true, env = "IPD_CARE_LOCATION", default_value = DEFAULT_CARE_LOCATION)]
    care_location: String,
    /// YAML access policy overriding the defaults
    #[arg(long, global = true, env = "IPD_ACCESS_POLICY")]
    access_policy: Option<PathBuf>,
    /// Acting staff member's id
    #[arg(long, global = true, env = "IPD_ACTOR_ID")]
    actor_id: Option<String>,
    /// Acting staff member's role
    #[arg(long, global = true, env = "IPD_ACTOR_ROLE")]
    role: Option<Role>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List episodes, newest admission first
    List {
        /// Only episodes in this status
        #[arg(long)]
        status: Option<String>,
        /// Only episodes on this ward
        #[arg(long)]
        ward: Option<String>,
        /// Match admission number or patient name
        #[arg(long)]
        search: Option<String>,
    },
    /// Show one episode with its ledger
    Show {
        /// Episode id
        id: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Admit a patient
    Admit(AdmitArgs),
    /// Change a non-terminal status
    Status {
        /// Episode id
        id: String,
        /// admitted, under_observation, critical or stable
        status: String,
        /// Only apply if the episode is still at this version
        #[arg(long)]
        expected_version: Option<u64>,
    },
    /// Discharge an episode
    Discharge {
        /// Episode id
        id: String,
        /// recovered, improved, referred, transferred, against_medical_advice, absconded or
        /// deceased
        reason: String,
        /// Discharge summary
        summary: String,
    },
    /// Show the commit history of an episode
    History {
        /// Episode id
        id: String,
    },
}

#[derive(Args)]
struct AdmitArgs {
    patient_ref: String,
    ward_ref: String,
    bed_ref: String,
    /// emergency, elective or transfer
    admission_type: String,
    admission_reason: String,
    #[arg(long)]
    contact_name: String,
    #[arg(long)]
    contact_phone: String,
    #[arg(long)]
    contact_relationship: String,
    /// ward (default) or theatre
    #[arg(long)]
    kind: Option<String>,
    #[arg(long, requires = "policy_number")]
    insurance_provider: Option<String>,
    #[arg(long, requires = "insurance_provider")]
    policy_number: Option<String>,
}

impl From<AdmitArgs> for AdmissionDraft {
    fn from(args: AdmitArgs) -> Self {
        AdmissionDraft {
            patient_ref: args.patient_ref,
            ward_ref: args.ward_ref,
            bed_ref: args.bed_ref,
            kind: args.kind,
            admission_type: args.admission_type,
            admission_reason: args.admission_reason,
            emergency_contact: EmergencyContactDraft {
                name: args.contact_name,
                phone: args.contact_phone,
                relationship: args.contact_relationship,
            },
            insurance: args
                .insurance_provider
                .zip(args.policy_number)
                .map(|(provider, policy_number)| InsuranceDraft {
                    provider,
                    policy_number,
                }),
        }
    }
}

fn parse_id(raw: &str) -> EpisodeResult<ShardableUuid> {
    ShardableUuid::parse(raw).map_err(|_| EpisodeError::NotFound)
}

fn run(
    service: &IpdService,
    actor: &ActorContext,
    command: Commands,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::List {
            status,
            ward,
            search,
        } => {
            let episodes = service.queries.list(
                actor,
                EpisodeFilter {
                    status,
                    ward,
                    search,
                },
            )?;
            if episodes.is_empty() {
                println!("No episodes found.");
            }
            for summary in episodes {
                let e = &summary.episode;
                println!(
                    "{}  {}  {:<17}  ward {}  bed {}  patient {}  LOS {}d",
                    e.id,
                    e.admission_number,
                    e.status.as_str(),
                    e.ward_ref,
                    e.bed_ref,
                    summary.patient_name.as_deref().unwrap_or(e.patient_ref.as_str()),
                    summary.length_of_stay
                );
            }
        }
        Commands::Show { id, json } => {
            let detail = service.queries.get(actor, parse_id(&id)?)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&detail)?);
                return Ok(());
            }
            let e = &detail.episode;
            println!("Episode:    {} ({})", e.id, e.admission_number);
            println!("Kind:       {}", e.kind.as_str());
            println!("Status:     {} (version {})", e.status, e.version);
            println!("Patient:    {}", e.patient_ref);
            println!("Ward/bed:   {} / {}", e.ward_ref, e.bed_ref);
            println!("Admitted:   {} by {}", e.admission_date.to_rfc3339(), e.admitted_by);
            println!("Stay:       {} day(s)", detail.length_of_stay);
            if let Some(d) = &e.discharge {
                println!(
                    "Discharged: {} by {} ({}): {}",
                    d.date.to_rfc3339(),
                    d.discharged_by,
                    d.reason.as_str(),
                    d.summary
                );
            }
            for v in &detail.ledger.vitals {
                println!(
                    "  #{} vitals by {} at {}: hr {:?} temp {:?} rr {:?} spo2 {:?}",
                    v.seq,
                    v.recorded_by,
                    v.recorded_date.to_rfc3339(),
                    v.heart_rate,
                    v.temperature,
                    v.respiratory_rate,
                    v.oxygen_saturation
                );
            }
            for m in &detail.ledger.medications {
                println!(
                    "  #{} medication by {}: {} {} {} from {}",
                    m.seq, m.prescribed_by, m.medication, m.dosage, m.frequency, m.start_date
                );
            }
            for n in &detail.ledger.nursing_notes {
                println!(
                    "  #{} note ({}) by {}: {}",
                    n.seq,
                    n.category.as_str(),
                    n.recorded_by,
                    n.note
                );
            }
            for d in &detail.ledger.diagnoses {
                println!("  #{} diagnosis by {}: {}", d.seq, d.diagnosed_by, d.condition);
            }
        }
        Commands::Admit(args) => {
            let episode = service.registry.admit(actor, args.into())?;
            println!(
                "Admitted episode {} with admission number {}",
                episode.id, episode.admission_number
            );
        }
        Commands::Status {
            id,
            status,
            expected_version,
        } => {
            let episode = service.registry.set_status(
                actor,
                parse_id(&id)?,
                StatusChange {
                    status,
                    expected_version,
                },
            )?;
            println!(
                "Episode {} is now {} (version {})",
                episode.id, episode.status, episode.version
            );
        }
        Commands::Discharge {
            id,
            reason,
            summary,
        } => {
            let episode = service.registry.discharge(
                actor,
                parse_id(&id)?,
                DischargeDraft { reason, summary },
            )?;
            println!("Discharged episode {}", episode.id);
        }
        Commands::History { id } => {
            for commit in service.queries.history(actor, parse_id(&id)?)? {
                println!(
                    "{}  {}  {}  {}",
                    &commit.id[..12.min(commit.id.len())],
                    commit.committed_at.to_rfc3339(),
                    commit.author_id.as_deref().unwrap_or("-"),
                    commit.subject
                );
            }
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'ipd --help' for commands");
        return Ok(());
    };

    let (Some(actor_id), Some(role)) = (cli.actor_id, cli.role) else {
        eprintln!("Error: --actor-id and --role are required");
        std::process::exit(2);
    };

    std::fs::create_dir_all(&cli.data_dir)?;
    let cfg = CoreConfig::new(
        cli.data_dir,
        cli.care_location,
        load_access_policy(cli.access_policy)?,
    )?;
    let service = IpdService::with_defaults(Arc::new(cfg));
    let actor = ActorContext::new(actor_id, role);

    if let Err(e) = run(&service, &actor, command) {
        match e.downcast_ref::<EpisodeError>() {
            Some(err) if err.is_client_error() => eprintln!("Refused: {err}"),
            _ => eprintln!("Error: {e}"),
        }
        std::process::exit(1);
    }

    Ok(())
}
