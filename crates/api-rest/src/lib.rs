//! # API REST
//!
//! REST API implementation for IPD.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status codes)
//!
//! Uses `api-shared` for request/response types and caller identity.

#![warn(rust_2018_idioms)]

pub mod error;

use axum::{
    body::Bytes,
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::{IntoParams, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use api_shared::dto::{
    AdmitEpisodeReq, BloodPressureDto, CommitRes, DiagnosisEntryRes, DiagnosisReq, DischargeReq,
    DischargeRes, EmergencyContactReq, EmergencyContactRes, EpisodeDetailRes, EpisodeRes,
    EpisodeSummaryRes, ErrorRes, HistoryRes, InsuranceReq, InsuranceRes, LedgerRes,
    ListEpisodesRes, MedicationEntryRes, MedicationReq, NursingNoteEntryRes, NursingNoteReq,
    SetStatusReq, VitalsEntryRes, VitalsReq,
};
use api_shared::{HealthRes, HealthService};
use ipd_core::config::load_access_policy;
use ipd_core::constants::{DEFAULT_CARE_LOCATION, DEFAULT_DATA_DIR};
use ipd_core::{ActorContext, CoreConfig, EpisodeFilter, IpdService, Operation};
use ipd_uuid::ShardableUuid;

pub use error::{Actor, ApiError};

/// Application state for the REST API server.
#[derive(Clone)]
pub struct AppState {
    pub service: IpdService,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_episodes,
        admit_episode,
        get_episode,
        episode_history,
        set_status,
        discharge_episode,
        append_vitals,
        append_medication,
        append_nursing_note,
        append_diagnosis,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        AdmitEpisodeReq,
        EmergencyContactReq,
        InsuranceReq,
        SetStatusReq,
        DischargeReq,
        VitalsReq,
        BloodPressureDto,
        MedicationReq,
        NursingNoteReq,
        DiagnosisReq,
        EpisodeRes,
        EmergencyContactRes,
        InsuranceRes,
        DischargeRes,
        EpisodeSummaryRes,
        ListEpisodesRes,
        EpisodeDetailRes,
        LedgerRes,
        VitalsEntryRes,
        MedicationEntryRes,
        NursingNoteEntryRes,
        DiagnosisEntryRes,
        HistoryRes,
        CommitRes,
    ))
)]
pub struct ApiDoc;

/// Build the core configuration from the process environment.
///
/// # Environment Variables
/// - `IPD_DATA_DIR`: data directory (default: `ipd_data`); created if missing
/// - `IPD_CARE_LOCATION`: care location recorded on every commit
/// - `IPD_ACCESS_POLICY`: optional YAML access policy file
///
/// # Errors
/// Returns an error if the data directory cannot be created, the care location is blank, or
/// the access policy file cannot be read or parsed.
pub fn config_from_env() -> anyhow::Result<Arc<CoreConfig>> {
    let data_dir =
        PathBuf::from(std::env::var("IPD_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into()));
    std::fs::create_dir_all(&data_dir)?;

    let care_location =
        std::env::var("IPD_CARE_LOCATION").unwrap_or_else(|_| DEFAULT_CARE_LOCATION.into());
    let access_policy =
        load_access_policy(std::env::var("IPD_ACCESS_POLICY").ok().map(PathBuf::from))?;

    Ok(Arc::new(CoreConfig::new(
        data_dir,
        care_location,
        access_policy,
    )?))
}

/// All REST routes plus Swagger UI, with permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/episodes", get(list_episodes).post(admit_episode))
        .route("/episodes/:id", get(get_episode))
        .route("/episodes/:id/history", get(episode_history))
        .route("/episodes/:id/status", put(set_status))
        .route("/episodes/:id/discharge", put(discharge_episode))
        .route("/episodes/:id/vitals", post(append_vitals))
        .route("/episodes/:id/medications", post(append_medication))
        .route("/episodes/:id/nursing-notes", post(append_nursing_note))
        .route("/episodes/:id/diagnosis", post(append_diagnosis))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn episode_id(raw: &str) -> Result<ShardableUuid, ApiError> {
    ShardableUuid::parse(raw).map_err(|_| ApiError::UnknownEpisodeId)
}

/// Gate the caller for `operation`, then parse the JSON body.
///
/// The body is only looked at once the caller is allowed to attempt the operation.
fn gated_body<T: DeserializeOwned>(
    state: &AppState,
    actor: &ActorContext,
    operation: Operation,
    body: &Bytes,
) -> Result<T, ApiError> {
    state.service.check_access(actor, operation)?;
    let mut deserializer = serde_json::Deserializer::from_slice(body);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
        let field = err.path().to_string();
        ApiError::MalformedBody {
            field: (field != ".").then_some(field),
            message: err.into_inner().to_string(),
        }
    })
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListEpisodesQuery {
    /// Exact status, e.g. `critical`.
    pub status: Option<String>,
    /// Exact ward reference.
    pub ward: Option<String>,
    /// Case-insensitive match on admission number or patient name.
    pub search: Option<String>,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    get,
    path = "/episodes",
    params(ListEpisodesQuery),
    responses(
        (status = 200, description = "Matching episodes, newest admission first", body = ListEpisodesRes),
        (status = 400, description = "Unknown status filter", body = ErrorRes),
        (status = 401, description = "Missing caller identity", body = ErrorRes),
        (status = 403, description = "Caller may not view episodes", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn list_episodes(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Query(query): Query<ListEpisodesQuery>,
) -> Result<Json<ListEpisodesRes>, ApiError> {
    let filter = EpisodeFilter {
        status: query.status,
        ward: query.ward,
        search: query.search,
    };
    let episodes = state.service.queries.list(&actor, filter)?;
    Ok(Json(ListEpisodesRes {
        episodes: episodes.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/episodes",
    request_body = AdmitEpisodeReq,
    responses(
        (status = 201, description = "Episode admitted", body = EpisodeRes),
        (status = 400, description = "Invalid admission", body = ErrorRes),
        (status = 403, description = "Caller may not admit", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn admit_episode(
    State(state): State<AppState>,
    Actor(actor): Actor,
    body: Bytes,
) -> Result<(StatusCode, Json<EpisodeRes>), ApiError> {
    let req: AdmitEpisodeReq = gated_body(&state, &actor, Operation::Admit, &body)?;
    let episode = state.service.registry.admit(&actor, req.into())?;
    Ok((StatusCode::CREATED, Json(episode.into())))
}

#[utoipa::path(
    get,
    path = "/episodes/{id}",
    params(("id" = String, Path, description = "Episode id")),
    responses(
        (status = 200, description = "Episode with its full ledger", body = EpisodeDetailRes),
        (status = 403, description = "Caller may not view episodes", body = ErrorRes),
        (status = 404, description = "No such episode", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_episode(
    State(state): State<AppState>,
    Actor(actor): Actor,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<EpisodeDetailRes>, ApiError> {
    let detail = state.service.queries.get(&actor, episode_id(&id)?)?;
    Ok(Json(detail.into()))
}

#[utoipa::path(
    get,
    path = "/episodes/{id}/history",
    params(("id" = String, Path, description = "Episode id")),
    responses(
        (status = 200, description = "Commit history, newest first", body = HistoryRes),
        (status = 403, description = "Caller may not view episodes", body = ErrorRes),
        (status = 404, description = "No such episode", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn episode_history(
    State(state): State<AppState>,
    Actor(actor): Actor,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<HistoryRes>, ApiError> {
    let commits = state.service.queries.history(&actor, episode_id(&id)?)?;
    Ok(Json(HistoryRes {
        commits: commits.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    put,
    path = "/episodes/{id}/status",
    params(("id" = String, Path, description = "Episode id")),
    request_body = SetStatusReq,
    responses(
        (status = 200, description = "Status changed", body = EpisodeRes),
        (status = 400, description = "Unknown or terminal status", body = ErrorRes),
        (status = 403, description = "Caller may not change status", body = ErrorRes),
        (status = 404, description = "No such episode", body = ErrorRes),
        (status = 409, description = "Episode closed or version mismatch", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn set_status(
    State(state): State<AppState>,
    Actor(actor): Actor,
    AxumPath(id): AxumPath<String>,
    body: Bytes,
) -> Result<Json<EpisodeRes>, ApiError> {
    let req: SetStatusReq = gated_body(&state, &actor, Operation::SetStatus, &body)?;
    let id = episode_id(&id)?;
    let episode = state.service.registry.set_status(&actor, id, req.into())?;
    Ok(Json(episode.into()))
}

#[utoipa::path(
    put,
    path = "/episodes/{id}/discharge",
    params(("id" = String, Path, description = "Episode id")),
    request_body = DischargeReq,
    responses(
        (status = 200, description = "Episode discharged", body = EpisodeRes),
        (status = 400, description = "Invalid reason or summary", body = ErrorRes),
        (status = 403, description = "Caller may not discharge", body = ErrorRes),
        (status = 404, description = "No such episode", body = ErrorRes),
        (status = 409, description = "Episode already discharged", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn discharge_episode(
    State(state): State<AppState>,
    Actor(actor): Actor,
    AxumPath(id): AxumPath<String>,
    body: Bytes,
) -> Result<Json<EpisodeRes>, ApiError> {
    let req: DischargeReq = gated_body(&state, &actor, Operation::Discharge, &body)?;
    let id = episode_id(&id)?;
    let episode = state.service.registry.discharge(&actor, id, req.into())?;
    Ok(Json(episode.into()))
}

#[utoipa::path(
    post,
    path = "/episodes/{id}/vitals",
    params(("id" = String, Path, description = "Episode id")),
    request_body = VitalsReq,
    responses(
        (status = 201, description = "Vitals recorded", body = VitalsEntryRes),
        (status = 400, description = "Invalid measurement", body = ErrorRes),
        (status = 403, description = "Caller may not record vitals", body = ErrorRes),
        (status = 404, description = "No such episode", body = ErrorRes),
        (status = 409, description = "Episode discharged", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn append_vitals(
    State(state): State<AppState>,
    Actor(actor): Actor,
    AxumPath(id): AxumPath<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<VitalsEntryRes>), ApiError> {
    let req: VitalsReq = gated_body(&state, &actor, Operation::AppendVitals, &body)?;
    let id = episode_id(&id)?;
    let entry = state.service.ledger.append_vitals(&actor, id, req.into())?;
    Ok((StatusCode::CREATED, Json(entry.into())))
}

#[utoipa::path(
    post,
    path = "/episodes/{id}/medications",
    params(("id" = String, Path, description = "Episode id")),
    request_body = MedicationReq,
    responses(
        (status = 201, description = "Medication prescribed", body = MedicationEntryRes),
        (status = 400, description = "Invalid prescription", body = ErrorRes),
        (status = 403, description = "Caller may not prescribe", body = ErrorRes),
        (status = 404, description = "No such episode", body = ErrorRes),
        (status = 409, description = "Episode discharged", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn append_medication(
    State(state): State<AppState>,
    Actor(actor): Actor,
    AxumPath(id): AxumPath<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<MedicationEntryRes>), ApiError> {
    let req: MedicationReq = gated_body(&state, &actor, Operation::AppendMedication, &body)?;
    let id = episode_id(&id)?;
    let entry = state
        .service
        .ledger
        .append_medication(&actor, id, req.into())?;
    Ok((StatusCode::CREATED, Json(entry.into())))
}

#[utoipa::path(
    post,
    path = "/episodes/{id}/nursing-notes",
    params(("id" = String, Path, description = "Episode id")),
    request_body = NursingNoteReq,
    responses(
        (status = 201, description = "Note recorded", body = NursingNoteEntryRes),
        (status = 400, description = "Invalid note", body = ErrorRes),
        (status = 403, description = "Caller may not write nursing notes", body = ErrorRes),
        (status = 404, description = "No such episode", body = ErrorRes),
        (status = 409, description = "Episode discharged", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn append_nursing_note(
    State(state): State<AppState>,
    Actor(actor): Actor,
    AxumPath(id): AxumPath<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<NursingNoteEntryRes>), ApiError> {
    let req: NursingNoteReq = gated_body(&state, &actor, Operation::AppendNursingNote, &body)?;
    let id = episode_id(&id)?;
    let entry = state
        .service
        .ledger
        .append_nursing_note(&actor, id, req.into())?;
    Ok((StatusCode::CREATED, Json(entry.into())))
}

#[utoipa::path(
    post,
    path = "/episodes/{id}/diagnosis",
    params(("id" = String, Path, description = "Episode id")),
    request_body = DiagnosisReq,
    responses(
        (status = 201, description = "Diagnosis recorded", body = DiagnosisEntryRes),
        (status = 400, description = "Invalid diagnosis", body = ErrorRes),
        (status = 403, description = "Caller may not diagnose this episode", body = ErrorRes),
        (status = 404, description = "No such episode", body = ErrorRes),
        (status = 409, description = "Episode discharged", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn append_diagnosis(
    State(state): State<AppState>,
    Actor(actor): Actor,
    AxumPath(id): AxumPath<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<DiagnosisEntryRes>), ApiError> {
    let req: DiagnosisReq = gated_body(&state, &actor, Operation::AppendDiagnosis, &body)?;
    let id = episode_id(&id)?;
    let entry = state
        .service
        .ledger
        .append_diagnosis(&actor, id, req.into())?;
    Ok((StatusCode::CREATED, Json(entry.into())))
}
