use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::{any, get};
use axum::{Json, Router};
use phonebook_core::{
    Contact, ContactId, ContactRepository, NewContact, PhonebookError, NUMBER_REQUIRED,
};
use serde::Deserialize;
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::failure::ServiceFailure;

const FRONTEND_ENTRY: &str = "index.html";
const BACKEND_STATUS: &str = "phonebook backend is running; no frontend bundle is installed";

#[derive(Clone)]
pub(crate) struct ServiceState {
    contacts: Arc<dyn ContactRepository>,
    frontend_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
struct CreatePersonRequest {
    name: Option<String>,
    number: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct UpdatePersonRequest {
    number: Option<String>,
}

impl ServiceState {
    pub(crate) fn new(contacts: Arc<dyn ContactRepository>, frontend_dir: Option<PathBuf>) -> Self {
        Self { contacts, frontend_dir }
    }

    /// Runs a repository call on the blocking pool.
    async fn run_blocking<T, F>(
        &self,
        operation_label: &'static str,
        op: F,
    ) -> Result<T, ServiceFailure>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ContactRepository) -> Result<T, PhonebookError> + Send + 'static,
    {
        let contacts = Arc::clone(&self.contacts);
        let joined = tokio::task::spawn_blocking(move || op(contacts.as_ref())).await;
        let result = joined.map_err(|err| {
            ServiceFailure::internal(&format!("{operation_label} join failure: {err}"))
        })?;
        result.map_err(|err| {
            debug!(operation = operation_label, error = %err, "repository call failed");
            ServiceFailure::from(err)
        })
    }
}

/// Returns `dir` when it holds a built frontend bundle.
pub(crate) fn frontend_bundle(dir: &FsPath) -> Option<PathBuf> {
    dir.join(FRONTEND_ENTRY).is_file().then(|| dir.to_path_buf())
}

fn contact_routes() -> Router<ServiceState> {
    Router::new()
        .route("/persons", get(list_persons).post(create_person))
        .route("/persons/:id", get(get_person).put(update_person).delete(delete_person))
        .route("/info", get(phonebook_info))
}

pub(crate) fn app(state: ServiceState) -> Router {
    let frontend_dir = state.frontend_dir.clone();
    let router = Router::new()
        .nest("/api", contact_routes().fallback(unknown_endpoint))
        .route("/api/", any(unknown_endpoint))
        .merge(contact_routes())
        .with_state(state);

    let router = match frontend_dir {
        Some(dir) => {
            let entry = dir.join(FRONTEND_ENTRY);
            router.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(entry)))
        }
        None => router.fallback(backend_status),
    };

    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

async fn list_persons(
    State(state): State<ServiceState>,
) -> Result<Json<Vec<Contact>>, ServiceFailure> {
    let contacts = state.run_blocking("list_persons", |contacts| contacts.list()).await?;
    Ok(Json(contacts))
}

async fn get_person(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<Contact>, ServiceFailure> {
    let id = ContactId::parse(&id)?;
    let contact = state
        .run_blocking("get_person", move |contacts| {
            contacts.get(id)?.ok_or(PhonebookError::NotFound(id))
        })
        .await?;
    Ok(Json(contact))
}

async fn create_person(
    State(state): State<ServiceState>,
    payload: Result<Json<CreatePersonRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Contact>), ServiceFailure> {
    let Json(request) = payload.map_err(|rejection| ServiceFailure::invalid_json(&rejection))?;
    debug!(?request, "create person request");

    let (Some(name), Some(number)) = (non_blank(request.name), non_blank(request.number)) else {
        return Err(ServiceFailure::missing_fields());
    };
    let input = NewContact::new(&name, &number);
    let contact =
        state.run_blocking("create_person", move |contacts| contacts.create(&input)).await?;

    info!(id = %contact.id, name = %contact.name, "added person");
    Ok((StatusCode::CREATED, Json(contact)))
}

async fn update_person(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdatePersonRequest>, JsonRejection>,
) -> Result<Json<Contact>, ServiceFailure> {
    let id = ContactId::parse(&id)?;
    let Json(request) = payload.map_err(|rejection| ServiceFailure::invalid_json(&rejection))?;
    debug!(%id, ?request, "update person request");

    let number = non_blank(request.number)
        .ok_or_else(|| PhonebookError::Validation(NUMBER_REQUIRED.to_string()))?;
    let contact = state
        .run_blocking("update_person", move |contacts| {
            contacts.update_number(id, &number)?.ok_or(PhonebookError::NotFound(id))
        })
        .await?;
    Ok(Json(contact))
}

async fn delete_person(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceFailure> {
    let id = ContactId::parse(&id)?;
    state
        .run_blocking("delete_person", move |contacts| {
            if contacts.delete(id)? {
                Ok(())
            } else {
                Err(PhonebookError::NotFound(id))
            }
        })
        .await?;
    info!(%id, "deleted person");
    Ok(StatusCode::NO_CONTENT)
}

async fn phonebook_info(State(state): State<ServiceState>) -> Result<Html<String>, ServiceFailure> {
    let count = state.run_blocking("info", |contacts| contacts.count()).await?;
    let now = OffsetDateTime::now_utc()
        .format(&Rfc2822)
        .map_err(|err| ServiceFailure::internal(&format!("failed to format timestamp: {err}")))?;
    Ok(Html(format!("Phonebook has info for {count} people<br/><br/>{now}")))
}

async fn unknown_endpoint() -> ServiceFailure {
    ServiceFailure::unknown_endpoint()
}

async fn backend_status() -> impl IntoResponse {
    BACKEND_STATUS
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
