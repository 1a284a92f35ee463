use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::documents::UploadRequest;
use super::domain::{
    ContractId, DocumentId, DocumentStatus, PropertyChanges, PropertyDraft, PropertyId, RentalId,
    RentalStatus, UserId,
};
use super::error::MarketplaceError;
use super::repository::MarketplaceRepository;
use super::Marketplace;
use crate::storage::ObjectStore;

/// Header carrying the upstream-authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Caller identity extracted from [`USER_ID_HEADER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

#[async_trait]
impl<St> FromRequestParts<St> for CurrentUser
where
    St: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(|id| CurrentUser(UserId(id)))
            .ok_or_else(|| {
                let payload = json!({ "error": "missing or invalid x-user-id header" });
                (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
            })
    }
}

type Shared<R, S> = State<Arc<Marketplace<R, S>>>;
type ApiResult = Result<Response, MarketplaceError>;

/// Router exposing the marketplace managers under `/api/v1`.
pub fn marketplace_router<R, S>(marketplace: Arc<Marketplace<R, S>>) -> Router
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    Router::new()
        .route("/api/v1/users/me", get(me_handler::<R, S>))
        .route("/api/v1/users/:user_id", get(user_handler::<R, S>))
        .route("/api/v1/properties", post(create_property_handler::<R, S>))
        .route("/api/v1/properties/mine", get(my_properties_handler::<R, S>))
        .route(
            "/api/v1/properties/:property_id",
            get(property_handler::<R, S>)
                .put(update_property_handler::<R, S>)
                .delete(delete_property_handler::<R, S>),
        )
        .route("/api/v1/rentals", post(create_rental_handler::<R, S>))
        .route("/api/v1/rentals/me", get(renter_rentals_handler::<R, S>))
        .route("/api/v1/rentals/owner", get(owner_rentals_handler::<R, S>))
        .route(
            "/api/v1/rentals/:rental_id/status",
            patch(rental_status_handler::<R, S>),
        )
        .route(
            "/api/v1/rentals/:rental_id/contract",
            get(rental_contract_handler::<R, S>).post(materialize_contract_handler::<R, S>),
        )
        .route("/api/v1/contracts", get(my_contracts_handler::<R, S>))
        .route("/api/v1/contracts/:contract_id", get(contract_handler::<R, S>))
        .route(
            "/api/v1/contracts/:contract_id/generate-pdf",
            post(generate_pdf_handler::<R, S>),
        )
        .route(
            "/api/v1/contracts/:contract_id/download-url",
            get(contract_download_handler::<R, S>),
        )
        .route("/api/v1/contracts/:contract_id/sign", post(sign_handler::<R, S>))
        .route(
            "/api/v1/contracts/:contract_id/notarize",
            post(notarize_handler::<R, S>),
        )
        .route("/api/v1/documents/me", get(my_documents_handler::<R, S>))
        .route(
            "/api/v1/documents/upload-url",
            post(upload_url_handler::<R, S>),
        )
        .route(
            "/api/v1/documents/:document_id",
            delete(delete_document_handler::<R, S>),
        )
        .route(
            "/api/v1/documents/:document_id/confirm",
            post(confirm_upload_handler::<R, S>),
        )
        .route(
            "/api/v1/documents/:document_id/review",
            patch(review_document_handler::<R, S>),
        )
        .route(
            "/api/v1/documents/:document_id/download-url",
            get(document_download_handler::<R, S>),
        )
        .with_state(marketplace)
}

#[derive(Debug, Deserialize)]
pub(crate) struct RentalRequestBody {
    pub property_id: PropertyId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusBody<T> {
    pub status: T,
}

fn ok<T: serde::Serialize>(body: T) -> ApiResult {
    Ok((StatusCode::OK, Json(body)).into_response())
}

fn created<T: serde::Serialize>(body: T) -> ApiResult {
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

fn download(url: url::Url) -> ApiResult {
    ok(json!({ "download_url": url.as_str() }))
}

async fn me_handler<R, S>(State(m): Shared<R, S>, CurrentUser(user): CurrentUser) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    ok(m.profile(user)?)
}

async fn user_handler<R, S>(State(m): Shared<R, S>, Path(user_id): Path<UserId>) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    ok(m.public_profile(user_id)?)
}

async fn create_property_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
    Json(draft): Json<PropertyDraft>,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    created(m.properties().create(draft, user)?)
}

async fn my_properties_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    ok(m.properties().list_owned(user)?)
}

async fn property_handler<R, S>(
    State(m): Shared<R, S>,
    Path(property_id): Path<PropertyId>,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    ok(m.properties().get(property_id)?)
}

async fn update_property_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
    Path(property_id): Path<PropertyId>,
    Json(changes): Json<PropertyChanges>,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    ok(m.properties().update(property_id, changes, user)?)
}

async fn delete_property_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
    Path(property_id): Path<PropertyId>,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    m.properties().delete(property_id, user)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn create_rental_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<RentalRequestBody>,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    created(m.rentals().create_rental(body.property_id, user)?)
}

async fn renter_rentals_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    ok(m.rentals().list_for_renter(user)?)
}

async fn owner_rentals_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    ok(m.rentals().list_for_owner(user)?)
}

async fn rental_status_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
    Path(rental_id): Path<RentalId>,
    Json(body): Json<StatusBody<RentalStatus>>,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    ok(m.rentals().update_status(rental_id, body.status, user)?)
}

async fn rental_contract_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
    Path(rental_id): Path<RentalId>,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    ok(m.contracts().get_by_rental_id(rental_id, user)?)
}

async fn materialize_contract_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
    Path(rental_id): Path<RentalId>,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    ok(m.contracts().create_for_party(rental_id, user)?)
}

async fn my_contracts_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    ok(m.contracts().list_for_user(user)?)
}

async fn contract_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
    Path(contract_id): Path<ContractId>,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    ok(m.contracts().get_by_id(contract_id, user)?)
}

async fn generate_pdf_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
    Path(contract_id): Path<ContractId>,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    let contract = m.contracts().generate_and_upload_pdf(contract_id, user)?;
    ok(json!({
        "message": "contract pdf generated and uploaded",
        "contract": contract,
    }))
}

async fn contract_download_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
    Path(contract_id): Path<ContractId>,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    download(m.contracts().pdf_download_url(contract_id, user)?)
}

async fn sign_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
    Path(contract_id): Path<ContractId>,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    ok(m.contracts().sign(contract_id, user)?)
}

async fn notarize_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
    Path(contract_id): Path<ContractId>,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    ok(m.contracts().notarize(contract_id, user)?)
}

async fn my_documents_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    ok(m.documents().my_documents(user)?)
}

async fn upload_url_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<UploadRequest>,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    created(m.documents().prepare_upload(request, user)?)
}

async fn confirm_upload_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
    Path(document_id): Path<DocumentId>,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    ok(m.documents().confirm_upload(document_id, user)?)
}

async fn review_document_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
    Path(document_id): Path<DocumentId>,
    Json(body): Json<StatusBody<DocumentStatus>>,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    ok(m.documents().review_document(document_id, body.status, user)?)
}

async fn document_download_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
    Path(document_id): Path<DocumentId>,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    download(m.documents().download_url(document_id, user)?)
}

async fn delete_document_handler<R, S>(
    State(m): Shared<R, S>,
    CurrentUser(user): CurrentUser,
    Path(document_id): Path<DocumentId>,
) -> ApiResult
where
    R: MarketplaceRepository + 'static,
    S: ObjectStore + 'static,
{
    m.documents().delete_document(document_id, user)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
