use super::http_auth::{authenticate, session, Session};
use super::http_extract::{ApiJson, ApiPath, ApiQuery};
use super::http_errors::{
    map_billing_error, map_branding_error, map_form_error, map_notification_error,
    map_submission_error, map_tag_error, map_testimonial_error,
};
use super::http_parse::{
    parse_export_format, parse_field_type, parse_testimonial_status, FIELD_TYPE_VALUES,
    FORMAT_VALUES, STATUS_VALUES,
};
use super::http_types::{
    AssignTagRequest, BrandingRequest, CreateFormRequest, ExportRequestBody, FieldRequest,
    FormResponse, GuardQuery, HealthResponse, ModerateRequest, MoveFieldRequest,
    NotificationRequest, PortalRequest, StatusQuery, SubscriptionResponse, TagRequest,
    ThemeRequest, UpdateFormRequest, UpdateTagRequest,
};
use super::state::AppState;
use crate::application::{
    ExportRequest, GuardDecision, Notification, SubscriptionLookup, WebhookOutcome,
};
use crate::domain::{
    AccountStanding, Capabilities, FieldType, Form, SubmissionRequest, TestimonialStatus,
    DEFAULT_MAX_IMAGE_SIZE_MB, DEFAULT_MAX_VIDEO_SIZE_MB,
};
use crate::infrastructure::SIGNATURE_HEADER;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, header::HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use chrono::Utc;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

/// Room for one image and one video at the default caps once base64-encoded,
/// plus the text fields.
pub(super) const SUBMISSION_BODY_LIMIT: usize =
    (DEFAULT_MAX_IMAGE_SIZE_MB + DEFAULT_MAX_VIDEO_SIZE_MB) as usize * 1024 * 1024 / 3 * 4
        + 1024 * 1024;

type Reply = (StatusCode, Json<Value>);
type ApiResult = Result<Reply, Reply>;

fn reply((status, body): (StatusCode, Value)) -> Reply {
    (status, Json(body))
}

fn ok(body: Value) -> ApiResult {
    Ok((StatusCode::OK, Json(body)))
}

fn bad_request(msg: &str, allowed: &[&str]) -> Reply {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": msg, "allowed": allowed })),
    )
}

pub fn router(state: AppState) -> Router {
    let cors = match state
        .cors_allowed_origin
        .as_deref()
        .and_then(|origin| origin.parse::<HeaderValue>().ok())
    {
        Some(origin) => CorsLayer::new().allow_origin(origin),
        None => CorsLayer::new().allow_origin(Any),
    }
    .allow_methods(Any)
    .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/guard", get(evaluate_guard))
        .route("/subscription", get(get_subscription))
        .route("/subscription/refresh", post(refresh_subscription))
        .route("/forms", get(list_forms).post(create_form))
        .route(
            "/forms/:id",
            get(get_form).patch(update_form).delete(delete_form),
        )
        .route("/forms/:id/fields", get(list_fields).post(add_field))
        .route("/forms/:id/fields/order", put(move_field))
        .route(
            "/forms/:id/fields/:field_id",
            patch(update_field).delete(delete_field),
        )
        .route(
            "/submit/:form_id",
            get(load_public_form)
                .post(submit_testimonial)
                .layer(DefaultBodyLimit::max(SUBMISSION_BODY_LIMIT)),
        )
        .route("/testimonials", get(list_testimonials))
        .route("/testimonials/:id", axum::routing::delete(delete_testimonial))
        .route("/testimonials/:id/status", patch(moderate_testimonial))
        .route(
            "/testimonials/:id/tags",
            get(list_testimonial_tags).post(assign_tag),
        )
        .route(
            "/testimonials/:id/tags/:tag_id",
            axum::routing::delete(unassign_tag),
        )
        .route("/exports", post(export_testimonials))
        .route("/tags", get(list_tags).post(create_tag))
        .route("/tags/:id", patch(update_tag).delete(delete_tag))
        .route("/branding", get(get_branding).put(update_branding))
        .route("/billing/checkout", post(create_checkout))
        .route("/billing/portal", post(create_portal))
        .route("/billing/webhook", post(stripe_webhook))
        .route("/notifications", post(send_notification))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        evaluate_guard,
        get_subscription,
        refresh_subscription,
        list_forms,
        create_form,
        get_form,
        update_form,
        delete_form,
        list_fields,
        add_field,
        move_field,
        update_field,
        delete_field,
        load_public_form,
        submit_testimonial,
        list_testimonials,
        moderate_testimonial,
        delete_testimonial,
        list_testimonial_tags,
        assign_tag,
        unassign_tag,
        export_testimonials,
        list_tags,
        create_tag,
        update_tag,
        delete_tag,
        get_branding,
        update_branding,
        create_checkout,
        create_portal,
        stripe_webhook,
        send_notification,
    ),
    components(
        schemas(
            HealthResponse,
            CreateFormRequest,
            UpdateFormRequest,
            super::http_types::MediaPolicyRequest,
            FieldRequest,
            MoveFieldRequest,
            ModerateRequest,
            ExportRequestBody,
            ThemeRequest,
            TagRequest,
            UpdateTagRequest,
            AssignTagRequest,
            BrandingRequest,
            PortalRequest,
            NotificationRequest,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Account", description = "Route guard and subscription state"),
        (name = "Forms", description = "Testimonial forms and custom fields"),
        (name = "Public", description = "Public submission pages"),
        (name = "Testimonials", description = "Moderation, tags and exports"),
        (name = "Settings", description = "Tags and branding"),
        (name = "Billing", description = "Checkout, billing portal and webhooks"),
        (name = "Notifications", description = "Transactional email"),
    ),
    info(
        title = "TestiFlow API",
        version = "0.1.0",
        description = "Testimonial collection with plan-gated features and Stripe billing",
        license(name = "MIT OR Apache-2.0")
    )
)]
struct ApiDoc;

/// Health check endpoint
///
/// Verifies database connectivity and returns service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse)
    )
)]
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").fetch_one(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                error: None,
            }),
        ),
        Err(e) => {
            error!(error = %e, "Health check failed: DB connectivity issue");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    error: Some("Database connectivity failed".to_string()),
                }),
            )
        }
    }
}

/// Route guard decision for the path the client is about to render.
#[utoipa::path(
    get,
    path = "/guard",
    tag = "Account",
    params(GuardQuery),
    responses((status = 200, description = "Guard state and optional redirect", body = Object))
)]
async fn evaluate_guard(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<GuardQuery>,
) -> ApiResult {
    let decision = match session(&state, &headers).await {
        Session::SignedOut => state.guard.evaluate(None, &query.path).await,
        Session::SignedIn(user) => state.guard.evaluate(Some(user.id), &query.path).await,
        Session::Unresolved => {
            GuardDecision::for_standing(AccountStanding::LookupFailed, &query.path, Utc::now())
        }
    };
    ok(serde_json::json!(decision))
}

#[utoipa::path(
    get,
    path = "/subscription",
    tag = "Account",
    responses(
        (status = 200, description = "Plan, status, limits, usage and feature gates", body = Object),
        (status = 401, description = "Not signed in", body = Object)
    )
)]
async fn get_subscription(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let info = state.resolver.current(user.id).await;
    let features = Capabilities::from_limits(&info.limits).to_map();
    ok(serde_json::json!(SubscriptionResponse { info, features }))
}

/// Publishes the refresh signal and returns the re-resolved subscription.
#[utoipa::path(
    post,
    path = "/subscription/refresh",
    tag = "Account",
    responses(
        (status = 200, description = "Refreshed subscription", body = Object),
        (status = 401, description = "Not signed in", body = Object)
    )
)]
async fn refresh_subscription(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    state.refresh.invalidate();
    let info = state.resolver.current(user.id).await;
    let features = Capabilities::from_limits(&info.limits).to_map();
    ok(serde_json::json!(SubscriptionResponse { info, features }))
}

fn form_body(state: &AppState, form: Form) -> Value {
    let share_url = state.forms.share_url(&form);
    serde_json::json!(FormResponse { form, share_url })
}

#[utoipa::path(
    get,
    path = "/forms",
    tag = "Forms",
    responses((status = 200, description = "Owner's forms", body = Object))
)]
async fn list_forms(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let forms = state
        .forms
        .list(user.id)
        .await
        .map_err(|e| reply(map_form_error(&e)))?;
    let body: Vec<Value> = forms.into_iter().map(|f| form_body(&state, f)).collect();
    ok(Value::Array(body))
}

#[utoipa::path(
    post,
    path = "/forms",
    tag = "Forms",
    request_body = CreateFormRequest,
    responses(
        (status = 201, description = "Form created", body = Object),
        (status = 400, description = "Invalid form", body = Object),
        (status = 403, description = "Inactive subscription or form limit reached", body = Object)
    )
)]
async fn create_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<CreateFormRequest>,
) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let form = state
        .forms
        .create(user.id, req.into())
        .await
        .map_err(|e| reply(map_form_error(&e)))?;
    Ok((StatusCode::CREATED, Json(form_body(&state, form))))
}

#[utoipa::path(
    get,
    path = "/forms/{id}",
    tag = "Forms",
    params(("id" = Uuid, Path, description = "Form ID")),
    responses(
        (status = 200, description = "Form", body = Object),
        (status = 404, description = "Form not found", body = Object)
    )
)]
async fn get_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let form = state
        .forms
        .get(user.id, id)
        .await
        .map_err(|e| reply(map_form_error(&e)))?;
    ok(form_body(&state, form))
}

#[utoipa::path(
    patch,
    path = "/forms/{id}",
    tag = "Forms",
    params(("id" = Uuid, Path, description = "Form ID")),
    request_body = UpdateFormRequest,
    responses(
        (status = 200, description = "Form updated", body = Object),
        (status = 403, description = "Video uploads need Premium", body = Object),
        (status = 404, description = "Form not found", body = Object)
    )
)]
async fn update_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateFormRequest>,
) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let form = state
        .forms
        .update(user.id, id, req.into())
        .await
        .map_err(|e| reply(map_form_error(&e)))?;
    ok(form_body(&state, form))
}

#[utoipa::path(
    delete,
    path = "/forms/{id}",
    tag = "Forms",
    params(("id" = Uuid, Path, description = "Form ID")),
    responses(
        (status = 200, description = "Form deleted", body = Object),
        (status = 404, description = "Form not found", body = Object)
    )
)]
async fn delete_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    state
        .forms
        .delete(user.id, id)
        .await
        .map_err(|e| reply(map_form_error(&e)))?;
    ok(serde_json::json!({ "deleted": true }))
}

#[utoipa::path(
    get,
    path = "/forms/{id}/fields",
    tag = "Forms",
    params(("id" = Uuid, Path, description = "Form ID")),
    responses((status = 200, description = "Fields in display order", body = Object))
)]
async fn list_fields(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let fields = state
        .forms
        .fields(user.id, id)
        .await
        .map_err(|e| reply(map_form_error(&e)))?;
    ok(serde_json::json!(fields))
}

fn requested_field_type(raw: &str) -> Result<FieldType, Reply> {
    parse_field_type(raw).ok_or_else(|| bad_request("Invalid field_type", &FIELD_TYPE_VALUES))
}

#[utoipa::path(
    post,
    path = "/forms/{id}/fields",
    tag = "Forms",
    params(("id" = Uuid, Path, description = "Form ID")),
    request_body = FieldRequest,
    responses(
        (status = 201, description = "Field added", body = Object),
        (status = 403, description = "Custom fields need Premium", body = Object)
    )
)]
async fn add_field(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<FieldRequest>,
) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let field_type = requested_field_type(&req.field_type)?;
    let field = state
        .forms
        .add_field(user.id, id, req.into_draft(field_type))
        .await
        .map_err(|e| reply(map_form_error(&e)))?;
    Ok((StatusCode::CREATED, Json(serde_json::json!(field))))
}

#[utoipa::path(
    put,
    path = "/forms/{id}/fields/order",
    tag = "Forms",
    params(("id" = Uuid, Path, description = "Form ID")),
    request_body = MoveFieldRequest,
    responses(
        (status = 200, description = "Fields in their new order", body = Object),
        (status = 400, description = "Unknown field or index out of range", body = Object)
    )
)]
async fn move_field(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<MoveFieldRequest>,
) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let fields = state
        .forms
        .move_field(user.id, id, req.field_id, req.to_index)
        .await
        .map_err(|e| reply(map_form_error(&e)))?;
    ok(serde_json::json!(fields))
}

#[utoipa::path(
    patch,
    path = "/forms/{id}/fields/{field_id}",
    tag = "Forms",
    params(
        ("id" = Uuid, Path, description = "Form ID"),
        ("field_id" = Uuid, Path, description = "Field ID")
    ),
    request_body = FieldRequest,
    responses(
        (status = 200, description = "Field updated", body = Object),
        (status = 404, description = "Field not found", body = Object)
    )
)]
async fn update_field(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath((id, field_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(req): ApiJson<FieldRequest>,
) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let field_type = requested_field_type(&req.field_type)?;
    let field = state
        .forms
        .update_field(user.id, id, field_id, req.into_draft(field_type))
        .await
        .map_err(|e| reply(map_form_error(&e)))?;
    ok(serde_json::json!(field))
}

#[utoipa::path(
    delete,
    path = "/forms/{id}/fields/{field_id}",
    tag = "Forms",
    params(
        ("id" = Uuid, Path, description = "Form ID"),
        ("field_id" = Uuid, Path, description = "Field ID")
    ),
    responses((status = 200, description = "Remaining fields, densely ordered", body = Object))
)]
async fn delete_field(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath((id, field_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let fields = state
        .forms
        .delete_field(user.id, id, field_id)
        .await
        .map_err(|e| reply(map_form_error(&e)))?;
    ok(serde_json::json!(fields))
}

#[utoipa::path(
    get,
    path = "/submit/{form_id}",
    tag = "Public",
    params(("form_id" = Uuid, Path, description = "Form ID")),
    responses(
        (status = 200, description = "Form definition, fields and branding", body = Object),
        (status = 404, description = "Form missing or inactive", body = Object)
    )
)]
async fn load_public_form(
    State(state): State<AppState>,
    ApiPath(form_id): ApiPath<Uuid>,
) -> ApiResult {
    let public = state
        .submissions
        .load(form_id)
        .await
        .map_err(|e| reply(map_submission_error(&e)))?;
    ok(serde_json::json!(public))
}

#[utoipa::path(
    post,
    path = "/submit/{form_id}",
    tag = "Public",
    params(("form_id" = Uuid, Path, description = "Form ID")),
    request_body(content = Object, description = "Name, email, company, message, rating, custom_responses, image, video"),
    responses(
        (status = 201, description = "Testimonial submitted", body = Object),
        (status = 400, description = "Validation failed", body = Object),
        (status = 403, description = "Owner's testimonial limit reached", body = Object),
        (status = 409, description = "Duplicate submission in flight", body = Object)
    )
)]
async fn submit_testimonial(
    State(state): State<AppState>,
    ApiPath(form_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<SubmissionRequest>,
) -> ApiResult {
    let receipt = state
        .submissions
        .submit(form_id, req)
        .await
        .map_err(|e| reply(map_submission_error(&e)))?;
    Ok((StatusCode::CREATED, Json(serde_json::json!(receipt))))
}

fn status_filter(raw: Option<&str>) -> Result<Option<TestimonialStatus>, Reply> {
    match raw {
        None => Ok(None),
        Some(s) => parse_testimonial_status(s)
            .map(Some)
            .ok_or_else(|| bad_request("Invalid status", &STATUS_VALUES)),
    }
}

#[utoipa::path(
    get,
    path = "/testimonials",
    tag = "Testimonials",
    params(StatusQuery),
    responses((status = 200, description = "Owner's testimonials, newest first", body = Object))
)]
async fn list_testimonials(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<StatusQuery>,
) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let status = status_filter(query.status.as_deref())?;
    let testimonials = state
        .testimonials
        .list(user.id, status)
        .await
        .map_err(|e| reply(map_testimonial_error(&e)))?;
    ok(serde_json::json!(testimonials))
}

#[utoipa::path(
    patch,
    path = "/testimonials/{id}/status",
    tag = "Testimonials",
    params(("id" = Uuid, Path, description = "Testimonial ID")),
    request_body = ModerateRequest,
    responses(
        (status = 200, description = "Testimonial moderated", body = Object),
        (status = 404, description = "Testimonial not found", body = Object)
    )
)]
async fn moderate_testimonial(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<ModerateRequest>,
) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let status = parse_testimonial_status(&req.status)
        .ok_or_else(|| bad_request("Invalid status", &STATUS_VALUES))?;
    let testimonial = state
        .testimonials
        .set_status(user.id, id, status)
        .await
        .map_err(|e| reply(map_testimonial_error(&e)))?;
    ok(serde_json::json!(testimonial))
}

#[utoipa::path(
    delete,
    path = "/testimonials/{id}",
    tag = "Testimonials",
    params(("id" = Uuid, Path, description = "Testimonial ID")),
    responses((status = 200, description = "Testimonial deleted", body = Object))
)]
async fn delete_testimonial(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    state
        .testimonials
        .delete(user.id, id)
        .await
        .map_err(|e| reply(map_testimonial_error(&e)))?;
    ok(serde_json::json!({ "deleted": true }))
}

#[utoipa::path(
    get,
    path = "/testimonials/{id}/tags",
    tag = "Testimonials",
    params(("id" = Uuid, Path, description = "Testimonial ID")),
    responses((status = 200, description = "Assigned tags", body = Object))
)]
async fn list_testimonial_tags(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let tags = state
        .testimonials
        .tags(user.id, id)
        .await
        .map_err(|e| reply(map_testimonial_error(&e)))?;
    ok(serde_json::json!(tags))
}

#[utoipa::path(
    post,
    path = "/testimonials/{id}/tags",
    tag = "Testimonials",
    params(("id" = Uuid, Path, description = "Testimonial ID")),
    request_body = AssignTagRequest,
    responses(
        (status = 200, description = "Assigned tags", body = Object),
        (status = 403, description = "Tags need Premium", body = Object)
    )
)]
async fn assign_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AssignTagRequest>,
) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let tags = state
        .testimonials
        .assign_tag(user.id, id, req.tag_id)
        .await
        .map_err(|e| reply(map_testimonial_error(&e)))?;
    ok(serde_json::json!(tags))
}

#[utoipa::path(
    delete,
    path = "/testimonials/{id}/tags/{tag_id}",
    tag = "Testimonials",
    params(
        ("id" = Uuid, Path, description = "Testimonial ID"),
        ("tag_id" = Uuid, Path, description = "Tag ID")
    ),
    responses((status = 200, description = "Assigned tags", body = Object))
)]
async fn unassign_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath((id, tag_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let tags = state
        .testimonials
        .unassign_tag(user.id, id, tag_id)
        .await
        .map_err(|e| reply(map_testimonial_error(&e)))?;
    ok(serde_json::json!(tags))
}

#[utoipa::path(
    post,
    path = "/exports",
    tag = "Testimonials",
    request_body = ExportRequestBody,
    responses(
        (status = 200, description = "Rendered export as a file download"),
        (status = 403, description = "JSON and widget exports need Premium", body = Object)
    )
)]
async fn export_testimonials(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<ExportRequestBody>,
) -> Result<Response, Reply> {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let format = match req.format.as_deref() {
        None => None,
        Some(raw) => Some(
            parse_export_format(raw).ok_or_else(|| bad_request("Invalid format", &FORMAT_VALUES))?,
        ),
    };
    let status = status_filter(req.status.as_deref())?;

    let output = state
        .testimonials
        .export(
            user.id,
            ExportRequest {
                format,
                testimonial_ids: req.testimonial_ids,
                status,
                theme: req.theme.map(Into::into),
            },
        )
        .await
        .map_err(|e| reply(map_testimonial_error(&e)))?;

    let disposition = format!("attachment; filename=\"{}\"", output.filename);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, output.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        output.body,
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/tags",
    tag = "Settings",
    responses(
        (status = 200, description = "Owner's tags", body = Object),
        (status = 403, description = "Tags need Premium", body = Object)
    )
)]
async fn list_tags(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let tags = state
        .tags
        .list(user.id)
        .await
        .map_err(|e| reply(map_tag_error(&e)))?;
    ok(serde_json::json!(tags))
}

#[utoipa::path(
    post,
    path = "/tags",
    tag = "Settings",
    request_body = TagRequest,
    responses(
        (status = 201, description = "Tag created", body = Object),
        (status = 409, description = "Duplicate tag name", body = Object)
    )
)]
async fn create_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<TagRequest>,
) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let tag = state
        .tags
        .create(user.id, &req.name, req.color.as_deref())
        .await
        .map_err(|e| reply(map_tag_error(&e)))?;
    info!(user_id = %user.id, tag_id = %tag.id, "Created tag");
    Ok((StatusCode::CREATED, Json(serde_json::json!(tag))))
}

#[utoipa::path(
    patch,
    path = "/tags/{id}",
    tag = "Settings",
    params(("id" = Uuid, Path, description = "Tag ID")),
    request_body = UpdateTagRequest,
    responses((status = 200, description = "Tag updated", body = Object))
)]
async fn update_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateTagRequest>,
) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let tag = state
        .tags
        .update(user.id, id, req.name.as_deref(), req.color.as_deref())
        .await
        .map_err(|e| reply(map_tag_error(&e)))?;
    ok(serde_json::json!(tag))
}

#[utoipa::path(
    delete,
    path = "/tags/{id}",
    tag = "Settings",
    params(("id" = Uuid, Path, description = "Tag ID")),
    responses((status = 200, description = "Tag deleted", body = Object))
)]
async fn delete_tag(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    state
        .tags
        .delete(user.id, id)
        .await
        .map_err(|e| reply(map_tag_error(&e)))?;
    ok(serde_json::json!({ "deleted": true }))
}

#[utoipa::path(
    get,
    path = "/branding",
    tag = "Settings",
    responses(
        (status = 200, description = "Saved branding or defaults", body = Object),
        (status = 403, description = "Branding needs Premium", body = Object)
    )
)]
async fn get_branding(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let branding = state
        .branding
        .get(user.id)
        .await
        .map_err(|e| reply(map_branding_error(&e)))?;
    ok(serde_json::json!(branding))
}

#[utoipa::path(
    put,
    path = "/branding",
    tag = "Settings",
    request_body = BrandingRequest,
    responses(
        (status = 200, description = "Branding saved", body = Object),
        (status = 400, description = "Invalid color, font or logo URL", body = Object)
    )
)]
async fn update_branding(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<BrandingRequest>,
) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let branding = state
        .branding
        .update(user.id, req.into())
        .await
        .map_err(|e| reply(map_branding_error(&e)))?;
    ok(serde_json::json!(branding))
}

#[utoipa::path(
    post,
    path = "/billing/checkout",
    tag = "Billing",
    request_body(content = Object, description = "price_id, success_url, cancel_url, mode, customer_email, client_reference_id?, is_plan_change?"),
    responses(
        (status = 200, description = "Checkout session", body = Object),
        (status = 400, description = "Invalid parameter", body = Object),
        (status = 500, description = "Stripe is not configured", body = Object)
    )
)]
async fn create_checkout(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult {
    let session = state
        .billing
        .checkout(&body)
        .await
        .map_err(|e| reply(map_billing_error(&e)))?;
    ok(serde_json::json!(session))
}

#[utoipa::path(
    post,
    path = "/billing/portal",
    tag = "Billing",
    request_body = PortalRequest,
    responses(
        (status = 200, description = "Portal URL", body = Object),
        (status = 400, description = "return_url is required", body = Object),
        (status = 401, description = "Not signed in", body = Object),
        (status = 404, description = "No customer found", body = Object)
    )
)]
async fn create_portal(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<PortalRequest>,
) -> ApiResult {
    let user = authenticate(&state, &headers).await.map_err(reply)?;
    let url = state
        .billing
        .portal(user.id, req.return_url.as_deref())
        .await
        .map_err(|e| reply(map_billing_error(&e)))?;
    ok(serde_json::json!({ "url": url }))
}

#[utoipa::path(
    post,
    path = "/billing/webhook",
    tag = "Billing",
    request_body(content = String, description = "Raw Stripe event payload"),
    responses(
        (status = 200, description = "Event received", body = Object),
        (status = 400, description = "Missing or invalid signature", body = Object),
        (status = 500, description = "Processing failed; Stripe will redeliver", body = Object)
    )
)]
async fn stripe_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> ApiResult {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    match state.billing.handle_webhook(&body, signature).await {
        Ok(WebhookOutcome::Processed(event_type)) => {
            info!(event_type = %event_type, "Processed webhook event");
            ok(serde_json::json!({ "received": true }))
        }
        Ok(WebhookOutcome::Ignored(_)) => ok(serde_json::json!({ "received": true })),
        Err(e) => {
            error!(error = %e, "Webhook failed");
            Err(reply(map_billing_error(&e)))
        }
    }
}

#[utoipa::path(
    post,
    path = "/notifications",
    tag = "Notifications",
    request_body = NotificationRequest,
    responses(
        (status = 200, description = "Email sent", body = Object),
        (status = 400, description = "Malformed payload", body = Object),
        (status = 500, description = "Unknown type or send failure", body = Object)
    )
)]
async fn send_notification(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<NotificationRequest>,
) -> ApiResult {
    let Some(notifications) = state.notifications.as_ref() else {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": "Email provider is not configured" })),
        ));
    };
    let notification = Notification::from_request(&req.kind, req.data)
        .map_err(|e| reply(map_notification_error(&e)))?;
    notifications
        .send(&notification)
        .await
        .map_err(|e| reply(map_notification_error(&e)))?;
    ok(serde_json::json!({ "success": true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::AppConfig;
    use crate::server::build_state_with_pool;
    use axum::body::Body;
    use axum::http::Request;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use http_body_util::BodyExt;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;
    use tower::ServiceExt;

    /// Router over a pool that never connects and no provider credentials.
    async fn app() -> Router {
        let config = AppConfig {
            database_url: "postgres://testiflow@127.0.0.1:1/testiflow".to_string(),
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            app_url: "http://localhost:5173".to_string(),
            standard_price_id: "price_standard".to_string(),
            premium_price_id: "price_premium".to_string(),
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            stripe_portal_configuration_id: None,
            resend_api_key: None,
            auth_url: None,
            auth_service_key: None,
            email_from: "TestiFlow <info@testiflow.com>".to_string(),
            webhook_tolerance_secs: 300,
            cors_allowed_origin: None,
        };
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy(&config.database_url)
            .unwrap();
        router(build_state_with_pool(config, pool, false).await.unwrap())
    }

    fn post_json(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = app().await.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| panic!("non-JSON body: {}", String::from_utf8_lossy(&bytes)));
        (status, body)
    }

    #[tokio::test]
    async fn malformed_checkout_body_is_a_json_400() {
        let (status, body) = send(post_json("/billing/checkout", "{\"priceId\": ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn checkout_without_json_content_type_is_a_json_415() {
        let request = Request::builder()
            .method("POST")
            .uri("/billing/checkout")
            .body(Body::from("{}"))
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn notification_without_type_is_a_json_400() {
        let (status, body) = send(post_json("/notifications", r#"{"data": {}}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some_and(|e| e.contains("type")));
    }

    #[tokio::test]
    async fn non_uuid_form_id_is_a_json_400() {
        let request = Request::builder()
            .uri("/submit/abc")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn guard_query_without_path_is_a_json_400() {
        let request = Request::builder().uri("/guard").body(Body::empty()).unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn submission_with_three_megabyte_image_reaches_the_service() {
        let image = format!(
            "data:image/png;base64,{}",
            BASE64.encode(vec![7u8; 3 * 1024 * 1024])
        );
        let payload = serde_json::json!({
            "name": "Ada Lovelace",
            "email": "ada@example.com",
            "message": "TestiFlow made collecting reviews painless.",
            "rating": 5,
            "image": image,
        });
        let uri = format!("/submit/{}", Uuid::new_v4());
        let (status, body) = send(post_json(&uri, payload.to_string())).await;

        // The store is unreachable, so the request fails inside the service.
        assert_ne!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn oversized_bodies_elsewhere_are_a_json_413() {
        let padding = "x".repeat(3 * 1024 * 1024);
        let payload = serde_json::json!({ "type": "welcome", "data": { "padding": padding } });
        let (status, body) = send(post_json("/notifications", payload.to_string())).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body["error"].is_string());
    }

    #[test]
    fn submission_limit_covers_both_default_media_caps() {
        let encoded = |mb: i32| (mb as usize * 1024 * 1024).div_ceil(3) * 4;
        assert!(
            SUBMISSION_BODY_LIMIT
                > encoded(DEFAULT_MAX_IMAGE_SIZE_MB) + encoded(DEFAULT_MAX_VIDEO_SIZE_MB)
        );
    }
}
