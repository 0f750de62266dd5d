use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::app::checkout::{CheckoutService, SubmitError};
use crate::app::delivery::DeliveryRunner;
use crate::app::model::{OrderStatus, SubmitOrderRequest};
use crate::app::order_store::OrderStore;
use crate::app::queue::InProcessQueue;
use crate::assets::LocalAssetIndex;
use crate::pages::{BookSpec, PageListBuilder, compose_book, name_letters};
use crate::preview::{PreviewBoard, PreviewResponse};
use crate::theme::{Gender, SkinTone, ThemeOrders};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OrderStore>,
    pub checkout: Arc<CheckoutService>,
    pub runner: Arc<DeliveryRunner>,
    pub queue: InProcessQueue,
    pub assets: Arc<LocalAssetIndex>,
    pub theme_orders: ThemeOrders,
    pub internal_auth_token: Option<String>,
}

/// Builds the storefront router. Bundled artwork is served under the asset
/// index's URL prefix when `assets_dir` is given.
pub fn router(state: AppState, assets_dir: Option<PathBuf>) -> Router {
    let asset_prefix = state.assets.url_prefix().to_string();
    let mut app = Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/api/preview", get(preview_handler))
        .route("/api/orders", post(submit_order))
        .route("/api/orders/:order_id", get(get_order))
        .route("/internal/orders/:order_id/deliver", post(deliver_order))
        .route("/orders/:order_id/book.pdf", get(download_pdf))
        .route("/orders/:order_id/confirmation", get(confirmation_page));
    if let Some(dir) = assets_dir {
        if asset_prefix.is_empty() {
            app = app.fallback_service(ServeDir::new(dir));
        } else {
            app = app.nest_service(&asset_prefix, ServeDir::new(dir));
        }
    }
    app.layer(TraceLayer::new_for_http()).with_state(state)
}

#[derive(Debug, Deserialize)]
struct PreviewQuery {
    name: String,
    gender: String,
    skin_tone: String,
}

async fn preview_handler(
    State(state): State<AppState>,
    Query(q): Query<PreviewQuery>,
) -> Result<Json<PreviewResponse>, (StatusCode, String)> {
    let gender: Gender = q
        .gender
        .parse()
        .map_err(|err| (StatusCode::BAD_REQUEST, format!("{err:#}")))?;
    let skin_tone: SkinTone = q
        .skin_tone
        .parse()
        .map_err(|err| (StatusCode::BAD_REQUEST, format!("{err:#}")))?;
    let child_name = q.name.trim().to_string();
    let letters = name_letters(&child_name).len();
    if letters == 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "name must contain at least one letter A-Z".to_string(),
        ));
    }

    let spec = BookSpec {
        child_name,
        gender,
        skin_tone,
    };
    let artwork = PageListBuilder::new(state.theme_orders, state.assets.as_ref()).build(&spec);
    let mut board = PreviewBoard::new(compose_book(artwork));
    let present: Vec<bool> = board
        .pages()
        .iter()
        .map(|p| !p.has_artwork() || state.assets.contains_url(&p.image_path))
        .collect();
    for (index, ok) in present.into_iter().enumerate() {
        if ok {
            board.mark_loaded(index);
        } else {
            board.mark_failed(index);
        }
    }
    Ok(Json(PreviewResponse::from_board(
        &spec.child_name,
        letters,
        &board,
    )))
}

async fn submit_order(
    State(state): State<AppState>,
    Json(req): Json<SubmitOrderRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    match state.checkout.submit(req).await {
        Ok(submitted) => Ok((StatusCode::CREATED, Json(submitted))),
        Err(err @ SubmitError::Invalid(_)) => Err((StatusCode::BAD_REQUEST, err.to_string())),
        Err(err @ SubmitError::Gateway(_)) => Err((StatusCode::BAD_GATEWAY, err.to_string())),
        Err(err @ SubmitError::Internal(_)) => {
            tracing::error!(err = %err, "submit order failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))
        }
    }
}

async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Response, StatusCode> {
    let order = load_order(&state, &order_id).await?;
    Ok(Json(order).into_response())
}

#[derive(Debug, Serialize)]
struct DeliveryQueued {
    order_id: String,
    status: &'static str,
}

async fn deliver_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, StatusCode> {
    if let Some(token) = state.internal_auth_token.as_deref() {
        let expected = format!("Bearer {token}");
        let provided = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    let order = load_order(&state, &order_id).await?;
    if !order.is_deliverable_at(chrono::Utc::now()) {
        return Err(StatusCode::CONFLICT);
    }

    let runner = Arc::clone(&state.runner);
    let id = order.order_id.clone();
    state.queue.spawn(async move {
        runner.run_order(&id).await;
    });
    tracing::info!(order_id = %order.order_id, "delivery queued");
    Ok((
        StatusCode::ACCEPTED,
        Json(DeliveryQueued {
            order_id: order.order_id,
            status: "queued",
        }),
    ))
}

async fn download_pdf(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Response, StatusCode> {
    let order = load_order(&state, &order_id).await?;
    if order.status != OrderStatus::Delivered {
        return Err(StatusCode::CONFLICT);
    }

    let path = state.store.pdf_path(&order.order_id);
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;
    let body = axum::body::Body::from_stream(ReaderStream::new(file));

    let mut resp = Response::new(body);
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/pdf"),
    );
    resp.headers_mut().insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!(
            "inline; filename=\"{}.pdf\"",
            order.order_number
        ))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?,
    );
    Ok(resp)
}

async fn confirmation_page(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Html<String>, StatusCode> {
    let order = load_order(&state, &order_id).await?;
    let name: String = order
        .book_data
        .spec
        .child_name
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '\'')
        .collect();
    Ok(Html(format!(
        r#"<!doctype html>
<html>
  <head><meta charset="utf-8"><title>Order {number}</title></head>
  <body>
    <h1>Thank you!</h1>
    <p>Your order <strong>{number}</strong> for {name}'s book has been received.</p>
  </body>
</html>
"#,
        number = order.order_number,
    )))
}

async fn load_order(
    state: &AppState,
    order_id: &str,
) -> Result<crate::app::model::Order, StatusCode> {
    if uuid::Uuid::parse_str(order_id.trim()).is_err() {
        return Err(StatusCode::BAD_REQUEST);
    }
    match state.store.get(order_id.trim()).await {
        Ok(Some(order)) => Ok(order),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(err) => {
            tracing::error!(order_id, ?err, "load order failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
