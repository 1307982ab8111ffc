/// API сервер для подготовки признаков и модели u_plus

use std::sync::Arc;

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

use wall_law_ml::{
    preprocessing::{augment_all, training_table, FeatureDeriver, SchemaMode},
    types::{
        AugmentRequest, AugmentResponse, DeriveRequest, EvaluateRequest, EvaluateResponse, RescaleRequest,
        RescaleResponse, SnapshotData, TableData, TrainRequest, TrainResponse, TuneRequest,
    },
    EngineConfig, Evaluation, FlowError, Snapshot, TrainedModel, TrainingSession, TuningResult,
};

type ApiError = (StatusCode, String);

#[derive(Clone)]
struct AppState {
    config: Arc<EngineConfig>,
    deriver: FeatureDeriver,
    model: Arc<Mutex<Option<TrainedModel>>>,
}

/// Ошибки входных данных дают 422, ошибки обучения 500
fn api_error(e: FlowError) -> ApiError {
    let status = match e {
        FlowError::Model(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (status, e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Инициализация логирования
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = EngineConfig::from_env();
    let addr = config.addr.clone();
    let app = app(AppState::new(config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

impl AppState {
    fn new(config: EngineConfig) -> Self {
        Self {
            deriver: FeatureDeriver::new(config.default_viscosity),
            config: Arc::new(config),
            model: Arc::new(Mutex::new(None)),
        }
    }
}

fn app(state: AppState) -> Router {
    // CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/derive", post(derive))
        .route("/api/rescale", post(rescale))
        .route("/api/augment", post(augment))
        .route("/api/train", post(train))
        .route("/api/evaluate", post(evaluate))
        .route("/api/tune", post(tune))
        .layer(cors)
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Wall-law ML API (Rust)",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let trained = state.model.lock().await.is_some();
    Json(serde_json::json!({ "status": "ok", "model_trained": trained }))
}

fn snapshots(state: &AppState, data: Vec<SnapshotData>) -> Result<Vec<Snapshot>, ApiError> {
    data.into_iter()
        .map(|s| s.into_snapshot(state.config.default_viscosity))
        .collect::<Result<Vec<_>, _>>()
        .map_err(api_error)
}

async fn derive(
    State(state): State<AppState>,
    Json(request): Json<DeriveRequest>,
) -> Result<Json<TableData>, ApiError> {
    let snapshot = request
        .snapshot
        .into_snapshot(state.config.default_viscosity)
        .map_err(api_error)?;
    tracing::info!("Derive request: {} rows", snapshot.n_rows());

    let mode = if request.required_only {
        SchemaMode::Required
    } else {
        SchemaMode::Full
    };
    let table = state.deriver.derive_snapshot(&snapshot, mode).map_err(api_error)?;
    Ok(Json(TableData::from(&table)))
}

async fn rescale(
    State(state): State<AppState>,
    Json(request): Json<RescaleRequest>,
) -> Result<Json<RescaleResponse>, ApiError> {
    let mut snapshot = request
        .snapshot
        .into_snapshot(state.config.default_viscosity)
        .map_err(api_error)?;
    tracing::info!(
        "Rescale request: {} rows, delta {:?}, viscosity {:?}",
        snapshot.n_rows(),
        request.new_delta,
        request.new_viscosity
    );

    if let Some(delta) = request.new_delta {
        snapshot.set_delta(delta).map_err(api_error)?;
    }
    if let Some(viscosity) = request.new_viscosity {
        snapshot.set_viscosity(viscosity).map_err(api_error)?;
    }

    Ok(Json(RescaleResponse {
        delta: snapshot.delta(),
        viscosity: snapshot.viscosity(),
        table: TableData::from(snapshot.frame()),
    }))
}

async fn augment(
    State(state): State<AppState>,
    Json(request): Json<AugmentRequest>,
) -> Result<Json<AugmentResponse>, ApiError> {
    let snapshots = snapshots(&state, request.snapshots)?;
    tracing::info!("Augment request: {} snapshots", snapshots.len());

    let table = augment_all(&snapshots, &request.plan).map_err(api_error)?;
    Ok(Json(AugmentResponse {
        n_rows: table.n_rows(),
        table: TableData::from(&table),
    }))
}

async fn train(
    State(state): State<AppState>,
    Json(request): Json<TrainRequest>,
) -> Result<Json<TrainResponse>, ApiError> {
    let snapshots = snapshots(&state, request.snapshots)?;
    tracing::info!("Train request: {} snapshots, {} eval sets", snapshots.len(), request.eval_sets.len());

    let table = training_table(&snapshots, &request.plan, &state.deriver).map_err(api_error)?;
    let params = request.params.unwrap_or_else(|| state.config.boosting.clone());
    let mut session = TrainingSession::new(params, &table).map_err(api_error)?;
    for eval in request.eval_sets {
        let snapshot = eval
            .snapshot
            .into_snapshot(state.config.default_viscosity)
            .map_err(api_error)?;
        session
            .add_eval_set(eval.name, snapshot.frame(), &state.deriver)
            .map_err(api_error)?;
    }

    // Обучение блокирует поток: выносим в blocking пул
    let trained = tokio::task::spawn_blocking(move || session.fit())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Training task failed: {}", e)))?
        .map_err(api_error)?;

    let response = TrainResponse {
        feature_names: trained.feature_names.clone(),
        report: trained.report.clone(),
    };
    *state.model.lock().await = Some(trained);
    Ok(Json(response))
}

async fn evaluate(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, ApiError> {
    let snapshot = request
        .snapshot
        .into_snapshot(state.config.default_viscosity)
        .map_err(api_error)?;
    tracing::info!("Evaluate request: {} rows", snapshot.n_rows());

    // Копия модели, чтобы не держать блокировку во время предсказания
    let model = state
        .model
        .lock()
        .await
        .clone()
        .ok_or_else(|| (StatusCode::CONFLICT, "Model not trained".to_string()))?;
    let deriver = state.deriver.clone();

    let response = tokio::task::spawn_blocking(move || {
        let evaluation = Evaluation::run(&model, snapshot.frame(), &deriver)?;
        Ok::<_, FlowError>(EvaluateResponse {
            scores: evaluation.scores(),
            comparisons: evaluation.compare(request.threshold),
            profile: evaluation.wall_profile(request.profile_limit)?,
        })
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Evaluation task failed: {}", e)))?
    .map_err(api_error)?;

    Ok(Json(response))
}

async fn tune(
    State(state): State<AppState>,
    Json(request): Json<TuneRequest>,
) -> Result<Json<TuningResult>, ApiError> {
    let snapshots = snapshots(&state, request.snapshots)?;
    tracing::info!("Tune request: {} snapshots", snapshots.len());

    let table = training_table(&snapshots, &request.plan, &state.deriver).map_err(api_error)?;
    let base = request.params.unwrap_or_else(|| state.config.boosting.clone());

    let result = tokio::task::spawn_blocking(move || match request.param {
        Some(param) => wall_law_ml::tune_parameter(&table, &base, param, &request.range, &request.config),
        None => wall_law_ml::tune_all(&table, &base, &request.distribution, request.n_iter, &request.config),
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Tuning task failed: {}", e)))?
    .map_err(api_error)?;

    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;
    use wall_law_ml::schema::BASE_COLUMNS;

    fn snapshot_json(n: usize) -> serde_json::Value {
        let columns: Vec<serde_json::Value> = BASE_COLUMNS
            .iter()
            .map(|c| {
                let values: Vec<f64> = (0..n).map(|i| 0.1 + 0.01 * i as f64).collect();
                serde_json::json!({ "name": c.as_str(), "values": values })
            })
            .collect();
        let mut table = serde_json::json!({ "columns": columns });
        // delta должна быть одна на снимок
        if let Some(column) = table["columns"]
            .as_array_mut()
            .and_then(|cols| cols.iter_mut().find(|c| c["name"] == "delta"))
        {
            column["values"] = serde_json::json!(vec![1.0; n]);
        }
        serde_json::json!({ "table": table })
    }

    async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(AppState::new(EngineConfig::default()));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_derive_required_columns() {
        let app = app(AppState::new(EngineConfig::default()));
        let body = serde_json::json!({ "snapshot": snapshot_json(5), "required_only": true });
        let (status, value) = post_json(app, "/api/derive", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["columns"].as_array().map(Vec::len), Some(9));
    }

    #[tokio::test]
    async fn test_rescale_rejects_non_positive_delta() {
        let app = app(AppState::new(EngineConfig::default()));
        let body = serde_json::json!({ "snapshot": snapshot_json(5), "new_delta": 0.0 });
        let (status, _) = post_json(app, "/api/rescale", body).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_evaluate_after_training() {
        let app = app(AppState::new(EngineConfig::default()));
        let train = serde_json::json!({
            "snapshots": [snapshot_json(30)],
            "params": { "n_estimators": 5, "max_depth": 2 }
        });
        let (status, value) = post_json(app.clone(), "/api/train", train).await;
        assert_eq!(status, StatusCode::OK, "{}", value);

        let body = serde_json::json!({ "snapshot": snapshot_json(10), "threshold": 0.0 });
        let (status, value) = post_json(app.clone(), "/api/evaluate", body).await;
        assert_eq!(status, StatusCode::OK, "{}", value);
        assert_eq!(value["comparisons"].as_array().map(Vec::len), Some(10));

        // модель остается доступной после оценки
        let (status, _) = post_json(app, "/api/evaluate", serde_json::json!({ "snapshot": snapshot_json(10) })).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_evaluate_requires_model() {
        let app = app(AppState::new(EngineConfig::default()));
        let body = serde_json::json!({ "snapshot": snapshot_json(5) });
        let (status, _) = post_json(app, "/api/evaluate", body).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
