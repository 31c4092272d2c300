// API module for headless mode - HTTP endpoints to drive and inspect a growth run

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use crate::config::SimulationConfig;
use crate::segment::Segment;
use crate::simulation::{Simulation, SimulationStats, StepRecord};

// Serializable views of the network for API responses
#[derive(Serialize, Clone)]
pub struct SegmentData {
    pub id: usize,
    pub parent: Option<usize>,
    pub start: [f64; 3],
    pub end: [f64; 3],
    pub orientation: [f64; 3],
    pub length: f64,
    pub age: f64,
    pub is_tip: bool,
    pub is_dead: bool,
    pub branches_made: u32,
    pub color: [f64; 3],
}

impl From<&Segment> for SegmentData {
    fn from(s: &Segment) -> Self {
        Self {
            id: s.id().index(),
            parent: s.parent().map(|p| p.index()),
            start: s.start().to_array(),
            end: s.end().to_array(),
            orientation: s.orientation().to_array(),
            length: s.length(),
            age: s.age(),
            is_tip: s.is_tip(),
            is_dead: s.is_dead(),
            branches_made: s.branches_made(),
            color: s.color().channels(),
        }
    }
}

#[derive(Serialize, Clone)]
pub struct StateResponse {
    /// Ids of the live tips.
    pub tips: Vec<usize>,
    pub segments: Vec<SegmentData>,
    pub stats: SimulationStats,
}

#[derive(Serialize, Clone)]
pub struct HistoryResponse {
    pub steps: Vec<StepRecord>,
    pub biomass: Vec<f64>,
}

#[derive(Deserialize)]
pub struct StepQuery {
    pub steps: Option<u64>,
}

// Shared state for the API server
#[derive(Clone)]
pub struct ApiState {
    pub simulation: Arc<Mutex<Simulation>>,
    pub rng: Arc<Mutex<StdRng>>,
}

impl ApiState {
    pub fn new(sim: Simulation) -> Self {
        Self::with_rng(sim, StdRng::from_entropy())
    }

    pub fn with_rng(sim: Simulation, rng: StdRng) -> Self {
        Self {
            simulation: Arc::new(Mutex::new(sim)),
            rng: Arc::new(Mutex::new(rng)),
        }
    }
}

fn simulation_to_response(sim: &Simulation) -> StateResponse {
    StateResponse {
        tips: sim.tips().map(|s| s.id().index()).collect(),
        segments: sim.get_all_segments().iter().map(SegmentData::from).collect(),
        stats: sim.stats(),
    }
}

// GET /state - Tips and every segment
async fn get_state(State(api_state): State<ApiState>) -> Result<Json<StateResponse>, StatusCode> {
    let sim = api_state
        .simulation
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(simulation_to_response(&sim)))
}

// GET /stats - Counters only
async fn get_stats(State(api_state): State<ApiState>) -> Result<Json<SimulationStats>, StatusCode> {
    let sim = api_state
        .simulation
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(sim.stats()))
}

// GET /history - Per-step tip positions and biomass
async fn get_history(State(api_state): State<ApiState>) -> Result<Json<HistoryResponse>, StatusCode> {
    let sim = api_state
        .simulation
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(HistoryResponse {
        steps: sim.step_history.clone(),
        biomass: sim.biomass_history.clone(),
    }))
}

// POST /step - Advance N steps (default 1), stopping early once no tip is left
async fn step_simulation(
    Query(params): Query<StepQuery>,
    State(api_state): State<ApiState>,
) -> Result<Json<StateResponse>, StatusCode> {
    let mut sim = api_state
        .simulation
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let mut rng = api_state
        .rng
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let summary = sim.run(params.steps.unwrap_or(1), &mut *rng);
    tracing::debug!(steps = summary.steps_run, stopped = summary.stopped_early, "stepped via api");

    Ok(Json(simulation_to_response(&sim)))
}

// POST /reset - Drop the network and plant a fresh seed at the origin
async fn reset_simulation(State(api_state): State<ApiState>) -> Result<Json<StateResponse>, StatusCode> {
    let mut sim = api_state
        .simulation
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let mut rng = api_state
        .rng
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    sim.reset();
    sim.seed_at_origin(&mut *rng);

    Ok(Json(simulation_to_response(&sim)))
}

// GET /config - Active configuration
async fn get_config(State(api_state): State<ApiState>) -> Result<Json<SimulationConfig>, StatusCode> {
    let sim = api_state
        .simulation
        .lock()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(sim.config.clone()))
}

pub fn create_router(api_state: ApiState) -> Router {
    Router::new()
        .route("/state", get(get_state))
        .route("/stats", get(get_stats))
        .route("/history", get(get_history))
        .route("/config", get(get_config))
        .route("/step", post(step_simulation))
        .route("/reset", post(reset_simulation))
        .layer(CorsLayer::permissive())
        .with_state(api_state)
}

/// Serves the API until the listener fails. The simulation only advances
/// when a client posts to `/step`.
pub async fn run_server(api_state: ApiState, port: u16) -> std::io::Result<()> {
    let app = create_router(api_state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    tracing::info!(port, "hyphal-growth headless API listening");
    tracing::info!("endpoints: GET /state /stats /history /config, POST /step?steps=N /reset");

    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vec3;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn state() -> ApiState {
        let mut sim = Simulation::new();
        sim.seed(Vec3::ZERO, Vec3::Z);
        ApiState::with_rng(sim, StdRng::seed_from_u64(9))
    }

    async fn call(api: &ApiState, method: &str, uri: &str) -> (StatusCode, Value) {
        let response = create_router(api.clone())
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn stats_report_the_seed() {
        let api = state();
        let (status, body) = call(&api, "GET", "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["segments"], 1);
        assert_eq!(body["live_tips"], 1);
    }

    #[tokio::test]
    async fn step_advances_and_history_follows() {
        let api = state();
        let (status, body) = call(&api, "POST", "/step?steps=3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stats"]["steps"], 3);
        assert!(!body["tips"].as_array().unwrap().is_empty());

        let (_, history) = call(&api, "GET", "/history").await;
        assert_eq!(history["biomass"].as_array().unwrap().len(), 3);
        assert_eq!(history["steps"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn reset_plants_a_single_seed() {
        let api = state();
        call(&api, "POST", "/step?steps=5").await;
        let (_, body) = call(&api, "POST", "/reset").await;
        assert_eq!(body["segments"].as_array().unwrap().len(), 1);
        assert_eq!(body["stats"]["time"], 0.0);
        assert_eq!(body["segments"][0]["start"], serde_json::json!([0.0, 0.0, 0.0]));
    }

    #[tokio::test]
    async fn config_is_exposed() {
        let (status, body) = call(&state(), "GET", "/config").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["growth_rate"], 1.0);
    }
}
