//! Route handlers for a wrapped model.

use std::time::Instant;

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{error, info};

use crate::error::ApiError;
use crate::metrics;
use crate::model_runtime::{ModelInput, XAI_METHOD_FIELD};
use crate::profiling::sample::profile_output_json_spec;
use crate::profiling::ProfileSample;

use super::form::{read_form, require_ue_id};
use super::state::ServiceState;

const UE_ID_DESCRIPTION: &str = "User Equipment ID (string) for tracking the request.";

/// Which model entry point a request targets.
#[derive(Debug, Clone)]
enum Call {
    Infer,
    Explain(String),
}

impl Call {
    fn route(&self) -> &'static str {
        match self {
            Call::Infer => "model",
            Call::Explain(_) => "xai_model",
        }
    }
}

struct Outcome {
    results: Value,
    xai_results: Option<Value>,
    sample: Option<ProfileSample>,
}

/// Run the model on the blocking pool, optionally under the profiler, and
/// record the execution in the run log.
async fn execute(state: &ServiceState, ue_id: &str, input: ModelInput, call: Call, profile: bool) -> Result<Outcome, ApiError> {
    let route = call.route();
    let input_size = input.input_size() as u64;
    let model = state.model.clone();
    let profiler = state.profiler.clone();
    let start = Instant::now();

    metrics::inc_in_flight();
    let joined = tokio::task::spawn_blocking(move || {
        let invoke = || match &call {
            Call::Infer => model.infer(&input).map(|results| (results, None)),
            Call::Explain(method) => model
                .explain(&input, method)
                .map(|explanation| (explanation.model_results, Some(explanation.xai_results))),
        };
        if profile {
            let name = match &call {
                Call::Infer => "model_inference",
                Call::Explain(_) => "xai_model_inference",
            };
            let (result, sample) = profiler.profile(name, invoke);
            result.map(|(results, xai_results)| (results, xai_results, Some(sample)))
        } else {
            invoke().map(|(results, xai_results)| (results, xai_results, None))
        }
    })
    .await;
    metrics::dec_in_flight();

    let elapsed = start.elapsed().as_secs_f64();
    metrics::observe_inference(route, elapsed);

    let (results, xai_results, sample) = match joined {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            error!("Model call failed for UE {}: {:#}", ue_id, e);
            return Err(ApiError::Model(format!("Failed to run the model. {:#}", e)));
        }
        Err(e) => {
            error!("Model task panicked for UE {}: {}", ue_id, e);
            return Err(ApiError::Internal("Model task failed".to_string()));
        }
    };

    state.run_log.record(ue_id, input_size, elapsed);
    info!("UE {} served by {} in {:.3}s ({} bytes)", ue_id, route, elapsed, input_size);
    Ok(Outcome {
        results,
        xai_results,
        sample,
    })
}

fn requested_method(state: &ServiceState, input: &ModelInput) -> Result<String, ApiError> {
    let method = input
        .xai_method()
        .ok_or_else(|| ApiError::BadRequest("XAI method is required.".to_string()))?;
    let supported = state.model.xai_methods();
    if !supported.iter().any(|m| m == method) {
        return Err(ApiError::BadRequest(format!(
            "Unsupported XAI method '{}'. Supported methods: {}",
            method,
            supported.join(", ")
        )));
    }
    Ok(method.to_string())
}

pub async fn run(
    State(state): State<ServiceState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let input = read_form(multipart).await?;
    let ue_id = require_ue_id(&input)?;
    let outcome = execute(&state, &ue_id, input, Call::Infer, false).await?;
    Ok(Json(json!({ "ue_id": ue_id, "model_results": outcome.results })))
}

pub async fn profile_run(
    State(state): State<ServiceState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let input = read_form(multipart).await?;
    let ue_id = require_ue_id(&input)?;
    let outcome = execute(&state, &ue_id, input, Call::Infer, true).await?;
    Ok(Json(json!({
        "ue_id": ue_id,
        "profile_result": outcome.sample,
        "model_results": outcome.results,
    })))
}

pub async fn xai_run(
    State(state): State<ServiceState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let input = read_form(multipart).await?;
    let ue_id = require_ue_id(&input)?;
    let method = requested_method(&state, &input)?;
    let outcome = execute(&state, &ue_id, input, Call::Explain(method), false).await?;
    Ok(Json(json!({
        "ue_id": ue_id,
        "xai_results": outcome.xai_results,
        "model_results": outcome.results,
    })))
}

pub async fn xai_profile_run(
    State(state): State<ServiceState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let input = read_form(multipart).await?;
    let ue_id = require_ue_id(&input)?;
    let method = requested_method(&state, &input)?;
    let outcome = execute(&state, &ue_id, input, Call::Explain(method), true).await?;
    Ok(Json(json!({
        "ue_id": ue_id,
        "xai_results": outcome.xai_results,
        "profile_result": outcome.sample,
        "model_results": outcome.results,
    })))
}

#[derive(Debug, Deserialize)]
pub struct UeLogQuery {
    pub ue_id: Option<String>,
}

pub async fn get_ue_log(
    State(state): State<ServiceState>,
    Query(query): Query<UeLogQuery>,
) -> Result<Json<Value>, ApiError> {
    let ue_id = query
        .ue_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("UE_ID is required.".to_string()))?;

    match state.run_log.get(&ue_id) {
        Some(log) => Ok(Json(serde_json::to_value(log).map_err(|e| ApiError::Internal(e.to_string()))?)),
        None => Err(ApiError::NotFound(format!("No logs found for UE_ID: {}", ue_id))),
    }
}

pub async fn initialization_duration(State(state): State<ServiceState>) -> Result<Json<Value>, ApiError> {
    match state.initialization_duration() {
        Some(duration) => Ok(Json(json!({
            "initialization_duration": duration,
            "script_start_time": state.script_start_time(),
        }))),
        None => Err(ApiError::Internal("Model not initialized.".to_string())),
    }
}

/// Merge `ue_id` and `extra` into a JSON object spec.
fn with_ue_id(spec: Value, extra: Option<(&str, &str)>) -> Value {
    let mut merged = Map::new();
    merged.insert("ue_id".to_string(), Value::from(UE_ID_DESCRIPTION));
    if let Some((key, description)) = extra {
        merged.insert(key.to_string(), Value::from(description));
    }
    if let Value::Object(fields) = spec {
        for (key, value) in fields {
            merged.entry(key).or_insert(value);
        }
    }
    Value::Object(merged)
}

fn merge(mut base: Value, extra: Value) -> Value {
    if let (Value::Object(base_fields), Value::Object(extra_fields)) = (&mut base, extra) {
        base_fields.extend(extra_fields);
    }
    base
}

/// Endpoint catalogue built from the model's input and output specs.
pub fn help_catalogue(state: &ServiceState) -> Value {
    let model = &state.model;
    let input_spec = model.input_form_spec();
    let output_spec = model.output_json_spec();
    let profile_spec = profile_output_json_spec();

    let mut endpoints = Map::new();
    endpoints.insert(
        "/model/run".to_string(),
        json!({
            "method": "POST",
            "description": "Executes the AI model with the provided input data.",
            "parameters": with_ue_id(input_spec.clone(), None),
            "response": with_ue_id(output_spec.clone(), None),
        }),
    );
    endpoints.insert(
        "/model/profile_run".to_string(),
        json!({
            "method": "POST",
            "description": "Profiles the AI model execution.",
            "parameters": with_ue_id(input_spec.clone(), None),
            "response": with_ue_id(
                profile_spec.clone(),
                Some(("profile_result", "Profiling results of the AI model execution.")),
            ),
        }),
    );
    endpoints.insert(
        "/get_ue_log".to_string(),
        json!({
            "method": "GET",
            "description": "Retrieves logs for a specific UE_ID.",
            "parameters": { "ue_id": "User Equipment ID (string) to retrieve logs for." },
            "response": {
                "node_id": "ID of the node running the model.",
                "k8s_pod_name": "Name of the pod running the model.",
                "model_name": "Name of the AI model.",
                "ue_id": "User Equipment ID (string) for which logs are retrieved.",
                "total_input_size": "Total size of input data processed for the UE_ID (in bytes).",
                "total_execution_duration": "Total time taken for all executions for the UE_ID (in seconds).",
                "total_executions": "Total number of executions for the UE_ID.",
                "average_execution_duration": "Average time taken for each execution for the UE_ID (in seconds).",
                "latest_run": {
                    "input_size": "Size of the latest input data processed (in bytes).",
                    "execution_duration": "Time taken for the latest execution (in seconds).",
                    "timestamp": "Timestamp of the latest execution (in seconds since epoch).",
                },
            },
        }),
    );
    endpoints.insert(
        "/initialization_duration".to_string(),
        json!({
            "method": "GET",
            "description": "Retrieves the initialization duration of the AI model.",
            "response": {
                "initialization_duration": "Time taken to initialize the model (in seconds).",
                "script_start_time": "Timestamp when the script started (in seconds since epoch).",
            },
        }),
    );

    if state.supports_xai() {
        let xai_output = model.xai_output_json_spec();
        let xai_input = merge(
            input_spec,
            json!({ (XAI_METHOD_FIELD): { "type": "string", "description": "XAI method", "enum": model.xai_methods() } }),
        );
        endpoints.insert(
            "/xai_model/run".to_string(),
            json!({
                "method": "POST",
                "description": "Executes the XAI model with the provided input data.",
                "parameters": with_ue_id(xai_input.clone(), None),
                "response": with_ue_id(merge(output_spec, xai_output.clone()), None),
            }),
        );
        endpoints.insert(
            "/xai_model/profile_run".to_string(),
            json!({
                "method": "POST",
                "description": "Profiles the XAI model execution.",
                "parameters": with_ue_id(xai_input, None),
                "response": with_ue_id(
                    merge(profile_spec, xai_output),
                    Some(("profile_result", "Profiling results of the XAI model execution.")),
                ),
            }),
        );
    }

    json!({ "endpoints": endpoints })
}

pub async fn help(State(state): State<ServiceState>) -> Json<Value> {
    Json(help_catalogue(&state))
}
