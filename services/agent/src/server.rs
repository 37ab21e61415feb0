//! Config query server.
//!
//! Local HTTP endpoint through which applications on this host read
//! their own configuration and secrets. Every request is answered from
//! the remote metadata authority via the store client and wrapped in
//! the uniform `{code, msg, body}` envelope.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use tracing::debug;

use crate::error::{AgentError, ApiError, Envelope};
use crate::model::{ConfigObject, SecretObject};
use crate::store::ConfigStoreClient;

struct AppState {
    store: ConfigStoreClient,
}

/// Query string of the config endpoints.
#[derive(Debug, Deserialize)]
pub struct QueryParams {
    #[serde(default)]
    appname: Option<String>,

    #[serde(default, rename = "type")]
    resource_type: Option<String>,

    #[serde(default)]
    domain: Option<String>,
}

/// Build the query router. `/configmap` is the legacy spelling of
/// `/config` kept for older clients.
pub fn router(store: ConfigStoreClient) -> Router {
    let state = Arc::new(AppState { store });
    Router::new()
        .route("/config", get(query_config))
        .route("/configmap", get(query_config))
        .with_state(state)
}

async fn query_config(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Envelope>, ApiError> {
    let resource_type = params
        .resource_type
        .as_deref()
        .ok_or_else(|| AgentError::InvalidParameter("type is required".to_string()))?;
    if params.appname.is_none() && params.domain.is_none() {
        return Err(AgentError::InvalidParameter(
            "appname or domain is required".to_string(),
        )
        .into());
    }

    let appname = params.appname.as_deref();
    let domain = params.domain.as_deref();
    debug!(?appname, ?domain, resource_type, "config query");

    let body = match resource_type {
        "configmap" => {
            let objects = state.store.config_objects(appname, domain).await?;
            let maps: Vec<BTreeMap<String, String>> =
                objects.iter().map(config_data).collect();
            serde_json::to_value(maps).map_err(AgentError::from)?
        }
        "secret" => {
            let objects = state.store.secret_objects(appname, domain).await?;
            let maps: Vec<BTreeMap<String, String>> =
                objects.iter().map(secret_data).collect();
            serde_json::to_value(maps).map_err(AgentError::from)?
        }
        other => {
            return Err(AgentError::Format(format!("unsupported type: {other}")).into());
        }
    };

    Ok(Json(Envelope::success(body)))
}

/// Plain data of a config object; falls back to decoded binary data
/// when no plain entries exist.
fn config_data(obj: &ConfigObject) -> BTreeMap<String, String> {
    if !obj.data.is_empty() {
        return obj.data.clone();
    }
    obj.binary_data
        .iter()
        .map(|(k, v)| (k.clone(), decode_value(v)))
        .collect()
}

/// Secret values are stored base64-encoded; decode each one.
fn secret_data(obj: &SecretObject) -> BTreeMap<String, String> {
    obj.data
        .iter()
        .map(|(k, v)| (k.clone(), decode_value(v)))
        .collect()
}

/// Decode a base64 value to UTF-8 text. Values that are not valid
/// base64, or not valid UTF-8 once decoded, pass through unchanged.
fn decode_value(raw: &str) -> String {
    match BASE64.decode(raw) {
        Ok(bytes) => String::from_utf8(bytes).unwrap_or_else(|_| raw.to_string()),
        Err(_) => raw.to_string(),
    }
}
