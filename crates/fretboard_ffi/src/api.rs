//! FFI use-case API for the Flutter editing surface.
//!
//! # Responsibility
//! - Expose surface sessions to Dart via FRB as sync calls.
//! - Carry bridge messages as JSON envelope strings in both directions.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Every outbound string is a complete `{action, data}` envelope the Dart
//!   side forwards to the document host verbatim.

use fretboard_core::db::open_db;
use fretboard_core::service::template_service::TemplateService;
use fretboard_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    EngineConfig, OutboundMessage, ScaleMode, SessionId, SqliteTemplateRepository,
    SurfaceSession, Template,
};
use log::{error, info};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

const TEMPLATE_DB_FILE_NAME: &str = "fretboard_templates.sqlite3";
static TEMPLATE_DB_PATH: OnceLock<PathBuf> = OnceLock::new();
static SESSIONS: OnceLock<Mutex<HashMap<SessionId, SurfaceSession>>> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Result of one surface call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceResponse {
    pub ok: bool,
    pub session_id: Option<String>,
    /// Envelopes to forward to the host, in order.
    pub outbound: Vec<String>,
    /// Human-readable message for diagnostics/UI.
    pub message: String,
}

impl SurfaceResponse {
    fn success(session_id: SessionId, outbound: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            ok: true,
            session_id: Some(session_id.to_string()),
            outbound,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            session_id: None,
            outbound: Vec::new(),
            message: message.into(),
        }
    }
}

/// One field as the surface should render it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldView {
    pub name: String,
    pub value: String,
    pub modified: bool,
    pub editable: bool,
}

/// Read-only view of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceSnapshot {
    /// `initial|live|template`.
    pub mode: String,
    pub template_name: Option<String>,
    pub scale_mode: String,
    pub fields: Vec<FieldView>,
    pub can_undo: bool,
    pub can_redo: bool,
    pub busy: bool,
    pub computing: bool,
    pub pending_timeline_changes: u32,
    /// Active notices; error notices are prefixed with `error: `.
    pub notices: Vec<String>,
}

/// Opens a surface session and returns its initial fetch requests.
///
/// `config_json` may be empty for defaults.
#[flutter_rust_bridge::frb(sync)]
pub fn open_session(config_json: String) -> SurfaceResponse {
    let config = if config_json.trim().is_empty() {
        EngineConfig::from_env()
    } else {
        EngineConfig::from_json(&config_json)
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => return SurfaceResponse::failure(format!("open_session failed: {err}")),
    };

    let mut session = SurfaceSession::new(config);
    let id = session.id();
    let outbound = match session.open().and_then(encode_all) {
        Ok(outbound) => outbound,
        Err(err) => return SurfaceResponse::failure(format!("open_session failed: {err}")),
    };
    match sessions().lock() {
        Ok(mut sessions) => {
            sessions.insert(id, session);
            info!(
                "event=ffi_open module=ffi status=ok session={} open_sessions={}",
                id,
                sessions.len()
            );
            SurfaceResponse::success(id, outbound, "Session opened.")
        }
        Err(_) => SurfaceResponse::failure("open_session failed: session registry poisoned"),
    }
}

/// Stages one display value.
#[flutter_rust_bridge::frb(sync)]
pub fn stage_edit(session_id: String, name: String, value: String) -> SurfaceResponse {
    with_session(&session_id, "stage_edit", |session| {
        session
            .stage_edit(name.trim(), &value)
            .map(|_| (Vec::new(), "Staged.".to_string()))
            .map_err(|err| err.to_string())
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn undo(session_id: String) -> SurfaceResponse {
    with_session(&session_id, "undo", |session| {
        session.undo();
        Ok((Vec::new(), String::new()))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn redo(session_id: String) -> SurfaceResponse {
    with_session(&session_id, "redo", |session| {
        session.redo();
        Ok((Vec::new(), String::new()))
    })
}

/// Switches linked scale editing: `single` or `multi`.
#[flutter_rust_bridge::frb(sync)]
pub fn set_scale_mode(session_id: String, mode: String) -> SurfaceResponse {
    let mode = match mode.trim().to_ascii_lowercase().as_str() {
        "single" => ScaleMode::Single,
        "multi" => ScaleMode::Multi,
        other => return SurfaceResponse::failure(format!("unknown scale mode: {other}")),
    };
    with_session(&session_id, "set_scale_mode", |session| {
        session.set_scale_mode(mode);
        Ok((Vec::new(), String::new()))
    })
}

/// Flips one timeline item locally.
#[flutter_rust_bridge::frb(sync)]
pub fn toggle_timeline_item(session_id: String, name: String) -> SurfaceResponse {
    with_session(&session_id, "toggle_timeline_item", |session| {
        session
            .toggle_timeline_item(&name)
            .map(|suppressed| {
                let state = if suppressed { "suppressed" } else { "active" };
                (Vec::new(), format!("{name} is {state}."))
            })
            .map_err(|err| err.to_string())
    })
}

/// Sends the modified fields; an empty `outbound` means nothing changed.
#[flutter_rust_bridge::frb(sync)]
pub fn submit_params(session_id: String) -> SurfaceResponse {
    with_session(&session_id, "submit_params", |session| {
        let message = session.submit_params().map_err(|err| err.to_string())?;
        optional_outbound(message, "No changes to apply.")
    })
}

/// Sends the pending timeline overrides.
#[flutter_rust_bridge::frb(sync)]
pub fn submit_timeline_changes(session_id: String) -> SurfaceResponse {
    with_session(&session_id, "submit_timeline_changes", |session| {
        let message = session
            .submit_timeline_changes()
            .map_err(|err| err.to_string())?;
        optional_outbound(message, "No timeline changes to apply.")
    })
}

/// Requests the current state of one timeline item by exact name.
#[flutter_rust_bridge::frb(sync)]
pub fn request_item_state(session_id: String, name: String) -> SurfaceResponse {
    with_session(&session_id, "request_item_state", |session| {
        let message = session
            .request_item_state(name.trim())
            .map_err(|err| err.to_string())?;
        Ok((encode_all(vec![message]).map_err(|err| err.to_string())?, String::new()))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn load_template(session_id: String, template_id: String, readonly: bool) -> SurfaceResponse {
    with_session(&session_id, "load_template", |session| {
        let message = session
            .load_template(template_id.trim(), readonly)
            .map_err(|err| err.to_string())?;
        Ok((encode_all(vec![message]).map_err(|err| err.to_string())?, String::new()))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn save_template(session_id: String, name: String, description: String) -> SurfaceResponse {
    with_session(&session_id, "save_template", |session| {
        let message = session
            .save_template(&name, &description)
            .map_err(|err| err.to_string())?;
        Ok((encode_all(vec![message]).map_err(|err| err.to_string())?, String::new()))
    })
}

#[flutter_rust_bridge::frb(sync)]
pub fn delete_template(session_id: String, template_id: String) -> SurfaceResponse {
    with_session(&session_id, "delete_template", |session| {
        let message = session
            .delete_template(template_id.trim())
            .map_err(|err| err.to_string())?;
        Ok((encode_all(vec![message]).map_err(|err| err.to_string())?, String::new()))
    })
}

/// Applies one host envelope; `outbound` carries follow-up requests.
#[flutter_rust_bridge::frb(sync)]
pub fn receive_message(session_id: String, raw: String) -> SurfaceResponse {
    with_session(&session_id, "receive_message", |session| {
        let follow_ups = session.receive(&raw).map_err(|err| err.to_string())?;
        Ok((encode_all(follow_ups).map_err(|err| err.to_string())?, String::new()))
    })
}

/// Current view of a session, `None` when the id is unknown.
#[flutter_rust_bridge::frb(sync)]
pub fn session_snapshot(session_id: String) -> Option<SurfaceSnapshot> {
    let id = SessionId::parse(&session_id)?;
    let sessions = sessions().lock().ok()?;
    let session = sessions.get(&id)?;
    let params = session.params();
    let edits = params.snapshot();
    let now = Instant::now();
    Some(SurfaceSnapshot {
        mode: params.mode().as_str().to_string(),
        template_name: params.template_name().map(str::to_string),
        scale_mode: match edits.scale_mode() {
            ScaleMode::Single => "single".to_string(),
            ScaleMode::Multi => "multi".to_string(),
        },
        fields: params
            .baseline()
            .fields()
            .iter()
            .map(|field| FieldView {
                name: field.name.clone(),
                value: edits.value(&field.name).unwrap_or_default().to_string(),
                modified: params.is_modified(&field.name),
                editable: field.editable,
            })
            .collect(),
        can_undo: edits.can_undo(),
        can_redo: edits.can_redo(),
        busy: session.is_busy(),
        computing: session.is_computing(),
        pending_timeline_changes: u32::try_from(session.pending().len()).unwrap_or(u32::MAX),
        notices: session
            .active_notices(now)
            .into_iter()
            .map(|notice| {
                if notice.is_error {
                    format!("error: {}", notice.message)
                } else {
                    notice.message.clone()
                }
            })
            .collect(),
    })
}

/// Detaches a session. Requests already sent still run on the host.
#[flutter_rust_bridge::frb(sync)]
pub fn close_session(session_id: String) -> SurfaceResponse {
    let Some(id) = SessionId::parse(&session_id) else {
        return SurfaceResponse::failure(format!("close_session failed: invalid id {session_id}"));
    };
    let removed = match sessions().lock() {
        Ok(mut sessions) => sessions.remove(&id),
        Err(_) => return SurfaceResponse::failure("close_session failed: session registry poisoned"),
    };
    match removed {
        Some(mut session) => {
            session.close();
            SurfaceResponse::success(id, Vec::new(), "Session closed.")
        }
        None => SurfaceResponse::failure(format!("close_session failed: unknown session {id}")),
    }
}

/// Installs readonly presets into the shared template database.
///
/// `presets_json` is a JSON array of templates. Returns empty string on
/// success and an error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn seed_template_presets(presets_json: String) -> String {
    let presets: Vec<Template> = match serde_json::from_str(&presets_json) {
        Ok(presets) => presets,
        Err(err) => return format!("seed_template_presets failed: {err}"),
    };
    let db_path = resolve_template_db_path();
    let result = open_db(&db_path)
        .map_err(|err| format!("template DB open failed: {err}"))
        .and_then(|conn| {
            let repo = SqliteTemplateRepository::try_new(&conn)
                .map_err(|err| format!("template repo init failed: {err}"))?;
            TemplateService::new(repo)
                .seed_presets(&presets)
                .map_err(|err| err.to_string())
        });
    match result {
        Ok(_) => String::new(),
        Err(err) => {
            error!("event=ffi_seed module=ffi status=error error={}", err);
            format!("seed_template_presets failed: {err}")
        }
    }
}

/// Template database path: `FRETBOARD_DB_PATH` or a file in the temp dir.
pub fn resolve_template_db_path() -> PathBuf {
    TEMPLATE_DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var("FRETBOARD_DB_PATH") {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(TEMPLATE_DB_FILE_NAME)
        })
        .clone()
}

fn sessions() -> &'static Mutex<HashMap<SessionId, SurfaceSession>> {
    SESSIONS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn with_session(
    session_id: &str,
    operation: &str,
    f: impl FnOnce(&mut SurfaceSession) -> Result<(Vec<String>, String), String>,
) -> SurfaceResponse {
    let Some(id) = SessionId::parse(session_id) else {
        return SurfaceResponse::failure(format!("{operation} failed: invalid id {session_id}"));
    };
    let mut sessions = match sessions().lock() {
        Ok(sessions) => sessions,
        Err(_) => {
            return SurfaceResponse::failure(format!(
                "{operation} failed: session registry poisoned"
            ))
        }
    };
    let Some(session) = sessions.get_mut(&id) else {
        return SurfaceResponse::failure(format!("{operation} failed: unknown session {id}"));
    };
    match f(session) {
        Ok((outbound, message)) => SurfaceResponse::success(id, outbound, message),
        Err(err) => SurfaceResponse::failure(format!("{operation} failed: {err}")),
    }
}

fn optional_outbound(
    message: Option<OutboundMessage>,
    empty_message: &str,
) -> Result<(Vec<String>, String), String> {
    match message {
        Some(message) => Ok((
            encode_all(vec![message]).map_err(|err| err.to_string())?,
            String::new(),
        )),
        None => Ok((Vec::new(), empty_message.to_string())),
    }
}

fn encode_all(messages: Vec<OutboundMessage>) -> fretboard_core::bridge::BridgeResult<Vec<String>> {
    messages.iter().map(OutboundMessage::to_json).collect()
}
