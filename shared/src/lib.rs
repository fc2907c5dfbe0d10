use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const EVENT_AUTH: &str = "auth";
pub const EVENT_SEND_STATS: &str = "send stats";
pub const EVENT_AUTH_SUCCESS: &str = "auth success";
pub const EVENT_STATS: &str = "stats";
pub const EVENT_STATUS: &str = "status";
pub const EVENT_TOKEN_EXPIRING: &str = "token expiring";
pub const EVENT_TOKEN_EXPIRED: &str = "token expired";

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("`{event}` frame is missing its argument")]
    MissingArgument { event: String },
    #[error("stats payload is malformed: {0}")]
    MalformedStats(serde_json::Error),
    #[error("unknown server status `{0}`")]
    UnknownStatus(String),
}

/// One-time transport endpoint and token handed out by the panel backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub socket_url: String,
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    #[default]
    Offline,
    Starting,
    Stopping,
    Running,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Offline => "offline",
            ServerStatus::Starting => "starting",
            ServerStatus::Stopping => "stopping",
            ServerStatus::Running => "running",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ServerStatus {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offline" => Ok(ServerStatus::Offline),
            "starting" => Ok(ServerStatus::Starting),
            "stopping" => Ok(ServerStatus::Stopping),
            "running" => Ok(ServerStatus::Running),
            other => Err(FrameError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ServerMetrics {
    pub cpu_percent: f64,
    pub memory_bytes: f64,
    pub disk_bytes: f64,
}

impl ServerMetrics {
    pub fn new(cpu_percent: f64, memory_bytes: f64, disk_bytes: f64) -> Self {
        Self {
            cpu_percent: cpu_percent.max(0.0),
            memory_bytes: memory_bytes.max(0.0),
            disk_bytes: disk_bytes.max(0.0),
        }
    }
}

/// Body of a `stats` frame as the panel daemon reports it.
/// Missing or `null` fields count as zero.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StatsPayload {
    cpu_absolute: Option<f64>,
    memory_bytes: Option<f64>,
    disk_bytes: Option<f64>,
}

impl From<StatsPayload> for ServerMetrics {
    fn from(payload: StatsPayload) -> Self {
        ServerMetrics::new(
            payload.cpu_absolute.unwrap_or(0.0),
            payload.memory_bytes.unwrap_or(0.0),
            payload.disk_bytes.unwrap_or(0.0),
        )
    }
}

/// JSON envelope shared by every frame in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
}

impl WireFrame {
    fn first_arg(&self) -> Result<&Value, FrameError> {
        self.args
            .as_ref()
            .and_then(|args| args.first())
            .filter(|arg| !arg.is_null())
            .ok_or_else(|| FrameError::MissingArgument {
                event: self.event.clone(),
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Auth { token: String },
    SendStats,
}

impl OutboundFrame {
    pub fn event(&self) -> &'static str {
        match self {
            OutboundFrame::Auth { .. } => EVENT_AUTH,
            OutboundFrame::SendStats => EVENT_SEND_STATS,
        }
    }

    pub fn encode(&self) -> Result<String, FrameError> {
        let args = match self {
            OutboundFrame::Auth { token } => vec![Value::String(token.clone())],
            OutboundFrame::SendStats => vec![Value::Null],
        };
        let frame = WireFrame {
            event: self.event().to_string(),
            args: Some(args),
        };
        Ok(serde_json::to_string(&frame)?)
    }
}

/// Server-to-client frames, decoded once at the transport boundary.
///
/// `Status` keeps the raw string so the consumer decides how to treat values
/// outside [`ServerStatus`].
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    AuthSuccess,
    Stats(ServerMetrics),
    Status(String),
    TokenExpiring,
    TokenExpired,
    Unknown(String),
}

impl InboundFrame {
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let frame: WireFrame = serde_json::from_str(text)?;

        let decoded = match frame.event.as_str() {
            EVENT_AUTH_SUCCESS => InboundFrame::AuthSuccess,
            EVENT_STATS => InboundFrame::Stats(decode_stats(frame.first_arg()?)?),
            EVENT_STATUS => match frame.first_arg()? {
                Value::String(status) => InboundFrame::Status(status.clone()),
                _ => {
                    return Err(FrameError::MissingArgument {
                        event: frame.event.clone(),
                    })
                }
            },
            EVENT_TOKEN_EXPIRING => InboundFrame::TokenExpiring,
            EVENT_TOKEN_EXPIRED => InboundFrame::TokenExpired,
            other => InboundFrame::Unknown(other.to_string()),
        };

        Ok(decoded)
    }
}

// The daemon sends the payload as a JSON string; some proxies forward it already parsed.
fn decode_stats(arg: &Value) -> Result<ServerMetrics, FrameError> {
    let payload: StatsPayload = match arg {
        Value::String(raw) => serde_json::from_str(raw).map_err(FrameError::MalformedStats)?,
        other => serde_json::from_value(other.clone()).map_err(FrameError::MalformedStats)?,
    };
    Ok(payload.into())
}

/// Formats a byte count the way the dashboard cards show it (base 1024).
pub fn format_bytes(bytes: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024.0 {
        return format!("{} B", bytes.max(0.0).round() as u64);
    }

    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{:.2} {}", value, UNITS[unit])
}
