//! Service façade
//!
//! Translates RPC-shaped requests into [`SignController`] calls and maps
//! driver errors onto status codes. No state lives here beyond the handle to
//! the controller.
//!
//! # Wire envelope
//!
//! One JSON object per request:
//!
//! ```json
//! {"method": "Draw", "params": {"sign": "top", "image": [true, false]}}
//! ```
//!
//! answered by either `{"result": {...}}` or
//! `{"error": {"code": "NOT_FOUND", "message": "Sign not found: top"}}`.

use crate::controller::SignController;
use crate::types::{DriverError, ErrorKind, SignInfo};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// RPC status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    Internal,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            StatusCode::NotFound => write!(f, "NOT_FOUND"),
            StatusCode::FailedPrecondition => write!(f, "FAILED_PRECONDITION"),
            StatusCode::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// A failed call: machine-checkable code plus a readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InvalidArgument, message)
    }
}

impl From<DriverError> for Status {
    fn from(err: DriverError) -> Self {
        let code = match err.kind() {
            ErrorKind::NotFound => StatusCode::NotFound,
            ErrorKind::InvalidImage | ErrorKind::InvalidEnum => StatusCode::InvalidArgument,
            ErrorKind::InvalidState => StatusCode::FailedPrecondition,
            ErrorKind::Configuration | ErrorKind::HardwareFault => StatusCode::Internal,
        };
        Self::new(code, err.to_string())
    }
}

/// Test pattern action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestAction {
    Start = 0,
    Stop = 1,
}

impl TryFrom<i32> for TestAction {
    type Error = DriverError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TestAction::Start),
            1 => Ok(TestAction::Stop),
            _ => Err(DriverError::InvalidEnum {
                field: "action",
                value,
            }),
        }
    }
}

/// Light switch position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightStatus {
    Off = 0,
    On = 1,
}

impl TryFrom<i32> for LightStatus {
    type Error = DriverError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LightStatus::Off),
            1 => Ok(LightStatus::On),
            _ => Err(DriverError::InvalidEnum {
                field: "status",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetInfoRequest {
    /// Restrict the answer to one sign
    #[serde(default)]
    pub sign: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetInfoResponse {
    pub signs: Vec<SignInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRequest {
    pub sign: String,
    /// Row-major pixels, `width * height` long
    pub image: Vec<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawResponse {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRequest {
    pub action: i32,
}

impl TestRequest {
    pub fn new(action: TestAction) -> Self {
        Self {
            action: action as i32,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResponse {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightRequest {
    pub status: i32,
}

impl LightRequest {
    pub fn new(status: LightStatus) -> Self {
        Self {
            status: status as i32,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightResponse {}

/// Request envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum Request {
    GetInfo(GetInfoRequest),
    Draw(DrawRequest),
    Test(TestRequest),
    Light(LightRequest),
}

/// Successful reply bodies
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    GetInfo(GetInfoResponse),
    Draw(DrawResponse),
    Test(TestResponse),
    Light(LightResponse),
}

/// Response envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Result(Reply),
    Error(Status),
}

/// The service façade
pub struct Service<C: ?Sized> {
    controller: Arc<C>,
}

impl<C: SignController + ?Sized> Service<C> {
    pub fn new(controller: Arc<C>) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &Arc<C> {
        &self.controller
    }

    /// Describe every sign, or only the named one
    pub fn get_info(&self, request: GetInfoRequest) -> Result<GetInfoResponse, Status> {
        let signs = match request.sign.as_deref() {
            Some(name) => vec![self.controller.sign(name)?],
            None => self.controller.signs()?,
        };
        Ok(GetInfoResponse { signs })
    }

    pub fn draw(&self, request: DrawRequest) -> Result<DrawResponse, Status> {
        self.controller.draw(&request.sign, request.image)?;
        Ok(DrawResponse {})
    }

    pub fn test(&self, request: TestRequest) -> Result<TestResponse, Status> {
        let action = TestAction::try_from(request.action)?;
        self.controller.test(action == TestAction::Start)?;
        Ok(TestResponse {})
    }

    pub fn light(&self, request: LightRequest) -> Result<LightResponse, Status> {
        let status = LightStatus::try_from(request.status)?;
        self.controller.set_light(status == LightStatus::On)?;
        Ok(LightResponse {})
    }

    /// Route a decoded request
    pub fn dispatch(&self, request: Request) -> Response {
        let result = match request {
            Request::GetInfo(req) => self.get_info(req).map(Reply::GetInfo),
            Request::Draw(req) => self.draw(req).map(Reply::Draw),
            Request::Test(req) => self.test(req).map(Reply::Test),
            Request::Light(req) => self.light(req).map(Reply::Light),
        };
        match result {
            Ok(reply) => Response::Result(reply),
            Err(status) => {
                log::debug!("Request failed: {}", status);
                Response::Error(status)
            }
        }
    }

    /// Decode one JSON request, dispatch it, and encode the response
    ///
    /// Takes raw bytes so a transport can hand over a complete line without
    /// decoding it first. Invalid UTF-8 is reported like any malformed JSON.
    pub fn handle_json(&self, line: impl AsRef<[u8]>) -> String {
        let response = match serde_json::from_slice::<Request>(line.as_ref()) {
            Ok(request) => self.dispatch(request),
            Err(e) => Response::Error(Status::invalid_argument(format!(
                "malformed request: {}",
                e
            ))),
        };
        serde_json::to_string(&response).unwrap_or_else(|e| {
            log::error!("Failed to encode response: {}", e);
            r#"{"error":{"code":"INTERNAL","message":"failed to encode response"}}"#.to_string()
        })
    }
}
