//! Flare Social Core 错误工具模块
//!
//! - 统一的错误类型 `FlareError` 与错误码 `ErrorCode`
//! - 错误分类对应客户端的失败处理策略（校验 / 远端写 / 远端读 / 增强副作用）
//! - 为基础设施层提供便捷的错误转换工具

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidArgument,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    AlreadyExists,
    InsufficientPoints,
    RemoteWriteFailed,
    RemoteReadFailed,
    ProcedureFailed,
    SubscriptionFailed,
    StorageFailed,
    OperationTimeout,
    ConfigurationError,
    Internal,
}

/// 错误分类
///
/// 决定调用方的处理方式：校验错误在远端调用之前拒绝；远端写失败触发回滚；
/// 远端读失败保留旧状态；增强副作用失败只记录日志。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Validation,
    RemoteWrite,
    RemoteRead,
    Enrichment,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::NotFound => "not_found",
            ErrorCode::AlreadyExists => "already_exists",
            ErrorCode::InsufficientPoints => "insufficient_points",
            ErrorCode::RemoteWriteFailed => "remote_write_failed",
            ErrorCode::RemoteReadFailed => "remote_read_failed",
            ErrorCode::ProcedureFailed => "procedure_failed",
            ErrorCode::SubscriptionFailed => "subscription_failed",
            ErrorCode::StorageFailed => "storage_failed",
            ErrorCode::OperationTimeout => "operation_timeout",
            ErrorCode::ConfigurationError => "configuration_error",
            ErrorCode::Internal => "internal",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::InvalidArgument
            | ErrorCode::Unauthenticated
            | ErrorCode::PermissionDenied
            | ErrorCode::AlreadyExists
            | ErrorCode::InsufficientPoints => ErrorCategory::Validation,
            ErrorCode::RemoteWriteFailed
            | ErrorCode::ProcedureFailed
            | ErrorCode::StorageFailed
            | ErrorCode::OperationTimeout => ErrorCategory::RemoteWrite,
            ErrorCode::RemoteReadFailed
            | ErrorCode::NotFound
            | ErrorCode::SubscriptionFailed => ErrorCategory::RemoteRead,
            ErrorCode::ConfigurationError | ErrorCode::Internal => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 统一错误类型
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct FlareError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl FlareError {
    pub fn new<T: Into<String>>(code: ErrorCode, message: T) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn invalid_argument<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn unauthenticated() -> Self {
        Self::new(ErrorCode::Unauthenticated, "no signed-in user")
    }

    pub fn remote_write<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorCode::RemoteWriteFailed, message)
    }

    pub fn remote_read<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorCode::RemoteReadFailed, message)
    }

    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    pub fn is_validation(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }

    /// 面向用户展示的简短文案
    pub fn user_message(&self) -> String {
        match self.category() {
            ErrorCategory::Validation => self.message.clone(),
            ErrorCategory::RemoteWrite => format!("action failed: {}", self.message),
            ErrorCategory::RemoteRead => "could not load data".to_string(),
            ErrorCategory::Enrichment | ErrorCategory::Internal => {
                "something went wrong".to_string()
            }
        }
    }
}

/// 错误构建器
pub struct ErrorBuilder {
    code: ErrorCode,
    message: String,
    details: Option<String>,
}

impl ErrorBuilder {
    pub fn new<T: Into<String>>(code: ErrorCode, message: T) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn details<T: Into<String>>(mut self, details: T) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn build_error(self) -> FlareError {
        FlareError {
            code: self.code,
            message: self.message,
            details: self.details,
        }
    }
}

pub type Result<T> = std::result::Result<T, FlareError>;

/// 基础设施错误转换
pub trait InfraResultExt<T> {
    fn into_flare(self, code: ErrorCode, message: &str) -> Result<T>;
}

impl<T, E: fmt::Display> InfraResultExt<T> for std::result::Result<T, E> {
    fn into_flare(self, code: ErrorCode, message: &str) -> Result<T> {
        self.map_err(|err| {
            ErrorBuilder::new(code, message)
                .details(err.to_string())
                .build_error()
        })
    }
}

/// 屏幕边界上的操作反馈
///
/// 应用层处理器在此把错误转换为本地提示，错误不会继续向外传播。
#[derive(Debug, Clone, PartialEq)]
pub enum CommandFeedback<T> {
    Done(T),
    /// 同一实体已有进行中的操作，本次被忽略
    Ignored,
    Failed {
        code: ErrorCode,
        message: String,
    },
}

impl<T> CommandFeedback<T> {
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => CommandFeedback::Done(value),
            Err(err) => CommandFeedback::Failed {
                code: err.code,
                message: err.user_message(),
            },
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, CommandFeedback::Done(_))
    }

    pub fn into_done(self) -> Option<T> {
        match self {
            CommandFeedback::Done(value) => Some(value),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            CommandFeedback::Failed { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            CommandFeedback::Failed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// 便捷宏：校验失败时直接返回 `InvalidArgument`
#[macro_export]
macro_rules! ensure_valid {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            return Err($crate::error::FlareError::invalid_argument($msg));
        }
    };
}

/// 便捷宏：从返回基础设施错误的表达式中直接转换为业务层 `Result`
#[macro_export]
macro_rules! try_infra {
    ($expr:expr, $code:expr, $msg:expr) => {
        $crate::error::InfraResultExt::into_flare($expr, $code, $msg)?
    };
}
