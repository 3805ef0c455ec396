//! Error types for dynamodb-encryption.
//!
//! AWS SDK errors are mapped using typed `SdkError` variant matching and
//! `ProvideErrorMetadata` codes, never by parsing debug output.

use aws_sdk_dynamodb::error::SdkError;
use thiserror::Error;

/// Every failure an encrypt or decrypt call can surface.
#[derive(Debug, Error)]
pub enum EncryptionError {
    /// The encrypted item carries no `pointer` attribute.
    #[error("Pointer not found")]
    PointerNotFound,

    #[error("{0}")]
    Credentials(String),

    #[error("{0}")]
    AccessDenied(String),

    #[error("{0}")]
    Throttled(String),

    #[error("{0}")]
    Connection(String),

    #[error("{0}")]
    ResourceNotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("DynamoDB operation failed: {0}")]
    DynamoDb(String),

    #[error("{0}")]
    Kms(String),

    #[error("item engine error: {0}")]
    Engine(String),

    #[error("item signature does not match its attributes")]
    SignatureMismatch,

    #[error("unsupported key: {0}")]
    UnsupportedKey(String),

    #[error("invalid number: {0}")]
    InvalidNumber(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Aws(String),
}

pub type Result<T> = std::result::Result<T, EncryptionError>;

impl From<serde_json::Error> for EncryptionError {
    fn from(err: serde_json::Error) -> Self {
        EncryptionError::Serialization(err.to_string())
    }
}

impl From<base64::DecodeError> for EncryptionError {
    fn from(err: base64::DecodeError) -> Self {
        EncryptionError::Serialization(format!("Invalid base64: {}", err))
    }
}

/// AWS service type for error context.
#[derive(Debug, Clone, Copy)]
pub enum AwsService {
    DynamoDB,
    Kms,
}

impl AwsService {
    fn name(&self) -> &'static str {
        match self {
            AwsService::DynamoDB => "DynamoDB",
            AwsService::Kms => "KMS",
        }
    }
}

// ========== TYPED ERROR MAPPING ==========

/// Map non-service `SdkError` variants (dispatch failures, timeouts, etc.).
///
/// Returns `None` for `ServiceError`, which needs the error code.
fn map_outer_sdk_error<E, R>(err: &SdkError<E, R>, service: AwsService) -> Option<EncryptionError>
where
    E: std::fmt::Debug,
    R: std::fmt::Debug,
{
    match err {
        SdkError::DispatchFailure(dispatch) => {
            let detail = if dispatch.is_timeout() {
                "timed out"
            } else if dispatch.is_io() {
                "failed (I/O error)"
            } else {
                "failed"
            };
            Some(EncryptionError::Connection(format!(
                "Connection {} to {}. Check if the endpoint is reachable.",
                detail,
                service.name()
            )))
        }
        SdkError::TimeoutError(_) => Some(EncryptionError::Connection(format!(
            "Connection timed out to {}. Check your network or endpoint.",
            service.name()
        ))),
        SdkError::ConstructionFailure(err) => {
            let msg = format!("{:?}", err);
            if msg.contains("credentials") || msg.contains("Credentials") {
                Some(EncryptionError::Credentials(
                    "No AWS credentials found. Configure credentials via environment variables \
                    (AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY), AWS profile, or IAM role."
                        .to_string(),
                ))
            } else {
                Some(EncryptionError::Aws(format!(
                    "Failed to build {} request: {}",
                    service.name(),
                    msg
                )))
            }
        }
        SdkError::ResponseError(err) => Some(EncryptionError::Aws(format!(
            "Invalid response from {}: {:?}",
            service.name(),
            err
        ))),
        SdkError::ServiceError(_) => None,
        _ => Some(EncryptionError::Aws(format!(
            "Unknown error from {}: {:?}",
            service.name(),
            err
        ))),
    }
}

/// Map error codes shared by DynamoDB and KMS.
///
/// Returns `None` if the code needs service-specific handling.
pub(crate) fn map_common_service_code(
    code: Option<&str>,
    message: Option<&str>,
    service: AwsService,
) -> Option<EncryptionError> {
    let code = code?;

    match code {
        "UnrecognizedClientException" => Some(EncryptionError::Credentials(
            "Invalid AWS credentials. Check your access key and secret.".to_string(),
        )),
        "InvalidSignatureException" | "SignatureDoesNotMatch" => {
            Some(EncryptionError::Credentials(
                "AWS signature mismatch. Check your secret access key.".to_string(),
            ))
        }
        "ExpiredTokenException" | "ExpiredToken" => Some(EncryptionError::Credentials(
            "AWS credentials have expired. Refresh your session token.".to_string(),
        )),
        "AccessDeniedException" => Some(EncryptionError::AccessDenied(format!(
            "Access denied to {}: {}",
            service.name(),
            message.unwrap_or("Check your IAM permissions.")
        ))),
        "ProvisionedThroughputExceededException"
        | "LimitExceededException"
        | "RequestLimitExceeded"
        | "ThrottlingException" => Some(EncryptionError::Throttled(format!(
            "{} request rate too high. Try again with exponential backoff.",
            service.name()
        ))),
        _ => None,
    }
}

/// Map a DynamoDB service error code + message.
pub(crate) fn map_dynamodb_code(
    code: Option<&str>,
    message: Option<&str>,
    display: &str,
    table: Option<&str>,
) -> EncryptionError {
    if let Some(err) = map_common_service_code(code, message, AwsService::DynamoDB) {
        return err;
    }

    match code {
        Some("ResourceNotFoundException") => {
            let msg = match table {
                Some(t) => format!("Table '{}' not found", t),
                None => "Resource not found".to_string(),
            };
            EncryptionError::ResourceNotFound(msg)
        }
        Some("ValidationException") => {
            EncryptionError::Validation(message.unwrap_or(display).to_string())
        }
        _ => EncryptionError::DynamoDb(message.unwrap_or(display).to_string()),
    }
}

/// Map a KMS service error code + message.
pub(crate) fn map_kms_code(code: Option<&str>, message: Option<&str>, display: &str) -> EncryptionError {
    if let Some(err) = map_common_service_code(code, message, AwsService::Kms) {
        return err;
    }

    let msg = match code {
        Some("NotFoundException") => "KMS key not found. Check the key ID or alias.".to_string(),
        Some("DisabledException") => "KMS key is disabled.".to_string(),
        Some("InvalidKeyUsageException") => {
            "KMS key cannot be used for this operation.".to_string()
        }
        Some("KeyUnavailableException") => {
            "KMS key is not available. Try again later.".to_string()
        }
        Some("InvalidCiphertextException") => {
            "Invalid ciphertext. The pointer may be corrupted.".to_string()
        }
        Some("IncorrectKeyException") => "Wrong KMS key used for decryption.".to_string(),
        _ => format!("KMS operation failed: {}", message.unwrap_or(display)),
    };
    EncryptionError::Kms(msg)
}

/// Map DynamoDB SDK errors.
pub fn map_sdk_error<E, R>(err: SdkError<E, R>, table: Option<&str>) -> EncryptionError
where
    E: aws_sdk_dynamodb::error::ProvideErrorMetadata + std::fmt::Debug + std::fmt::Display,
    R: std::fmt::Debug,
{
    if let Some(mapped) = map_outer_sdk_error(&err, AwsService::DynamoDB) {
        return mapped;
    }

    if let Some(service_err) = err.as_service_error() {
        let meta = aws_sdk_dynamodb::error::ProvideErrorMetadata::meta(service_err);
        return map_dynamodb_code(meta.code(), meta.message(), &service_err.to_string(), table);
    }

    EncryptionError::Aws(format!("Unexpected DynamoDB error: {:?}", err))
}

/// Map KMS SDK errors.
pub fn map_kms_error<E, R>(err: SdkError<E, R>) -> EncryptionError
where
    E: aws_sdk_kms::error::ProvideErrorMetadata + std::fmt::Debug + std::fmt::Display,
    R: std::fmt::Debug,
{
    if let Some(mapped) = map_outer_sdk_error(&err, AwsService::Kms) {
        return mapped;
    }

    if let Some(service_err) = err.as_service_error() {
        let meta = aws_sdk_kms::error::ProvideErrorMetadata::meta(service_err);
        return map_kms_code(meta.code(), meta.message(), &service_err.to_string());
    }

    EncryptionError::Aws(format!("Unexpected KMS error: {:?}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_codes_map_to_shared_variants() {
        let err = map_common_service_code(Some("ExpiredTokenException"), None, AwsService::Kms);
        assert!(matches!(err, Some(EncryptionError::Credentials(_))));

        let err = map_common_service_code(
            Some("AccessDeniedException"),
            Some("not allowed"),
            AwsService::DynamoDB,
        );
        match err {
            Some(EncryptionError::AccessDenied(msg)) => {
                assert_eq!(msg, "Access denied to DynamoDB: not allowed")
            }
            other => panic!("unexpected mapping: {:?}", other),
        }

        assert!(map_common_service_code(Some("Whatever"), None, AwsService::Kms).is_none());
        assert!(map_common_service_code(None, None, AwsService::Kms).is_none());
    }

    #[test]
    fn missing_table_names_the_table() {
        let err = map_dynamodb_code(
            Some("ResourceNotFoundException"),
            None,
            "service error",
            Some("users"),
        );
        assert_eq!(err.to_string(), "Table 'users' not found");
    }

    #[test]
    fn unknown_dynamodb_code_keeps_message() {
        let err = map_dynamodb_code(Some("InternalServerError"), Some("boom"), "display", None);
        assert_eq!(err.to_string(), "DynamoDB operation failed: boom");
    }

    #[test]
    fn kms_codes_get_readable_messages() {
        let err = map_kms_code(Some("InvalidCiphertextException"), None, "display");
        assert!(matches!(err, EncryptionError::Kms(ref m) if m.contains("pointer")));

        let err = map_kms_code(Some("ThrottlingException"), None, "display");
        assert!(matches!(err, EncryptionError::Throttled(_)));

        let err = map_kms_code(None, None, "raw display");
        assert_eq!(err.to_string(), "KMS operation failed: raw display");
    }

    #[test]
    fn pointer_error_message() {
        assert_eq!(EncryptionError::PointerNotFound.to_string(), "Pointer not found");
    }
}
