use thiserror::Error;

/// Core error types for the gateway's request-processing pipeline.
///
/// Every variant maps to exactly one [`ErrorKind`] via [`CoreError::kind`],
/// which is the single place HTTP status codes are decided (the pipeline,
/// not the resource service or validators, performs that mapping).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid FHIR resource type: {0}")]
    InvalidResourceType(String),

    #[error("Invalid FHIR ID: {0}")]
    InvalidId(String),

    #[error("Invalid FHIR DateTime: {0}")]
    InvalidDateTime(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Time parsing error: {0}")]
    TimeError(#[from] time::error::Parse),

    #[error("UUID error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("Resource not found: {resource_type}/{id}")]
    ResourceNotFound { resource_type: String, id: String },

    #[error("Resource conflict: {resource_type}/{id} already exists")]
    ResourceConflict { resource_type: String, id: String },

    #[error("Resource version conflict on {resource_type}/{id}: If-Match did not match the current version")]
    VersionConflict { resource_type: String, id: String },

    #[error("Resource deleted: {resource_type}/{id}")]
    ResourceDeleted { resource_type: String, id: String },

    #[error("Invalid resource data: {message}")]
    InvalidResource { message: String },

    #[error("Interaction not supported: {interaction} on {resource_type}")]
    NotSupported {
        resource_type: String,
        interaction: String,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Missing tenant header {header_name}")]
    MissingTenantHeader { header_name: String },

    #[error("Tenant header {header_name} is not a valid GUID: {value}")]
    InvalidTenantFormat { header_name: String, value: String },

    #[error("Unknown tenant: {0}")]
    TenantNotFound(String),

    #[error("Tenant is disabled: {0}")]
    TenantDisabled(String),

    #[error("FHIR version not supported for this resource type: {0}")]
    VersionNotSupported(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),
}

impl CoreError {
    pub fn invalid_resource_type(resource_type: impl Into<String>) -> Self {
        Self::InvalidResourceType(resource_type.into())
    }

    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId(id.into())
    }

    pub fn invalid_date_time(datetime: impl Into<String>) -> Self {
        Self::InvalidDateTime(datetime.into())
    }

    pub fn resource_not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::ResourceNotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    pub fn resource_conflict(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::ResourceConflict {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// If-Match mismatch on UPDATE (§4.4): always 412, distinct from a
    /// business-plugin duplicate-identifier conflict which is 409.
    pub fn version_conflict(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::VersionConflict {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// A current row with `is_deleted = true` (§9: resolved as 410 Gone).
    pub fn resource_deleted(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::ResourceDeleted {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    pub fn invalid_resource(message: impl Into<String>) -> Self {
        Self::InvalidResource {
            message: message.into(),
        }
    }

    pub fn not_supported(resource_type: impl Into<String>, interaction: impl Into<String>) -> Self {
        Self::NotSupported {
            resource_type: resource_type.into(),
            interaction: interaction.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn missing_tenant_header(header_name: impl Into<String>) -> Self {
        Self::MissingTenantHeader {
            header_name: header_name.into(),
        }
    }

    pub fn invalid_tenant_format(header_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidTenantFormat {
            header_name: header_name.into(),
            value: value.into(),
        }
    }

    pub fn tenant_not_found(guid: impl Into<String>) -> Self {
        Self::TenantNotFound(guid.into())
    }

    pub fn tenant_disabled(guid: impl Into<String>) -> Self {
        Self::TenantDisabled(guid.into())
    }

    pub fn version_not_supported(message: impl Into<String>) -> Self {
        Self::VersionNotSupported(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The error kind used by the request pipeline's single kind→status
    /// mapping point (§7).
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidResourceType(_)
            | Self::InvalidId(_)
            | Self::InvalidDateTime(_)
            | Self::InvalidResource { .. }
            | Self::JsonError(_) => ErrorKind::Invalid,

            Self::ResourceNotFound { .. } => ErrorKind::NotFound,
            Self::ResourceDeleted { .. } => ErrorKind::Gone,
            Self::ResourceConflict { .. } => ErrorKind::Conflict,
            Self::VersionConflict { .. } => ErrorKind::VersionConflict,
            Self::NotSupported { .. } => ErrorKind::NotSupported,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) | Self::TenantDisabled(_) => ErrorKind::Forbidden,
            Self::BadRequest(_)
            | Self::MissingTenantHeader { .. }
            | Self::InvalidTenantFormat { .. }
            | Self::TenantNotFound(_)
            | Self::VersionNotSupported(_)
            | Self::UrlError(_) => ErrorKind::BadRequest,

            Self::Configuration(_)
            | Self::Internal(_)
            | Self::TimeError(_)
            | Self::UuidError(_)
            | Self::RegexError(_) => ErrorKind::Internal,
        }
    }

    /// The HTTP status the pipeline surfaces for this error (§7).
    pub fn status_code(&self) -> u16 {
        self.kind().http_status()
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Error category for logging/monitoring, distinct from `ErrorKind`
    /// (which drives HTTP status): coarser buckets useful for metrics.
    pub fn category(&self) -> ErrorCategory {
        match self.kind() {
            ErrorKind::Invalid => ErrorCategory::Validation,
            ErrorKind::NotFound => ErrorCategory::NotFound,
            ErrorKind::Gone => ErrorCategory::Deleted,
            ErrorKind::Conflict | ErrorKind::VersionConflict => ErrorCategory::Conflict,
            ErrorKind::NotSupported => ErrorCategory::Validation,
            ErrorKind::Unauthorized | ErrorKind::Forbidden => ErrorCategory::Authorization,
            ErrorKind::BadRequest => ErrorCategory::Validation,
            ErrorKind::Internal => match self {
                Self::Configuration(_) => ErrorCategory::Configuration,
                Self::JsonError(_) => ErrorCategory::Serialization,
                _ => ErrorCategory::System,
            },
        }
    }
}

/// The §7 error-kind taxonomy. This is the only vocabulary the resource
/// service, validators, and plugin orchestrator are allowed to produce;
/// HTTP status codes are derived from it at the pipeline boundary, never
/// chosen upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Invalid,
    NotFound,
    Gone,
    Conflict,
    VersionConflict,
    NotSupported,
    Unauthorized,
    Forbidden,
    BadRequest,
    Internal,
}

impl ErrorKind {
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::Invalid => 422,
            ErrorKind::NotFound => 404,
            ErrorKind::Gone => 410,
            ErrorKind::Conflict => 409,
            ErrorKind::VersionConflict => 412,
            ErrorKind::NotSupported => 405,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::BadRequest => 400,
            ErrorKind::Internal => 500,
        }
    }
}

/// Error categories for monitoring and classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Conflict,
    Deleted,
    Authorization,
    Serialization,
    System,
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Deleted => write!(f, "deleted"),
            Self::Authorization => write!(f, "authorization"),
            Self::Serialization => write!(f, "serialization"),
            Self::System => write!(f, "system"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CoreError::invalid_resource_type("InvalidType");
        assert_eq!(err.to_string(), "Invalid FHIR resource type: InvalidType");
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_resource_not_found_error() {
        let err = CoreError::resource_not_found("Patient", "123");
        assert_eq!(err.to_string(), "Resource not found: Patient/123");
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_resource_deleted_maps_to_410() {
        let err = CoreError::resource_deleted("Patient", "123");
        assert_eq!(err.kind(), ErrorKind::Gone);
        assert_eq!(err.status_code(), 410);
    }

    #[test]
    fn test_version_conflict_maps_to_412() {
        let err = CoreError::version_conflict("Patient", "123");
        assert_eq!(err.status_code(), 412);
    }

    #[test]
    fn test_resource_conflict_maps_to_409() {
        let err = CoreError::resource_conflict("Patient", "123");
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn test_not_supported_maps_to_405() {
        let err = CoreError::not_supported("Patient", "patch");
        assert_eq!(err.status_code(), 405);
    }

    #[test]
    fn test_tenant_errors_map_correctly() {
        assert_eq!(CoreError::missing_tenant_header("X-Tenant-ID").status_code(), 400);
        assert_eq!(
            CoreError::invalid_tenant_format("X-Tenant-ID", "nope").status_code(),
            400
        );
        assert_eq!(CoreError::tenant_not_found("guid").status_code(), 400);
        assert_eq!(CoreError::tenant_disabled("guid").status_code(), 403);
    }

    #[test]
    fn test_version_not_supported_is_bad_request() {
        assert_eq!(
            CoreError::version_not_supported("r3 unknown").status_code(),
            400
        );
    }

    #[test]
    fn test_unauthorized_and_forbidden() {
        assert_eq!(CoreError::unauthorized("no token").status_code(), 401);
        assert_eq!(CoreError::forbidden("no scope").status_code(), 403);
    }

    #[test]
    fn test_json_error_conversion() {
        let invalid_json = "{ invalid json }";
        let json_err: serde_json::Error =
            serde_json::from_str::<serde_json::Value>(invalid_json).unwrap_err();
        let core_err: CoreError = json_err.into();

        assert!(matches!(core_err, CoreError::JsonError(_)));
        assert_eq!(core_err.status_code(), 422);
    }

    #[test]
    fn test_configuration_error_is_internal() {
        let err = CoreError::configuration("Invalid config value");
        assert_eq!(err.to_string(), "Configuration error: Invalid config value");
        assert!(err.is_server_error());
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_url_error_is_bad_request() {
        let url_err = url::Url::parse("not a url").unwrap_err();
        let core_err: CoreError = url_err.into();
        assert_eq!(core_err.status_code(), 400);
    }

    #[test]
    fn test_error_categories_display() {
        assert_eq!(ErrorCategory::Validation.to_string(), "validation");
        assert_eq!(ErrorCategory::NotFound.to_string(), "not_found");
        assert_eq!(ErrorCategory::Conflict.to_string(), "conflict");
        assert_eq!(ErrorCategory::Serialization.to_string(), "serialization");
        assert_eq!(ErrorCategory::System.to_string(), "system");
        assert_eq!(ErrorCategory::Configuration.to_string(), "configuration");
        assert_eq!(ErrorCategory::Authorization.to_string(), "authorization");
    }

    #[test]
    fn test_client_vs_server_error_classification() {
        assert!(CoreError::invalid_resource_type("Bad").is_client_error());
        assert!(CoreError::invalid_id("bad-id").is_client_error());
        assert!(CoreError::resource_not_found("Patient", "123").is_client_error());
        assert!(CoreError::resource_conflict("Patient", "123").is_client_error());

        assert!(CoreError::configuration("config error").is_server_error());

        let client_err = CoreError::invalid_id("test");
        assert!(client_err.is_client_error());
        assert!(!client_err.is_server_error());

        let server_err = CoreError::configuration("test");
        assert!(server_err.is_server_error());
        assert!(!server_err.is_client_error());
    }

    #[test]
    fn test_result_type_usage() {
        fn test_function() -> Result<String> {
            Ok("success".to_string())
        }

        fn test_function_error() -> Result<String> {
            Err(CoreError::invalid_id("bad"))
        }

        assert!(test_function().is_ok());
        assert!(test_function_error().is_err());
    }

    #[test]
    fn test_error_chains() {
        let invalid_time_str = "25:61:61";
        match time::Time::parse(
            invalid_time_str,
            &time::format_description::parse("[hour]:[minute]:[second]").unwrap(),
        ) {
            Err(time_err) => {
                let core_err: CoreError = time_err.into();
                assert!(matches!(core_err, CoreError::TimeError(_)));
                assert!(core_err.is_server_error());
            }
            Ok(_) => panic!("Expected time parsing to fail"),
        }
    }

    #[test]
    fn test_uuid_error_conversion() {
        let uuid_str = "not-a-uuid";
        match uuid::Uuid::parse_str(uuid_str) {
            Err(uuid_err) => {
                let core_err: CoreError = uuid_err.into();
                assert!(matches!(core_err, CoreError::UuidError(_)));
                assert!(core_err.is_server_error());
            }
            Ok(_) => panic!("Expected UUID parsing to fail"),
        }
    }

    #[test]
    fn test_regex_error_conversion() {
        let invalid_regex = "[";
        match regex::Regex::new(invalid_regex) {
            Err(regex_err) => {
                let core_err: CoreError = regex_err.into();
                assert!(matches!(core_err, CoreError::RegexError(_)));
                assert!(core_err.is_server_error());
            }
            Ok(_) => panic!("Expected regex compilation to fail"),
        }
    }

    #[test]
    fn test_all_kinds_have_distinct_or_documented_status() {
        let kinds = [
            ErrorKind::Invalid,
            ErrorKind::NotFound,
            ErrorKind::Gone,
            ErrorKind::Conflict,
            ErrorKind::VersionConflict,
            ErrorKind::NotSupported,
            ErrorKind::Unauthorized,
            ErrorKind::Forbidden,
            ErrorKind::BadRequest,
            ErrorKind::Internal,
        ];
        // Conflict (409) and VersionConflict (412) are the one kind that
        // the spec's table collapses into "409 / 412" depending on cause.
        let statuses: Vec<u16> = kinds.iter().map(|k| k.http_status()).collect();
        assert_eq!(statuses.len(), kinds.len());
    }
}
