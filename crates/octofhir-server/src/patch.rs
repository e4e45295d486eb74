//! JSON Patch (RFC 6902) support for the PATCH interaction.

use json_patch::{Patch, PatchOperation, patch};
use octofhir_api::ApiError;
use serde_json::Value;

/// Applies a JSON Patch (RFC 6902) to a FHIR resource.
///
/// # Arguments
/// * `resource` - The current resource JSON to patch
/// * `patch_bytes` - Raw JSON Patch document bytes
///
/// # Returns
/// The patched resource or an error if the patch is invalid or fails to apply
pub fn apply_json_patch(resource: &Value, patch_bytes: &[u8]) -> Result<Value, ApiError> {
    let operations: Patch = serde_json::from_slice(patch_bytes)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON Patch document: {e}")))?;

    validate_json_patch_operations(&operations.0)?;

    let mut patched = resource.clone();
    patch(&mut patched, &operations)
        .map_err(|e| ApiError::bad_request(format!("Patch operation failed: {e}")))?;

    Ok(patched)
}

/// Validates that JSON Patch operations don't modify protected fields.
fn validate_json_patch_operations(operations: &[PatchOperation]) -> Result<(), ApiError> {
    for op in operations {
        let path = json_patch_operation_path(op);

        if path == "/resourceType" || path.starts_with("/resourceType/") {
            return Err(ApiError::bad_request(
                "Cannot modify resourceType with patch".to_string(),
            ));
        }

        if path == "/id" || path.starts_with("/id/") {
            return Err(ApiError::bad_request(
                "Cannot modify id with patch".to_string(),
            ));
        }
    }
    Ok(())
}

/// Extracts the path from a JSON Patch operation.
fn json_patch_operation_path(op: &PatchOperation) -> &str {
    match op {
        PatchOperation::Add(add_op) => add_op.path.as_str(),
        PatchOperation::Remove(remove_op) => remove_op.path.as_str(),
        PatchOperation::Replace(replace_op) => replace_op.path.as_str(),
        PatchOperation::Move(move_op) => move_op.path.as_str(),
        PatchOperation::Copy(copy_op) => copy_op.path.as_str(),
        PatchOperation::Test(test_op) => test_op.path.as_str(),
    }
}
