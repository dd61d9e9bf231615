//! Verifies `CoreError` stays small enough that clippy's large_enum_variant
//! lint doesn't fire and `Result<T, CoreError>` stays cheap to move around.

use media_core::error::CoreError;

#[test]
fn test_core_error_size() {
    let error_size = std::mem::size_of::<CoreError>();

    assert!(
        error_size <= 128,
        "CoreError size is {} bytes, which is too large. Consider boxing large variants.",
        error_size
    );

    println!("CoreError size: {} bytes", error_size);
}

#[test]
fn test_result_size() {
    let result_unit_size = std::mem::size_of::<Result<(), CoreError>>();
    let result_string_size = std::mem::size_of::<Result<String, CoreError>>();
    let result_value_size = std::mem::size_of::<Result<serde_json::Value, CoreError>>();

    println!("Result<(), CoreError> size: {} bytes", result_unit_size);
    println!("Result<String, CoreError> size: {} bytes", result_string_size);
    println!("Result<Value, CoreError> size: {} bytes", result_value_size);

    assert!(result_unit_size <= 136, "Result<(), CoreError> is too large");
    assert!(result_string_size <= 160, "Result<String, CoreError> is too large");
    assert!(result_value_size <= 160, "Result<Value, CoreError> is too large");
}
