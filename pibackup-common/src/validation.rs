//! Input validation
//!
//! The device name ends up inside the image file name, so it has to be a
//! plain file name component.

/// Validate a device name for filesystem compatibility
///
/// # Validation Rules
/// - Name must not be empty and must be ≤ 64 characters
/// - Cannot contain `/`, null bytes, whitespace, or `..`
/// - Cannot start with `-` or `.`
///
/// # Examples
/// ```
/// # use pibackup_common::validate_device_name;
/// assert!(validate_device_name("kitchen-pi").is_ok());
/// assert!(validate_device_name("../root").is_err());
/// ```
pub fn validate_device_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Device name cannot be empty".to_string());
    }

    if name.len() > 64 {
        return Err("Device name too long (max 64 characters)".to_string());
    }

    if name.contains('/') {
        return Err("Device name cannot contain '/'".to_string());
    }

    if name.contains('\0') {
        return Err("Device name cannot contain null bytes".to_string());
    }

    if name.chars().any(char::is_whitespace) {
        return Err("Device name cannot contain whitespace".to_string());
    }

    if name.contains("..") {
        return Err("Device name cannot contain '..'".to_string());
    }

    if name.starts_with('-') {
        return Err("Device name cannot start with '-'".to_string());
    }

    if name.starts_with('.') {
        return Err("Device name cannot start with '.'".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_device_names() {
        assert!(validate_device_name("device1").is_ok());
        assert!(validate_device_name("pi_zero.2").is_ok());
    }

    #[test]
    fn test_invalid_device_names() {
        assert!(validate_device_name("").is_err());
        assert!(validate_device_name("a/b").is_err());
        assert!(validate_device_name("two words").is_err());
        assert!(validate_device_name("-rf").is_err());
        assert!(validate_device_name(".hidden").is_err());
        assert!(validate_device_name(&"x".repeat(65)).is_err());
    }
}
